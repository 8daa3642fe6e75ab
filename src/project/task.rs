use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{ConcoctError, Result};
use crate::project::{resolve_all, Project, Solution};

/// The on-disk shape of `<task-path>/config.json`, field names exactly as
/// spec'd on the wire (`desc`, `src_dir`); [`Task`] itself uses clearer
/// field names once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub desc: String,
    #[serde(default)]
    pub libs: Vec<String>,
    pub src_dir: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub files_main: Vec<String>,
    #[serde(default)]
    pub files_test: Vec<String>,
    #[serde(default)]
    pub files_student: Vec<String>,
}

/// An instructor-authored exercise: description, configuration, common
/// sources, a main driver, a test driver, and placeholder student files.
/// Read-only once loaded.
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub description_path: PathBuf,
    pub libs: Vec<String>,
    pub source_root: PathBuf,
    pub files: Vec<String>,
    pub files_main: Vec<String>,
    pub files_test: Vec<String>,
    pub files_student: Vec<String>,
}

impl Task {
    /// Reads `<path>/config.json` and resolves `description_path` /
    /// `source_root` relative to `path`. Fails with `InputValidation` on a
    /// missing or ill-formed config, never panics.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_path = path.join("config.json");
        let raw = std::fs::read_to_string(&config_path).map_err(|e| ConcoctError::io(e, &config_path))?;
        let config: TaskConfig = serde_json::from_str(&raw)
            .map_err(|e| ConcoctError::input(format!("malformed task config {config_path:?}: {e}")))?;

        let source_root = path.join(&config.src_dir);
        let description_path = path.join(&config.desc);
        debug!(task = %config.name, ?source_root, "loaded task config");

        Ok(Self {
            name: config.name,
            description_path,
            libs: config.libs,
            source_root,
            files: config.files,
            files_main: config.files_main,
            files_test: config.files_test,
            files_student: config.files_student,
        })
    }

    /// Combines `files` + `files_main` + (the solution's files, or
    /// `files_student` if none was given) into a `Project` with
    /// `[source_root]` as the single include directory.
    pub fn main_project(&self, solution: Option<&Solution<'_>>) -> Result<Project> {
        self.project(&self.files_main, solution)
    }

    /// Same composition, using `files_test` as the entry point instead of
    /// `files_main`.
    pub fn test_project(&self, solution: Option<&Solution<'_>>) -> Result<Project> {
        self.project(&self.files_test, solution)
    }

    fn project(&self, entry_point: &[String], solution: Option<&Solution<'_>>) -> Result<Project> {
        let mut file_list = resolve_all(&self.source_root, &self.files);
        file_list.extend(resolve_all(&self.source_root, entry_point));

        match solution {
            Some(solution) => file_list.extend(solution.solution_file_list.iter().cloned()),
            None => file_list.extend(resolve_all(&self.source_root, &self.files_student)),
        }

        Project::new(self.name.clone(), file_list, vec![self.source_root.clone()], self.libs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_task(root: &Path, name_suffix: &str) {
        let src_dir = "src";
        fs::create_dir_all(root.join(src_dir)).unwrap();
        fs::write(root.join(src_dir).join("common.c"), "int common(void) { return 1; }").unwrap();
        fs::write(root.join(src_dir).join("main.c"), "int main(void) { return 0; }").unwrap();
        fs::write(root.join(src_dir).join("student.c"), "int student(void) { return 0; }").unwrap();
        fs::write(root.join("description.md"), "describe task").unwrap();

        let config = serde_json::json!({
            "name": format!("task{name_suffix}"),
            "desc": "description.md",
            "libs": ["m"],
            "src_dir": src_dir,
            "files": ["common.c"],
            "files_main": ["main.c"],
            "files_test": ["main.c"],
            "files_student": ["student.c"],
        });
        fs::write(root.join("config.json"), config.to_string()).unwrap();
    }

    #[test]
    fn main_project_uses_files_student_without_a_solution() {
        let root = std::env::temp_dir().join("concoct_task_test_no_solution");
        fs::create_dir_all(&root).unwrap();
        write_task(&root, "_no_solution");

        let task = Task::load(&root).unwrap();
        let project = task.main_project(None).unwrap();
        assert_eq!(project.file_list.len(), 3);
        assert!(project.file_list.iter().any(|p| p.ends_with("student.c")));
        assert_eq!(project.include, vec![task.source_root.clone()]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn main_project_prefers_solution_files_when_present() {
        let root = std::env::temp_dir().join("concoct_task_test_with_solution");
        fs::create_dir_all(&root).unwrap();
        write_task(&root, "_with_solution");

        let task = Task::load(&root).unwrap();
        let solution_file = root.join("submitted.c");
        fs::write(&solution_file, "int student(void) { return 1; }").unwrap();
        let solution = Solution::new(&task, vec![solution_file.clone()]);
        let project = task.main_project(Some(&solution)).unwrap();

        assert!(project.file_list.contains(&solution_file));
        assert!(!project.file_list.iter().any(|p| p.ends_with("student.c")));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn main_project_does_not_fall_back_to_files_student_for_an_empty_solution() {
        let root = std::env::temp_dir().join("concoct_task_test_empty_solution");
        fs::create_dir_all(&root).unwrap();
        write_task(&root, "_empty_solution");

        let task = Task::load(&root).unwrap();
        let solution = Solution::new(&task, vec![]);
        let project = task.main_project(Some(&solution)).unwrap();

        assert!(!project.file_list.iter().any(|p| p.ends_with("student.c")));
        assert_eq!(project.file_list.len(), 2);

        fs::remove_dir_all(&root).ok();
    }
}
