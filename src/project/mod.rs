//! `Task` + `Solution` compose into a `Project`: the buildable unit every
//! pipeline stage operates on.
//!
//! Task and Solution are read-only value objects; a `Project` is created
//! fresh per grading run and discarded afterward. `Project` never carries a
//! back-reference to the `Task` that produced it — the factories on `Task`
//! build a freestanding value, deliberately keeping the relation one-way.

mod task;

pub use task::{Task, TaskConfig};

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::debug;

use crate::error::{ConcoctError, Result};

/// The student contribution being graded against a `Task`.
#[derive(Debug, Clone)]
pub struct Solution<'a> {
    pub task: &'a Task,
    pub solution_file_list: Vec<PathBuf>,
}

impl<'a> Solution<'a> {
    pub fn new(task: &'a Task, solution_file_list: Vec<PathBuf>) -> Self {
        Self { task, solution_file_list }
    }
}

/// A concrete buildable composition: file list, include paths, library
/// names, and a container-repo-safe target name, materialized per grading
/// run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub project_name: String,
    pub target: String,
    pub file_list: Vec<PathBuf>,
    pub include: Vec<PathBuf>,
    pub libs: Vec<String>,
    /// Assigned by the pipeline for the duration of one grading run, cleared
    /// afterward. `None` outside that window.
    pub tempdir: Option<PathBuf>,
}

impl Project {
    /// Builds a `Project`, validating that every entry in `file_list` exists
    /// on disk. Never panics, never launches an external process; a missing
    /// file is reported as `InputValidation`, not a crash.
    pub fn new(
        project_name: impl Into<String>,
        file_list: Vec<PathBuf>,
        include: Vec<PathBuf>,
        libs: Vec<String>,
    ) -> Result<Self> {
        let project_name = project_name.into();
        for file in &file_list {
            if !file.exists() {
                return Err(ConcoctError::input(format!(
                    "project {project_name:?} references missing file {}",
                    file.display()
                )));
            }
        }
        let target = derive_target(&project_name);
        debug!(%project_name, %target, files = file_list.len(), "composed project");
        Ok(Self { project_name, target, file_list, include, libs, tempdir: None })
    }

    /// The compiled executable's expected path once the scratch directory is
    /// assigned.
    pub fn executable_path(&self) -> Option<PathBuf> {
        self.tempdir.as_ref().map(|dir| dir.join(&self.target))
    }

    pub fn image_tag(&self) -> String {
        format!("autotest/{}", self.target)
    }
}

/// Base64-encode the UTF-8 bytes, lower-case, strip `=` padding: keeps the
/// name acceptable as a container image repository name. Not injective over
/// arbitrary project names (lower-casing may collide) — callers are expected
/// to keep project names unique, see DESIGN.md.
fn derive_target(project_name: &str) -> String {
    STANDARD.encode(project_name.as_bytes()).to_lowercase().trim_end_matches('=').to_string()
}

pub(crate) fn resolve_all(root: &Path, names: &[String]) -> Vec<PathBuf> {
    names.iter().map(|name| root.join(name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_lowercase_base64_without_padding() {
        let target = derive_target("greaterZero");
        assert!(!target.contains('='));
        assert_eq!(target, target.to_lowercase());
    }

    #[test]
    fn construction_fails_for_missing_file() {
        let err = Project::new(
            "p",
            vec![PathBuf::from("/nonexistent/definitely/not/here.c")],
            vec![],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, ConcoctError::InputValidation(_)));
    }

    #[test]
    fn construction_succeeds_for_existing_files() {
        let file = std::env::temp_dir().join("concoct_project_test_exists.c");
        std::fs::write(&file, "int main(void) { return 0; }").unwrap();
        let project = Project::new("p", vec![file.clone()], vec![], vec![]).unwrap();
        assert_eq!(project.file_list, vec![file.clone()]);
        std::fs::remove_file(&file).ok();
    }
}
