//! Invokes the C compiler driver and turns its captured stderr into a
//! `ReportPart{source = "gcc"}`.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, instrument, trace};

use crate::error::{ConcoctError, Result};
use crate::model::ReportPart;
use crate::parsers::compiler::CompilerParser;
use crate::parsers::DiagnosticParser;
use crate::project::Project;

/// The default flag set: `-static`, C99, no optimization, debug symbols,
/// both warning classes on, and a disabled line-wrap so diagnostics stay
/// one-line-per-message for the parser.
const DEFAULT_FLAGS: &[&str] =
    &["-static", "-std=c99", "-O0", "-g", "-Wall", "-Wextra", "-fmessage-length=0"];

pub struct CompilerRunner {
    path: PathBuf,
    flags: Vec<String>,
    parser: CompilerParser,
}

impl Default for CompilerRunner {
    fn default() -> Self {
        Self::new("gcc")
    }
}

impl CompilerRunner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flags: DEFAULT_FLAGS.iter().map(|s| s.to_string()).collect(),
            parser: CompilerParser::default(),
        }
    }

    /// Overrides the default flag set entirely.
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_parser(mut self, parser: CompilerParser) -> Self {
        self.parser = parser;
        self
    }

    /// Invokes `gcc --version` and returns the raw stdout, for the
    /// environment probe.
    #[instrument(level = "debug", skip_all)]
    pub fn version(&self) -> Result<String> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("--version").stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!(?cmd, "checking compiler version");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.path))?;
        if !output.status.success() {
            return Err(ConcoctError::env(format!("{} --version failed", self.path.display())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Asks the compiler driver to resolve `lib<name>.{so,a}` on its default
    /// search path, the probe the environment check uses to confirm the
    /// unit-test library is installed before accepting any grading work.
    pub fn probe_library(&self, name: &str) -> Result<bool> {
        for ext in ["so", "a"] {
            let filename = format!("lib{name}.{ext}");
            let mut cmd = Command::new(&self.path);
            cmd.arg(format!("-print-file-name={filename}"))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.path))?;
            let resolved = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !resolved.is_empty() && resolved != filename {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Compiles `project` into `project.tempdir/project.target`, capturing
    /// both streams. The scratch directory must already be assigned by the
    /// pipeline; its absence is a programming error, not user input.
    #[instrument(name = "compile", level = "debug", skip(self, project))]
    pub fn compile(&self, project: &Project) -> Result<ReportPart> {
        let tempdir = project
            .tempdir
            .as_ref()
            .ok_or_else(|| ConcoctError::infra("compiler invoked without a scratch directory"))?;
        let output_path = tempdir.join(&project.target);

        let mut cmd = Command::new(&self.path);
        cmd.args(&self.flags);
        for include in &project.include {
            cmd.arg("-I").arg(include);
        }
        cmd.arg("-o").arg(&output_path);
        cmd.args(&project.file_list);
        cmd.arg("-lcunit");
        for lib in &project.libs {
            cmd.arg(format!("-l{lib}"));
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(?cmd, "compiling project");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.path))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        trace!(%stderr, "compiler stderr");

        let outcome = self.parser.parse(&output.stderr)?;
        let returncode = output.status.code().unwrap_or(-1);
        Ok(ReportPart::new("gcc", returncode, outcome.messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_enforce_c99_and_static() {
        let runner = CompilerRunner::new("gcc");
        assert!(runner.flags.contains(&"-static".to_string()));
        assert!(runner.flags.contains(&"-std=c99".to_string()));
    }

    #[test]
    fn compile_without_tempdir_is_an_infrastructure_error() {
        let project =
            crate::project::Project::new("p", vec![], vec![], vec![]).unwrap();
        let err = CompilerRunner::default().compile(&project).unwrap_err();
        assert!(matches!(err, ConcoctError::Infrastructure(_)));
    }
}
