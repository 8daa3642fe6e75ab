//! Invokes the static analyzer and turns its captured stderr (where cppcheck
//! writes its XML report) into a `ReportPart{source = "cppcheck"}`.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, instrument, trace};

use crate::error::{ConcoctError, Result};
use crate::model::ReportPart;
use crate::parsers::cppcheck::CppcheckParser;
use crate::parsers::DiagnosticParser;
use crate::project::Project;

pub struct StaticAnalyzerRunner {
    path: PathBuf,
    parser: CppcheckParser,
}

impl Default for StaticAnalyzerRunner {
    fn default() -> Self {
        Self::new("cppcheck")
    }
}

impl StaticAnalyzerRunner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), parser: CppcheckParser::default() }
    }

    #[instrument(level = "debug", skip_all)]
    pub fn version(&self) -> Result<String> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("--version").stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!(?cmd, "checking static analyzer version");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.path))?;
        if !output.status.success() {
            return Err(ConcoctError::env(format!("{} --version failed", self.path.display())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[instrument(name = "analyze", level = "debug", skip(self, project))]
    pub fn check(&self, project: &Project) -> Result<ReportPart> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("--suppress=missingIncludeSystem");
        for include in &project.include {
            cmd.arg("-I").arg(include);
        }
        cmd.arg("--std=c99").arg("--enable=all").arg("--xml-version=2");
        cmd.args(&project.file_list);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(?cmd, "running static analyzer");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.path))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        trace!(%stderr, "static analyzer stderr");

        let outcome = self.parser.parse(&output.stderr)?;
        let returncode = output.status.code().unwrap_or(-1);
        Ok(ReportPart::new("cppcheck", returncode, outcome.messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_includes_required_flags() {
        let project = crate::project::Project::new(
            "p",
            vec![],
            vec![PathBuf::from("/tmp/include")],
            vec![],
        )
        .unwrap();
        let mut cmd = Command::new("cppcheck");
        cmd.arg("--suppress=missingIncludeSystem");
        for include in &project.include {
            cmd.arg("-I").arg(include);
        }
        cmd.arg("--std=c99").arg("--enable=all").arg("--xml-version=2");
        let rendered = format!("{cmd:?}");
        assert!(rendered.contains("--xml-version=2"));
        assert!(rendered.contains("/tmp/include"));
    }
}
