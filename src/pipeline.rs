//! Orchestrates the three-stage check: static analysis, compilation,
//! isolated unit-test execution. Stage sequencing, short-circuit semantics,
//! and scratch-directory lifecycle live here; nothing else in the crate
//! decides run order.

use tracing::{debug, warn};

use crate::backend::IsolationBackend;
use crate::error::{ConcoctError, Result};
use crate::model::{Report, ReportPart};
use crate::parsers::cunit::CunitParser;
use crate::parsers::DiagnosticParser;
use crate::project::Project;
use crate::tools::{CompilerRunner, StaticAnalyzerRunner};

pub struct GradingPipeline<B: IsolationBackend> {
    analyzer: StaticAnalyzerRunner,
    compiler: CompilerRunner,
    backend: B,
}

impl<B: IsolationBackend> GradingPipeline<B> {
    /// Construction runs the environment probe; a missing prerequisite
    /// fails here, before any grading work is accepted, never partway
    /// through a run.
    pub fn new(
        analyzer: StaticAnalyzerRunner,
        compiler: CompilerRunner,
        backend: B,
        probe_container_runtime: &crate::backend::ContainerBackend,
    ) -> Result<Self> {
        crate::probe::Probe::verify(&compiler, &analyzer, probe_container_runtime)?;
        Ok(Self { analyzer, compiler, backend })
    }

    /// Assigns a scratch directory to `project.tempdir` for the duration of
    /// the call, runs the three stages with short-circuit semantics, and
    /// clears `project.tempdir` before returning — on every path, success or
    /// error, matching the explicit-scope cleanup this crate uses instead of
    /// a `Drop`-based finalizer.
    pub fn check_project(&self, project: &mut Project) -> Result<Report> {
        let scratch = tempfile::tempdir().map_err(|e| ConcoctError::io(e, std::env::temp_dir()))?;
        project.tempdir = Some(scratch.path().to_path_buf());

        let result = self.run_stages(project);

        project.tempdir = None;
        result
    }

    fn run_stages(&self, project: &Project) -> Result<Report> {
        let mut report = Report::new();

        let analysis = self.analyzer.check(project)?;
        let analysis_ok = analysis.succeeded();
        report.add_part(analysis);
        if !analysis_ok {
            debug!("static analyzer reported failure; skipping compile and test stages");
            return Ok(report);
        }

        let compilation = self.compiler.compile(project)?;
        let compilation_ok = compilation.succeeded();
        report.add_part(compilation);
        if !compilation_ok {
            debug!("compilation failed; skipping test stage");
            return Ok(report);
        }

        let outcome = self.backend.run(project)?;
        let test_part = self.build_test_part(outcome);
        report.add_part(test_part);

        Ok(report)
    }

    fn build_test_part(&self, outcome: crate::backend::BackendOutcome) -> ReportPart {
        if outcome.exit_code != 0 {
            return ReportPart::new("cunit", outcome.exit_code, vec![]);
        }

        match outcome.test_artifact {
            Some(bytes) => {
                match CunitParser.parse(&bytes) {
                    Ok(outcome) => {
                        ReportPart::new("cunit", 0, outcome.messages).with_tests(outcome.tests.unwrap_or_default())
                    }
                    Err(e) => {
                        warn!(error = %e, "test artifact failed to parse; recording an empty report part");
                        ReportPart::new("cunit", 0, vec![])
                    }
                }
            }
            None => ReportPart::new("cunit", -1, vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOutcome;

    struct StubBackend(BackendOutcome);

    impl IsolationBackend for StubBackend {
        fn run(&self, _project: &Project) -> Result<BackendOutcome> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn nonzero_backend_exit_code_yields_empty_messages() {
        let pipeline = GradingPipeline {
            analyzer: StaticAnalyzerRunner::default(),
            compiler: CompilerRunner::default(),
            backend: StubBackend(BackendOutcome { exit_code: -1, test_artifact: None }),
        };
        let part = pipeline.build_test_part(BackendOutcome { exit_code: -1, test_artifact: None });
        assert_eq!(part.returncode, -1);
        assert!(part.messages.is_empty());
    }

    #[test]
    fn malformed_artifact_yields_empty_messages_not_an_error() {
        let pipeline = GradingPipeline {
            analyzer: StaticAnalyzerRunner::default(),
            compiler: CompilerRunner::default(),
            backend: StubBackend(BackendOutcome { exit_code: 0, test_artifact: None }),
        };
        let part = pipeline.build_test_part(BackendOutcome {
            exit_code: 0,
            test_artifact: Some(b"<not><closed>".to_vec()),
        });
        assert_eq!(part.returncode, 0);
        assert!(part.messages.is_empty());
    }
}
