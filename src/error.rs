//! Typed error taxonomy for the grading pipeline.
//!
//! Stage-level tool failures (a non-zero `gcc`/`cppcheck` exit code) are
//! intentionally **not** represented here: per the pipeline's design those
//! are data recorded in a [`crate::model::ReportPart`], not an exception.
//! Everything in this enum aborts the current grading run.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ConcoctError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ConcoctError {
    /// A required external tool or library is absent or too old. Raised at
    /// pipeline construction; fatal.
    #[error("missing dependency: {0}")]
    Environment(String),

    /// A `Project` references a missing source file, or a `Task` config is
    /// missing or ill-formed.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// A parser received malformed input.
    #[error("failed to parse {source} output: {message}")]
    ParseError { source: &'static str, message: String },

    /// An isolation backend itself failed (could not connect, image build
    /// failed, executable missing). Cleanup still ran on every exit path.
    #[error("isolation backend failure: {0}")]
    Infrastructure(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ConcoctError {
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn infra(msg: impl std::fmt::Display) -> Self {
        Self::Infrastructure(msg.to_string())
    }

    pub fn env(msg: impl std::fmt::Display) -> Self {
        Self::Environment(msg.to_string())
    }

    pub fn input(msg: impl std::fmt::Display) -> Self {
        Self::InputValidation(msg.to_string())
    }

    pub fn parse(source: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::ParseError { source, message: msg.to_string() }
    }
}
