//! Converters from tool-specific textual/XML output into the uniform
//! [`crate::model::Message`] model.
//!
//! All three parsers implement [`DiagnosticParser`] — the explicit
//! capability that replaces the source's duck-typed `.parse()` methods
//! shared only by convention.

pub mod compiler;
pub mod cppcheck;
pub mod cunit;

use crate::error::Result;
use crate::model::{Message, TestMap};

/// What a parser produces from one tool invocation's captured output.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParseOutcome {
    pub messages: Vec<Message>,
    /// Only the unit-test parser ever populates this.
    pub tests: Option<TestMap>,
}

impl From<Vec<Message>> for ParseOutcome {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages, tests: None }
    }
}

pub trait DiagnosticParser {
    fn parse(&self, data: &[u8]) -> Result<ParseOutcome>;
}
