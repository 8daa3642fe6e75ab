//! The uniform diagnostic model shared by every parser, tool runner, and
//! isolation backend: a [`Message`] is one diagnostic, a [`ReportPart`] is
//! the diagnostics from one pipeline stage, and a [`Report`] is the ordered
//! collection of parts for one grading run.

mod message;
mod report;

pub use message::{Message, MessageKind};
pub use report::{Report, ReportPart, TestMap};
