#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Grades student-submitted C source code against instructor-defined tasks:
//! static analysis, compilation, and isolated unit-test execution, rolled up
//! into a uniform [`Report`].
//!
//! The core exposed here is the grading pipeline and its isolation
//! backends. The CLI entry point, the job-queue worker, and the
//! editor-project packaging are thin external adapters that call
//! [`GradingPipeline::check_project`] and serialize the result with
//! [`Report::to_json`]/[`Report::to_xml`] — none of them live in this crate.

#[macro_use]
extern crate tracing;

pub mod backend;
pub mod error;
pub mod model;
pub mod parsers;
pub mod pipeline;
pub mod probe;
pub mod project;
pub mod tools;

pub use backend::{BackendOutcome, ContainerBackend, IsolationBackend, VMBackend};
pub use error::{ConcoctError, Result};
pub use model::{Message, MessageKind, Report, ReportPart, TestMap};
pub use pipeline::GradingPipeline;
pub use probe::Probe;
pub use project::{Project, Solution, Task, TaskConfig};
pub use tools::{CompilerRunner, StaticAnalyzerRunner};
