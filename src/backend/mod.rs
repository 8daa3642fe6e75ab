//! The isolated-execution contract and its two implementations.
//!
//! `IsolationBackend` is the explicit capability that replaces the source's
//! duck-typed backend selection (REDESIGN FLAG, see DESIGN.md): a closed
//! choice between [`ContainerBackend`] and [`VMBackend`], never a string flag.

pub mod container;
pub mod vm;

pub use container::ContainerBackend;
pub use vm::VMBackend;

use crate::error::Result;
use crate::project::Project;

/// Path the in-container/in-VM test runner always writes its report to.
pub const ARTIFACT_PATH: &str = "/CUnitAutomated-Results.xml";

/// What one `run()` call produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOutcome {
    pub exit_code: i32,
    /// Present only when `exit_code == 0` and the artifact was recovered.
    pub test_artifact: Option<Vec<u8>>,
}

/// Runs a compiled executable under resource limits and recovers its
/// test-framework XML artifact. Implementations MUST reclaim every transient
/// resource (images, containers, remote files) on every exit path.
pub trait IsolationBackend {
    fn run(&self, project: &Project) -> Result<BackendOutcome>;
}
