//! Verifies every external prerequisite exists before the pipeline accepts
//! any grading work, failing construction loudly rather than failing midway
//! through a run.

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use tracing::debug;

use crate::backend::ContainerBackend;
use crate::error::{ConcoctError, Result};
use crate::tools::{CompilerRunner, StaticAnalyzerRunner};

/// Minimum container-runtime client version this pipeline trusts. The
/// source parsed version strings by splitting on `-` then `.`, which breaks
/// on non-standard version strings (spec Open Question); comparing through
/// `semver` instead is the fix this implementation settles on.
const MIN_CONTAINER_RUNTIME_MAJOR: u64 = 1;
const MIN_CONTAINER_RUNTIME_MINOR: u64 = 2;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap());

pub struct Probe;

impl Probe {
    /// Checks the compiler driver, the static-analyzer binary, the
    /// `-lcunit` link probe, and the container-runtime client version — the
    /// runtime client is checked even when the VM backend is configured,
    /// mirroring the source's own unconditional import of its client
    /// library.
    pub fn verify(
        compiler: &CompilerRunner,
        analyzer: &StaticAnalyzerRunner,
        container_runtime: &ContainerBackend,
    ) -> Result<()> {
        compiler
            .version()
            .map_err(|e| ConcoctError::env(format!("compiler driver unavailable: {e}")))?;
        analyzer
            .version()
            .map_err(|e| ConcoctError::env(format!("static analyzer unavailable: {e}")))?;

        let has_cunit = compiler
            .probe_library("cunit")
            .map_err(|e| ConcoctError::env(format!("could not probe for libcunit: {e}")))?;
        if !has_cunit {
            return Err(ConcoctError::env("libcunit is not installed"));
        }

        Self::verify_container_runtime(container_runtime)?;

        debug!("environment probe passed");
        Ok(())
    }

    fn verify_container_runtime(container_runtime: &ContainerBackend) -> Result<()> {
        let raw = container_runtime
            .version()
            .map_err(|e| ConcoctError::env(format!("container runtime unavailable: {e}")))?;
        let version = parse_version(&raw)?;
        if version.major < MIN_CONTAINER_RUNTIME_MAJOR
            || (version.major == MIN_CONTAINER_RUNTIME_MAJOR && version.minor < MIN_CONTAINER_RUNTIME_MINOR)
        {
            return Err(ConcoctError::env(format!(
                "container runtime version {version} is older than the required {MIN_CONTAINER_RUNTIME_MAJOR}.{MIN_CONTAINER_RUNTIME_MINOR}"
            )));
        }
        Ok(())
    }
}

fn parse_version(raw: &str) -> Result<Version> {
    let captures = VERSION_PATTERN
        .captures(raw)
        .ok_or_else(|| ConcoctError::env(format!("could not parse a version from {raw:?}")))?;
    let major: u64 = captures[1].parse().unwrap();
    let minor: u64 = captures[2].parse().unwrap();
    let patch: u64 = captures[3].parse().unwrap();
    Ok(Version::new(major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_style_version_banner() {
        let version = parse_version("Docker version 24.0.5, build ced0996").unwrap();
        assert_eq!(version, Version::new(24, 0, 5));
    }

    #[test]
    fn rejects_unparseable_version_string() {
        assert!(parse_version("no version here").is_err());
    }
}
