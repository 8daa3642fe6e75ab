//! Runs the compiled executable inside a short-lived, resource-capped
//! Docker container.
//!
//! State machine: `idle -> image-built -> container-created ->
//! container-running -> container-exited -> artifact-extracted -> cleaned`.
//! Every branch, including every early return, funnels through
//! [`ContainerBackend::cleanup`] rather than relying on `Drop` (REDESIGN
//! FLAG, see DESIGN.md) — `run()` wraps the state machine in
//! [`ContainerBackend::run_inner`] and always cleans up afterward,
//! regardless of the result.

use std::io::Cursor;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::backend::{BackendOutcome, IsolationBackend, ARTIFACT_PATH};
use crate::error::{ConcoctError, Result};
use crate::project::Project;

const MEMORY_LIMIT: &str = "4m";
const CPU_SHARES: &str = "10";
const CPU_QUOTA: &str = "50000";
const DEFAULT_CPUSET: &str = "0";
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ContainerBackend {
    docker_path: PathBuf,
    wait_timeout: Duration,
    cpuset: String,
}

impl Default for ContainerBackend {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerBackend {
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            cpuset: DEFAULT_CPUSET.to_string(),
        }
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_cpuset(mut self, cpuset: impl Into<String>) -> Self {
        self.cpuset = cpuset.into();
        self
    }

    /// Invokes `docker --version`/`docker info`, for the environment probe.
    #[instrument(level = "debug", skip_all)]
    pub fn version(&self) -> Result<String> {
        let mut cmd = Command::new(&self.docker_path);
        cmd.arg("--version").stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!(?cmd, "checking container runtime version");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.docker_path))?;
        if !output.status.success() {
            return Err(ConcoctError::env(format!(
                "{} --version failed",
                self.docker_path.display()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_inner(&self, project: &Project, container_name: &str, image_tag: &str) -> Result<BackendOutcome> {
        let tempdir = project
            .tempdir
            .as_ref()
            .ok_or_else(|| ConcoctError::infra("container backend invoked without a scratch directory"))?;
        let executable = tempdir.join(&project.target);
        if !executable.exists() {
            return Err(ConcoctError::infra(format!(
                "missing compiled executable at {}",
                executable.display()
            )));
        }

        self.write_dockerfile(tempdir, &project.target)?;
        self.build_image(tempdir, image_tag)?;
        self.create_container(container_name, image_tag)?;
        self.start_container(container_name)?;

        match self.wait_for_exit(container_name)? {
            None => return Ok(BackendOutcome { exit_code: -1, test_artifact: None }),
            Some(code) if code != 0 => return Ok(BackendOutcome { exit_code: code, test_artifact: None }),
            Some(_) => {}
        }

        match self.extract_artifact(container_name)? {
            Some(bytes) => Ok(BackendOutcome { exit_code: 0, test_artifact: Some(bytes) }),
            None => Ok(BackendOutcome { exit_code: -1, test_artifact: None }),
        }
    }

    fn write_dockerfile(&self, tempdir: &std::path::Path, target: &str) -> Result<()> {
        let dockerfile = format!(
            "FROM scratch\nCOPY {target} /{target}\nENTRYPOINT [\"/{target}\"]\n"
        );
        let path = tempdir.join("Dockerfile");
        std::fs::write(&path, dockerfile).map_err(|e| ConcoctError::io(e, &path))
    }

    #[instrument(level = "debug", skip(self))]
    fn build_image(&self, context_dir: &std::path::Path, image_tag: &str) -> Result<()> {
        let mut cmd = Command::new(&self.docker_path);
        cmd.arg("build")
            .arg("-t")
            .arg(image_tag)
            .arg("--rm")
            .arg("--memory")
            .arg(MEMORY_LIMIT)
            .arg("--memory-swap")
            .arg(MEMORY_LIMIT)
            .arg("--cpu-shares")
            .arg(CPU_SHARES)
            .arg("--cpuset-cpus")
            .arg(&self.cpuset)
            .arg(context_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(?cmd, "building container image");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.docker_path))?;
        if !output.status.success() {
            return Err(ConcoctError::infra(format!(
                "docker build failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn create_container(&self, container_name: &str, image_tag: &str) -> Result<()> {
        let mut cmd = Command::new(&self.docker_path);
        cmd.arg("create")
            .arg("--name")
            .arg(container_name)
            .arg("--network")
            .arg("none")
            .arg("--memory")
            .arg(MEMORY_LIMIT)
            .arg("--memory-swap")
            .arg(MEMORY_LIMIT)
            .arg("--cpu-shares")
            .arg(CPU_SHARES)
            .arg("--cpu-quota")
            .arg(CPU_QUOTA)
            .arg(image_tag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(?cmd, "creating container");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.docker_path))?;
        if !output.status.success() {
            return Err(ConcoctError::infra(format!(
                "docker create failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    fn start_container(&self, container_name: &str) -> Result<()> {
        let mut cmd = Command::new(&self.docker_path);
        cmd.arg("start").arg(container_name).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!(?cmd, "starting container");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.docker_path))?;
        if !output.status.success() {
            return Err(ConcoctError::infra(format!(
                "docker start failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// Waits for the container to exit, bounded by `self.wait_timeout`.
    /// Returns `None` on timeout, `Some(exit_code)` otherwise.
    fn wait_for_exit(&self, container_name: &str) -> Result<Option<i32>> {
        let seconds = self.wait_timeout.as_secs().max(1).to_string();
        let mut cmd = Command::new("timeout");
        cmd.arg(format!("{seconds}s"))
            .arg(&self.docker_path)
            .arg("wait")
            .arg(container_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(?cmd, "waiting for container exit");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.docker_path))?;
        if output.status.code() == Some(124) {
            warn!(container_name, "container wait timed out");
            self.stop_container(container_name);
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let code = stdout.trim().parse::<i32>().map_err(|_| {
            ConcoctError::infra(format!("could not parse `docker wait` output: {stdout:?}"))
        })?;
        Ok(Some(code))
    }

    fn extract_artifact(&self, container_name: &str) -> Result<Option<Vec<u8>>> {
        let mut cmd = Command::new(&self.docker_path);
        cmd.arg("cp")
            .arg(format!("{container_name}:{ARTIFACT_PATH}"))
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(?cmd, "extracting test artifact");
        let output = cmd.output().map_err(|e| ConcoctError::io(e, &self.docker_path))?;
        if !output.status.success() {
            return Ok(None);
        }

        let mut archive = tar::Archive::new(Cursor::new(output.stdout));
        let entries = archive.entries().map_err(|e| ConcoctError::parse("tar", e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| ConcoctError::parse("tar", e))?;
            let mut bytes = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut bytes).map_err(|e| ConcoctError::infra(e))?;
            return Ok(Some(bytes));
        }
        Ok(None)
    }

    fn stop_container(&self, container_name: &str) {
        let mut cmd = Command::new(&self.docker_path);
        cmd.arg("stop").arg(container_name).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        let _ = cmd.status();
    }

    /// Idempotent: stop (if running), remove the container, remove the
    /// image. Errors here are logged, not propagated — cleanup always runs,
    /// and a cleanup failure must not mask the real outcome.
    fn cleanup(&self, container_name: &str, image_tag: &str) {
        self.stop_container(container_name);

        let mut rm = Command::new(&self.docker_path);
        rm.arg("rm").arg("-f").arg(container_name).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        if let Err(e) = rm.status() {
            warn!(container_name, error = %e, "failed to remove container during cleanup");
        }

        let mut rmi = Command::new(&self.docker_path);
        rmi.arg("rmi").arg("-f").arg(image_tag).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        if let Err(e) = rmi.status() {
            warn!(image_tag, error = %e, "failed to remove image during cleanup");
        }
    }
}

impl IsolationBackend for ContainerBackend {
    #[instrument(name = "container_run", level = "debug", skip(self, project))]
    fn run(&self, project: &Project) -> Result<BackendOutcome> {
        let container_name = format!("concoct-{}", project.target);
        let image_tag = project.image_tag();
        let result = self.run_inner(project, &container_name, &image_tag);
        self.cleanup(&container_name, &image_tag);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tag_matches_spec_naming() {
        let project = Project::new("greaterZero", vec![], vec![], vec![]).unwrap();
        assert!(project.image_tag().starts_with("autotest/"));
    }

    #[test]
    fn dockerfile_references_target_as_entrypoint() {
        let tempdir = std::env::temp_dir().join("concoct_container_test_dockerfile");
        std::fs::create_dir_all(&tempdir).unwrap();
        let backend = ContainerBackend::default();
        backend.write_dockerfile(&tempdir, "mytarget").unwrap();
        let contents = std::fs::read_to_string(tempdir.join("Dockerfile")).unwrap();
        assert!(contents.contains("ENTRYPOINT [\"/mytarget\"]"));
        std::fs::remove_dir_all(&tempdir).ok();
    }
}
