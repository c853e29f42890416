//! Container runtime port
//!
//! [`ContainerRuntimeClient`] is the only way the rest of the crate talks to a
//! container engine. The Docker Engine API implementation lives in
//! [`crate::docker`], together with an in-memory mock for tests.

use crate::errors::{BerthError, Result, RuntimeError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncWrite};

/// Everything needed to create a workspace container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub labels: BTreeMap<String, String>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
    pub user: Option<String>,
    /// Host directory bind-mounted at `workspace_target`
    pub workspace_source: String,
    pub workspace_target: String,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
}

/// Options for a command executed inside a running container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub user: Option<String>,
    pub tty: bool,
    /// Keep stdin open for the relay
    pub attach_stdin: bool,
    pub working_dir: Option<String>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
}

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub columns: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }
}

/// A container as seen by label discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub running: bool,
}

/// Live byte streams of an attached exec.
///
/// `output` carries the remote stdout (and stderr, merged) until the process
/// exits. `input` feeds the remote stdin.
pub struct ExecStream {
    pub output: Box<dyn AsyncRead + Send + Unpin>,
    pub input: Box<dyn AsyncWrite + Send + Unpin>,
}

impl std::fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStream").finish_non_exhaustive()
    }
}

/// Operations the core requires from a container engine.
#[async_trait]
pub trait ContainerRuntimeClient: Send + Sync {
    /// Name of the engine, e.g. "docker"
    fn runtime_name(&self) -> &'static str;

    /// Check that the engine is reachable
    async fn ping(&self) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// `false` when the container is stopped or does not exist
    async fn is_running(&self, name: &str) -> Result<bool>;

    async fn start(&self, name: &str) -> Result<()>;

    /// Create (but do not start) a container; returns its id
    async fn create(&self, spec: &CreateSpec) -> Result<String>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn remove(&self, name: &str) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Containers carrying all of `labels`, running or not
    async fn find_containers(&self, labels: &[(String, String)]) -> Result<Vec<ContainerSummary>>;

    /// Register a command to run in `container`; returns the exec id
    async fn exec_create(&self, container: &str, spec: &ExecSpec) -> Result<String>;

    /// Open the bidirectional stream of an exec. Must precede `exec_start`.
    async fn exec_attach(&self, exec_id: &str, tty: bool) -> Result<ExecStream>;

    /// Run the exec to completion and return its exit code
    async fn exec_start(&self, exec_id: &str, tty: bool) -> Result<i64>;

    async fn exec_resize(&self, exec_id: &str, size: TerminalSize) -> Result<()>;
}

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    Podman,
}

impl RuntimeKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = BerthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(RuntimeError::RuntimeUnavailable {
                reason: format!("Unknown runtime: {}. Supported runtimes: docker, podman", s),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime factory
pub struct RuntimeFactory;

impl RuntimeFactory {
    /// Precedence: CLI flag > BERTH_RUNTIME env var > docker
    pub fn detect_runtime(cli_runtime: Option<RuntimeKind>) -> RuntimeKind {
        if let Some(runtime) = cli_runtime {
            return runtime;
        }

        if let Ok(env_runtime) = std::env::var("BERTH_RUNTIME") {
            if let Ok(runtime) = env_runtime.parse() {
                return runtime;
            }
        }

        RuntimeKind::Docker
    }

    /// Connect to the engine for `kind`
    pub fn connect(kind: RuntimeKind) -> Result<crate::docker::DockerEngine> {
        crate::docker::DockerEngine::connect(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_runtime_kind_parse() {
        assert_eq!(RuntimeKind::from_str("Docker").unwrap(), RuntimeKind::Docker);
        assert_eq!(RuntimeKind::from_str("podman").unwrap(), RuntimeKind::Podman);
        let err = RuntimeKind::from_str("containerd").unwrap_err();
        assert!(err.to_string().contains("Supported runtimes: docker, podman"));
        assert_eq!(RuntimeKind::Podman.to_string(), "podman");
    }

    #[test]
    fn test_detect_runtime_cli_wins() {
        assert_eq!(
            RuntimeFactory::detect_runtime(Some(RuntimeKind::Podman)),
            RuntimeKind::Podman
        );
    }
}
