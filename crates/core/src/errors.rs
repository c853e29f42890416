//! Error types and handling
//!
//! Domain-specific error enums (configuration, runtime, lifecycle, terminal)
//! are wrapped in the top-level [`BerthError`] so callers can match on a
//! single type while still reaching the precise failure.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Feature not implemented
    #[error("Feature not implemented: {feature}")]
    NotImplemented { feature: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Container runtime errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The runtime daemon cannot be reached
    #[error("Container runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    /// No container with this name exists
    #[error("Container not found: {name}. Run 'berth up' first")]
    ContainerNotFound { name: String },

    /// The container exists but is stopped
    #[error("Container is not running: {name}. Run 'berth up' first")]
    ContainerNotRunning { name: String },

    /// `up` was refused because the container is already up
    #[error("Container is already running: {name}")]
    AlreadyRunning { name: String },

    #[error("Failed to pull image {image}: {message}")]
    ImagePullFailed { image: String, message: String },

    #[error("Failed to create container {name}: {message}")]
    ContainerCreateFailed { name: String, message: String },

    /// Create was rejected because the name is already taken
    #[error("Container name already in use: {name}")]
    NameConflict { name: String },

    #[error("Failed to create exec in container {container}: {message}")]
    ExecCreateFailed { container: String, message: String },

    #[error("Failed to attach to exec {exec_id}: {message}")]
    AttachFailed { exec_id: String, message: String },

    #[error("Failed to start exec {exec_id}: {message}")]
    ExecStartFailed { exec_id: String, message: String },

    /// Any other runtime API failure
    #[error("Container runtime API error: {0}")]
    Api(String),
}

/// Lifecycle hook errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A hook command ran and exited non-zero
    #[error("Lifecycle phase {phase} failed with exit code {exit_code}")]
    PhaseCommandFailed { phase: String, exit_code: i64 },

    /// A hook command could not be run at all
    #[error("Lifecycle phase {phase} could not be executed: {message}")]
    PhaseExecFailed { phase: String, message: String },
}

/// Local terminal errors
#[derive(Error, Debug)]
pub enum TerminalError {
    /// Raw mode could not be entered or left
    #[error("Failed to change terminal mode: {0}")]
    ModeChange(#[source] std::io::Error),

    #[error("Failed to query terminal size: {0}")]
    Size(#[source] std::io::Error),
}

/// Main error type for berth operations
#[derive(Error, Debug)]
pub enum BerthError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Container runtime errors
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Lifecycle hook errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Terminal errors
    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),

    /// Background task errors
    #[error("Background task failed: {0}")]
    Task(String),
}

impl BerthError {
    /// The lifecycle phase a failure belongs to, if any.
    pub fn failed_phase(&self) -> Option<&str> {
        match self {
            BerthError::Lifecycle(LifecycleError::PhaseCommandFailed { phase, .. })
            | BerthError::Lifecycle(LifecycleError::PhaseExecFailed { phase, .. }) => {
                Some(phase.as_str())
            }
            _ => None,
        }
    }
}

/// Result type alias for berth operations
pub type Result<T> = std::result::Result<T, BerthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Validation {
            message: "waitFor must not be postAttachCommand".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration validation error: waitFor must not be postAttachCommand"
        );

        let error = ConfigError::NotFound {
            path: "/ws/.devcontainer/devcontainer.json".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration file not found: /ws/.devcontainer/devcontainer.json"
        );
    }

    #[test]
    fn test_runtime_error_hints_up() {
        let error = RuntimeError::ContainerNotRunning {
            name: "proj-default-1234abcd".to_string(),
        };
        assert!(error.to_string().contains("Run 'berth up' first"));

        let error = RuntimeError::ContainerNotFound {
            name: "proj-default-1234abcd".to_string(),
        };
        assert!(error.to_string().contains("Run 'berth up' first"));
    }

    #[test]
    fn test_error_conversion() {
        let runtime_error = RuntimeError::AlreadyRunning {
            name: "proj".to_string(),
        };
        let berth_error: BerthError = runtime_error.into();
        assert!(matches!(
            berth_error,
            BerthError::Runtime(RuntimeError::AlreadyRunning { .. })
        ));
        assert_eq!(
            berth_error.to_string(),
            "Runtime error: Container is already running: proj"
        );
    }

    #[test]
    fn test_failed_phase() {
        let error: BerthError = LifecycleError::PhaseCommandFailed {
            phase: "onCreate".to_string(),
            exit_code: 2,
        }
        .into();
        assert_eq!(error.failed_phase(), Some("onCreate"));
        assert!(error.to_string().contains("exit code 2"));

        let error: BerthError = RuntimeError::Api("boom".to_string()).into();
        assert_eq!(error.failed_phase(), None);
    }

    #[test]
    fn test_anyhow_conversion() {
        let error = BerthError::Config(ConfigError::NotImplemented {
            feature: "build".to_string(),
        });
        let anyhow_error: anyhow::Error = error.into();
        assert!(anyhow_error
            .to_string()
            .contains("Feature not implemented: build"));
        assert!(anyhow_error.downcast_ref::<BerthError>().is_some());
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "not a tty");
        let error = BerthError::Terminal(TerminalError::ModeChange(io_error));
        let source = std::error::Error::source(&error);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("terminal mode"));
    }
}
