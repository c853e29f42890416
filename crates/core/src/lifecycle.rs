//! Lifecycle phases and hook commands
//!
//! Defines the fixed phase order, the wait barrier that splits phases into a
//! blocking prefix and a background suffix, and the normalization of
//! configured hook commands into a canonical argv.

use crate::errors::{ConfigError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Shell used to run string-form hook commands.
pub const HOOK_SHELL: &str = "/bin/sh";

/// Lifecycle phases in their fixed execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecyclePhase {
    Initialize,
    OnCreate,
    UpdateContent,
    PostCreate,
    PostStart,
    PostAttach,
}

impl LifecyclePhase {
    /// All phases, in execution order.
    pub const ALL: [LifecyclePhase; 6] = [
        LifecyclePhase::Initialize,
        LifecyclePhase::OnCreate,
        LifecyclePhase::UpdateContent,
        LifecyclePhase::PostCreate,
        LifecyclePhase::PostStart,
        LifecyclePhase::PostAttach,
    ];

    /// Get the phase name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::OnCreate => "onCreate",
            LifecyclePhase::UpdateContent => "updateContent",
            LifecyclePhase::PostCreate => "postCreate",
            LifecyclePhase::PostStart => "postStart",
            LifecyclePhase::PostAttach => "postAttach",
        }
    }

    /// Key of this phase's command in devcontainer.json
    pub fn config_key(&self) -> &'static str {
        match self {
            LifecyclePhase::Initialize => "initializeCommand",
            LifecyclePhase::OnCreate => "onCreateCommand",
            LifecyclePhase::UpdateContent => "updateContentCommand",
            LifecyclePhase::PostCreate => "postCreateCommand",
            LifecyclePhase::PostStart => "postStartCommand",
            LifecyclePhase::PostAttach => "postAttachCommand",
        }
    }

    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The last phase that must finish before the container is reported ready.
///
/// `PostAttach` has no variant here: it always runs last, in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitBarrier {
    Initialize,
    OnCreate,
    #[default]
    UpdateContent,
    PostCreate,
    PostStart,
}

impl WaitBarrier {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            WaitBarrier::Initialize => LifecyclePhase::Initialize,
            WaitBarrier::OnCreate => LifecyclePhase::OnCreate,
            WaitBarrier::UpdateContent => LifecyclePhase::UpdateContent,
            WaitBarrier::PostCreate => LifecyclePhase::PostCreate,
            WaitBarrier::PostStart => LifecyclePhase::PostStart,
        }
    }
}

impl FromStr for WaitBarrier {
    type Err = crate::errors::BerthError;

    /// Accepts the `waitFor` values of devcontainer.json.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initializeCommand" => Ok(WaitBarrier::Initialize),
            "onCreateCommand" => Ok(WaitBarrier::OnCreate),
            "updateContentCommand" => Ok(WaitBarrier::UpdateContent),
            "postCreateCommand" => Ok(WaitBarrier::PostCreate),
            "postStartCommand" => Ok(WaitBarrier::PostStart),
            "postAttachCommand" => Err(ConfigError::Validation {
                message: "waitFor cannot be postAttachCommand; it always runs last".to_string(),
            }
            .into()),
            other => Err(ConfigError::Validation {
                message: format!(
                    "Unknown waitFor value '{}'. Expected one of: initializeCommand, \
                     onCreateCommand, updateContentCommand, postCreateCommand, postStartCommand",
                    other
                ),
            }
            .into()),
        }
    }
}

/// Whether `phase` must complete before the caller is told the container is ready.
pub fn should_run_synchronously(phase: LifecyclePhase, barrier: WaitBarrier) -> bool {
    phase != LifecyclePhase::PostAttach && phase.ordinal() <= barrier.phase().ordinal()
}

/// A hook command as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// `"npm install"`, run through the hook shell
    ShellForm(String),
    /// `["npm", "install"]`, run as an exact argv
    ArgvForm(Vec<String>),
}

impl CommandSpec {
    /// Parse a devcontainer.json command value.
    ///
    /// Returns `None` for null or unsupported shapes. Non-string array elements
    /// are dropped.
    pub fn from_json_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(cmd) => Some(CommandSpec::ShellForm(cmd.clone())),
            Value::Array(items) => {
                let argv: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        other => {
                            warn!("Ignoring non-string command element: {}", other);
                            None
                        }
                    })
                    .collect();
                Some(CommandSpec::ArgvForm(argv))
            }
            other => {
                warn!(
                    "Unsupported command format (expected string or array): {}",
                    other
                );
                None
            }
        }
    }

    /// Resolve into the argv executed in the container.
    pub fn into_argv(self) -> Vec<String> {
        match self {
            CommandSpec::ShellForm(cmd) if cmd.trim().is_empty() => Vec::new(),
            CommandSpec::ShellForm(cmd) => vec![HOOK_SHELL.to_string(), "-c".to_string(), cmd],
            CommandSpec::ArgvForm(argv) => argv,
        }
    }
}

/// A phase paired with its resolved argv. An empty argv means "nothing to run".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleCommand {
    pub phase: LifecyclePhase,
    pub argv: Vec<String>,
}

impl LifecycleCommand {
    pub fn new(phase: LifecyclePhase, argv: Vec<String>) -> Self {
        Self { phase, argv }
    }

    pub fn is_noop(&self) -> bool {
        self.argv.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_order_is_fixed() {
        let ordinals: Vec<usize> = LifecyclePhase::ALL.iter().map(|p| p.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3, 4, 5]);
        assert!(LifecyclePhase::Initialize < LifecyclePhase::PostAttach);
        assert_eq!(LifecyclePhase::PostCreate.to_string(), "postCreate");
        assert_eq!(LifecyclePhase::OnCreate.config_key(), "onCreateCommand");
    }

    #[test]
    fn test_should_run_synchronously_with_on_create_barrier() {
        let barrier = WaitBarrier::OnCreate;
        assert!(should_run_synchronously(LifecyclePhase::Initialize, barrier));
        assert!(should_run_synchronously(LifecyclePhase::OnCreate, barrier));
        assert!(!should_run_synchronously(LifecyclePhase::UpdateContent, barrier));
        assert!(!should_run_synchronously(LifecyclePhase::PostCreate, barrier));
        assert!(!should_run_synchronously(LifecyclePhase::PostStart, barrier));
        assert!(!should_run_synchronously(LifecyclePhase::PostAttach, barrier));
    }

    #[test]
    fn test_post_attach_never_synchronous() {
        for barrier in [
            WaitBarrier::Initialize,
            WaitBarrier::OnCreate,
            WaitBarrier::UpdateContent,
            WaitBarrier::PostCreate,
            WaitBarrier::PostStart,
        ] {
            assert!(!should_run_synchronously(
                LifecyclePhase::PostAttach,
                barrier
            ));
        }
    }

    #[test]
    fn test_wait_barrier_default_and_parse() {
        assert_eq!(WaitBarrier::default(), WaitBarrier::UpdateContent);
        assert_eq!(
            "postStartCommand".parse::<WaitBarrier>().unwrap(),
            WaitBarrier::PostStart
        );
        assert!("postAttachCommand".parse::<WaitBarrier>().is_err());
        assert!("sometime".parse::<WaitBarrier>().is_err());
    }

    #[test]
    fn test_shell_form_wraps_in_shell() {
        let spec = CommandSpec::from_json_value(&json!("npm install")).unwrap();
        assert_eq!(spec, CommandSpec::ShellForm("npm install".to_string()));
        assert_eq!(spec.into_argv(), vec!["/bin/sh", "-c", "npm install"]);
    }

    #[test]
    fn test_argv_form_filters_non_strings() {
        let spec = CommandSpec::from_json_value(&json!(["npm", 1, "install", null])).unwrap();
        assert_eq!(spec.into_argv(), vec!["npm", "install"]);
    }

    #[test]
    fn test_empty_and_unsupported_commands() {
        assert!(CommandSpec::from_json_value(&Value::Null).is_none());
        assert!(CommandSpec::from_json_value(&json!({"a": "b"})).is_none());
        assert!(CommandSpec::from_json_value(&json!(42)).is_none());
        assert!(CommandSpec::ShellForm("  ".to_string()).into_argv().is_empty());
        assert!(LifecycleCommand::new(LifecyclePhase::OnCreate, Vec::new()).is_noop());
    }
}
