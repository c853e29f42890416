//! DevContainer configuration
//!
//! Discovery and parsing of `devcontainer.json` (JSON with comments), the
//! immutable per-invocation options coming from the command line, and the
//! [`ConfigProvider`] view the rest of the crate consumes.

use crate::errors::{BerthError, ConfigError, Result};
use crate::lifecycle::{CommandSpec, LifecycleCommand, LifecyclePhase, WaitBarrier};
use crate::runtime::RuntimeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Subset of devcontainer.json this tool understands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevContainerConfig {
    pub name: Option<String>,
    pub image: Option<String>,
    /// Image build settings. Builds are not supported; presence is detected only.
    pub build: Option<Value>,
    /// Legacy form of `build.dockerfile`
    pub docker_file: Option<String>,
    pub workspace_folder: Option<String>,
    pub container_user: Option<String>,
    #[serde(default)]
    pub container_env: BTreeMap<String, String>,
    pub wait_for: Option<String>,
    pub initialize_command: Option<Value>,
    pub on_create_command: Option<Value>,
    pub update_content_command: Option<Value>,
    pub post_create_command: Option<Value>,
    pub post_start_command: Option<Value>,
    pub post_attach_command: Option<Value>,
}

impl DevContainerConfig {
    fn command_value(&self, phase: LifecyclePhase) -> Option<&Value> {
        match phase {
            LifecyclePhase::Initialize => self.initialize_command.as_ref(),
            LifecyclePhase::OnCreate => self.on_create_command.as_ref(),
            LifecyclePhase::UpdateContent => self.update_content_command.as_ref(),
            LifecyclePhase::PostCreate => self.post_create_command.as_ref(),
            LifecyclePhase::PostStart => self.post_start_command.as_ref(),
            LifecyclePhase::PostAttach => self.post_attach_command.as_ref(),
        }
    }
}

/// Command-line inputs for a single invocation.
///
/// Built once by the CLI and passed by reference; never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    pub workspace_folder: PathBuf,
    pub config_path: Option<PathBuf>,
    pub container_name: Option<String>,
    pub image: Option<String>,
    pub session: Option<String>,
    pub always_pull: bool,
    /// `None` defers to `BERTH_RUNTIME`, then docker
    pub runtime: Option<RuntimeKind>,
    /// `KEY=VALUE` pairs layered over `containerEnv`
    pub env: Vec<(String, String)>,
}

/// Typed access to the configuration values the core needs.
pub trait ConfigProvider: Send + Sync {
    fn configured_name(&self) -> Option<&str>;
    fn image(&self) -> Result<&str>;
    fn workspace_folder(&self) -> &str;
    fn container_user(&self) -> Option<&str>;
    fn container_env(&self) -> &BTreeMap<String, String>;
    fn wait_barrier(&self) -> WaitBarrier;
    /// Normalized command for `phase`; empty argv when unset.
    fn command(&self, phase: LifecyclePhase) -> LifecycleCommand;
}

/// Configuration file merged with invocation overrides.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    config: DevContainerConfig,
    image: Option<String>,
    workspace_folder: String,
    env: BTreeMap<String, String>,
    wait_barrier: WaitBarrier,
}

impl ResolvedConfig {
    /// Merge `config` with `options`. Validates `waitFor` eagerly.
    pub fn new(config: DevContainerConfig, options: &InvocationOptions) -> Result<Self> {
        let wants_build = config.build.is_some() || config.docker_file.is_some();
        if config.image.is_none() && options.image.is_none() && wants_build {
            return Err(ConfigError::NotImplemented {
                feature: "image build (build / dockerFile)".to_string(),
            }
            .into());
        }

        let wait_barrier = match config.wait_for.as_deref() {
            Some(value) => value.parse::<WaitBarrier>()?,
            None => WaitBarrier::default(),
        };

        let workspace_folder = match &config.workspace_folder {
            Some(folder) => folder.clone(),
            None => default_workspace_folder(&options.workspace_folder),
        };

        let mut env = config.container_env.clone();
        for (key, value) in &options.env {
            env.insert(key.clone(), value.clone());
        }

        Ok(Self {
            image: options.image.clone().or_else(|| config.image.clone()),
            config,
            workspace_folder,
            env,
            wait_barrier,
        })
    }

    pub fn raw(&self) -> &DevContainerConfig {
        &self.config
    }
}

impl ConfigProvider for ResolvedConfig {
    fn configured_name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    fn image(&self) -> Result<&str> {
        self.image.as_deref().ok_or_else(|| {
            BerthError::from(ConfigError::Validation {
                message: "No image configured. Set \"image\" or pass --image".to_string(),
            })
        })
    }

    fn workspace_folder(&self) -> &str {
        &self.workspace_folder
    }

    fn container_user(&self) -> Option<&str> {
        self.config.container_user.as_deref()
    }

    fn container_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn wait_barrier(&self) -> WaitBarrier {
        self.wait_barrier
    }

    fn command(&self, phase: LifecyclePhase) -> LifecycleCommand {
        let argv = self
            .config
            .command_value(phase)
            .and_then(CommandSpec::from_json_value)
            .map(CommandSpec::into_argv)
            .unwrap_or_default();
        LifecycleCommand::new(phase, argv)
    }
}

/// `/workspaces/<basename>`, the in-container default.
pub fn default_workspace_folder(host_workspace: &Path) -> String {
    let base = host_workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    format!("/workspaces/{}", base)
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_env_pair(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ConfigError::Validation {
            message: format!("Invalid environment variable '{}', expected KEY=VALUE", raw),
        }
        .into()),
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Locate the configuration file inside `workspace`.
    ///
    /// Search order: `.devcontainer/devcontainer.json(c)`, then
    /// `.devcontainer.json(c)` at the workspace root.
    pub fn discover_config(workspace: &Path) -> Result<Option<PathBuf>> {
        if !workspace.exists() {
            return Err(ConfigError::NotFound {
                path: workspace.display().to_string(),
            }
            .into());
        }

        let candidates = [
            workspace.join(".devcontainer").join("devcontainer.json"),
            workspace.join(".devcontainer").join("devcontainer.jsonc"),
            workspace.join(".devcontainer.json"),
            workspace.join(".devcontainer.jsonc"),
        ];
        for candidate in candidates {
            debug!("Checking for configuration at {}", candidate.display());
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Load and parse a configuration file.
    #[instrument(level = "debug")]
    pub fn load_from_path(path: &Path) -> Result<DevContainerConfig> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::load_from_str(&content).map_err(|e| match e {
            BerthError::Config(ConfigError::Validation { message }) => {
                BerthError::Config(ConfigError::Validation {
                    message: format!("{} ({})", message, path.display()),
                })
            }
            other => other,
        })
    }

    /// Parse configuration text (JSON5: comments and trailing commas allowed).
    pub fn load_from_str(content: &str) -> Result<DevContainerConfig> {
        let raw_value: Value = json5::from_str(content).map_err(|e| ConfigError::Parsing {
            message: format!("JSON parsing error: {}", e),
        })?;

        if !raw_value.is_object() {
            return Err(ConfigError::Validation {
                message: "Dev container config must contain a JSON object literal".to_string(),
            }
            .into());
        }

        serde_json::from_value(raw_value).map_err(|e| {
            ConfigError::Parsing {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Resolve the effective configuration for an invocation.
    ///
    /// With no configuration file, an `--image` override alone is enough.
    pub fn resolve(options: &InvocationOptions) -> Result<ResolvedConfig> {
        let config = match &options.config_path {
            Some(path) => Self::load_from_path(path)?,
            None => match Self::discover_config(&options.workspace_folder)? {
                Some(path) => Self::load_from_path(&path)?,
                None if options.image.is_some() => {
                    debug!("No configuration file found; using --image only");
                    DevContainerConfig::default()
                }
                None => {
                    return Err(ConfigError::NotFound {
                        path: options
                            .workspace_folder
                            .join(".devcontainer")
                            .join("devcontainer.json")
                            .display()
                            .to_string(),
                    }
                    .into())
                }
            },
        };
        ResolvedConfig::new(config, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options_for(dir: &Path) -> InvocationOptions {
        InvocationOptions {
            workspace_folder: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_jsonc_with_comments() {
        let config = ConfigLoader::load_from_str(
            r#"{
                // base image
                "name": "My Project",
                "image": "ubuntu:22.04",
                "containerEnv": { "FOO": "bar" },
                "waitFor": "onCreateCommand",
                "postCreateCommand": ["echo", "hi"],
            }"#,
        )
        .unwrap();
        assert_eq!(config.name.as_deref(), Some("My Project"));
        assert_eq!(config.image.as_deref(), Some("ubuntu:22.04"));
        assert_eq!(config.container_env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(config.wait_for.as_deref(), Some("onCreateCommand"));
    }

    #[test]
    fn test_root_must_be_object() {
        let err = ConfigLoader::load_from_str("[1, 2]").unwrap_err();
        assert!(matches!(
            err,
            BerthError::Config(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_discover_prefers_devcontainer_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".devcontainer")).unwrap();
        std::fs::write(
            temp.path().join(".devcontainer").join("devcontainer.json"),
            "{}",
        )
        .unwrap();
        std::fs::write(temp.path().join(".devcontainer.json"), "{}").unwrap();

        let found = ConfigLoader::discover_config(temp.path()).unwrap().unwrap();
        assert!(found.ends_with(".devcontainer/devcontainer.json"));
    }

    #[test]
    fn test_resolve_without_config_requires_image() {
        let temp = TempDir::new().unwrap();
        let err = ConfigLoader::resolve(&options_for(temp.path())).unwrap_err();
        assert!(matches!(err, BerthError::Config(ConfigError::NotFound { .. })));

        let options = InvocationOptions {
            image: Some("alpine:3".to_string()),
            ..options_for(temp.path())
        };
        let resolved = ConfigLoader::resolve(&options).unwrap();
        assert_eq!(resolved.image().unwrap(), "alpine:3");
        assert_eq!(resolved.wait_barrier(), WaitBarrier::UpdateContent);
    }

    #[test]
    fn test_resolved_config_overrides() {
        let temp = TempDir::new().unwrap();
        let config = ConfigLoader::load_from_str(
            r#"{ "image": "ubuntu", "containerEnv": { "A": "1", "B": "2" },
                 "onCreateCommand": "make setup" }"#,
        )
        .unwrap();
        let options = InvocationOptions {
            image: Some("debian".to_string()),
            env: vec![("B".to_string(), "3".to_string())],
            ..options_for(temp.path())
        };
        let resolved = ResolvedConfig::new(config, &options).unwrap();

        assert_eq!(resolved.image().unwrap(), "debian");
        assert_eq!(resolved.container_env().get("A").unwrap(), "1");
        assert_eq!(resolved.container_env().get("B").unwrap(), "3");
        assert_eq!(
            resolved.workspace_folder(),
            default_workspace_folder(temp.path())
        );
        assert_eq!(
            resolved.command(LifecyclePhase::OnCreate).argv,
            vec!["/bin/sh", "-c", "make setup"]
        );
        assert!(resolved.command(LifecyclePhase::PostStart).is_noop());
    }

    #[test]
    fn test_post_attach_wait_for_rejected() {
        let temp = TempDir::new().unwrap();
        let config =
            ConfigLoader::load_from_str(r#"{ "image": "x", "waitFor": "postAttachCommand" }"#)
                .unwrap();
        let err = ResolvedConfig::new(config, &options_for(temp.path())).unwrap_err();
        assert!(err.to_string().contains("postAttachCommand"));
    }

    #[test]
    fn test_build_without_image_not_implemented() {
        let temp = TempDir::new().unwrap();
        let config =
            ConfigLoader::load_from_str(r#"{ "build": { "dockerfile": "Dockerfile" } }"#).unwrap();
        let err = ResolvedConfig::new(config, &options_for(temp.path())).unwrap_err();
        assert!(matches!(
            err,
            BerthError::Config(ConfigError::NotImplemented { .. })
        ));
    }

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("FOO=a=b").unwrap(),
            ("FOO".to_string(), "a=b".to_string())
        );
        assert!(parse_env_pair("=x").is_err());
        assert!(parse_env_pair("NOVALUE").is_err());
    }
}
