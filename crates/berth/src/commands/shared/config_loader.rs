//! Shared configuration and identity resolution for CLI commands.
//!
//! Every subcommand goes through [`load_workspace`] so configuration errors,
//! container naming, and runtime selection behave the same everywhere.

use anyhow::Result;
use berth_core::config::{ConfigLoader, ConfigProvider, InvocationOptions, ResolvedConfig};
use berth_core::container::{ContainerIdentity, ImageSpec};
use berth_core::docker::DockerEngine;
use berth_core::runtime::{ContainerRuntimeClient, RuntimeFactory};
use std::sync::Arc;
use tracing::debug;

/// Resolved configuration plus the container it maps to.
#[derive(Debug)]
pub struct WorkspaceContext {
    pub config: ResolvedConfig,
    pub identity: ContainerIdentity,
}

impl WorkspaceContext {
    /// Image reference and pull policy for `up`.
    pub fn image_spec(&self, options: &InvocationOptions) -> Result<ImageSpec> {
        Ok(ImageSpec {
            reference: self.config.image()?.to_string(),
            always_pull: options.always_pull,
        })
    }
}

/// Load configuration and derive the container identity for `options`.
pub fn load_workspace(options: &InvocationOptions) -> Result<WorkspaceContext> {
    let config = ConfigLoader::resolve(options)?;
    let identity = ContainerIdentity::for_workspace(
        &options.workspace_folder,
        options.container_name.as_deref(),
        config.configured_name(),
        options.session.as_deref(),
    )?;
    debug!(
        "Workspace {} maps to container {}",
        identity.workspace_path.display(),
        identity.derived_name()
    );
    Ok(WorkspaceContext { config, identity })
}

/// Connect to the selected container runtime and check it answers.
pub async fn create_runtime(options: &InvocationOptions) -> Result<Arc<DockerEngine>> {
    let kind = RuntimeFactory::detect_runtime(options.runtime);
    debug!("Using container runtime: {}", kind);
    let engine = RuntimeFactory::connect(kind)?;
    engine.ping().await?;
    debug!("Connected to {} engine", engine.runtime_name());
    Ok(Arc::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::container::DEFAULT_SESSION;
    use std::fs;
    use tempfile::TempDir;

    fn options_for(dir: &TempDir) -> InvocationOptions {
        InvocationOptions {
            workspace_folder: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_workspace_uses_configured_name() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".devcontainer")).unwrap();
        fs::write(
            dir.path().join(".devcontainer").join("devcontainer.json"),
            r#"{ "name": "My Project", "image": "alpine:3.19" }"#,
        )
        .unwrap();

        let options = options_for(&dir);
        let context = load_workspace(&options).unwrap();
        let name = context.identity.derived_name();
        assert!(name.starts_with("my_project-default-"), "{}", name);
        assert_eq!(context.identity.session_label, DEFAULT_SESSION);
        assert_eq!(context.image_spec(&options).unwrap().reference, "alpine:3.19");
    }

    #[test]
    fn test_image_flag_without_config() {
        let dir = TempDir::new().unwrap();
        let options = InvocationOptions {
            image: Some("ubuntu:22.04".to_string()),
            always_pull: true,
            ..options_for(&dir)
        };

        let context = load_workspace(&options).unwrap();
        let image = context.image_spec(&options).unwrap();
        assert_eq!(image.reference, "ubuntu:22.04");
        assert!(image.always_pull);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_workspace(&options_for(&dir)).unwrap_err();
        assert!(err.to_string().contains("devcontainer.json"), "{}", err);
    }
}
