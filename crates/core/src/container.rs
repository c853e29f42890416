//! Container identity and the create-vs-start gate
//!
//! A workspace maps to exactly one container name per session label. The
//! name is derived from the workspace path fingerprint so that two checkouts
//! with the same directory name never collide, and it is recomputed on every
//! invocation rather than stored anywhere.

use crate::config::ConfigProvider;
use crate::errors::{ConfigError, Result, RuntimeError};
use crate::runtime::{ContainerRuntimeClient, CreateSpec};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Marks containers created by this tool
pub const LABEL_MANAGED: &str = "berth.managed";
/// Absolute host workspace path
pub const LABEL_WORKSPACE: &str = "berth.workspace";
pub const LABEL_SESSION: &str = "berth.session";

pub const DEFAULT_SESSION: &str = "default";

/// Length of the path fingerprint in hex characters (32 bits)
pub const FINGERPRINT_LEN: usize = 8;

/// Keeps the container alive without depending on the image's entrypoint.
pub const SLEEP_FOREVER: [&str; 3] = [
    "/bin/sh",
    "-c",
    "echo Container started; trap \"exit 0\" 15; while sleep 1 & wait $!; do :; done",
];

/// First 8 hex characters of the SHA-256 of the path's bytes.
///
/// UTF-8 paths hash their UTF-8 bytes; other paths hash their raw encoding.
pub fn path_fingerprint(path: &Path) -> String {
    let digest = Sha256::digest(path.as_os_str().as_encoded_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Lowercase, spaces replaced by underscores.
pub fn sanitize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Container identity for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    pub workspace_path: PathBuf,
    pub session_label: String,
    pub explicit_name_override: Option<String>,
    pub configured_name: Option<String>,
    pub path_fingerprint: String,
}

impl ContainerIdentity {
    /// Derive the identity for an absolute workspace path.
    ///
    /// Pure: the path is not touched on disk.
    pub fn resolve(
        workspace_path: &Path,
        explicit_override: Option<&str>,
        configured_name: Option<&str>,
        session_label: Option<&str>,
    ) -> Result<Self> {
        if !workspace_path.is_absolute() {
            return Err(ConfigError::Validation {
                message: format!(
                    "Workspace path must be absolute: {}",
                    workspace_path.display()
                ),
            }
            .into());
        }

        let identity = Self {
            workspace_path: workspace_path.to_path_buf(),
            session_label: session_label
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SESSION)
                .to_string(),
            explicit_name_override: explicit_override
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            configured_name: configured_name
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            path_fingerprint: path_fingerprint(workspace_path),
        };
        debug!(
            name = %identity.derived_name(),
            fingerprint = %identity.path_fingerprint,
            "Resolved container identity"
        );
        Ok(identity)
    }

    /// Canonicalize an existing workspace directory, then [`resolve`](Self::resolve).
    pub fn for_workspace(
        workspace: &Path,
        explicit_override: Option<&str>,
        configured_name: Option<&str>,
        session_label: Option<&str>,
    ) -> Result<Self> {
        let canonical = workspace.canonicalize().map_err(|_| ConfigError::NotFound {
            path: workspace.display().to_string(),
        })?;
        Self::resolve(&canonical, explicit_override, configured_name, session_label)
    }

    pub fn derived_name(&self) -> String {
        if let Some(name) = &self.explicit_name_override {
            return name.clone();
        }
        let base = match &self.configured_name {
            Some(name) => sanitize_name(name),
            None => sanitize_name(
                &self
                    .workspace_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "workspace".to_string()),
            ),
        };
        format!("{}-{}-{}", base, self.session_label, self.path_fingerprint)
    }

    /// Labels written on creation
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.selector()
            .into_iter()
            .chain(std::iter::once((
                LABEL_SESSION.to_string(),
                self.session_label.clone(),
            )))
            .collect()
    }

    /// Labels that identify this workspace's containers
    pub fn selector(&self) -> Vec<(String, String)> {
        vec![
            (LABEL_MANAGED.to_string(), "true".to_string()),
            (
                LABEL_WORKSPACE.to_string(),
                self.workspace_path.display().to_string(),
            ),
        ]
    }
}

/// Image to run and whether to refresh it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    pub reference: String,
    pub always_pull: bool,
}

/// What the gate did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// New container; lifecycle hooks must run
    Created,
    /// Existing container restarted; hooks are not re-run
    Started,
}

impl EnsureOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnsureOutcome::Created => "created",
            EnsureOutcome::Started => "started",
        }
    }

    pub fn runs_lifecycle(&self) -> bool {
        matches!(self, EnsureOutcome::Created)
    }
}

/// Make sure the workspace container exists and is running.
///
/// Fails with `AlreadyRunning` if it is already up. A name conflict at create
/// time means another invocation won the race; the container is then treated
/// as pre-existing.
#[instrument(skip_all, fields(container = %identity.derived_name()))]
pub async fn ensure_container<R, C>(
    runtime: &R,
    identity: &ContainerIdentity,
    image: &ImageSpec,
    config: &C,
) -> Result<EnsureOutcome>
where
    R: ContainerRuntimeClient + ?Sized,
    C: ConfigProvider + ?Sized,
{
    let name = identity.derived_name();

    if runtime.exists(&name).await? {
        return start_existing(runtime, &name).await;
    }

    if image.always_pull || !runtime.image_exists(&image.reference).await? {
        info!("Pulling image {}", image.reference);
        runtime.pull_image(&image.reference).await?;
    }

    let spec = create_spec(identity, image, config);
    match runtime.create(&spec).await {
        Ok(id) => debug!("Container id {}", id),
        Err(crate::errors::BerthError::Runtime(RuntimeError::NameConflict { .. })) => {
            warn!(
                "Container {} was created concurrently by another invocation",
                name
            );
            return start_existing(runtime, &name).await;
        }
        Err(e) => return Err(e),
    }

    runtime.start(&name).await?;
    info!("Created and started container {}", name);
    Ok(EnsureOutcome::Created)
}

async fn start_existing<R>(runtime: &R, name: &str) -> Result<EnsureOutcome>
where
    R: ContainerRuntimeClient + ?Sized,
{
    if runtime.is_running(name).await? {
        return Err(RuntimeError::AlreadyRunning {
            name: name.to_string(),
        }
        .into());
    }
    runtime.start(name).await?;
    info!("Started existing container {}", name);
    Ok(EnsureOutcome::Started)
}

fn create_spec<C>(identity: &ContainerIdentity, image: &ImageSpec, config: &C) -> CreateSpec
where
    C: ConfigProvider + ?Sized,
{
    CreateSpec {
        name: identity.derived_name(),
        image: image.reference.clone(),
        labels: identity.labels(),
        env: config
            .container_env()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect(),
        user: config.container_user().map(str::to_string),
        workspace_source: identity.workspace_path.display().to_string(),
        workspace_target: config.workspace_folder().to_string(),
        entrypoint: vec![SLEEP_FOREVER[0].to_string(), SLEEP_FOREVER[1].to_string()],
        cmd: vec![SLEEP_FOREVER[2].to_string()],
    }
}

/// Name and run state of this workspace's container, if any.
///
/// Looks up the derived name first, then falls back to label discovery so
/// containers created under an earlier explicit name are still found.
pub async fn locate_container<R>(
    runtime: &R,
    identity: &ContainerIdentity,
) -> Result<Option<(String, bool)>>
where
    R: ContainerRuntimeClient + ?Sized,
{
    let name = identity.derived_name();
    if runtime.exists(&name).await? {
        let running = runtime.is_running(&name).await?;
        return Ok(Some((name, running)));
    }

    let mut selector = identity.selector();
    selector.push((LABEL_SESSION.to_string(), identity.session_label.clone()));
    let mut candidates = runtime.find_containers(&selector).await?;
    // Prefer a running container when several carry the labels.
    candidates.sort_by_key(|c| !c.running);
    Ok(candidates.into_iter().next().map(|c| (c.name, c.running)))
}

/// Name of the running container for this workspace.
pub async fn require_running<R>(runtime: &R, identity: &ContainerIdentity) -> Result<String>
where
    R: ContainerRuntimeClient + ?Sized,
{
    match locate_container(runtime, identity).await? {
        Some((name, true)) => Ok(name),
        Some((name, false)) => Err(RuntimeError::ContainerNotRunning { name }.into()),
        None => Err(RuntimeError::ContainerNotFound {
            name: identity.derived_name(),
        }
        .into()),
    }
}
