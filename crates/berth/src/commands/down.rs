//! Down command implementation

use crate::commands::shared::{create_runtime, load_workspace};
use anyhow::Result;
use berth_core::config::InvocationOptions;
use berth_core::container::{locate_container, ContainerIdentity};
use berth_core::errors::{BerthError, RuntimeError};
use berth_core::runtime::ContainerRuntimeClient;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// JSON document printed on success
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownOutput {
    pub outcome: &'static str,
    pub container_name: String,
    pub stopped: bool,
    pub removed: bool,
}

/// Identity for `down`. A broken or missing configuration only loses the
/// configured name; label discovery still finds the container.
fn resolve_identity(options: &InvocationOptions) -> Result<ContainerIdentity> {
    match load_workspace(options) {
        Ok(context) => Ok(context.identity),
        Err(e) => {
            warn!("Failed to load configuration: {:#}, using workspace path only", e);
            Ok(ContainerIdentity::for_workspace(
                &options.workspace_folder,
                options.container_name.as_deref(),
                None,
                options.session.as_deref(),
            )?)
        }
    }
}

#[instrument(skip(options))]
pub async fn execute_down(options: &InvocationOptions, remove: bool) -> Result<()> {
    let identity = resolve_identity(options)?;
    let runtime = create_runtime(options).await?;

    let output = stop_container(runtime.as_ref(), &identity, remove).await?;
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// Stop the workspace container and optionally remove it.
pub async fn stop_container<R>(
    runtime: &R,
    identity: &ContainerIdentity,
    remove: bool,
) -> Result<DownOutput>
where
    R: ContainerRuntimeClient + ?Sized,
{
    let Some((name, running)) = locate_container(runtime, identity).await? else {
        return Err(BerthError::from(RuntimeError::ContainerNotFound {
            name: identity.derived_name(),
        })
        .into());
    };

    if running {
        info!("Stopping container {}", name);
        runtime.stop(&name).await?;
    } else {
        debug!("Container {} is already stopped", name);
    }
    if remove {
        info!("Removing container {}", name);
        runtime.remove(&name).await?;
    }

    Ok(DownOutput {
        outcome: "success",
        container_name: name,
        stopped: running,
        removed: remove,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::docker::mock::{MockCall, MockContainer, MockRuntime};
    use std::path::Path;

    fn identity() -> ContainerIdentity {
        ContainerIdentity::resolve(Path::new("/ws/proj"), None, None, None).unwrap()
    }

    #[tokio::test]
    async fn test_stops_and_removes_running_container() {
        let runtime = MockRuntime::new();
        let name = identity().derived_name();
        runtime.add_container(MockContainer::new(name.clone(), true));

        let output = stop_container(&runtime, &identity(), true).await.unwrap();

        assert!(output.stopped);
        assert!(output.removed);
        let calls = runtime.calls();
        assert!(calls.contains(&MockCall::Stop(name.clone())));
        assert!(calls.contains(&MockCall::Remove(name)));
    }

    #[tokio::test]
    async fn test_stopped_container_is_not_stopped_again() {
        let runtime = MockRuntime::new();
        let name = identity().derived_name();
        runtime.add_container(MockContainer::new(name, false));

        let output = stop_container(&runtime, &identity(), false).await.unwrap();

        assert!(!output.stopped);
        assert!(!runtime
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::Stop(_) | MockCall::Remove(_))));
    }

    #[tokio::test]
    async fn test_missing_container_is_not_found() {
        let runtime = MockRuntime::new();
        let err = stop_container(&runtime, &identity(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BerthError>(),
            Some(BerthError::Runtime(RuntimeError::ContainerNotFound { .. }))
        ));
    }
}
