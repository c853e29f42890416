//! Run-user-commands command implementation

use crate::commands::shared::{create_runtime, load_workspace};
use crate::commands::up::wait_for_background;
use anyhow::Result;
use berth_core::config::InvocationOptions;
use berth_core::container_lifecycle::run_user_commands;
use serde_json::json;
use tracing::instrument;

/// Re-run every lifecycle phase against the running container.
#[instrument(skip_all)]
pub async fn execute_run_user_commands(options: &InvocationOptions) -> Result<()> {
    let context = load_workspace(options)?;
    let runtime = create_runtime(options).await?;

    let (container_name, background) =
        run_user_commands(runtime, &context.identity, &context.config).await?;

    println!(
        "{}",
        json!({ "outcome": "success", "containerName": container_name })
    );
    wait_for_background(background).await
}
