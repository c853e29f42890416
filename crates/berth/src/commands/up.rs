//! Up command implementation
//!
//! Ensures the workspace container, prints the readiness result on stdout,
//! then waits for background lifecycle phases before returning.

use crate::commands::shared::{create_runtime, load_workspace};
use anyhow::{Context, Result};
use berth_core::config::{ConfigProvider, InvocationOptions};
use berth_core::container_lifecycle::{up, BackgroundPhases};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// JSON document printed on success
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpOutput {
    pub outcome: &'static str,
    pub container_name: String,
    pub state: &'static str,
    pub remote_user: Option<String>,
    pub remote_workspace_folder: String,
}

#[instrument(skip_all)]
pub async fn execute_up(options: &InvocationOptions) -> Result<()> {
    let context = load_workspace(options)?;
    let image = context.image_spec(options)?;
    let runtime = create_runtime(options).await?;

    let result = up(runtime, &context.identity, &image, &context.config).await?;

    let output = UpOutput {
        outcome: "success",
        container_name: result.container_name.clone(),
        state: result.outcome.as_str(),
        remote_user: context.config.container_user().map(str::to_string),
        remote_workspace_folder: context.config.workspace_folder().to_string(),
    };
    println!("{}", serde_json::to_string(&output)?);

    if let Some(background) = result.background {
        wait_for_background(background).await?;
    }
    Ok(())
}

/// Block until non-blocking phases finish; their failures are only logged.
pub async fn wait_for_background(background: BackgroundPhases) -> Result<()> {
    let report = background
        .wait()
        .await
        .context("Background lifecycle phases did not complete")?;
    for (phase, message) in &report.failures {
        warn!("Background phase {} failed: {}", phase, message);
    }
    info!(
        "Background lifecycle finished: {} executed, {} skipped, {} failed",
        report.executed.len(),
        report.skipped.len(),
        report.failures.len()
    );
    Ok(())
}
