//! Exec command implementation

use crate::commands::shared::run_session;
use anyhow::Result;
use berth_core::config::InvocationOptions;
use tracing::instrument;

/// Run `command` verbatim without a TTY.
#[instrument(skip(options))]
pub async fn execute_exec(options: &InvocationOptions, command: Vec<String>) -> Result<()> {
    run_session(options, command, false).await
}
