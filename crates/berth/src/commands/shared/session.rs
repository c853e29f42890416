//! Runs an interactive session on the host's stdio.

use super::{create_runtime, load_workspace};
use anyhow::Result;
use berth_core::config::{ConfigProvider, InvocationOptions};
use berth_core::container::require_running;
use berth_core::session::{InteractiveSession, SessionOutcome, SessionRequest};
use berth_core::terminal::{shutdown_signal, HostTerminal, Terminal};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// Run `cmd` in the workspace container and exit with its status.
///
/// Never returns on success: the process exits with the remote exit code, or
/// 130 when interrupted, because a pending stdin read would otherwise keep the
/// runtime alive.
pub async fn run_session(options: &InvocationOptions, cmd: Vec<String>, tty: bool) -> Result<()> {
    let context = load_workspace(options)?;
    let runtime = create_runtime(options).await?;
    let container = require_running(runtime.as_ref(), &context.identity).await?;

    let request = SessionRequest {
        container,
        cmd,
        tty,
        user: context.config.container_user().map(str::to_string),
        working_dir: Some(context.config.workspace_folder().to_string()),
        env: context
            .config
            .container_env()
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect(),
    };
    debug!("Session request: {:?}", request);

    let terminal: Arc<dyn Terminal> = Arc::new(HostTerminal);
    let outcome = InteractiveSession::new(runtime, terminal)
        .run(
            &request,
            tokio::io::stdin(),
            tokio::io::stdout(),
            shutdown_signal(),
        )
        .await?;

    match outcome {
        SessionOutcome::Completed { exit_code } => {
            info!("Command completed with exit code: {}", exit_code)
        }
        SessionOutcome::Interrupted => info!("Session interrupted"),
    }
    let _ = std::io::stdout().flush();
    std::process::exit(outcome.exit_status());
}
