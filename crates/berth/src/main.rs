use berth_core::errors::{BerthError, RuntimeError};
use clap::Parser;

mod cli;
mod commands;

/// Exit status for any other failure
const EXIT_FAILURE: i32 = 1;
/// Exit status for a container that is already up
const EXIT_ALREADY_RUNNING: i32 = 3;
/// Exit status when the workspace container is missing or stopped
const EXIT_NOT_RUNNING: i32 = 4;

#[tokio::main]
async fn main() {
    let parsed = cli::Cli::parse();

    if let Err(err) = parsed.dispatch().await {
        eprintln!("Error: {:?}", err);
        // Exit here rather than unwinding the runtime: a session may still
        // have a blocking stdin read in flight.
        std::process::exit(exit_status_for(&err));
    }
}

fn exit_status_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<BerthError>() {
        Some(BerthError::Runtime(RuntimeError::AlreadyRunning { .. })) => EXIT_ALREADY_RUNNING,
        Some(BerthError::Runtime(
            RuntimeError::ContainerNotFound { .. } | RuntimeError::ContainerNotRunning { .. },
        )) => EXIT_NOT_RUNNING,
        _ => EXIT_FAILURE,
    }
}
