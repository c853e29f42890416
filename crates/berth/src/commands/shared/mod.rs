//! Shared helpers for command implementations.

pub mod config_loader;
pub mod session;

pub use config_loader::{create_runtime, load_workspace, WorkspaceContext};
pub use session::run_session;
