//! Shell command implementation

use crate::commands::shared::run_session;
use anyhow::Result;
use berth_core::config::InvocationOptions;
use tracing::instrument;

/// Falls back to `/bin/sh` when the container user has no `SHELL`.
const DEFAULT_LOGIN_SHELL: &str = "exec ${SHELL:-/bin/sh} -l";

/// Command line for an interactive login shell.
pub fn shell_command(shell: Option<&str>) -> Vec<String> {
    match shell {
        Some(shell) => vec![shell.to_string(), "-l".to_string()],
        None => vec![
            "/bin/sh".to_string(),
            "-lc".to_string(),
            DEFAULT_LOGIN_SHELL.to_string(),
        ],
    }
}

/// Open a login shell with a TTY when stdin is a terminal.
#[instrument(skip(options))]
pub async fn execute_shell(options: &InvocationOptions, shell: Option<String>) -> Result<()> {
    run_session(options, shell_command(shell.as_deref()), true).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shell_is_login_shell() {
        assert_eq!(
            shell_command(None),
            vec!["/bin/sh", "-lc", "exec ${SHELL:-/bin/sh} -l"]
        );
    }

    #[test]
    fn test_explicit_shell() {
        assert_eq!(shell_command(Some("/bin/zsh")), vec!["/bin/zsh", "-l"]);
    }
}
