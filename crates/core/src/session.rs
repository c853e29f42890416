//! Interactive exec sessions
//!
//! One session drives one remote command: create the exec, attach to its
//! streams, and only then start it, so no early output is lost. While the
//! remote output is relayed to the local side, local input is forwarded on a
//! separate task and a signal listener stands by to restore the terminal.
//!
//! The remote output reaching end-of-stream ends the session.

use crate::errors::{Result, RuntimeError};
use crate::runtime::{ContainerRuntimeClient, ExecSpec, ExecStream};
use crate::terminal::{RawModeGuard, RestoreHandle, Terminal};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// What to run and how
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRequest {
    /// Container name or id
    pub container: String,
    pub cmd: Vec<String>,
    /// Allocate a TTY when local input is a terminal
    pub tty: bool,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Remote output closed; carries the remote exit code
    Completed { exit_code: i64 },
    /// A termination signal arrived first
    Interrupted,
}

impl SessionOutcome {
    /// Exit status for the local process (130 after a signal)
    pub fn exit_status(&self) -> i32 {
        match self {
            SessionOutcome::Completed { exit_code } => {
                i32::try_from(*exit_code).unwrap_or(1)
            }
            SessionOutcome::Interrupted => 130,
        }
    }
}

/// Live state of one exec. Raw mode, when held, is released with it.
struct ExecSession {
    exec_id: String,
    tty: bool,
    raw_mode: Option<RawModeGuard>,
}

/// Runs exec sessions against one runtime and terminal
pub struct InteractiveSession<R: ?Sized> {
    runtime: Arc<R>,
    terminal: Arc<dyn Terminal>,
}

impl<R> InteractiveSession<R>
where
    R: ContainerRuntimeClient + ?Sized + 'static,
{
    pub fn new(runtime: Arc<R>, terminal: Arc<dyn Terminal>) -> Self {
        Self { runtime, terminal }
    }

    /// Run `request` to completion.
    ///
    /// `signal` resolving ends the session early with
    /// [`SessionOutcome::Interrupted`]; the terminal is restored before this
    /// returns on every path.
    #[instrument(skip_all, fields(container = %request.container, cmd = ?request.cmd))]
    pub async fn run<I, O, S>(
        &self,
        request: &SessionRequest,
        local_input: I,
        mut local_output: O,
        signal: S,
    ) -> Result<SessionOutcome>
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin,
        S: Future<Output = ()> + Send + 'static,
    {
        self.check_container(&request.container).await?;

        let tty = request.tty && self.terminal.is_terminal();
        let spec = ExecSpec {
            cmd: request.cmd.clone(),
            user: request.user.clone(),
            tty,
            attach_stdin: true,
            working_dir: request.working_dir.clone(),
            env: request.env.clone(),
        };
        let exec_id = self.runtime.exec_create(&request.container, &spec).await?;
        let ExecStream { mut output, input } = self.runtime.exec_attach(&exec_id, tty).await?;
        debug!("Attached to exec {}", exec_id);

        // Listen before entering raw mode so a signal always finds a restorer.
        let restore_slot: Arc<OnceLock<RestoreHandle>> = Arc::new(OnceLock::new());
        let mut listener = {
            let slot = restore_slot.clone();
            tokio::spawn(async move {
                signal.await;
                if let Some(handle) = slot.get() {
                    handle.restore();
                }
            })
        };

        let mut session = ExecSession {
            exec_id,
            tty,
            raw_mode: None,
        };
        if session.tty {
            self.resize(&session.exec_id).await;
            let guard = match RawModeGuard::acquire(self.terminal.clone()) {
                Ok(guard) => guard,
                Err(e) => {
                    listener.abort();
                    return Err(e);
                }
            };
            // A signal that fired before this point ends the session below,
            // and dropping the guard restores the terminal.
            let _ = restore_slot.set(guard.handle());
            session.raw_mode = Some(guard);
        }

        let start_task = self.spawn_start(&session);
        let input_task = spawn_input_relay(local_input, input);
        let resize_task = self.spawn_resize_watcher(&session);

        let interrupted = tokio::select! {
            copied = tokio::io::copy(&mut output, &mut local_output) => {
                match copied {
                    Ok(bytes) => debug!("Remote output closed after {} bytes", bytes),
                    Err(e) => warn!("Relay from container ended with error: {}", e),
                }
                false
            }
            _ = &mut listener => true,
        };

        listener.abort();
        input_task.abort();
        if let Some(task) = resize_task {
            task.abort();
        }
        if let Err(e) = local_output.flush().await {
            debug!("Failed to flush local output: {}", e);
        }
        drop(session.raw_mode.take());

        if interrupted {
            info!("Session interrupted by signal");
            start_task.abort();
            return Ok(SessionOutcome::Interrupted);
        }

        let exit_code = match start_task.await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) => {
                error!("Exec {} failed to start: {}", session.exec_id, e);
                return Err(e);
            }
            Err(e) => {
                return Err(RuntimeError::ExecStartFailed {
                    exec_id: session.exec_id,
                    message: e.to_string(),
                }
                .into())
            }
        };
        debug!("Exec {} exited with {}", session.exec_id, exit_code);
        Ok(SessionOutcome::Completed { exit_code })
    }

    async fn check_container(&self, container: &str) -> Result<()> {
        if !self.runtime.exists(container).await? {
            return Err(RuntimeError::ContainerNotFound {
                name: container.to_string(),
            }
            .into());
        }
        if !self.runtime.is_running(container).await? {
            return Err(RuntimeError::ContainerNotRunning {
                name: container.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn resize(&self, exec_id: &str) {
        match self.terminal.size() {
            Ok(size) => {
                if let Err(e) = self.runtime.exec_resize(exec_id, size).await {
                    warn!("Failed to set exec size: {}", e);
                }
            }
            Err(e) => warn!("Failed to read terminal size: {}", e),
        }
    }

    /// Start runs until the remote process exits, so it gets its own task.
    fn spawn_start(&self, session: &ExecSession) -> JoinHandle<Result<i64>> {
        let runtime = self.runtime.clone();
        let exec_id = session.exec_id.clone();
        let tty = session.tty;
        tokio::spawn(async move { runtime.exec_start(&exec_id, tty).await })
    }

    #[cfg(unix)]
    fn spawn_resize_watcher(&self, session: &ExecSession) -> Option<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        if !session.tty {
            return None;
        }
        let mut window_changes = match signal(SignalKind::window_change()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register SIGWINCH handler: {}", e);
                return None;
            }
        };
        let runtime = self.runtime.clone();
        let terminal = self.terminal.clone();
        let exec_id = session.exec_id.clone();
        Some(tokio::spawn(async move {
            while window_changes.recv().await.is_some() {
                if let Ok(size) = terminal.size() {
                    if let Err(e) = runtime.exec_resize(&exec_id, size).await {
                        debug!("Resize failed: {}", e);
                    }
                }
            }
        }))
    }

    #[cfg(not(unix))]
    fn spawn_resize_watcher(&self, _session: &ExecSession) -> Option<JoinHandle<()>> {
        None
    }
}

/// Best-effort copy of local input to the remote stdin; never awaited.
fn spawn_input_relay<I>(
    mut local_input: I,
    mut remote_input: Box<dyn AsyncWrite + Send + Unpin>,
) -> JoinHandle<()>
where
    I: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::io::copy(&mut local_input, &mut remote_input).await {
            debug!("Relay to container ended: {}", e);
        }
        // Signal EOF to the remote process.
        let _ = remote_input.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        assert_eq!(SessionOutcome::Completed { exit_code: 0 }.exit_status(), 0);
        assert_eq!(SessionOutcome::Completed { exit_code: 42 }.exit_status(), 42);
        assert_eq!(SessionOutcome::Interrupted.exit_status(), 130);
        assert_eq!(
            SessionOutcome::Completed {
                exit_code: i64::MAX
            }
            .exit_status(),
            1
        );
    }
}
