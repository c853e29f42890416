//! Local terminal control
//!
//! Raw mode is held through [`RawModeGuard`]. The guard and any number of
//! [`RestoreHandle`] clones share one flag, so whichever path gets there
//! first (normal drop, error unwinding, or a signal) restores the terminal
//! and the rest do nothing.

use crate::errors::{Result, TerminalError};
use crate::runtime::TerminalSize;
use std::future::Future;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// The local console
pub trait Terminal: Send + Sync {
    /// Whether local input is an interactive terminal
    fn is_terminal(&self) -> bool;
    fn size(&self) -> Result<TerminalSize>;
    fn enable_raw_mode(&self) -> Result<()>;
    fn disable_raw_mode(&self) -> Result<()>;
}

/// The process's own stdin/stdout terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct HostTerminal;

impl Terminal for HostTerminal {
    fn is_terminal(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn size(&self) -> Result<TerminalSize> {
        let (columns, rows) = crossterm::terminal::size().map_err(TerminalError::Size)?;
        Ok(TerminalSize::new(columns, rows))
    }

    fn enable_raw_mode(&self) -> Result<()> {
        crossterm::terminal::enable_raw_mode().map_err(TerminalError::ModeChange)?;
        Ok(())
    }

    fn disable_raw_mode(&self) -> Result<()> {
        crossterm::terminal::disable_raw_mode().map_err(TerminalError::ModeChange)?;
        Ok(())
    }
}

/// Restores the terminal at most once, shared across tasks
#[derive(Clone)]
pub struct RestoreHandle {
    terminal: Arc<dyn Terminal>,
    restored: Arc<AtomicBool>,
}

impl RestoreHandle {
    /// Leave raw mode unless already done. Returns whether this call restored.
    ///
    /// Failures are logged, never returned.
    pub fn restore(&self) -> bool {
        if self
            .restored
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        match self.terminal.disable_raw_mode() {
            Ok(()) => debug!("Terminal restored"),
            Err(e) => warn!("Failed to restore terminal: {}", e),
        }
        true
    }

    pub fn is_restored(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RestoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreHandle")
            .field("restored", &self.is_restored())
            .finish()
    }
}

/// Raw mode for as long as the guard lives
#[derive(Debug)]
pub struct RawModeGuard {
    handle: RestoreHandle,
}

impl RawModeGuard {
    pub fn acquire(terminal: Arc<dyn Terminal>) -> Result<Self> {
        terminal.enable_raw_mode()?;
        debug!("Terminal switched to raw mode");
        Ok(Self {
            handle: RestoreHandle {
                terminal,
                restored: Arc::new(AtomicBool::new(false)),
            },
        })
    }

    /// A handle for restoring from another task
    pub fn handle(&self) -> RestoreHandle {
        self.handle.clone()
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.handle.restore();
    }
}

/// Resolves on Ctrl-C, or on SIGINT/SIGTERM/SIGHUP on unix.
///
/// The unix handlers are registered by this call, before the returned future
/// is first polled.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());
    let hangup = signal(SignalKind::hangup());
    async move {
        tokio::select! {
            _ = next_signal(interrupt, "SIGINT") => debug!("Received Ctrl-C"),
            _ = next_signal(terminate, "SIGTERM") => debug!("Received SIGTERM"),
            _ = next_signal(hangup, "SIGHUP") => debug!("Received SIGHUP"),
        }
    }
}

#[cfg(unix)]
async fn next_signal(
    registered: std::io::Result<tokio::signal::unix::Signal>,
    name: &'static str,
) {
    match registered {
        Ok(mut s) => {
            s.recv().await;
        }
        Err(e) => {
            warn!("Failed to listen for {}: {}", name, e);
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        debug!("Received Ctrl-C");
    }
}

pub mod mock {
    //! Scriptable terminal for tests

    use super::Terminal;
    use crate::errors::{Result, TerminalError};
    use crate::runtime::TerminalSize;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts raw-mode transitions instead of touching a real console
    #[derive(Debug)]
    pub struct MockTerminal {
        interactive: bool,
        size: TerminalSize,
        raw: AtomicBool,
        enables: AtomicUsize,
        disables: AtomicUsize,
        fail_restore: AtomicBool,
    }

    impl MockTerminal {
        pub fn interactive(size: TerminalSize) -> Self {
            Self {
                interactive: true,
                size,
                raw: AtomicBool::new(false),
                enables: AtomicUsize::new(0),
                disables: AtomicUsize::new(0),
                fail_restore: AtomicBool::new(false),
            }
        }

        pub fn piped() -> Self {
            Self {
                interactive: false,
                ..Self::interactive(TerminalSize::new(80, 24))
            }
        }

        /// Make every `disable_raw_mode` call fail
        pub fn fail_restore(self) -> Self {
            self.fail_restore.store(true, Ordering::SeqCst);
            self
        }

        pub fn enable_count(&self) -> usize {
            self.enables.load(Ordering::SeqCst)
        }

        pub fn restore_count(&self) -> usize {
            self.disables.load(Ordering::SeqCst)
        }

        pub fn is_raw(&self) -> bool {
            self.raw.load(Ordering::SeqCst)
        }
    }

    impl Terminal for MockTerminal {
        fn is_terminal(&self) -> bool {
            self.interactive
        }

        fn size(&self) -> Result<TerminalSize> {
            Ok(self.size)
        }

        fn enable_raw_mode(&self) -> Result<()> {
            self.enables.fetch_add(1, Ordering::SeqCst);
            self.raw.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn disable_raw_mode(&self) -> Result<()> {
            self.disables.fetch_add(1, Ordering::SeqCst);
            if self.fail_restore.load(Ordering::SeqCst) {
                return Err(TerminalError::ModeChange(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "mock restore failure",
                ))
                .into());
            }
            self.raw.store(false, Ordering::SeqCst);
            Ok(())
        }
    }
}
