//! Lifecycle orchestration against a running container
//!
//! Phases up to the wait barrier run in order and block the caller; the
//! first failure aborts bring-up. Everything after the barrier runs in a
//! single background task where failures are logged and skipped past, and
//! `postAttach` is always attempted last.

use crate::config::ConfigProvider;
use crate::container::{
    ensure_container, require_running, ContainerIdentity, EnsureOutcome, ImageSpec,
};
use crate::errors::{BerthError, LifecycleError, Result};
use crate::lifecycle::{should_run_synchronously, LifecycleCommand, LifecyclePhase, WaitBarrier};
use crate::runtime::{ContainerRuntimeClient, ExecSpec, ExecStream};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Runs one hook command and reports its exit code.
#[async_trait]
pub trait HookRunner: Send + Sync + 'static {
    async fn run(&self, phase: LifecyclePhase, argv: &[String]) -> Result<i64>;
}

/// Runs hooks as non-interactive execs in the workspace container.
pub struct ContainerHookRunner<R: ?Sized> {
    runtime: Arc<R>,
    container: String,
    user: Option<String>,
    working_dir: String,
    env: Vec<String>,
}

impl<R: ContainerRuntimeClient + ?Sized> ContainerHookRunner<R> {
    pub fn new<C: ConfigProvider + ?Sized>(runtime: Arc<R>, container: String, config: &C) -> Self {
        Self {
            runtime,
            container,
            user: config.container_user().map(str::to_string),
            working_dir: config.workspace_folder().to_string(),
            env: config
                .container_env()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
        }
    }
}

#[async_trait]
impl<R: ContainerRuntimeClient + ?Sized + 'static> HookRunner for ContainerHookRunner<R> {
    #[instrument(skip(self, argv), fields(phase = %phase))]
    async fn run(&self, phase: LifecyclePhase, argv: &[String]) -> Result<i64> {
        let spec = ExecSpec {
            cmd: argv.to_vec(),
            user: self.user.clone(),
            tty: false,
            attach_stdin: false,
            working_dir: Some(self.working_dir.clone()),
            env: self.env.clone(),
        };
        let exec_id = self.runtime.exec_create(&self.container, &spec).await?;
        let ExecStream { output, input } = self.runtime.exec_attach(&exec_id, false).await?;

        let relay = async move {
            let mut reader = BufReader::new(output);
            let mut stderr = tokio::io::stderr();
            if let Err(e) = relay_hook_output(phase, &mut reader, &mut stderr).await {
                warn!("[{}] output relay error: {}", phase, e);
                // Keep reading so the hook never writes into a closed stream.
                if let Err(e) = tokio::io::copy_buf(&mut reader, &mut tokio::io::sink()).await {
                    debug!("[{}] discarding output failed: {}", phase, e);
                }
            }
        };
        let (_, exit_code) = tokio::join!(relay, self.runtime.exec_start(&exec_id, false));
        drop(input);
        exit_code
    }
}

/// Copy hook output to `sink` line by line, prefixed with the phase.
///
/// Reads until end-of-stream whatever the bytes are; invalid UTF-8 is
/// replaced for display only. Returns the number of lines written.
pub async fn relay_hook_output<R, W>(
    phase: LifecyclePhase,
    reader: &mut R,
    sink: &mut W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut lines = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(&['\r', '\n'][..]);
        sink.write_all(format!("[{}] {}\n", phase, line).as_bytes()).await?;
        lines += 1;
    }
    sink.flush().await?;
    Ok(lines)
}

/// Outcome of the background phases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundReport {
    /// Phases whose command ran to a zero exit
    pub executed: Vec<LifecyclePhase>,
    /// Phases with no command configured
    pub skipped: Vec<LifecyclePhase>,
    /// Phases that failed, with the error
    pub failures: Vec<(LifecyclePhase, String)>,
}

impl BackgroundReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Handle to the post-barrier task
#[derive(Debug)]
pub struct BackgroundPhases {
    handle: JoinHandle<BackgroundReport>,
}

impl BackgroundPhases {
    /// Wait for every background phase to be attempted.
    pub async fn wait(self) -> Result<BackgroundReport> {
        self.handle
            .await
            .map_err(|e| BerthError::Task(format!("background lifecycle phases: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Drives the hook sequence for one bring-up
pub struct LifecycleOrchestrator<H: HookRunner> {
    runner: Arc<H>,
    commands: Vec<LifecycleCommand>,
    barrier: WaitBarrier,
}

impl<H: HookRunner> LifecycleOrchestrator<H> {
    /// Orchestrator for the commands and barrier in `config`
    pub fn from_config<C: ConfigProvider + ?Sized>(runner: Arc<H>, config: &C) -> Self {
        let commands = LifecyclePhase::ALL
            .iter()
            .map(|phase| config.command(*phase))
            .collect();
        Self::new(runner, commands, config.wait_barrier())
    }

    pub fn new(runner: Arc<H>, mut commands: Vec<LifecycleCommand>, barrier: WaitBarrier) -> Self {
        commands.sort_by_key(|c| c.phase);
        Self {
            runner,
            commands,
            barrier,
        }
    }

    /// Run the synchronous phases, then hand the rest to a background task.
    ///
    /// Returns once the container is ready for use. No background work is
    /// started if a synchronous phase fails.
    #[instrument(skip(self), fields(barrier = %self.barrier.phase()))]
    pub async fn bring_up(self) -> Result<BackgroundPhases> {
        let barrier = self.barrier;
        let (sync, background): (Vec<_>, Vec<_>) = self
            .commands
            .into_iter()
            .partition(|c| should_run_synchronously(c.phase, barrier));

        for command in &sync {
            if command.is_noop() {
                debug!("No {} command configured; skipping", command.phase);
                continue;
            }
            run_phase(self.runner.as_ref(), command).await?;
        }
        info!("Container ready (wait barrier {} reached)", barrier.phase());

        let runner = self.runner;
        let handle = tokio::spawn(async move { run_background(runner.as_ref(), background).await });
        Ok(BackgroundPhases { handle })
    }
}

async fn run_phase<H: HookRunner + ?Sized>(runner: &H, command: &LifecycleCommand) -> Result<()> {
    let phase = command.phase;
    info!("Running {} command: {:?}", phase, command.argv);
    let start = Instant::now();
    let exit_code = runner.run(phase, &command.argv).await.map_err(|e| match e {
        BerthError::Lifecycle(inner) => BerthError::Lifecycle(inner),
        other => LifecycleError::PhaseExecFailed {
            phase: phase.as_str().to_string(),
            message: other.to_string(),
        }
        .into(),
    })?;
    let elapsed = start.elapsed();
    if exit_code != 0 {
        error!(
            "{} command failed with exit code {} after {:.2?}",
            phase, exit_code, elapsed
        );
        return Err(LifecycleError::PhaseCommandFailed {
            phase: phase.as_str().to_string(),
            exit_code,
        }
        .into());
    }
    info!("{} command completed in {:.2?}", phase, elapsed);
    Ok(())
}

async fn run_background<H: HookRunner + ?Sized>(
    runner: &H,
    commands: Vec<LifecycleCommand>,
) -> BackgroundReport {
    let (post_attach, ordered): (Vec<_>, Vec<_>) = commands
        .into_iter()
        .partition(|c| c.phase == LifecyclePhase::PostAttach);

    let mut report = BackgroundReport::default();
    for command in ordered.iter().chain(post_attach.iter()) {
        if command.is_noop() {
            report.skipped.push(command.phase);
            continue;
        }
        match run_phase(runner, command).await {
            Ok(()) => report.executed.push(command.phase),
            Err(e) => {
                error!("Background {} phase failed: {}", command.phase, e);
                report.failures.push((command.phase, e.to_string()));
            }
        }
    }
    report
}

/// Result of `up`
#[derive(Debug)]
pub struct UpResult {
    pub container_name: String,
    pub outcome: EnsureOutcome,
    /// Present only when the lifecycle ran
    pub background: Option<BackgroundPhases>,
}

/// Ensure the container, and run the full lifecycle on first boot.
pub async fn up<R, C>(
    runtime: Arc<R>,
    identity: &ContainerIdentity,
    image: &ImageSpec,
    config: &C,
) -> Result<UpResult>
where
    R: ContainerRuntimeClient + ?Sized + 'static,
    C: ConfigProvider + ?Sized,
{
    let outcome = ensure_container(runtime.as_ref(), identity, image, config).await?;
    let container_name = identity.derived_name();

    let background = if outcome.runs_lifecycle() {
        let runner = Arc::new(ContainerHookRunner::new(
            runtime,
            container_name.clone(),
            config,
        ));
        Some(
            LifecycleOrchestrator::from_config(runner, config)
                .bring_up()
                .await?,
        )
    } else {
        info!("Container {} restarted; lifecycle commands not re-run", container_name);
        None
    };

    Ok(UpResult {
        container_name,
        outcome,
        background,
    })
}

/// Run the full hook pass against the already-running workspace container.
pub async fn run_user_commands<R, C>(
    runtime: Arc<R>,
    identity: &ContainerIdentity,
    config: &C,
) -> Result<(String, BackgroundPhases)>
where
    R: ContainerRuntimeClient + ?Sized + 'static,
    C: ConfigProvider + ?Sized,
{
    let container_name = require_running(runtime.as_ref(), identity).await?;
    let runner = Arc::new(ContainerHookRunner::new(
        runtime,
        container_name.clone(),
        config,
    ));
    let background = LifecycleOrchestrator::from_config(runner, config)
        .bring_up()
        .await?;
    Ok((container_name, background))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        ran: Mutex<Vec<LifecyclePhase>>,
        failing: Vec<LifecyclePhase>,
    }

    #[async_trait]
    impl HookRunner for RecordingRunner {
        async fn run(&self, phase: LifecyclePhase, _argv: &[String]) -> Result<i64> {
            self.ran.lock().unwrap().push(phase);
            Ok(if self.failing.contains(&phase) { 1 } else { 0 })
        }
    }

    fn command(phase: LifecyclePhase) -> LifecycleCommand {
        LifecycleCommand::new(phase, vec!["true".to_string()])
    }

    #[tokio::test]
    async fn test_default_barrier_splits_after_update_content() {
        let runner = Arc::new(RecordingRunner::default());
        let commands = LifecyclePhase::ALL.iter().map(|p| command(*p)).collect();
        let background = LifecycleOrchestrator::new(runner.clone(), commands, WaitBarrier::default())
            .bring_up()
            .await
            .unwrap();

        assert_eq!(
            *runner.ran.lock().unwrap(),
            vec![
                LifecyclePhase::Initialize,
                LifecyclePhase::OnCreate,
                LifecyclePhase::UpdateContent
            ]
        );

        let report = background.wait().await.unwrap();
        assert_eq!(
            report.executed,
            vec![
                LifecyclePhase::PostCreate,
                LifecyclePhase::PostStart,
                LifecyclePhase::PostAttach
            ]
        );
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_commands_sorted_into_phase_order() {
        let runner = Arc::new(RecordingRunner::default());
        let commands = vec![
            command(LifecyclePhase::PostAttach),
            command(LifecyclePhase::OnCreate),
            command(LifecyclePhase::Initialize),
        ];
        LifecycleOrchestrator::new(runner.clone(), commands, WaitBarrier::PostStart)
            .bring_up()
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(
            *runner.ran.lock().unwrap(),
            vec![
                LifecyclePhase::Initialize,
                LifecyclePhase::OnCreate,
                LifecyclePhase::PostAttach
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_failure_identifies_phase() {
        let runner = Arc::new(RecordingRunner {
            failing: vec![LifecyclePhase::Initialize],
            ..Default::default()
        });
        let commands = LifecyclePhase::ALL.iter().map(|p| command(*p)).collect();
        let err = LifecycleOrchestrator::new(runner.clone(), commands, WaitBarrier::OnCreate)
            .bring_up()
            .await
            .unwrap_err();

        assert_eq!(err.failed_phase(), Some("initialize"));
        assert_eq!(*runner.ran.lock().unwrap(), vec![LifecyclePhase::Initialize]);
    }

    #[tokio::test]
    async fn test_relay_hook_output_replaces_invalid_utf8() {
        let mut reader: &[u8] = b"caf\xe9 latin-1\r\n\xff\xfe\nno newline";
        let mut sink = Vec::new();
        let lines = relay_hook_output(LifecyclePhase::OnCreate, &mut reader, &mut sink)
            .await
            .unwrap();

        assert_eq!(lines, 3);
        assert_eq!(
            String::from_utf8(sink).unwrap(),
            "[onCreate] caf\u{FFFD} latin-1\n[onCreate] \u{FFFD}\u{FFFD}\n[onCreate] no newline\n"
        );
        assert!(reader.is_empty());
    }

    #[test]
    fn test_background_report_success() {
        let mut report = BackgroundReport::default();
        assert!(report.success());
        report
            .failures
            .push((LifecyclePhase::PostStart, "boom".to_string()));
        assert!(!report.success());
    }
}
