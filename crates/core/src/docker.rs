//! Docker Engine API client
//!
//! Implements [`ContainerRuntimeClient`] over the Docker Engine HTTP API
//! using `bollard`. Podman is reached through its Docker-compatible socket.

use crate::errors::{BerthError, Result, RuntimeError};
use crate::runtime::{
    ContainerRuntimeClient, ContainerSummary, CreateSpec, ExecSpec, ExecStream, RuntimeKind,
    TerminalSize,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument};

/// Interval between exec inspections while waiting for a process to exit.
const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Seconds a container gets to stop before it is killed.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Engine client backed by the Docker Engine API
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
    kind: RuntimeKind,
}

impl DockerEngine {
    /// Connect to the local engine socket for `kind`.
    ///
    /// Docker honours `DOCKER_HOST`; Podman uses its per-user socket when
    /// `XDG_RUNTIME_DIR` is set, otherwise the system socket.
    pub fn connect(kind: RuntimeKind) -> Result<Self> {
        let docker = match kind {
            RuntimeKind::Docker => Docker::connect_with_local_defaults(),
            RuntimeKind::Podman => Docker::connect_with_socket(
                &podman_socket_path(),
                120,
                bollard::API_DEFAULT_VERSION,
            ),
        }
        .map_err(|e| RuntimeError::RuntimeUnavailable {
            reason: format!("cannot connect to {}: {}", kind, e),
        })?;
        Ok(Self { docker, kind })
    }
}

fn podman_socket_path() -> String {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => format!("{}/podman/podman.sock", dir),
        _ => "/run/podman/podman.sock".to_string(),
    }
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            Some(*status_code)
        }
        _ => None,
    }
}

/// Map engine errors that are not specific to one operation.
fn map_api_error(err: bollard::errors::Error) -> BerthError {
    match err {
        bollard::errors::Error::IOError { err } => RuntimeError::RuntimeUnavailable {
            reason: err.to_string(),
        }
        .into(),
        other => RuntimeError::Api(other.to_string()).into(),
    }
}

/// Split `repo[:tag]` so pulls never fall back to "all tags".
fn split_image_ref(image: &str) -> (String, String) {
    if image.contains('@') {
        return (image.to_string(), String::new());
    }
    let last_segment_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_segment_start..].rfind(':') {
        Some(pos) => {
            let split = last_segment_start + pos;
            (image[..split].to_string(), image[split + 1..].to_string())
        }
        None => (image.to_string(), "latest".to_string()),
    }
}

#[async_trait]
impl ContainerRuntimeClient for DockerEngine {
    fn runtime_name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| {
                RuntimeError::RuntimeUnavailable {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    #[instrument(skip(self))]
    async fn exists(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(map_api_error(e)),
        }
    }

    #[instrument(skip(self))]
    async fn is_running(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => Ok(details
                .state
                .and_then(|state| state.running)
                .unwrap_or(false)),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(map_api_error(e)),
        }
    }

    #[instrument(skip(self))]
    async fn start(&self, name: &str) -> Result<()> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 304: already started
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Err(RuntimeError::ContainerNotFound {
                name: name.to_string(),
            }
            .into()),
            Err(e) => Err(map_api_error(e)),
        }
    }

    #[instrument(skip(self, spec), fields(container = %spec.name, image = %spec.image))]
    async fn create(&self, spec: &CreateSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let labels: HashMap<String, String> = spec
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            user: spec.user.clone(),
            labels: Some(labels),
            entrypoint: Some(spec.entrypoint.clone()),
            cmd: Some(spec.cmd.clone()),
            working_dir: Some(spec.workspace_target.clone()),
            host_config: Some(HostConfig {
                binds: Some(vec![format!(
                    "{}:{}",
                    spec.workspace_source, spec.workspace_target
                )]),
                ..Default::default()
            }),
            ..Default::default()
        };

        match self.docker.create_container(Some(options), config).await {
            Ok(response) => {
                info!("Created container {} ({})", spec.name, response.id);
                Ok(response.id)
            }
            Err(e) if status_code(&e) == Some(409) => Err(RuntimeError::NameConflict {
                name: spec.name.clone(),
            }
            .into()),
            Err(e) => Err(RuntimeError::ContainerCreateFailed {
                name: spec.name.clone(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    #[instrument(skip(self))]
    async fn stop(&self, name: &str) -> Result<()> {
        match self
            .docker
            .stop_container(
                name,
                Some(StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Err(RuntimeError::ContainerNotFound {
                name: name.to_string(),
            }
            .into()),
            Err(e) => Err(map_api_error(e)),
        }
    }

    #[instrument(skip(self))]
    async fn remove(&self, name: &str) -> Result<()> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => RuntimeError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into(),
                _ => map_api_error(e),
            })
    }

    #[instrument(skip(self))]
    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(map_api_error(e)),
        }
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = split_image_ref(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(update) = progress.try_next().await.map_err(|e| {
            RuntimeError::ImagePullFailed {
                image: image.to_string(),
                message: e.to_string(),
            }
        })? {
            if let Some(status) = update.status {
                debug!("pull {}: {}", image, status);
            }
        }
        info!("Pulled image {}", image);
        Ok(())
    }

    async fn find_containers(&self, labels: &[(String, String)]) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>(),
        );
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_api_error)?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                running: c.state.as_deref() == Some("running"),
            })
            .collect())
    }

    #[instrument(skip(self, spec), fields(cmd = ?spec.cmd, tty = spec.tty))]
    async fn exec_create(&self, container: &str, spec: &ExecSpec) -> Result<String> {
        let options = CreateExecOptions {
            cmd: Some(spec.cmd.clone()),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(spec.tty),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            user: spec.user.clone(),
            working_dir: spec.working_dir.clone(),
            ..Default::default()
        };
        let created = self
            .docker
            .create_exec(container, options)
            .await
            .map_err(|e| RuntimeError::ExecCreateFailed {
                container: container.to_string(),
                message: e.to_string(),
            })?;
        debug!("Created exec {}", created.id);
        Ok(created.id)
    }

    /// The engine has no separate attach call: the hijacked `start` upgrade
    /// is the attach, and output is buffered to this consumer from the first
    /// byte. [`exec_start`](Self::exec_start) then waits for the process.
    #[instrument(skip(self))]
    async fn exec_attach(&self, exec_id: &str, tty: bool) -> Result<ExecStream> {
        let options = StartExecOptions {
            detach: false,
            tty,
            ..Default::default()
        };
        let attach_failed = |message: String| RuntimeError::AttachFailed {
            exec_id: exec_id.to_string(),
            message,
        };
        match self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(|e| attach_failed(e.to_string()))?
        {
            StartExecResults::Attached { output, input } => {
                let bytes = output.map(|chunk| {
                    chunk
                        .map(|log| log.into_bytes())
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
                });
                Ok(ExecStream {
                    output: Box::new(StreamReader::new(bytes)),
                    input: Box::new(input),
                })
            }
            StartExecResults::Detached => {
                Err(attach_failed("engine returned a detached exec".to_string()).into())
            }
        }
    }

    #[instrument(skip(self))]
    async fn exec_start(&self, exec_id: &str, _tty: bool) -> Result<i64> {
        loop {
            let inspect = self.docker.inspect_exec(exec_id).await.map_err(|e| {
                RuntimeError::ExecStartFailed {
                    exec_id: exec_id.to_string(),
                    message: e.to_string(),
                }
            })?;
            if inspect.running != Some(true) {
                if let Some(code) = inspect.exit_code {
                    debug!("Exec {} exited with {}", exec_id, code);
                    return Ok(code);
                }
            }
            tokio::time::sleep(EXEC_POLL_INTERVAL).await;
        }
    }

    async fn exec_resize(&self, exec_id: &str, size: TerminalSize) -> Result<()> {
        self.docker
            .resize_exec(
                exec_id,
                ResizeExecOptions {
                    height: size.rows,
                    width: size.columns,
                },
            )
            .await
            .map_err(map_api_error)
    }
}

pub mod mock {
    //! In-memory runtime for tests
    //!
    //! Tracks containers and images, scripts exec output and exit codes, and
    //! records every port call in order so tests can assert on sequencing.

    use crate::errors::{Result, RuntimeError};
    use crate::runtime::{
        ContainerRuntimeClient, ContainerSummary, CreateSpec, ExecSpec, ExecStream, TerminalSize,
    };
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    const PIPE_CAPACITY: usize = 64 * 1024;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One recorded call on the mock
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockCall {
        Ping,
        Exists(String),
        IsRunning(String),
        Start(String),
        Create(String),
        Stop(String),
        Remove(String),
        ImageExists(String),
        PullImage(String),
        FindContainers,
        ExecCreate { container: String, cmd: Vec<String> },
        ExecAttach(String),
        ExecStart(String),
        ExecResize(String, TerminalSize),
    }

    /// Scripted behaviour of one exec
    #[derive(Debug, Clone, Default)]
    pub struct MockExecResponse {
        pub exit_code: i64,
        /// Written to the output stream when the exec starts
        pub stdout: Vec<u8>,
        /// Copy everything written to the input stream back to the output
        pub echo_stdin: bool,
        /// Never finish; keeps the output stream open
        pub hang: bool,
        pub delay: Option<Duration>,
    }

    impl MockExecResponse {
        pub fn exit(code: i64) -> Self {
            Self {
                exit_code: code,
                ..Default::default()
            }
        }

        pub fn output(stdout: impl Into<Vec<u8>>) -> Self {
            Self {
                stdout: stdout.into(),
                ..Default::default()
            }
        }
    }

    /// A container known to the mock
    #[derive(Debug, Clone)]
    pub struct MockContainer {
        pub id: String,
        pub name: String,
        pub image: String,
        pub running: bool,
        pub labels: BTreeMap<String, String>,
    }

    impl MockContainer {
        pub fn new(name: impl Into<String>, running: bool) -> Self {
            let name = name.into();
            Self {
                id: format!("id-{}", name),
                name,
                image: "mock:latest".to_string(),
                running,
                labels: BTreeMap::new(),
            }
        }

        pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
            self.labels = labels;
            self
        }
    }

    /// Failure switches
    #[derive(Debug, Clone, Default)]
    pub struct MockRuntimeConfig {
        pub daemon_unavailable: bool,
        pub pull_fails: bool,
        pub create_fails: bool,
        /// Simulate another invocation winning the create race: the create
        /// fails with a name conflict and a running container appears.
        pub create_conflict: bool,
        pub exec_create_fails: bool,
        pub attach_fails: bool,
        /// Fail the start of an attached exec; its streams are closed
        pub exec_start_fails: bool,
    }

    struct PendingExec {
        container: String,
        cmd: Vec<String>,
        attached: Option<(DuplexStream, DuplexStream)>,
    }

    #[derive(Default)]
    struct State {
        config: MockRuntimeConfig,
        containers: Vec<MockContainer>,
        images: HashSet<String>,
        calls: Vec<MockCall>,
        created: Vec<CreateSpec>,
        exec_specs: Vec<ExecSpec>,
        execs: HashMap<String, PendingExec>,
        next_exec: usize,
        default_response: MockExecResponse,
        responses: HashMap<String, MockExecResponse>,
    }

    /// Mock container runtime
    #[derive(Clone, Default)]
    pub struct MockRuntime {
        state: Arc<Mutex<State>>,
    }

    impl std::fmt::Debug for MockRuntime {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockRuntime").finish_non_exhaustive()
        }
    }

    impl MockRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_config(config: MockRuntimeConfig) -> Self {
            let runtime = Self::default();
            lock(&runtime.state).config = config;
            runtime
        }

        pub fn update_config<F>(&self, f: F)
        where
            F: FnOnce(&mut MockRuntimeConfig),
        {
            f(&mut lock(&self.state).config);
        }

        pub fn add_container(&self, container: MockContainer) {
            lock(&self.state).containers.push(container);
        }

        pub fn add_image(&self, image: impl Into<String>) {
            lock(&self.state).images.insert(image.into());
        }

        /// Response for execs whose argv joined by spaces equals `command`
        pub fn set_exec_response(&self, command: impl Into<String>, response: MockExecResponse) {
            lock(&self.state).responses.insert(command.into(), response);
        }

        pub fn set_default_exec_response(&self, response: MockExecResponse) {
            lock(&self.state).default_response = response;
        }

        pub fn calls(&self) -> Vec<MockCall> {
            lock(&self.state).calls.clone()
        }

        pub fn clear_calls(&self) {
            lock(&self.state).calls.clear();
        }

        /// Argv of every exec created, in order
        pub fn exec_commands(&self) -> Vec<Vec<String>> {
            lock(&self.state)
                .calls
                .iter()
                .filter_map(|call| match call {
                    MockCall::ExecCreate { cmd, .. } => Some(cmd.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn exec_specs(&self) -> Vec<ExecSpec> {
            lock(&self.state).exec_specs.clone()
        }

        pub fn created_specs(&self) -> Vec<CreateSpec> {
            lock(&self.state).created.clone()
        }

        pub fn container(&self, name: &str) -> Option<MockContainer> {
            lock(&self.state)
                .containers
                .iter()
                .find(|c| c.name == name)
                .cloned()
        }

        fn record(&self, call: MockCall) -> Result<()> {
            let mut state = lock(&self.state);
            state.calls.push(call);
            if state.config.daemon_unavailable {
                return Err(RuntimeError::RuntimeUnavailable {
                    reason: "mock daemon unavailable".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerRuntimeClient for MockRuntime {
        fn runtime_name(&self) -> &'static str {
            "mock"
        }

        async fn ping(&self) -> Result<()> {
            self.record(MockCall::Ping)
        }

        async fn exists(&self, name: &str) -> Result<bool> {
            self.record(MockCall::Exists(name.to_string()))?;
            Ok(self.container(name).is_some())
        }

        async fn is_running(&self, name: &str) -> Result<bool> {
            self.record(MockCall::IsRunning(name.to_string()))?;
            Ok(self.container(name).map(|c| c.running).unwrap_or(false))
        }

        async fn start(&self, name: &str) -> Result<()> {
            self.record(MockCall::Start(name.to_string()))?;
            let mut state = lock(&self.state);
            match state.containers.iter_mut().find(|c| c.name == name) {
                Some(container) => {
                    container.running = true;
                    Ok(())
                }
                None => Err(RuntimeError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into()),
            }
        }

        async fn create(&self, spec: &CreateSpec) -> Result<String> {
            self.record(MockCall::Create(spec.name.clone()))?;
            let mut state = lock(&self.state);
            if state.config.create_conflict {
                state.containers.push(MockContainer::new(spec.name.clone(), true));
                return Err(RuntimeError::NameConflict {
                    name: spec.name.clone(),
                }
                .into());
            }
            if state.config.create_fails || state.containers.iter().any(|c| c.name == spec.name) {
                return Err(RuntimeError::ContainerCreateFailed {
                    name: spec.name.clone(),
                    message: "mock create failure".to_string(),
                }
                .into());
            }
            let container = MockContainer {
                image: spec.image.clone(),
                labels: spec.labels.clone(),
                ..MockContainer::new(spec.name.clone(), false)
            };
            let id = container.id.clone();
            state.containers.push(container);
            state.created.push(spec.clone());
            Ok(id)
        }

        async fn stop(&self, name: &str) -> Result<()> {
            self.record(MockCall::Stop(name.to_string()))?;
            let mut state = lock(&self.state);
            match state.containers.iter_mut().find(|c| c.name == name) {
                Some(container) => {
                    container.running = false;
                    Ok(())
                }
                None => Err(RuntimeError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into()),
            }
        }

        async fn remove(&self, name: &str) -> Result<()> {
            self.record(MockCall::Remove(name.to_string()))?;
            let mut state = lock(&self.state);
            let before = state.containers.len();
            state.containers.retain(|c| c.name != name);
            if state.containers.len() == before {
                return Err(RuntimeError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn image_exists(&self, image: &str) -> Result<bool> {
            self.record(MockCall::ImageExists(image.to_string()))?;
            Ok(lock(&self.state).images.contains(image))
        }

        async fn pull_image(&self, image: &str) -> Result<()> {
            self.record(MockCall::PullImage(image.to_string()))?;
            let mut state = lock(&self.state);
            if state.config.pull_fails {
                return Err(RuntimeError::ImagePullFailed {
                    image: image.to_string(),
                    message: "mock pull failure".to_string(),
                }
                .into());
            }
            state.images.insert(image.to_string());
            Ok(())
        }

        async fn find_containers(
            &self,
            labels: &[(String, String)],
        ) -> Result<Vec<ContainerSummary>> {
            self.record(MockCall::FindContainers)?;
            Ok(lock(&self.state)
                .containers
                .iter()
                .filter(|c| labels.iter().all(|(k, v)| c.labels.get(k) == Some(v)))
                .map(|c| ContainerSummary {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    running: c.running,
                })
                .collect())
        }

        async fn exec_create(&self, container: &str, spec: &ExecSpec) -> Result<String> {
            self.record(MockCall::ExecCreate {
                container: container.to_string(),
                cmd: spec.cmd.clone(),
            })?;
            let mut state = lock(&self.state);
            if state.config.exec_create_fails {
                return Err(RuntimeError::ExecCreateFailed {
                    container: container.to_string(),
                    message: "mock exec create failure".to_string(),
                }
                .into());
            }
            state.next_exec += 1;
            let exec_id = format!("exec-{}", state.next_exec);
            state.exec_specs.push(spec.clone());
            state.execs.insert(
                exec_id.clone(),
                PendingExec {
                    container: container.to_string(),
                    cmd: spec.cmd.clone(),
                    attached: None,
                },
            );
            Ok(exec_id)
        }

        async fn exec_attach(&self, exec_id: &str, _tty: bool) -> Result<ExecStream> {
            self.record(MockCall::ExecAttach(exec_id.to_string()))?;
            let mut state = lock(&self.state);
            if state.config.attach_fails {
                return Err(RuntimeError::AttachFailed {
                    exec_id: exec_id.to_string(),
                    message: "mock attach failure".to_string(),
                }
                .into());
            }
            let exec = state.execs.get_mut(exec_id).ok_or_else(|| {
                RuntimeError::AttachFailed {
                    exec_id: exec_id.to_string(),
                    message: "unknown exec".to_string(),
                }
            })?;
            let (output_local, output_remote) = tokio::io::duplex(PIPE_CAPACITY);
            let (input_local, input_remote) = tokio::io::duplex(PIPE_CAPACITY);
            exec.attached = Some((output_remote, input_remote));
            Ok(ExecStream {
                output: Box::new(output_local),
                input: Box::new(input_local),
            })
        }

        async fn exec_start(&self, exec_id: &str, _tty: bool) -> Result<i64> {
            self.record(MockCall::ExecStart(exec_id.to_string()))?;
            let (container, cmd, attached, response) = {
                let mut state = lock(&self.state);
                let exec = state.execs.remove(exec_id).ok_or_else(|| {
                    RuntimeError::ExecStartFailed {
                        exec_id: exec_id.to_string(),
                        message: "unknown exec".to_string(),
                    }
                })?;
                let response = state
                    .responses
                    .get(&exec.cmd.join(" "))
                    .cloned()
                    .unwrap_or_else(|| state.default_response.clone());
                (exec.container, exec.cmd, exec.attached, response)
            };

            let (mut output, mut input) = attached.ok_or_else(|| RuntimeError::ExecStartFailed {
                exec_id: exec_id.to_string(),
                message: format!(
                    "exec {:?} in {} started before attach; output would be lost",
                    cmd, container
                ),
            })?;

            if lock(&self.state).config.exec_start_fails {
                drop((output, input));
                return Err(RuntimeError::ExecStartFailed {
                    exec_id: exec_id.to_string(),
                    message: "mock exec start failure".to_string(),
                }
                .into());
            }

            if let Some(delay) = response.delay {
                tokio::time::sleep(delay).await;
            }
            let io_err = |e: std::io::Error| RuntimeError::ExecStartFailed {
                exec_id: exec_id.to_string(),
                message: e.to_string(),
            };
            output.write_all(&response.stdout).await.map_err(io_err)?;
            if response.echo_stdin {
                tokio::io::copy(&mut input, &mut output)
                    .await
                    .map_err(io_err)?;
            }
            if response.hang {
                std::future::pending::<()>().await;
            }
            output.shutdown().await.map_err(io_err)?;
            Ok(response.exit_code)
        }

        async fn exec_resize(&self, exec_id: &str, size: TerminalSize) -> Result<()> {
            self.record(MockCall::ExecResize(exec_id.to_string(), size))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_ref() {
        assert_eq!(
            split_image_ref("ubuntu"),
            ("ubuntu".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_ref("ubuntu:22.04"),
            ("ubuntu".to_string(), "22.04".to_string())
        );
        assert_eq!(
            split_image_ref("localhost:5000/team/app"),
            ("localhost:5000/team/app".to_string(), "latest".to_string())
        );
        assert_eq!(
            split_image_ref("localhost:5000/team/app:v1"),
            ("localhost:5000/team/app".to_string(), "v1".to_string())
        );
        assert_eq!(
            split_image_ref("alpine@sha256:abc").1,
            String::new()
        );
    }

    #[test]
    fn test_podman_socket_path_default() {
        let path = podman_socket_path();
        assert!(path.ends_with("podman/podman.sock"));
    }
}
