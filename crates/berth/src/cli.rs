use crate::commands;
use anyhow::{Context, Result};
use berth_core::config::{parse_env_pair, InvocationOptions};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl From<RuntimeOption> for berth_core::runtime::RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => berth_core::runtime::RuntimeKind::Docker,
            RuntimeOption::Podman => berth_core::runtime::RuntimeKind::Podman,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Workspace containers with lifecycle hooks and interactive exec
#[derive(Debug, Parser)]
#[command(name = "berth", version, about, long_about = None)]
pub struct Cli {
    /// Log format (text or json, can be set via BERTH_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Workspace folder path (defaults to the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub workspace_folder: Option<PathBuf>,

    /// Configuration file path (skips discovery)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use this container name instead of the derived one
    #[arg(long, global = true, value_name = "NAME")]
    pub container_name: Option<String>,

    /// Image to run, overriding the configuration
    #[arg(long, global = true, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Session label; distinct labels give distinct containers per workspace
    #[arg(long, global = true, value_name = "LABEL")]
    pub session: Option<String>,

    /// Container runtime to use (docker or podman, can be set via BERTH_RUNTIME env var)
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Extra container environment (KEY=VALUE, repeatable)
    #[arg(long = "env", global = true, value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Pull the image even when it is present locally
    #[arg(long, global = true)]
    pub always_pull: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or start the workspace container and run lifecycle commands
    Up,
    /// Run a command in the running workspace container (no TTY)
    Exec {
        /// Command and arguments
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true,
            value_name = "COMMAND"
        )]
        command: Vec<String>,
    },
    /// Open an interactive login shell in the workspace container
    Shell {
        /// Shell to launch instead of the container user's default
        #[arg(long, value_name = "PATH")]
        shell: Option<String>,
    },
    /// Re-run every lifecycle command in the running workspace container
    RunUserCommands,
    /// Stop the workspace container
    Down {
        /// Remove the container after stopping it
        #[arg(long)]
        remove: bool,
    },
}

impl Cli {
    /// Freeze the global flags into the value passed to every command.
    pub fn invocation_options(&self) -> Result<InvocationOptions> {
        let workspace_folder = match &self.workspace_folder {
            Some(folder) => folder.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        // Missing folders are kept as given and reported during config discovery.
        let workspace_folder = workspace_folder.canonicalize().unwrap_or(workspace_folder);
        let env = self
            .env
            .iter()
            .map(|raw| parse_env_pair(raw))
            .collect::<berth_core::errors::Result<Vec<_>>>()?;

        Ok(InvocationOptions {
            workspace_folder,
            config_path: self.config.clone(),
            container_name: self.container_name.clone(),
            image: self.image.clone(),
            session: self.session.clone(),
            always_pull: self.always_pull,
            runtime: self.runtime.map(Into::into),
            env,
        })
    }

    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };
        let log_level = match self.log_level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };

        // Seed the filter before logging is initialized.
        if std::env::var_os("BERTH_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("berth={},berth_core={}", log_level, log_level),
            );
        }
        berth_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let options = self.invocation_options()?;

        match self.command {
            Commands::Up => commands::up::execute_up(&options).await,
            Commands::Exec { command } => commands::exec::execute_exec(&options, command).await,
            Commands::Shell { shell } => commands::shell::execute_shell(&options, shell).await,
            Commands::RunUserCommands => {
                commands::run_user_commands::execute_run_user_commands(&options).await
            }
            Commands::Down { remove } => commands::down::execute_down(&options, remove).await,
        }
    }
}
