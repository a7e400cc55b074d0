use std::fmt;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use rosterwatch_core::browser::BrowserError;
use rosterwatch_core::roster::{NotificationFormatter, SnapshotError, SnapshotStore};
use rosterwatch_core::session::AcquisitionError;
use rosterwatch_core::watch::WatchError;
use rosterwatch_core::{load_watch_config, WatchConfig};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::snapshot::{DiffArgs, DiffView, SnapshotCommands, SnapshotView};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] rosterwatch_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Watch(#[from] WatchError),
    #[error("{0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("{0}")]
    Browser(#[from] BrowserError),
    #[error("{0}")]
    Snapshot(#[from] SnapshotError),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("health check failed: {0}")]
    Unhealthy(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Watches a social graph entity list for drift", long_about = None)]
pub struct Cli {
    /// Path to rosterwatch.toml
    #[arg(long, default_value = "configs/rosterwatch.toml")]
    pub config: PathBuf,
    /// Data directory override (replaces paths.data_dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log filter, e.g. `debug` or `rosterwatch_core=trace` (defaults to RUST_LOG, then info)
    #[arg(long)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run watch cycles until interrupted
    Run,
    /// Run a single watch cycle
    Once,
    /// Acquire a session credential and print its fingerprint
    Token,
    /// Inspect the stored snapshot
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    /// Compare two snapshot files offline
    Diff(DiffArgs),
    /// Check configuration and local state
    Health,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout carries command output; logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "rosterwatchctl",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Run => {
            context.config.validate()?;
            let summary = commands::watch::run_watcher(&context.config, cli.format)?;
            render(&summary, cli.format)?;
        }
        Commands::Once => {
            context.config.validate()?;
            let report = commands::watch::run_once(&context.config)?;
            render(&report, cli.format)?;
        }
        Commands::Token => {
            context.config.validate()?;
            let report = commands::watch::acquire_token(&context.config)?;
            render(&report, cli.format)?;
        }
        Commands::Snapshot(SnapshotCommands::Show) => {
            let view = SnapshotView::load(context.config.snapshot_path())?;
            render(&view, cli.format)?;
        }
        Commands::Diff(args) => {
            let view = DiffView::compute(args, &context.formatter())?;
            render(&view, cli.format)?;
        }
        Commands::Health => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::Unhealthy(
                    "one or more checks failed".to_string(),
                ));
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: WatchConfig,
    config_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let mut config = load_watch_config(&config_path)?;
        config.apply_env_overrides()?;
        if let Some(data_dir) = &cli.data_dir {
            config.paths.data_dir = data_dir.to_string_lossy().into_owned();
        }
        Ok(Self {
            config,
            config_path,
        })
    }

    fn formatter(&self) -> NotificationFormatter {
        NotificationFormatter::from_config(&self.config.notify)
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = vec![self.check_path("rosterwatch.toml", &self.config_path)];

        results.push(match self.config.validate() {
            Ok(()) => HealthEntry::ok("configuration", "valid"),
            Err(err) => HealthEntry::error("configuration", err.to_string()),
        });

        results.push(self.check_directory("data_dir", Path::new(&self.config.paths.data_dir)));
        results.push(self.check_directory("browser profile", &self.config.profile_dir()));

        results.push(match &self.config.chromium.executable_path {
            Some(path) => self.check_path("chromium", Path::new(path)),
            None => HealthEntry::ok("chromium", "auto-detected at launch"),
        });

        let snapshot_path = self.config.snapshot_path();
        results.push(match SnapshotStore::new(&snapshot_path).load() {
            Ok(snapshot) if snapshot_path.exists() => HealthEntry::ok(
                "snapshot",
                format!("{} entities in {}", snapshot.len(), snapshot_path.display()),
            ),
            Ok(_) => HealthEntry::warn(
                "snapshot",
                format!("{} not written yet", snapshot_path.display()),
            ),
            Err(err) => HealthEntry::error("snapshot", err.to_string()),
        });

        let notify = &self.config.notify;
        results.push(if !notify.enabled {
            HealthEntry::warn("telegram", "disabled; drift is only logged")
        } else if notify.bot_token.is_some() && notify.chat_id.is_some() {
            HealthEntry::ok("telegram", "configured")
        } else {
            HealthEntry::error("telegram", "enabled but bot_token or chat_id missing")
        });

        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{} found", path.display()))
        } else {
            HealthEntry::error(name, format!("{} missing", path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        if path.is_dir() {
            HealthEntry::ok(name, format!("{} ready", path.display()))
        } else {
            HealthEntry::warn(
                name,
                format!("{} missing; created on first run", path.display()),
            )
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(HealthEntry::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for HealthEntry {
    fn display(&self) -> String {
        format!(
            "[{status}] {name}: {detail}",
            status = self.status,
            name = self.name,
            detail = self.detail
        )
    }
}
