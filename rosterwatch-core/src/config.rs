use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const ENV_REFRESH_INTERVAL: &str = "ROSTERWATCH_REFRESH_INTERVAL";
pub const ENV_OWNER_ID: &str = "ROSTERWATCH_OWNER_ID";
pub const ENV_TG_BOT_TOKEN: &str = "ROSTERWATCH_TG_BOT_TOKEN";
pub const ENV_TG_CHAT_ID: &str = "ROSTERWATCH_TG_CHAT_ID";
pub const ENV_CHROMIUM_PATH: &str = "ROSTERWATCH_CHROMIUM_PATH";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WatchConfig {
    pub paths: PathsSection,
    pub chromium: ChromiumSection,
    pub session: SessionSection,
    pub api: ApiSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub schedule: ScheduleSection,
}

impl WatchConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.data_dir).join(path)
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.snapshot_file)
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.profile_dir)
    }

    /// Applies the process environment on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_REFRESH_INTERVAL) {
            self.schedule.refresh_interval_seconds =
                value.trim().parse().map_err(|_| ConfigError::Env {
                    variable: ENV_REFRESH_INTERVAL.to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(ENV_OWNER_ID) {
            self.api.owner_id = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_TG_BOT_TOKEN) {
            self.notify.bot_token = Some(value.trim().to_string());
        }
        if let Some(value) = lookup(ENV_TG_CHAT_ID) {
            self.notify.chat_id = Some(value.trim().to_string());
        }
        if let Some(value) = lookup(ENV_CHROMIUM_PATH) {
            self.chromium.executable_path = Some(value.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_url("session.target_url", &self.session.target_url)?;
        check_url("api.base_url", &self.api.base_url)?;
        if self.notify.enabled {
            check_url("notify.api_base", &self.notify.api_base)?;
        }
        if self.session.unauthenticated_marker.trim().is_empty()
            || self.session.authenticated_marker.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "session markers must both be set".into(),
            ));
        }
        if self.session.token_key_pattern.is_empty() {
            return Err(ConfigError::Invalid(
                "session.token_key_pattern is empty".into(),
            ));
        }
        if self.api.owner_id.trim().is_empty() {
            return Err(ConfigError::Invalid("api.owner_id is empty".into()));
        }
        if self.api.page_size == 0 {
            return Err(ConfigError::Invalid("api.page_size must be > 0".into()));
        }
        if self.notify.enabled && (self.notify.bot_token.is_none() || self.notify.chat_id.is_none())
        {
            return Err(ConfigError::Invalid(
                "notify is enabled but bot_token or chat_id is missing".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub data_dir: String,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
    #[serde(default = "default_profile_dir")]
    pub profile_dir: String,
}

fn default_snapshot_file() -> String {
    "entities.json".to_string()
}

fn default_profile_dir() -> String {
    "profile_data".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: Option<String>,
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
    #[serde(default = "default_true")]
    pub sandbox: bool,
    #[serde(default = "default_true")]
    pub disable_gpu: bool,
    #[serde(default = "default_window_size")]
    pub window_size: [u32; 2],
    pub request_timeout_seconds: Option<u64>,
}

fn default_profile_name() -> String {
    "rosterwatch".to_string()
}

fn default_true() -> bool {
    true
}

fn default_window_size() -> [u32; 2] {
    [900, 600]
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    pub target_url: String,
    pub unauthenticated_marker: String,
    pub authenticated_marker: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    pub token_key_pattern: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl SessionSection {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    pub version: String,
    pub owner_id: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u64,
}

fn default_page_size() -> u32 {
    5000
}

fn default_api_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    pub enabled: bool,
    pub api_base: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub removed_header: String,
    pub added_header: String,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.telegram.org".to_string(),
            bot_token: None,
            chat_id: None,
            removed_header: "Removed entities:".to_string(),
            added_header: "Added entities:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    pub refresh_interval_seconds: u64,
    pub failure_retry_seconds: Option<u64>,
}

impl ScheduleSection {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    /// Delay after a failed cycle; falls back to the regular interval.
    pub fn failure_retry(&self) -> Duration {
        self.failure_retry_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.refresh_interval())
    }
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: 3600,
            failure_retry_seconds: None,
        }
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(ConfigError::Invalid(format!(
            "{field} must be http(s), got scheme {:?}",
            parsed.scheme()
        ))),
        Err(err) => Err(ConfigError::Invalid(format!("{field} is not a valid URL: {err}"))),
    }
}

pub fn load_watch_config<P: AsRef<Path>>(path: P) -> Result<WatchConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
