use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub player: PlayerConfig,

    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Where episodes are written; guessed from newsboat when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Override for the newsboat config used to guess the download dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newsboat_config: Option<PathBuf>,

    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// 0 disables the periodic stats report
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments that idle the engine; the IPC flag is appended separately
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    #[serde(default = "default_ipc_path")]
    pub ipc_path: PathBuf,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_backoff")]
    pub connect_backoff_ms: u64,

    #[serde(default = "default_connect_backoff_max")]
    pub connect_backoff_max_ms: u64,

    /// Scheduler tick
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        info!("Config loaded successfully");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.progress_interval_ms == 0 {
            return Err(anyhow::anyhow!("progress_interval_ms must be greater than 0"));
        }

        if self.player.tick_ms == 0 {
            return Err(anyhow::anyhow!("tick_ms must be greater than 0"));
        }

        if self.player.connect_attempts == 0 {
            return Err(anyhow::anyhow!("connect_attempts must be greater than 0"));
        }

        if self.player.program.trim().is_empty() {
            return Err(anyhow::anyhow!("player program must not be empty"));
        }

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("podqueue").join("config.toml"))
    }
}

impl CacheConfig {
    /// Resolve the download directory, falling back to newsboat's setting
    /// and then to the home directory
    pub fn download_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.download_dir {
            return Ok(dir.clone());
        }

        let newsboat = match self.newsboat_config {
            Some(ref path) => Some(path.clone()),
            None => dirs::config_dir().map(|d| d.join("newsboat").join("config")),
        };

        if let Some(path) = newsboat {
            match fs::read_to_string(&path) {
                Ok(contents) => {
                    if let Some(dir) = parse_newsboat_download_path(&contents) {
                        debug!("Using newsboat download-path {:?}", dir);
                        return Ok(dir);
                    }
                }
                Err(e) => debug!("No newsboat config at {:?}: {}", path, e),
            }
        }

        dirs::home_dir().context("Failed to get home directory")
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl PlayerConfig {
    /// Full argument list handed to the engine, including the IPC endpoint
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(format!("--input-ipc-server={}", self.ipc_path.display()));
        args
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Backoff before the given (zero-based) connect retry
    pub fn connect_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        let ms = self
            .connect_backoff_ms
            .saturating_mul(factor)
            .min(self.connect_backoff_max_ms);
        Duration::from_millis(ms)
    }
}

impl QueueConfig {
    pub fn queue_file(&self) -> Option<PathBuf> {
        if let Some(ref file) = self.file {
            return Some(file.clone());
        }

        let legacy = dirs::home_dir().map(|h| h.join(".newsboat").join("queue"));
        match legacy {
            Some(path) if path.exists() => Some(path),
            _ => dirs::config_dir().map(|d| d.join("newsboat").join("queue")),
        }
    }
}

/// Extract `download-path` from newsboat's config, expanding `~`
fn parse_newsboat_download_path(contents: &str) -> Option<PathBuf> {
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("download-path") {
            continue;
        }

        let Some(raw) = fields.next() else {
            warn!("Ignoring download-path line without a value");
            continue;
        };
        let raw = raw.trim_matches('"');

        if let Some(rest) = raw.strip_prefix("~/") {
            return dirs::home_dir().map(|h| h.join(rest));
        }
        return Some(PathBuf::from(raw));
    }
    None
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            newsboat_config: None,
            progress_interval_ms: default_progress_interval(),
            stats_interval_secs: default_stats_interval(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            ipc_path: default_ipc_path(),
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff(),
            connect_backoff_max_ms: default_connect_backoff_max(),
            tick_ms: default_tick(),
        }
    }
}

// Default value functions
fn default_progress_interval() -> u64 { 1000 }
fn default_stats_interval() -> u64 { 30 }
fn default_user_agent() -> String { format!("podqueue/{}", env!("CARGO_PKG_VERSION")) }
fn default_program() -> String { "mpv".to_string() }
fn default_args() -> Vec<String> { vec!["--no-video".to_string(), "--idle".to_string()] }
fn default_ipc_path() -> PathBuf { PathBuf::from("/tmp/podqueue-mpv") }
fn default_connect_attempts() -> u32 { 40 }
fn default_connect_backoff() -> u64 { 50 }
fn default_connect_backoff_max() -> u64 { 1000 }
fn default_tick() -> u64 { 200 }
