//! Bootstrap configuration
//!
//! Configuration is read once at startup from a TOML file. Every section is
//! optional and falls back to built-in defaults, so a missing or partial file
//! never prevents startup. Credentials may be supplied through environment
//! variables, which take priority over the file.
//!
//! # Config file resolution
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`REPCHECK_CONFIG`)
//! 3. `./repcheck.toml` in the working directory
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "REPCHECK_CONFIG";

/// Config file looked up in the working directory when nothing else is given
pub const DEFAULT_CONFIG_FILE: &str = "repcheck.toml";

/// Complete bootstrap configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub validator: ValidatorConfig,
    pub http: HttpConfig,
    pub feeds: FeedsConfig,
    pub telegram: TelegramConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins if set
    pub level: String,

    /// Optional log file, appended to in addition to stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Location of the history database and CSV exports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root_folder: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured folder, else `<data_local_dir>/repcheck`, else `./results`
    pub fn resolve_root_folder(&self) -> PathBuf {
        if let Some(folder) = &self.root_folder {
            return folder.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("repcheck"))
            .unwrap_or_else(|| PathBuf::from("results"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve_root_folder().join("history.db")
    }
}

/// Score cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
    Disabled,
}

/// Upper bound on `cache.ttl_seconds` (ten years)
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Score cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    /// Lifetime of a cached score
    pub ttl_seconds: u64,
    /// Connection attempts at startup before running uncached
    pub connect_attempts: u32,
    pub connect_retry_delay_ms: u64,
    /// Upper bound on any single cache round trip
    pub operation_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_url: "redis://redis:6379/0".to_string(),
            ttl_seconds: 86_400,
            connect_attempts: 5,
            connect_retry_delay_ms: 2_000,
            operation_timeout_ms: 5_000,
        }
    }
}

impl CacheConfig {
    /// Reject lifetimes no backend can store
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 || self.ttl_seconds > MAX_CACHE_TTL_SECS {
            return Err(Error::Config(format!(
                "cache.ttl_seconds must be between 1 and {}, got {}",
                MAX_CACHE_TTL_SECS, self.ttl_seconds
            )));
        }
        Ok(())
    }
}

/// Batch validator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Worker pool size; defaults to `2 × CPU count + 1`
    pub workers: Option<usize>,
}

impl ValidatorConfig {
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => default_worker_count(),
        }
    }
}

/// Pool size for I/O-bound network fan-out
pub fn default_worker_count() -> usize {
    2 * num_cpus::get() + 1
}

/// Outbound HTTP retry policy shared by all feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1_000,
        }
    }
}

/// Per-feed settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub otx: OtxConfig,
    pub misp: MispConfig,
    pub kaspersky: KasperskyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtxConfig {
    pub api_key: String,
    /// `{address}` is replaced with the address being looked up
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Pulse count above which the finding is strong
    pub strong_threshold: u64,
}

impl Default for OtxConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://otx.alienvault.com/api/v1/indicators/IPv4/{address}/general"
                .to_string(),
            timeout_secs: 10,
            strong_threshold: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MispConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    /// MISP appliances commonly run with self-signed certificates
    pub verify_tls: bool,
}

impl Default for MispConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://misp.local/attributes/restSearch".to_string(),
            timeout_secs: 10,
            verify_tls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KasperskyConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for KasperskyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://opentip.kaspersky.com/api/v1/search/ip?request={address}"
                .to_string(),
            timeout_secs: 30,
        }
    }
}

/// Telegram bot used to deliver CSV exports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

/// Pick the config file to read, following the resolution order above
///
/// Returns `None` when no file was named and the working-directory default
/// does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

/// Parse a config file
///
/// A missing file yields defaults with a warning; an unreadable or
/// malformed file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.cache.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve, read and apply environment overrides in one step
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) => load_toml_config(&path)?,
        None => TomlConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Overlay credentials and endpoints from the environment
///
/// Blank values are ignored so an exported-but-empty variable does not wipe
/// a key from the file.
pub fn apply_env_overrides(config: &mut TomlConfig) {
    fn env_value(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    if let Some(key) = env_value("REPCHECK_OTX_API_KEY") {
        config.feeds.otx.api_key = key;
    }
    if let Some(key) = env_value("REPCHECK_MISP_API_KEY") {
        config.feeds.misp.api_key = key;
    }
    if let Some(url) = env_value("REPCHECK_MISP_ENDPOINT") {
        config.feeds.misp.endpoint = url;
    }
    if let Some(key) = env_value("REPCHECK_KASPERSKY_API_KEY") {
        config.feeds.kaspersky.api_key = key;
    }
    if let Some(url) = env_value("REPCHECK_REDIS_URL") {
        config.cache.redis_url = url;
    }
    if let Some(token) = env_value("REPCHECK_TELEGRAM_TOKEN") {
        config.telegram.token = Some(token);
    }
    if let Some(chat_id) = env_value("REPCHECK_TELEGRAM_CHAT_ID") {
        config.telegram.chat_id = Some(chat_id);
    }
}
