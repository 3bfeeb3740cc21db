use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for a ChainGraph session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChainGraphConfig {
    /// Loading and prefetch behaviour
    #[serde(default)]
    pub explorer: ExplorerConfig,

    /// Message bus timing
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Display settings persisted with a saved graph
    #[serde(default)]
    pub view: ViewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Neighbor prefetch bound; entities with a degree at or above this are not prefetched
    #[serde(default = "default_degree_threshold")]
    pub degree_threshold: u64,

    /// Keyspaces offered before stats arrive from the backend
    #[serde(default)]
    pub supported_keyspaces: Vec<String>,

    /// Maximum number of search hits requested per keyspace
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Search terms shorter than this are not sent to the backend
    #[serde(default = "default_search_min_length")]
    pub search_min_length: usize,

    /// Page size used when loading cluster addresses
    #[serde(default = "default_cluster_addresses_limit")]
    pub cluster_addresses_limit: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            degree_threshold: default_degree_threshold(),
            supported_keyspaces: Vec::new(),
            search_limit: default_search_limit(),
            search_min_length: default_search_min_length(),
            cluster_addresses_limit: default_cluster_addresses_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Idle time after the last graph mutation before a snapshot is taken
    #[serde(default = "default_snapshot_idle_ms")]
    pub snapshot_idle_ms: u64,

    /// Record dispatched messages for replay
    #[serde(default = "default_record_history")]
    pub record_history: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            snapshot_idle_ms: default_snapshot_idle_ms(),
            record_history: default_record_history(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    #[serde(default = "default_label")]
    pub cluster_label: String,
    #[serde(default = "default_label")]
    pub address_label: String,
    #[serde(default = "default_tx_label")]
    pub tx_label: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub locale: Option<String>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            cluster_label: default_label(),
            address_label: default_label(),
            tx_label: default_tx_label(),
            currency: default_currency(),
            locale: None,
        }
    }
}

fn default_degree_threshold() -> u64 {
    100
}
fn default_search_limit() -> usize {
    100
}
fn default_search_min_length() -> usize {
    2
}
fn default_cluster_addresses_limit() -> usize {
    100
}
fn default_snapshot_idle_ms() -> u64 {
    2000
}
fn default_record_history() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_label() -> String {
    "id".to_string()
}
fn default_tx_label() -> String {
    "noTransactions".to_string()
}
fn default_currency() -> String {
    "satoshi".to_string()
}

/// Configuration manager with defaults, file and environment layers
pub struct ConfigManager {
    config: ChainGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.chaingraph.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading ChainGraph configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: none, using defaults"),
        }
        info!(
            degree_threshold = config.explorer.degree_threshold,
            snapshot_idle_ms = config.bus.snapshot_idle_ms,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load from an explicit file, still honouring environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".chaingraph.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .chaingraph.env: {}", e);
                } else {
                    info!("Loaded .chaingraph.env from home directory");
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.chaingraph.toml
    /// 2. ~/.chaingraph/config.toml
    fn load_config_file() -> Result<(ChainGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".chaingraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".chaingraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((ChainGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<ChainGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: ChainGraphConfig) -> ChainGraphConfig {
        if let Ok(threshold) = std::env::var("CHAINGRAPH_DEGREE_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                config.explorer.degree_threshold = t;
            }
        }
        if let Ok(keyspaces) = std::env::var("CHAINGRAPH_SUPPORTED_KEYSPACES") {
            // Accepts a JSON array or a comma separated list
            config.explorer.supported_keyspaces = serde_json::from_str(&keyspaces)
                .unwrap_or_else(|_| {
                    keyspaces
                        .split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                });
        }
        if let Ok(limit) = std::env::var("CHAINGRAPH_SEARCH_LIMIT") {
            if let Ok(l) = limit.parse() {
                config.explorer.search_limit = l;
            }
        }
        if let Ok(idle) = std::env::var("CHAINGRAPH_SNAPSHOT_IDLE_MS") {
            if let Ok(ms) = idle.parse() {
                config.bus.snapshot_idle_ms = ms;
            }
        }

        if let Ok(level) = std::env::var("CHAINGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("CHAINGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    pub fn validate_config(config: &ChainGraphConfig) -> Result<(), ConfigError> {
        if config.explorer.degree_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "explorer.degree_threshold must be greater than zero".to_string(),
            ));
        }
        if config.explorer.search_limit == 0 {
            return Err(ConfigError::ValidationError(
                "explorer.search_limit must be greater than zero".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &ChainGraphConfig {
        &self.config
    }

    pub fn into_config(self) -> ChainGraphConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = ChainGraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
