use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::query::progress::ProgressDisplay;
use crate::shared::output::OutputFormat;

pub const DEFAULT_CONFIG_FILE: &str = "flowdist.toml";
pub const CONFIG_PATH_ENV: &str = "FLOWDIST_CONFIG";
pub const ENV_PREFIX: &str = "FLOWDIST";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub query: QueryConfig,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub stdout_level: String,
    pub file_level: String,
    /// Daily rolling log files are written here when set.
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout_level: "warn".to_string(),
            file_level: "debug".to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Upper bound on scanning threads per worker; unset means all cores.
    pub max_threads: Option<usize>,
    pub progress: ProgressDisplay,
    pub output_format: OutputFormat,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_threads: None,
            progress: ProgressDisplay::None,
            output_format: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub listen_addr: String,
    pub connect_retries: u32,
    pub connect_backoff_ms: u64,
}

impl ClusterConfig {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7474".to_string(),
            connect_retries: 40,
            connect_backoff_ms: 250,
        }
    }
}

/// Defaults, then the optional config file, then `FLOWDIST__SECTION__KEY`
/// environment overrides.
pub fn load_settings() -> Result<Settings, config::ConfigError> {
    let config_path =
        env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    load_settings_from(&config_path)
}

pub fn load_settings_from(config_path: &str) -> Result<Settings, config::ConfigError> {
    let logging = LoggingConfig::default();
    let cluster = ClusterConfig::default();

    let settings: Settings = config::Config::builder()
        .set_default("logging.stdout_level", logging.stdout_level)?
        .set_default("logging.file_level", logging.file_level)?
        .set_default("query.progress", "none")?
        .set_default("query.output_format", "text")?
        .set_default("cluster.listen_addr", cluster.listen_addr)?
        .set_default("cluster.connect_retries", cluster.connect_retries as i64)?
        .set_default("cluster.connect_backoff_ms", cluster.connect_backoff_ms as i64)?
        .add_source(config::File::with_name(config_path).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;

    Ok(settings)
}
