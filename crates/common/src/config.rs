//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Work queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Notification fan-out configuration.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Export job configuration.
    #[serde(default)]
    pub export: ExportConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served under `/public` and written to by export jobs.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Work queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Name of the durable work queue.
    #[serde(default = "default_queue_name")]
    pub name: String,
    /// Number of consumers to run in this process. Zero disables consumption.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Prefix of this process's consumer ids. Consumer `i` is `{consumer_name}-{i}`
    /// and owns the in-flight list `{name}:processing:{consumer_name}-{i}`, so
    /// processes sharing a queue need distinct names.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    /// Redeliveries allowed before a message is dead-lettered.
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
    /// How long a consumer blocks waiting for a delivery before re-checking for shutdown.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

/// Notification fan-out configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Pub/Sub channel carrying job outcomes.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Outbound queue capacity per websocket connection.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

/// Export job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Number of data rows written per export.
    #[serde(default = "default_export_rows")]
    pub rows: u32,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_public_dir() -> String {
    "public".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_queue_name() -> String {
    "file_processing".to_string()
}

const fn default_workers() -> usize {
    1
}

fn default_consumer_name() -> String {
    "jobcast".to_string()
}

const fn default_max_redeliveries() -> u32 {
    5
}

const fn default_poll_timeout_secs() -> u64 {
    5
}

fn default_channel() -> String {
    "file_download".to_string()
}

const fn default_connection_buffer() -> usize {
    64
}

const fn default_export_rows() -> u32 {
    100_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_dir: default_public_dir(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            workers: default_workers(),
            consumer_name: default_consumer_name(),
            max_redeliveries: default_max_redeliveries(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl QueueConfig {
    /// Blocking dequeue timeout. Zero is raised to one second; Redis reads a
    /// zero timeout as "block forever".
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        let secs = if self.poll_timeout_secs == 0 {
            1
        } else {
            self.poll_timeout_secs
        };
        Duration::from_secs(secs)
    }

    /// Consumer id of worker `index`.
    #[must_use]
    pub fn consumer_id(&self, index: usize) -> String {
        format!("{}-{index}", self.consumer_name)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            connection_buffer: default_connection_buffer(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            rows: default_export_rows(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `JOBCAST_ENV`)
    /// 4. Environment variables with `JOBCAST_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("JOBCAST_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("JOBCAST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("JOBCAST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_wire_names() {
        let config = Config::default();

        assert_eq!(config.queue.name, "file_processing");
        assert_eq!(config.notifications.channel, "file_download");
        assert_eq!(config.queue.workers, 1);
        assert_eq!(config.queue.consumer_id(0), "jobcast-0");
        assert_eq!(config.queue.max_redeliveries, 5);
        assert_eq!(config.queue.poll_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_zero_poll_timeout_is_clamped() {
        let queue = QueueConfig {
            poll_timeout_secs: 0,
            ..QueueConfig::default()
        };

        assert_eq!(queue.poll_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_file_fills_missing_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9090\n\n[queue]\nworkers = 4\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.queue.workers, 4);
        assert_eq!(config.queue.name, "file_processing");
        assert_eq!(config.notifications.connection_buffer, 64);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
