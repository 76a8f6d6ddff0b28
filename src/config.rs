use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

use crate::store::QueuePolicy;

/// Upper bound for any configured time window (30 days)
const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// Upper bound for `trades.max_retained`
const MAX_TRADES_RETAINED: usize = 100_000;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub trades: TradesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP port (default: 3000, or $PORT)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum pending + delivered commands per terminal
    pub max_len: usize,
    /// Seconds a delivered command waits for an ack before it is handed out again
    pub redelivery_timeout_secs: u64,
    /// Seconds after creation at which an unacknowledged command expires
    pub command_ttl_secs: u64,
    /// Seconds acknowledged/expired commands are kept before garbage collection
    pub settled_retention_secs: u64,
    /// Seconds an empty queue may sit untouched before it is dropped (0 keeps queues forever)
    pub idle_eviction_secs: u64,
    /// Upper bound on commands returned by one poll
    pub max_poll_batch: usize,
    /// Interval of the background expiry sweep (0 disables it)
    pub sweep_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_len: 100,
            redelivery_timeout_secs: 30,
            command_ttl_secs: 300,
            settled_retention_secs: 300,
            idle_eviction_secs: 3600,
            max_poll_batch: 50,
            sweep_interval_secs: 5,
        }
    }
}

impl QueueConfig {
    /// Build the queue policy applied to every terminal
    pub fn policy(&self) -> QueuePolicy {
        QueuePolicy {
            max_len: self.max_len,
            redelivery_timeout: window(self.redelivery_timeout_secs),
            ttl: window(self.command_ttl_secs),
            settled_retention: window(self.settled_retention_secs),
            idle_eviction: window(self.idle_eviction_secs),
        }
    }
}

fn window(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// A terminal counts as online if it reported within this many seconds
    pub online_window_secs: u64,
    /// Drop snapshots of terminals silent for this many seconds (0 keeps them).
    /// A dropped terminal's next report is accepted whatever its `observed_at`.
    pub retention_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            online_window_secs: 300,
            retention_secs: 0,
        }
    }
}

impl StatusConfig {
    pub fn online_window(&self) -> chrono::Duration {
        window(self.online_window_secs)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        (self.retention_secs > 0).then(|| window(self.retention_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradesConfig {
    /// Number of trade events kept in memory
    pub max_retained: usize,
}

impl Default for TradesConfig {
    fn default() -> Self {
        Self { max_retained: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rotated log files (console only when unset)
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        // Hosting platforms hand the port over as $PORT
        Self::load_with_port(config_dir.as_ref(), std::env::var("PORT").ok())
    }

    /// Layering: defaults, `default.toml`, `$MT5_BRIDGE_ENV` file, `port`, then
    /// `MT5_BRIDGE__*` variables. An unparsable `port` is ignored.
    fn load_with_port(config_dir: &Path, port: Option<String>) -> Result<Self, ConfigError> {
        let queue = QueueConfig::default();

        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("queue.max_len", queue.max_len as i64)?
            .set_default("queue.redelivery_timeout_secs", queue.redelivery_timeout_secs as i64)?
            .set_default("queue.command_ttl_secs", queue.command_ttl_secs as i64)?
            .set_default("queue.settled_retention_secs", queue.settled_retention_secs as i64)?
            .set_default("queue.idle_eviction_secs", queue.idle_eviction_secs as i64)?
            .set_default("queue.max_poll_batch", queue.max_poll_batch as i64)?
            .set_default("queue.sweep_interval_secs", queue.sweep_interval_secs as i64)?
            .set_default("status.online_window_secs", 300)?
            .set_default("status.retention_secs", 0)?
            .set_default("trades.max_retained", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("MT5_BRIDGE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            );

        if let Some(port) = port.and_then(|raw| raw.trim().parse::<u16>().ok()) {
            builder = builder.add_source(File::from_str(
                &format!("[server]\nport = {port}\n"),
                FileFormat::Toml,
            ));
        }

        // Override with environment variables (MT5_BRIDGE__SERVER__PORT, etc.)
        builder
            .add_source(
                Environment::with_prefix("MT5_BRIDGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.queue.max_len == 0 {
            errors.push("queue.max_len must be positive".to_string());
        }

        if self.queue.max_poll_batch == 0 {
            errors.push("queue.max_poll_batch must be positive".to_string());
        }

        if self.queue.redelivery_timeout_secs == 0 {
            errors.push("queue.redelivery_timeout_secs must be positive".to_string());
        }

        if self.queue.command_ttl_secs <= self.queue.redelivery_timeout_secs {
            errors.push(
                "queue.command_ttl_secs should be greater than queue.redelivery_timeout_secs"
                    .to_string(),
            );
        }

        for (name, value) in [
            ("queue.redelivery_timeout_secs", self.queue.redelivery_timeout_secs),
            ("queue.command_ttl_secs", self.queue.command_ttl_secs),
            ("queue.settled_retention_secs", self.queue.settled_retention_secs),
            ("queue.idle_eviction_secs", self.queue.idle_eviction_secs),
            ("status.online_window_secs", self.status.online_window_secs),
            ("status.retention_secs", self.status.retention_secs),
        ] {
            if value > MAX_WINDOW_SECS {
                errors.push(format!("{name} must not exceed {MAX_WINDOW_SECS}"));
            }
        }

        if self.trades.max_retained == 0 {
            errors.push("trades.max_retained must be positive".to_string());
        } else if self.trades.max_retained > MAX_TRADES_RETAINED {
            errors.push(format!(
                "trades.max_retained must not exceed {MAX_TRADES_RETAINED}"
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.queue.max_len, 100);
        assert_eq!(config.trades.max_retained, 100);
    }

    #[test]
    fn test_policy_windows() {
        let policy = QueueConfig::default().policy();
        assert_eq!(policy.redelivery_timeout, chrono::Duration::seconds(30));
        assert_eq!(policy.ttl, chrono::Duration::seconds(300));
        assert_eq!(policy.max_len, 100);
    }

    #[test]
    fn test_validate_rejects_ttl_below_redelivery() {
        let mut config = AppConfig::default();
        config.queue.command_ttl_secs = 10;
        config.queue.max_poll_batch = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("command_ttl_secs")));
        assert!(errors.iter().any(|e| e.contains("max_poll_batch")));
    }

    #[test]
    fn test_port_overrides_shipped_config() {
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");

        let config = AppConfig::load_with_port(&shipped, Some("4123".to_string())).unwrap();
        assert_eq!(config.server.port, 4123);

        let config = AppConfig::load_with_port(&shipped, None).unwrap();
        assert_eq!(config.server.port, 3000);

        let config = AppConfig::load_with_port(&shipped, Some("not-a-port".to_string())).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_port_outranks_file_port() {
        let dir = std::env::temp_dir().join(format!("mt5-bridge-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("default.toml"), "[server]\nport = 8081\n").unwrap();

        let from_file = AppConfig::load_with_port(&dir, None).unwrap();
        let from_env = AppConfig::load_with_port(&dir, Some(" 9090 ".to_string())).unwrap();
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(from_file.server.port, 8081);
        assert_eq!(from_env.server.port, 9090);
    }

    #[test]
    fn test_validate_caps_trade_retention() {
        let mut config = AppConfig::default();
        config.trades.max_retained = usize::MAX;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("trades.max_retained"));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/mt5-bridge-config").unwrap();
        assert_eq!(config.queue.redelivery_timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }
}
