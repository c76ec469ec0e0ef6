use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PatronConfig {
    pub service: ServiceConfig,
    pub http: HttpConfig,
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Service name reported by the info endpoint and in logs
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Optional documentation file served by the info endpoint
    #[serde(default)]
    pub docs_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HttpConfig {
    /// IP address to bind to
    #[serde(default = "default_http_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Time allowed for components to stop after cancellation
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: u64,

    /// Upper bound for a single component health check
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level used when no verbosity flag is given (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: pretty, compact or json
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

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

impl HttpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl RuntimeConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}

impl PatronConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("patron.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("http.ip", default_http_ip())?
            .set_default("http.port", default_http_port())?
            .set_default(
                "runtime.grace_period_seconds",
                default_grace_period_seconds(),
            )?
            .set_default(
                "runtime.health_check_timeout_ms",
                default_health_check_timeout_ms(),
            )?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Nested keys use a double underscore: PATRON_HTTP__PORT=9000
            .add_source(
                Environment::with_prefix("PATRON")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: PatronConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Service name must not be empty".to_string(),
            ));
        }

        if self.http.port == 0 {
            return Err(ConfigError::Message(
                "HTTP port must be greater than 0".to_string(),
            ));
        }

        if self.http.ip.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Message(format!(
                "HTTP ip '{}' is not a valid address",
                self.http.ip
            )));
        }

        if self.runtime.grace_period_seconds == 0 {
            return Err(ConfigError::Message(
                "Runtime grace_period_seconds must be greater than 0".to_string(),
            ));
        }

        if self.runtime.health_check_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Runtime health_check_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Message(format!(
                "Logging level '{}' must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::Message(format!(
                "Logging format '{}' must be one of: {}",
                self.logging.format,
                LOG_FORMATS.join(", ")
            )));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for PatronConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: default_service_name(),
                docs_path: None,
            },
            http: HttpConfig {
                ip: default_http_ip(),
                port: default_http_port(),
            },
            runtime: RuntimeConfig {
                grace_period_seconds: default_grace_period_seconds(),
                health_check_timeout_ms: default_health_check_timeout_ms(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

// Default value functions
fn default_service_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_http_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    50000
}

fn default_grace_period_seconds() -> u64 {
    5
}
fn default_health_check_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
