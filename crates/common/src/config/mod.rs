//! Configuration management for the Civica portal
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Flat-file store configuration
    pub store: StoreConfig,

    /// Upload store configuration
    pub uploads: UploadConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Mail dispatch configuration
    pub mail: MailConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Path of the main portal document (papers, profiles, access requests)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Path of the chat history document (messages, user snapshots)
    #[serde(default = "default_chat_path")]
    pub chat_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Upload backend: disk, remote
    #[serde(default = "default_upload_backend")]
    pub backend: String,

    /// Directory for the disk backend
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Externally visible base address. Resolved at request time so a
    /// deployment can move hosts without rewriting stored records.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Media host endpoint for the remote backend
    pub remote_endpoint: Option<String>,

    /// API key for the remote media host
    pub remote_api_key: Option<String>,

    /// Request timeout in seconds for remote uploads
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for remote uploads
    #[serde(default = "default_upload_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Admin login email
    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    /// SHA-256 hex digest of the admin login password
    pub admin_password_hash: Option<String>,

    /// Bootstrap credentials, disabled unless explicitly enabled
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Bootstrap credentials for test and first-run setups.
///
/// None of these are honored unless `enabled` is set. They exist so the
/// admin path can be exercised before a real credential store is populated,
/// and must stay off in production deployments.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Static bearer token accepted as admin proof
    pub bearer_token: Option<String>,

    /// Master PIN that bypasses the access-request scan
    pub master_pin: Option<String>,

    /// Fixed admin login password
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// Mail provider endpoint; dispatch is disabled when unset
    pub endpoint: Option<String>,

    /// API key for the mail provider
    pub api_key: Option<String>,

    /// Sender address
    #[serde(default = "default_mail_from")]
    pub from: String,

    /// Request timeout in seconds
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_upload_bytes() -> usize { 25 * 1024 * 1024 }
fn default_data_path() -> PathBuf { PathBuf::from("data/portal.json") }
fn default_chat_path() -> PathBuf { PathBuf::from("data/chat.json") }
fn default_upload_backend() -> String { "disk".to_string() }
fn default_upload_dir() -> PathBuf { PathBuf::from("data/uploads") }
fn default_public_base_url() -> String { "http://localhost:8080".to_string() }
fn default_upload_timeout() -> u64 { 30 }
fn default_upload_retries() -> u32 { 3 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_admin_email() -> String { "admin@civica.org".to_string() }
fn default_mail_from() -> String { "portal@civica.org".to_string() }
fn default_mail_timeout() -> u64 { 15 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "civica-portal".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            store: StoreConfig {
                data_path: default_data_path(),
                chat_path: default_chat_path(),
            },
            uploads: UploadConfig {
                backend: default_upload_backend(),
                dir: default_upload_dir(),
                public_base_url: default_public_base_url(),
                remote_endpoint: None,
                remote_api_key: None,
                timeout_secs: default_upload_timeout(),
                max_retries: default_upload_retries(),
            },
            auth: AuthConfig {
                jwt_secret: None,
                jwt_expiration_secs: default_jwt_expiration(),
                admin_email: default_admin_email(),
                admin_password_hash: None,
                bootstrap: BootstrapConfig::default(),
            },
            mail: MailConfig {
                endpoint: None,
                api_key: None,
                from: default_mail_from(),
                timeout_secs: default_mail_timeout(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.uploads.backend, "disk");
        assert_eq!(config.store.data_path, PathBuf::from("data/portal.json"));
    }

    #[test]
    fn test_bootstrap_disabled_by_default() {
        let config = AppConfig::default();
        assert!(!config.auth.bootstrap.enabled);
        assert!(config.auth.bootstrap.bearer_token.is_none());
        assert!(config.auth.bootstrap.master_pin.is_none());
    }

    #[test]
    fn test_mail_disabled_by_default() {
        let config = AppConfig::default();
        assert!(config.mail.endpoint.is_none());
    }
}
