//! Configuration management for the site guard

use crate::middleware::{CsrfConfig, ProtectOptions, SniffPolicy};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod loader;
pub mod validation;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub uploads: UploadSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Maximum JSON request body size in MB (0 = unlimited)
    #[serde(default = "default_max_body_size")]
    pub max_body_size_mb: usize,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Route protection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub csrf: CsrfConfig,

    /// Guard options for collection create/update/delete
    #[serde(default)]
    pub mutations: ProtectOptions,

    /// Guard options for the upload endpoint
    #[serde(default)]
    pub uploads: ProtectOptions,

    /// How often expired rate-limit windows are swept
    #[serde(default = "default_rate_limit_sweep")]
    pub rate_limit_sweep_secs: u64,
}

impl SecurityConfig {
    /// CSRF settings with `secure` forced on in production
    pub fn effective_csrf(&self) -> CsrfConfig {
        CsrfConfig {
            secure: self.csrf.secure || self.environment == Environment::Production,
            ..self.csrf.clone()
        }
    }

    pub fn rate_limit_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_secs)
    }
}

/// A configured API/session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub subject: String,

    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub token: Secret<String>,
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,

    /// Cookie carrying a session token
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    #[serde(default)]
    pub tokens: Vec<AuthToken>,
}

/// Read cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached collection reads
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_sweep")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Upload content checks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default)]
    pub sniff_policy: SniffPolicy,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json, compact or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_server_host() -> String { "0.0.0.0".to_string() }
fn default_server_port() -> u16 { 8080 }
fn default_max_body_size() -> usize { 1 }
fn default_rate_limit_sweep() -> u64 { 60 }
fn default_auth_enabled() -> bool { true }
fn default_session_cookie() -> String { "session".to_string() }
fn default_cache_ttl() -> u64 { 300 } // 5 minutes
fn default_cache_sweep() -> u64 { 60 }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_uploads_dir() -> PathBuf { PathBuf::from("public/uploads") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            max_body_size_mb: default_max_body_size(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            csrf: CsrfConfig::default(),
            mutations: ProtectOptions::default(),
            uploads: ProtectOptions::default(),
            rate_limit_sweep_secs: default_rate_limit_sweep(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            session_cookie: default_session_cookie(),
            tokens: Vec::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            sweep_interval_secs: default_cache_sweep(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            uploads_dir: default_uploads_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config_with_env(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }

    /// Create default configuration.
    ///
    /// Auth is enabled with no tokens, so one must be configured (or auth
    /// disabled) before this validates.
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            auth: AuthSettings::default(),
            cache: CacheConfig::default(),
            uploads: UploadSettings::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Custom serializer for Secret<String>
fn serialize_secret<S>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

/// Custom deserializer for Secret<String>
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(Secret::new(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_forces_secure_cookie() {
        let mut security = SecurityConfig::default();
        assert!(!security.effective_csrf().secure);

        security.environment = Environment::Production;
        let csrf = security.effective_csrf();
        assert!(csrf.secure);
        assert_eq!(csrf.cookie_name, "csrf-token");
    }

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.mutations.rate_limit.max_requests, 10);
        assert_eq!(config.security.mutations.rate_limit.window_ms, 60_000);
        assert!(config.security.mutations.require_csrf);
        assert_eq!(config.uploads.sniff_policy, SniffPolicy::Lenient);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_token_deserializes_into_secret() {
        let settings: AuthSettings = serde_json::from_str(
            r#"{"tokens": [{"subject": "editor", "token": "s3cret"}]}"#,
        )
        .unwrap();

        assert!(settings.enabled);
        assert_eq!(settings.tokens[0].subject, "editor");
        assert_eq!(settings.tokens[0].token.expose_secret(), "s3cret");
    }
}
