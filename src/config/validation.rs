//! Configuration validation

use super::*;
use crate::error::{Result, SiteError};

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_security_config(&config.security)?;
    validate_auth_settings(&config.auth)?;
    validate_cache_config(&config.cache)?;
    validate_storage_config(&config.storage)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.host.is_empty() {
        return Err(SiteError::Config("Server host cannot be empty".to_string()));
    }

    if config.port == 0 {
        return Err(SiteError::Config("Server port must be greater than 0".to_string()));
    }

    if config.max_body_size_mb > 100 {
        return Err(SiteError::Config(
            "Max body size too large (max: 100 MB)".to_string()
        ));
    }

    Ok(())
}

fn validate_protect_options(name: &str, options: &ProtectOptions) -> Result<()> {
    if options.rate_limit.max_requests == 0 {
        return Err(SiteError::Config(format!(
            "{} rate limit max_requests must be greater than 0",
            name
        )));
    }

    if options.rate_limit.window_ms == 0 {
        return Err(SiteError::Config(format!(
            "{} rate limit window_ms must be greater than 0",
            name
        )));
    }

    Ok(())
}

fn validate_security_config(config: &SecurityConfig) -> Result<()> {
    validate_protect_options("Mutation", &config.mutations)?;
    validate_protect_options("Upload", &config.uploads)?;

    if config.csrf.cookie_name.is_empty() || config.csrf.header_name.is_empty() {
        return Err(SiteError::Config(
            "CSRF cookie and header names cannot be empty".to_string()
        ));
    }

    if config.csrf.max_age_secs == 0 {
        return Err(SiteError::Config(
            "CSRF cookie max age must be greater than 0".to_string()
        ));
    }

    if config.rate_limit_sweep_secs == 0 {
        return Err(SiteError::Config(
            "Rate limit sweep interval must be greater than 0".to_string()
        ));
    }

    Ok(())
}

fn validate_auth_settings(config: &AuthSettings) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    if config.tokens.is_empty() {
        return Err(SiteError::Config(
            "Authentication is enabled but no tokens are configured".to_string()
        ));
    }

    if let Some(token) = config
        .tokens
        .iter()
        .find(|t| t.subject.is_empty() || t.token.expose_secret().is_empty())
    {
        return Err(SiteError::Config(format!(
            "Auth token for subject '{}' has an empty subject or token",
            token.subject
        )));
    }

    if config.session_cookie.is_empty() {
        return Err(SiteError::Config("Session cookie name cannot be empty".to_string()));
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<()> {
    if config.ttl_secs == 0 {
        return Err(SiteError::Config("Cache TTL must be greater than 0".to_string()));
    }

    if config.sweep_interval_secs == 0 {
        return Err(SiteError::Config(
            "Cache sweep interval must be greater than 0".to_string()
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    if config.data_dir.as_os_str().is_empty() || config.uploads_dir.as_os_str().is_empty() {
        return Err(SiteError::Config(
            "Storage data_dir and uploads_dir cannot be empty".to_string()
        ));
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.to_lowercase().as_str()) {
        return Err(SiteError::Config(format!(
            "Invalid log level: {} (valid: {})",
            config.level,
            valid_levels.join(", ")
        )));
    }

    let valid_formats = ["json", "compact", "pretty"];
    if !valid_formats.contains(&config.format.as_str()) {
        return Err(SiteError::Config(format!(
            "Invalid log format: {} (valid: {})",
            config.format,
            valid_formats.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn valid_config() -> Config {
        let mut config = Config::default_config();
        config.auth.tokens.push(AuthToken {
            subject: "editor".to_string(),
            token: Secret::new("test_token".to_string()),
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_default_requires_token() {
        assert!(validate_config(&Config::default_config()).is_err());

        let mut config = Config::default_config();
        config.auth.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_rate_limit_window() {
        let mut config = valid_config();
        config.security.uploads.rate_limit.window_ms = 0;

        assert!(validate_security_config(&config.security).is_err());
    }

    #[test]
    fn test_zero_max_requests() {
        let mut config = valid_config();
        config.security.mutations.rate_limit.max_requests = 0;

        assert!(validate_security_config(&config.security).is_err());
    }

    #[test]
    fn test_empty_csrf_cookie_name() {
        let mut config = valid_config();
        config.security.csrf.cookie_name.clear();

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_server_port() {
        let mut config = valid_config();
        config.server.port = 0;

        assert!(validate_server_config(&config.server).is_err());
    }

    #[test]
    fn test_empty_token() {
        let mut config = valid_config();
        config.auth.tokens[0].token = Secret::new(String::new());

        assert!(validate_auth_settings(&config.auth).is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = valid_config();
        config.logging.format = "xml".to_string();

        assert!(validate_logging_config(&config.logging).is_err());
    }
}
