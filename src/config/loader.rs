//! Configuration loader with environment variable support

use super::Config;
use crate::error::Result;
use config::{Environment, File, FileFormat};
use std::path::Path;

/// Prefix for environment overrides, e.g. `SITE_GUARD__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "SITE_GUARD";

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()))
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Load configuration from a TOML file with environment variable overrides.
///
/// A missing file is not an error; defaults plus environment apply.
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Parse configuration from TOML text
pub fn load_config_from_str(toml: &str) -> Result<Config> {
    let config = config::Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?;

    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment as DeployEnvironment;
    use crate::middleware::SniffPolicy;
    use secrecy::ExposeSecret;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
port = 9000

[security]
environment = "production"

[security.mutations]
require_csrf = false

[security.mutations.rate_limit]
max_requests = 5
window_ms = 1000

[[auth.tokens]]
subject = "editor"
token = "editor-token"

[uploads]
sniff_policy = "strict"
"#;

    #[test]
    fn test_load_from_str() {
        let config = load_config_from_str(SAMPLE).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.security.environment, DeployEnvironment::Production);
        assert_eq!(config.security.mutations.rate_limit.max_requests, 5);
        assert!(!config.security.mutations.require_csrf);
        assert!(config.security.uploads.require_csrf);
        assert_eq!(config.auth.tokens[0].token.expose_secret(), "editor-token");
        assert_eq!(config.uploads.sniff_policy, SniffPolicy::Strict);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.data_dir, std::path::PathBuf::from("data"));
    }

    #[test]
    fn test_missing_file_is_error_without_env_loader() {
        assert!(load_config("/nonexistent/site-guard.toml").is_err());
    }
}
