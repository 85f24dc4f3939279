//! Layered service configuration
//!
//! Defaults, then an optional file (TOML, YAML or JSON by extension), then
//! `WARDEN__*` environment variables. Nested keys use `__`, so
//! `WARDEN__TOKEN__ADDRESS=0.0.0.0:8002` overrides `token.address`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::secret::SecretServiceConfig;
use crate::token::{ReaderServiceConfig, TokenServiceConfig};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "WARDEN";

/// Configuration loading failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("unsupported configuration file format, use .toml, .yaml, .yml or .json")]
    UnsupportedFormat,

    /// Parsing or deserialization failure
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),
}

/// Complete configuration for every service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Key authority
    pub secret: SecretServiceConfig,
    /// Token issuer
    pub token: TokenServiceConfig,
    /// Relying token reader
    pub reader: ReaderServiceConfig,
}

impl WardenConfig {
    /// Load defaults, an optional file and `WARDEN__*` overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or of an unknown format, or
    /// if the merged configuration does not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// As [`WardenConfig::load`] with a custom environment prefix
    ///
    /// # Errors
    ///
    /// As [`WardenConfig::load`].
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }

            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml" | "yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(ConfigError::UnsupportedFormat),
            };

            let name = path.to_str().ok_or(ConfigError::UnsupportedFormat)?;
            builder = builder.add_source(File::new(name, format));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    use jsonwebtoken::Algorithm;
    use serial_test::serial;
    use warden_auth::{KeySource, KeyType};

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        let config = WardenConfig::load_with_prefix(None, "WARDEN_TEST_UNSET").unwrap();

        assert_eq!(config.secret.address, "localhost:8001");
        assert_eq!(config.token.address, "localhost:8002");
        assert_eq!(config.secret.keys.len(), 1);
        assert_eq!(config.token.issuer.max_ttl, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.token.secret.algorithm, Algorithm::RS256);

        let cache = &config.reader.cache;
        assert_eq!(config.reader.address, "localhost:8003");
        assert_eq!(cache.default_ttl, Duration::from_secs(24 * 60 * 60));
        assert_eq!(cache.max_size, 10);
        assert_eq!(cache.client.address, "localhost:8001");
        assert_eq!(cache.client.timeout, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_reader_section() {
        let file = write_config(
            "yaml",
            r#"
reader:
  cache:
    default_ttl: 300
    max_size: 2
    client:
      address: "authority.internal:8001"
  signup:
    allowed_issuers: ["auth.example"]
    audience_name: "enrol"
"#,
        );

        let config = WardenConfig::load_with_prefix(Some(file.path()), "WARDEN_TEST_UNSET").unwrap();
        let reader = &config.reader;

        assert_eq!(reader.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(reader.cache.max_size, 2);
        assert_eq!(reader.cache.client.address, "authority.internal:8001");
        assert_eq!(reader.cache.client.timeout, Duration::from_secs(10));
        assert_eq!(reader.signup.audience_name, "enrol");
        assert!(reader.signup.allowed_issuers.contains("auth.example"));
        assert_eq!(reader.user.audience_name, "user");
    }

    #[test]
    #[serial]
    fn test_toml_file() {
        let file = write_config(
            "toml",
            r#"
            [secret]
            address = "0.0.0.0:9001"

            [[secret.keys]]
            algorithm = "ES256"
            type = "generate"
            data = "EC"

            [token.issuer]
            issuer_name = "auth.example"
            max_ttl = 600
            "#,
        );

        let config = WardenConfig::load_with_prefix(Some(file.path()), "WARDEN_TEST_UNSET").unwrap();

        assert_eq!(config.secret.address, "0.0.0.0:9001");
        assert_eq!(config.secret.keys[0].algorithm, Algorithm::ES256);
        assert!(matches!(
            config.secret.keys[0].source,
            KeySource::Generate(KeyType::Ec)
        ));
        assert_eq!(config.token.issuer.issuer_name, "auth.example");
        assert_eq!(config.token.issuer.max_ttl, Duration::from_secs(600));
        assert_eq!(config.token.address, "localhost:8002");
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let file = write_config("json", r#"{ "token": { "address": "file:1" } }"#);

        // SAFETY: serialized with every other test touching the environment
        unsafe { std::env::set_var("WARDEN_TEST_ENV__TOKEN__ADDRESS", "env:2") };
        let config = WardenConfig::load_with_prefix(Some(file.path()), "WARDEN_TEST_ENV");
        // SAFETY: as above
        unsafe { std::env::remove_var("WARDEN_TEST_ENV__TOKEN__ADDRESS") };

        assert_eq!(config.unwrap().token.address, "env:2");
    }

    #[test]
    fn test_missing_and_unknown_files() {
        let missing = WardenConfig::load(Some(Path::new("/nonexistent/warden.toml")));
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));

        let file = write_config("ini", "");
        let unknown = WardenConfig::load(Some(file.path()));
        assert!(matches!(unknown, Err(ConfigError::UnsupportedFormat)));
    }
}
