//! YAML configuration file support for facematch.
//!
//! One file configures the matcher policy, the record store and the service
//! timeouts. Every section is optional; missing values fall back to the same
//! defaults the library types use.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "field-office"
//!
//! matcher:
//!   threshold: 0.6
//!   expected_dimension: 128
//!
//! store:
//!   backend: "redb"
//!   path: "/var/lib/facematch/faces.redb"
//!   compression: "none"
//!   include_found: false
//!
//! service:
//!   store_timeout_ms: 5000
//! ```
//!
//! ## Environment overrides
//!
//! [`FaceMatchConfig::apply_env_overrides`] lets deployments tweak a few
//! values without editing the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `FACEMATCH_THRESHOLD` | `matcher.threshold` |
//! | `FACEMATCH_STORE_BACKEND` | `store.backend` |
//! | `FACEMATCH_STORE_PATH` | `store.path` |
//! | `FACEMATCH_STORE_TIMEOUT_MS` | `service.store_timeout_ms` |

use std::fs;
use std::path::Path;
use std::time::Duration;

use matcher::{DEFAULT_THRESHOLD, MatcherConfig, ServiceConfig};
use serde::{Deserialize, Serialize};
use store::{BackendConfig, CompressionCodec, CompressionConfig, StoreConfig};
use thiserror::Error;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "FACEMATCH_";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },
}

/// Top-level YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FaceMatchConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub matcher: MatcherYamlConfig,

    #[serde(default)]
    pub store: StoreYamlConfig,

    #[serde(default)]
    pub service: ServiceYamlConfig,
}

impl FaceMatchConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: FaceMatchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.matcher.validate()?;
        self.store.validate()?;
        self.service.validate()?;
        Ok(())
    }

    /// Apply `FACEMATCH_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigLoadError> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `FACEMATCH_*` overrides from `vars`, then re-validate. Unrelated
    /// keys are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigLoadError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let invalid = || ConfigLoadError::InvalidOverride {
                key: key.to_string(),
                value: value.to_string(),
            };
            match name {
                "THRESHOLD" => self.matcher.threshold = value.parse().map_err(|_| invalid())?,
                "STORE_BACKEND" => self.store.backend = value.to_string(),
                "STORE_PATH" => self.store.path = Some(value.to_string()),
                "STORE_TIMEOUT_MS" => {
                    self.service.store_timeout_ms = value.parse().map_err(|_| invalid())?
                }
                _ => {}
            }
        }
        self.validate()
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        self.matcher.to_matcher_config()
    }

    pub fn store_config(&self) -> StoreConfig {
        self.store.to_store_config()
    }

    pub fn service_config(&self) -> ServiceConfig {
        self.service.to_service_config()
    }
}

impl Default for FaceMatchConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            matcher: MatcherYamlConfig::default(),
            store: StoreYamlConfig::default(),
            service: ServiceYamlConfig::default(),
        }
    }
}

/// Matcher YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatcherYamlConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default)]
    pub expected_dimension: Option<usize>,
}

impl MatcherYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        self.to_matcher_config()
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("matcher: {e}")))
    }

    pub fn to_matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            threshold: self.threshold,
            expected_dimension: self.expected_dimension,
            ..MatcherConfig::default()
        }
    }
}

impl Default for MatcherYamlConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            expected_dimension: None,
        }
    }
}

/// Record store YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file, required for `redb`.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    #[serde(default)]
    pub include_found: bool,
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "store.backend must be one of: {valid_backends:?}"
            )));
        }

        if self.backend == "redb" && self.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
            return Err(ConfigLoadError::Validation(
                "store.path is required when backend is 'redb'".to_string(),
            ));
        }

        let valid_codecs = ["none", "zstd"];
        if !valid_codecs.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "store.compression must be one of: {valid_codecs:?}"
            )));
        }

        if self.compression == "zstd" && !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(
                "store.compression_level must be between 1 and 22".to_string(),
            ));
        }

        Ok(())
    }

    pub fn to_store_config(&self) -> StoreConfig {
        let backend = match (self.backend.as_str(), self.path.as_deref()) {
            ("redb", Some(path)) => BackendConfig::redb(path),
            _ => BackendConfig::in_memory(),
        };
        let codec = match self.compression.as_str() {
            "zstd" => CompressionCodec::Zstd,
            _ => CompressionCodec::None,
        };
        StoreConfig::new()
            .with_backend(backend)
            .with_compression(CompressionConfig::new(codec, self.compression_level))
            .with_include_found(self.include_found)
    }
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            compression: default_compression(),
            compression_level: default_compression_level(),
            include_found: false,
        }
    }
}

/// Service YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceYamlConfig {
    /// Applied separately to the snapshot read and to the status write.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl ServiceYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.store_timeout_ms == 0 {
            return Err(ConfigLoadError::Validation(
                "service.store_timeout_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig::default().with_store_timeout(Duration::from_millis(self.store_timeout_ms))
    }
}

impl Default for ServiceYamlConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}
fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_compression() -> String {
    "none".to_string()
}
fn default_compression_level() -> i32 {
    3
}
fn default_store_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "test config"
matcher:
  threshold: 0.5
  expected_dimension: 128
"#;

        let config = FaceMatchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("test config"));
        assert_eq!(config.matcher.threshold, 0.5);
        assert_eq!(config.matcher_config().expected_dimension, Some(128));
        assert_eq!(config.store.backend, "in_memory");
        assert_eq!(config.service.store_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_from_file() {
        let yaml = r#"
version: "1"
store:
  backend: "redb"
  path: "/tmp/faces.redb"
  compression: "zstd"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = FaceMatchConfig::from_file(temp_file.path()).unwrap();
        let store = config.store_config();
        assert_eq!(store.backend, BackendConfig::redb("/tmp/faces.redb"));
        assert_eq!(store.compression.codec, CompressionCodec::Zstd);
    }

    #[test]
    fn test_default_config() {
        let config = FaceMatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.matcher_config(), MatcherConfig::default());
        assert_eq!(config.store_config(), StoreConfig::default());
        assert_eq!(config.service_config(), ServiceConfig::default());
    }

    #[test]
    fn test_unsupported_version() {
        let err = FaceMatchConfig::from_yaml("version: \"2.0\"\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(v) if v == "2.0"));
    }

    #[test]
    fn test_redb_requires_path() {
        let yaml = r#"
version: "1.0"
store:
  backend: "redb"
"#;
        let err = FaceMatchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("store.path"));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let yaml = r#"
version: "1.0"
matcher:
  threshold: -0.2
"#;
        let err = FaceMatchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = r#"
version: "1.0"
store:
  backend: "rocksdb"
"#;
        let err = FaceMatchConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("store.backend"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FaceMatchConfig::default();
        config
            .apply_overrides([
                ("FACEMATCH_THRESHOLD", "0.45"),
                ("FACEMATCH_STORE_TIMEOUT_MS", "250"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();
        assert_eq!(config.matcher.threshold, 0.45);
        assert_eq!(
            config.service_config().store_timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = FaceMatchConfig::default();
        let err = config
            .apply_overrides([("FACEMATCH_THRESHOLD", "close")])
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::InvalidOverride { .. }));

        let err = config
            .apply_overrides([("FACEMATCH_STORE_BACKEND", "redb")])
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::Validation(_)));
    }
}
