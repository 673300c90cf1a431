//! Configuration for the extraction dispatcher.
//!
//! Loaded from a TOML file (`abex.toml`). Defaults match the behavior of the
//! reference deployment: three strikes disable a credential for five
//! minutes, a two-second courtesy delay precedes every call, and each
//! (endpoint, model) configuration gets three attempts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AbexError, Result};

/// One (endpoint, model) pair in the fallback catalog.
///
/// The catalog is ordered: earlier entries are preferred and later entries
/// are only tried once the earlier ones exhaust their attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    /// Chat-completions URL, e.g. `https://api.example.com/v1/chat/completions`.
    pub endpoint: String,
    /// Model identifier sent in the request body.
    pub model: String,
}

impl std::fmt::Display for ModelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.model, self.endpoint)
    }
}

/// Credential pool tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Consecutive failures before a credential is temporarily disabled.
    pub max_failure_count: u32,
    /// How long a disabled credential stays out of rotation, in seconds.
    pub disable_duration_secs: u64,
    /// When false, the pool always serves the first credential.
    pub rotation_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_failure_count: 3,
            disable_duration_secs: 300,
            rotation_enabled: true,
        }
    }
}

impl PoolConfig {
    /// Disable window as a [`Duration`].
    #[must_use]
    pub const fn disable_duration(&self) -> Duration {
        Duration::from_secs(self.disable_duration_secs)
    }
}

/// Retry/fallback orchestration tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Fixed courtesy delay before every outbound call, in milliseconds.
    pub request_delay_ms: u64,
    /// Attempts per (endpoint, model) configuration.
    pub max_retries_per_config: u32,
    /// Hard ceiling on attempts across all configurations.
    pub max_total_attempts: u32,
    /// Base for the 429 exponential backoff, in milliseconds.
    pub base_backoff_ms: u64,
    /// Ceiling for a single backoff sleep, in milliseconds.
    pub max_backoff_ms: u64,
    /// Per-call HTTP timeout, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 2000,
            max_retries_per_config: 3,
            max_total_attempts: 9,
            base_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            call_timeout_secs: 20,
        }
    }
}

impl DispatchConfig {
    /// Courtesy delay as a [`Duration`].
    #[must_use]
    pub const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Per-call timeout as a [`Duration`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Top-level configuration: credentials, catalog, and tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// API credentials, in rotation order. Never logged.
    pub api_keys: Vec<String>,
    /// Ordered fallback catalog, most-preferred first.
    pub catalog: Vec<ModelEndpoint>,
    /// Credential pool tuning.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Retry/fallback tuning.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl ExtractorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`AbexError::ConfigNotFound`] if the file is missing,
    /// [`AbexError::ConfigParse`] on malformed TOML, or a validation error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|_| AbexError::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| AbexError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`~/.config/abex/abex.toml` on Linux).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "abex")
            .map(|dirs| dirs.config_dir().join("abex.toml"))
    }

    /// Validate invariants that TOML parsing cannot express.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.api_keys.is_empty() {
            return Err(AbexError::NoCredentials);
        }
        if self.api_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(AbexError::ConfigInvalid {
                key: "api_keys".to_string(),
                message: "credentials must be non-empty".to_string(),
            });
        }
        if self.catalog.is_empty() {
            return Err(AbexError::EmptyCatalog);
        }
        for entry in &self.catalog {
            if !entry.endpoint.starts_with("http") {
                return Err(AbexError::ConfigInvalid {
                    key: "catalog.endpoint".to_string(),
                    message: format!("not an HTTP URL: {}", entry.endpoint),
                });
            }
        }
        if self.dispatch.max_retries_per_config == 0 {
            return Err(AbexError::ConfigInvalid {
                key: "dispatch.max_retries_per_config".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.dispatch.max_total_attempts == 0 {
            return Err(AbexError::ConfigInvalid {
                key: "dispatch.max_total_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.pool.max_failure_count == 0 {
            return Err(AbexError::ConfigInvalid {
                key: "pool.max_failure_count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            api_keys = ["sk-test-one", "sk-test-two"]

            [[catalog]]
            endpoint = "https://api.example.com/v1/chat/completions"
            model = "gpt-4o-mini"

            [[catalog]]
            endpoint = "https://api.other.example/v1/chat/completions"
            model = "deepseek-chat"
        "#
    }

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.validate().expect("valid");

        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.catalog.len(), 2);
        assert_eq!(config.pool.max_failure_count, 3);
        assert_eq!(config.pool.disable_duration(), Duration::from_secs(300));
        assert_eq!(config.dispatch.request_delay(), Duration::from_millis(2000));
        assert_eq!(config.dispatch.max_retries_per_config, 3);
        assert_eq!(config.dispatch.call_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn parse_overridden_tuning() {
        let toml_str = format!(
            "{}\n[pool]\nmax_failure_count = 2\ndisable_duration_secs = 5\n\n\
             [dispatch]\nrequest_delay_ms = 10\nmax_total_attempts = 4\n",
            minimal_toml()
        );
        let config: ExtractorConfig = toml::from_str(&toml_str).expect("parse");

        assert_eq!(config.pool.max_failure_count, 2);
        assert_eq!(config.pool.disable_duration(), Duration::from_secs(5));
        assert_eq!(config.dispatch.request_delay_ms, 10);
        assert_eq!(config.dispatch.max_total_attempts, 4);
        // Unspecified keys keep their defaults
        assert_eq!(config.dispatch.max_retries_per_config, 3);
    }

    #[test]
    fn validate_rejects_empty_keys() {
        let mut config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.api_keys.clear();
        assert!(matches!(config.validate(), Err(AbexError::NoCredentials)));

        let mut config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.api_keys = vec![String::new()];
        assert!(matches!(
            config.validate(),
            Err(AbexError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_catalog() {
        let mut config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.catalog.clear();
        assert!(matches!(config.validate(), Err(AbexError::EmptyCatalog)));
    }

    #[test]
    fn validate_rejects_non_http_endpoint() {
        let mut config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.catalog[0].endpoint = "ftp://api.example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AbexError::ConfigInvalid { .. }));
    }

    #[test]
    fn validate_rejects_zero_budgets() {
        let mut config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.dispatch.max_retries_per_config = 0;
        assert!(config.validate().is_err());

        let mut config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.dispatch.max_total_attempts = 0;
        assert!(config.validate().is_err());

        let mut config: ExtractorConfig = toml::from_str(minimal_toml()).expect("parse");
        config.pool.max_failure_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = ExtractorConfig::load(Path::new("/nonexistent/abex.toml")).unwrap_err();
        match err {
            AbexError::ConfigNotFound { path } => assert!(path.contains("abex.toml")),
            other => panic!("expected ConfigNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn load_from_tempfile_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("abex.toml");
        std::fs::write(&path, minimal_toml()).expect("write");

        let config = ExtractorConfig::load(&path).expect("load");
        assert_eq!(config.catalog[0].model, "gpt-4o-mini");
        assert_eq!(config.catalog[1].model, "deepseek-chat");
    }

    #[test]
    fn model_endpoint_display() {
        let entry = ModelEndpoint {
            endpoint: "https://api.example.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        assert_eq!(
            entry.to_string(),
            "gpt-4o-mini @ https://api.example.com/v1/chat/completions"
        );
    }
}
