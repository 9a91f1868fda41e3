//! Verifier configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Environment;

/// Configuration of a [`SignedDataVerifier`](crate::SignedDataVerifier).
///
/// Trust roots are not part of the config; they are passed as DER bytes at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Bundle id every payload must carry.
    pub bundle_id: String,

    /// Environment every payload must carry.
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// App Apple id. Required when `environment` is Production.
    #[serde(default)]
    pub app_apple_id: Option<i64>,

    /// Check certificate revocation over OCSP and validate against the
    /// current time.
    #[serde(default)]
    pub enable_online_checks: bool,

    /// Maximum number of verified chains kept in memory.
    #[serde(default = "default_cache_max_size")]
    pub certificate_cache_max_size: usize,

    /// Lifetime of a verified chain in the cache, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub certificate_cache_ttl_secs: u64,

    /// Per-request OCSP timeout in seconds.
    #[serde(default = "default_ocsp_timeout")]
    pub ocsp_timeout_secs: u64,
}

fn default_environment() -> Environment {
    Environment::Production
}

fn default_cache_max_size() -> usize {
    crate::cache::DEFAULT_CERTIFICATE_CACHE_MAX_SIZE
}

fn default_cache_ttl() -> u64 {
    crate::cache::DEFAULT_CERTIFICATE_CACHE_TTL.as_secs()
}

fn default_ocsp_timeout() -> u64 {
    30
}

impl VerifierConfig {
    /// Create a config with default cache and OCSP settings.
    pub fn new(bundle_id: impl Into<String>, environment: Environment) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            environment,
            app_apple_id: None,
            enable_online_checks: false,
            certificate_cache_max_size: default_cache_max_size(),
            certificate_cache_ttl_secs: default_cache_ttl(),
            ocsp_timeout_secs: default_ocsp_timeout(),
        }
    }

    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `APPSTORE_BUNDLE_ID` | Expected bundle id (required) |
    /// | `APPSTORE_ENVIRONMENT` | `Production`, `Sandbox`, `Xcode` or `LocalTesting` (default: Production) |
    /// | `APPSTORE_APP_APPLE_ID` | App Apple id (required for Production) |
    /// | `APPSTORE_ENABLE_ONLINE_CHECKS` | Enable OCSP checks |
    /// | `APPSTORE_CERT_CACHE_MAX_SIZE` | Certificate cache capacity (default: 32) |
    /// | `APPSTORE_CERT_CACHE_TTL` | Certificate cache TTL in seconds (default: 900) |
    /// | `APPSTORE_OCSP_TIMEOUT` | OCSP timeout in seconds (default: 30) |
    pub fn from_env() -> Result<Self, ConfigError> {
        let bundle_id =
            std::env::var("APPSTORE_BUNDLE_ID").map_err(|_| ConfigError::InvalidValue {
                key: "APPSTORE_BUNDLE_ID".to_string(),
                message: "not set".to_string(),
            })?;

        let environment = match std::env::var("APPSTORE_ENVIRONMENT") {
            Ok(v) => v.parse().map_err(|message| ConfigError::InvalidValue {
                key: "APPSTORE_ENVIRONMENT".to_string(),
                message,
            })?,
            Err(_) => default_environment(),
        };

        let app_apple_id = match std::env::var("APPSTORE_APP_APPLE_ID") {
            Ok(v) => Some(v.parse().map_err(|e| ConfigError::InvalidValue {
                key: "APPSTORE_APP_APPLE_ID".to_string(),
                message: format!("{e}"),
            })?),
            Err(_) => None,
        };

        Ok(Self {
            bundle_id,
            environment,
            app_apple_id,
            enable_online_checks: std::env::var("APPSTORE_ENABLE_ONLINE_CHECKS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            certificate_cache_max_size: env_number(
                "APPSTORE_CERT_CACHE_MAX_SIZE",
                default_cache_max_size,
            )?,
            certificate_cache_ttl_secs: env_number("APPSTORE_CERT_CACHE_TTL", default_cache_ttl)?,
            ocsp_timeout_secs: env_number("APPSTORE_OCSP_TIMEOUT", default_ocsp_timeout)?,
        })
    }

    /// Set the app Apple id.
    pub fn with_app_apple_id(mut self, app_apple_id: i64) -> Self {
        self.app_apple_id = Some(app_apple_id);
        self
    }

    /// Enable or disable OCSP checks.
    pub fn with_online_checks(mut self, enable: bool) -> Self {
        self.enable_online_checks = enable;
        self
    }

    /// Set the certificate cache capacity.
    pub fn with_certificate_cache_max_size(mut self, max_size: usize) -> Self {
        self.certificate_cache_max_size = max_size;
        self
    }

    /// Set the certificate cache TTL.
    pub fn with_certificate_cache_ttl(mut self, ttl: Duration) -> Self {
        self.certificate_cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the OCSP timeout.
    pub fn with_ocsp_timeout(mut self, timeout: Duration) -> Self {
        self.ocsp_timeout_secs = timeout.as_secs();
        self
    }

    pub fn certificate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.certificate_cache_ttl_secs)
    }

    pub fn ocsp_timeout(&self) -> Duration {
        Duration::from_secs(self.ocsp_timeout_secs)
    }

    /// Check cross-field requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Production && self.app_apple_id.is_none() {
            return Err(ConfigError::MissingAppAppleId);
        }
        if self.bundle_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "bundle_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a numeric variable, using `default` when it is unset.
fn env_number<T>(key: &str, default: fn() -> T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{v}': {e}"),
        }),
        Err(_) => Ok(default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 7] = [
        "APPSTORE_BUNDLE_ID",
        "APPSTORE_ENVIRONMENT",
        "APPSTORE_APP_APPLE_ID",
        "APPSTORE_ENABLE_ONLINE_CHECKS",
        "APPSTORE_CERT_CACHE_MAX_SIZE",
        "APPSTORE_CERT_CACHE_TTL",
        "APPSTORE_OCSP_TIMEOUT",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_from_json() {
        let config: VerifierConfig =
            serde_json::from_str(r#"{"bundle_id": "com.example", "app_apple_id": 1234}"#).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert!(!config.enable_online_checks);
        assert_eq!(config.certificate_cache_max_size, 32);
        assert_eq!(config.certificate_cache_ttl(), Duration::from_secs(900));
        assert_eq!(config.ocsp_timeout(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_production_requires_app_apple_id() {
        let config = VerifierConfig::new("com.example", Environment::Production);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAppAppleId)
        ));

        let sandbox = VerifierConfig::new("com.example", Environment::Sandbox);
        sandbox.validate().unwrap();
    }

    #[test]
    fn test_builders() {
        let config = VerifierConfig::new("com.example", Environment::Sandbox)
            .with_app_apple_id(42)
            .with_online_checks(true)
            .with_certificate_cache_max_size(4)
            .with_certificate_cache_ttl(Duration::from_secs(60))
            .with_ocsp_timeout(Duration::from_secs(5));

        assert_eq!(config.app_apple_id, Some(42));
        assert!(config.enable_online_checks);
        assert_eq!(config.certificate_cache_max_size, 4);
        assert_eq!(config.certificate_cache_ttl_secs, 60);
        assert_eq!(config.ocsp_timeout_secs, 5);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("APPSTORE_BUNDLE_ID", "com.example");
        std::env::set_var("APPSTORE_ENVIRONMENT", "Sandbox");
        std::env::set_var("APPSTORE_ENABLE_ONLINE_CHECKS", "true");
        std::env::set_var("APPSTORE_CERT_CACHE_TTL", "120");

        let config = VerifierConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.bundle_id, "com.example");
        assert_eq!(config.environment, Environment::Sandbox);
        assert!(config.enable_online_checks);
        assert_eq!(config.certificate_cache_ttl_secs, 120);
        assert_eq!(config.certificate_cache_max_size, 32);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_environment() {
        clear_env();
        std::env::set_var("APPSTORE_BUNDLE_ID", "com.example");
        std::env::set_var("APPSTORE_ENVIRONMENT", "Staging");

        let result = VerifierConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "APPSTORE_ENVIRONMENT"));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unparseable_numbers() {
        for var in [
            "APPSTORE_CERT_CACHE_MAX_SIZE",
            "APPSTORE_CERT_CACHE_TTL",
            "APPSTORE_OCSP_TIMEOUT",
        ] {
            clear_env();
            std::env::set_var("APPSTORE_BUNDLE_ID", "com.example");
            std::env::set_var("APPSTORE_ENVIRONMENT", "Sandbox");
            std::env::set_var(var, "ten");

            let result = VerifierConfig::from_env();
            clear_env();

            assert!(
                matches!(&result, Err(ConfigError::InvalidValue { key, .. }) if key == var),
                "{var}: {result:?}"
            );
        }
    }

    #[test]
    #[serial]
    fn test_from_env_requires_bundle_id() {
        clear_env();
        assert!(VerifierConfig::from_env().is_err());
    }
}
