//! Configuration management for Superban.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::ban::{BanCriterion, RouteRules};
use crate::error::{Result, SuperbanError};
use crate::store::MEMORY_DRIVER;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "SUPERBAN";

/// The `SUPERBAN_*` environment source; `__` separates nested keys.
fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// Main configuration for the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperbanConfig {
    /// Store driver holding ban records and attempt counters
    #[serde(default = "default_cache_driver")]
    pub cache_driver: String,

    /// Criterion used to key bans: `user_id`, `email` or `ip`.
    ///
    /// Kept as the raw token so a bad value surfaces as `InvalidCriterion`
    /// rather than a generic parse failure.
    #[serde(default = "default_ban_criteria")]
    pub ban_criteria: String,

    /// What to do with requests the criterion cannot identify
    #[serde(default)]
    pub unauthenticated: UnauthenticatedPolicy,

    /// How often the binary purges expired entries from the memory stores
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    /// Per-route limits
    #[serde(default)]
    pub rules: RouteRules,
}

impl Default for SuperbanConfig {
    fn default() -> Self {
        Self {
            cache_driver: default_cache_driver(),
            ban_criteria: default_ban_criteria(),
            unauthenticated: UnauthenticatedPolicy::default(),
            purge_interval_secs: default_purge_interval(),
            rules: RouteRules::default(),
        }
    }
}

fn default_cache_driver() -> String {
    MEMORY_DRIVER.to_string()
}

fn default_ban_criteria() -> String {
    "ip".to_string()
}

fn default_purge_interval() -> u64 {
    60
}

/// Handling of requests whose criterion needs a user that is not present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnauthenticatedPolicy {
    /// Let the request through without counting it
    #[default]
    Allow,
    /// Key the request by its network origin instead
    Ip,
}

impl SuperbanConfig {
    /// The validated ban criterion.
    pub fn criterion(&self) -> Result<BanCriterion> {
        self.ban_criteria.parse()
    }

    /// Check everything that can be checked before serving requests.
    pub fn validate(&self) -> Result<()> {
        self.criterion()?;
        if self.cache_driver.trim().is_empty() {
            return Err(SuperbanError::Config("cache_driver must not be empty".to_string()));
        }
        if self.purge_interval_secs == 0 {
            return Err(SuperbanError::Config(
                "purge_interval_secs must be positive".to_string(),
            ));
        }
        self.rules.validate()
    }

    /// Load configuration from an optional file, then apply `SUPERBAN_*`
    /// environment overrides (`SUPERBAN_BAN_CRITERIA`, `SUPERBAN_CACHE_DRIVER`, ...).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path));
        }

        Self::build(builder, environment())
    }

    fn build(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
        env: ::config::Environment,
    ) -> Result<Self> {
        let config = builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize::<SuperbanConfig>())
            .map_err(|e| SuperbanError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SuperbanConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SuperbanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SuperbanConfig::default();
        assert_eq!(config.cache_driver, "memory");
        assert_eq!(config.criterion().unwrap(), BanCriterion::Ip);
        assert_eq!(config.unauthenticated, UnauthenticatedPolicy::Allow);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
ban_criteria: email
unauthenticated: ip
rules:
  routes:
    - path_prefix: /login
      max_attempts: 5
      decay_minutes: 1
      banned_minutes: 30
"#;
        let config = SuperbanConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.criterion().unwrap(), BanCriterion::Email);
        assert_eq!(config.unauthenticated, UnauthenticatedPolicy::Ip);
        assert_eq!(config.rules.find_limits("/login").unwrap().banned_minutes, 30);
        assert_eq!(config.cache_driver, "memory");
    }

    #[test]
    fn test_invalid_criterion_fails_at_load() {
        let err = SuperbanConfig::from_yaml("ban_criteria: invalid_value").unwrap_err();
        assert!(matches!(err, SuperbanError::InvalidCriterion(ref c) if c == "invalid_value"));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(matches!(
            SuperbanConfig::from_yaml("cache_driver: ''"),
            Err(SuperbanError::Config(_))
        ));
        assert!(matches!(
            SuperbanConfig::from_yaml("purge_interval_secs: 0"),
            Err(SuperbanError::Config(_))
        ));
        assert!(matches!(
            SuperbanConfig::from_yaml("unauthenticated: reject"),
            Err(SuperbanError::Config(_))
        ));
    }

    fn env(vars: &[(&str, &str)]) -> ::config::Environment {
        let vars: ::config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    fn yaml_source(yaml: &str) -> ::config::ConfigBuilder<::config::builder::DefaultState> {
        ::config::Config::builder()
            .add_source(::config::File::from_str(yaml, ::config::FileFormat::Yaml))
    }

    #[test]
    fn test_build_without_sources_uses_defaults() {
        let config = SuperbanConfig::build(::config::Config::builder(), env(&[])).unwrap();
        assert_eq!(config, SuperbanConfig::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let yaml = r#"
cache_driver: memory
ban_criteria: email
rules:
  routes:
    - path_prefix: /login
      max_attempts: 5
      decay_minutes: 1
      banned_minutes: 30
"#;
        let config = SuperbanConfig::build(
            yaml_source(yaml),
            env(&[
                ("SUPERBAN_BAN_CRITERIA", "user_id"),
                ("SUPERBAN_CACHE_DRIVER", "redis"),
                ("SUPERBAN_PURGE_INTERVAL_SECS", "15"),
            ]),
        )
        .unwrap();

        assert_eq!(config.criterion().unwrap(), BanCriterion::UserId);
        assert_eq!(config.cache_driver, "redis");
        assert_eq!(config.purge_interval_secs, 15);
        assert_eq!(config.rules.find_limits("/login").unwrap().max_attempts, 5);
    }

    #[test]
    fn test_file_values_kept_without_overrides() {
        let config = SuperbanConfig::build(
            yaml_source("ban_criteria: email\nunauthenticated: ip\n"),
            env(&[("OTHER_BAN_CRITERIA", "user_id")]),
        )
        .unwrap();

        assert_eq!(config.criterion().unwrap(), BanCriterion::Email);
        assert_eq!(config.unauthenticated, UnauthenticatedPolicy::Ip);
    }

    #[test]
    fn test_invalid_criterion_from_environment() {
        let err = SuperbanConfig::build(
            yaml_source("ban_criteria: ip\n"),
            env(&[("SUPERBAN_BAN_CRITERIA", "invalid_value")]),
        )
        .unwrap_err();

        assert!(matches!(err, SuperbanError::InvalidCriterion(ref c) if c == "invalid_value"));
    }

    #[test]
    fn test_from_missing_file() {
        assert!(matches!(
            SuperbanConfig::from_file("/nonexistent/superban.yaml"),
            Err(SuperbanError::Io(_))
        ));
    }
}
