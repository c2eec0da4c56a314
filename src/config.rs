//! Process configuration and the upstream target registry
//!
//! Loads the three upstream sensor targets (air quality, time-series air
//! quality, traffic) plus server settings from environment variables.
//! The target set is fixed for the process lifetime; validation runs once
//! at startup and a missing upstream URL is fatal before the listener binds.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default listening port when `PORT` is not set
const DEFAULT_PORT: u16 = 3000;

/// Default upstream request timeout in milliseconds
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more targets have no upstream URL configured
    #[error("missing upstream URL for target(s): {0}")]
    MissingEndpoints(String),

    /// An environment variable holds a value that cannot be parsed
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
}

/// One configured upstream data source
///
/// Targets are immutable after construction. `cache_file` names the single
/// on-disk artifact for the target; freshness is decided from that file's
/// modification time against `ttl_ms`.
#[derive(Debug, Clone)]
pub struct Target {
    /// Stable identifier, also used as the key in `/api/status`
    pub key: &'static str,
    /// Upstream endpoint URL; empty means unconfigured
    pub endpoint: String,
    /// Maximum artifact age in milliseconds before a refetch
    pub ttl_ms: u64,
    /// File name of the cache artifact inside the cache directory
    pub cache_file: &'static str,
    /// Whether responses must pass through GeoJSON normalization
    pub normalize: bool,
}

/// Full process configuration, built once in main and owned by the service
#[derive(Debug, Clone)]
pub struct Config {
    /// Public base URL, only used for the startup log line
    pub app_url: String,
    /// Listening port
    pub port: u16,
    /// Directory holding one JSON artifact per target
    pub cache_dir: PathBuf,
    /// Directory with the frontend bundle served at `/`
    pub static_dir: PathBuf,
    /// Timeout applied to every upstream request
    pub upstream_timeout: Duration,
    /// Serve a stale artifact instead of failing when a refetch errors
    pub serve_stale_on_error: bool,
    /// The fixed set of upstream targets, in declaration order
    pub targets: Vec<Target>,
}

impl Config {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration from an arbitrary variable lookup
    ///
    /// The indirection keeps tests independent of process-global state.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let targets = vec![
            Target {
                key: "air-quality",
                endpoint: lookup("AIR_QUALITY_URL").unwrap_or_default(),
                ttl_ms: parse_or(&lookup, "CACHE_DURATION_AIR_QUALITY_MS", 0)?,
                cache_file: "air-quality.json",
                normalize: false,
            },
            Target {
                key: "air-quality-time",
                endpoint: lookup("AIR_QUALITY_TIME_URL").unwrap_or_default(),
                ttl_ms: parse_or(&lookup, "CACHE_DURATION_AIR_QUALITY_TIME_MS", 0)?,
                cache_file: "air-quality-time.json",
                normalize: true,
            },
            Target {
                key: "traffic",
                endpoint: lookup("TRAFFIC_URL").unwrap_or_default(),
                ttl_ms: parse_or(&lookup, "CACHE_DURATION_TRAFFIC_MS", 0)?,
                cache_file: "traffic.json",
                normalize: true,
            },
        ];

        Ok(Self {
            app_url: lookup("URL").unwrap_or_else(|| "http://localhost".to_string()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            cache_dir: lookup("CACHE_DIR").unwrap_or_else(|| "cache".to_string()).into(),
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "public".to_string()).into(),
            upstream_timeout: Duration::from_millis(parse_or(
                &lookup,
                "UPSTREAM_TIMEOUT_MS",
                DEFAULT_UPSTREAM_TIMEOUT_MS,
            )?),
            serve_stale_on_error: parse_or(&lookup, "SERVE_STALE_ON_ERROR", false)?,
            targets,
        })
    }

    /// Checks that every target has an upstream URL
    ///
    /// Returns an error naming all offending targets at once, so a broken
    /// deployment surfaces every missing variable in a single message.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = self
            .targets
            .iter()
            .filter(|t| t.endpoint.is_empty())
            .map(|t| t.key)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingEndpoints(missing.join(", ")))
        }
    }

    /// Looks up a target by its identifier
    pub fn target(&self, key: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.key == key)
    }
}

/// Parses an environment value, falling back to a default when unset
fn parse_or<L, T>(lookup: &L, var: &str, default: T) -> Result<T, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("AIR_QUALITY_URL", "http://upstream/aq"),
            ("AIR_QUALITY_TIME_URL", "http://upstream/aqt"),
            ("TRAFFIC_URL", "http://upstream/traffic"),
            ("CACHE_DURATION_AIR_QUALITY_MS", "60000"),
            ("CACHE_DURATION_AIR_QUALITY_TIME_MS", "120000"),
            ("CACHE_DURATION_TRAFFIC_MS", "30000"),
            ("PORT", "8080"),
            ("URL", "https://sensors.example"),
        ])
    }

    fn load(env: &HashMap<&str, &str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|var| env.get(var).map(|v| v.to_string()))
    }

    #[test]
    fn test_full_env_builds_three_targets_in_order() {
        let config = load(&full_env()).expect("Config should load");

        let keys: Vec<&str> = config.targets.iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["air-quality", "air-quality-time", "traffic"]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.app_url, "https://sensors.example");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl_and_normalization_per_target() {
        let config = load(&full_env()).expect("Config should load");

        let aq = config.target("air-quality").unwrap();
        assert_eq!(aq.ttl_ms, 60000);
        assert!(!aq.normalize);

        let traffic = config.target("traffic").unwrap();
        assert_eq!(traffic.ttl_ms, 30000);
        assert!(traffic.normalize);
    }

    #[test]
    fn test_validate_lists_every_missing_endpoint() {
        let mut env = full_env();
        env.remove("AIR_QUALITY_URL");
        env.remove("TRAFFIC_URL");

        let config = load(&env).expect("Config should still load");
        let err = config.validate().expect_err("Validation should fail");

        let message = err.to_string();
        assert!(message.contains("air-quality"), "message: {}", message);
        assert!(message.contains("traffic"), "message: {}", message);
        assert!(!message.contains("air-quality-time,"), "message: {}", message);
    }

    #[test]
    fn test_defaults_when_optional_vars_absent() {
        let env = HashMap::from([
            ("AIR_QUALITY_URL", "http://upstream/aq"),
            ("AIR_QUALITY_TIME_URL", "http://upstream/aqt"),
            ("TRAFFIC_URL", "http://upstream/traffic"),
        ]);

        let config = load(&env).expect("Config should load");
        assert_eq!(config.port, 3000);
        assert_eq!(config.app_url, "http://localhost");
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.upstream_timeout, Duration::from_millis(30_000));
        assert!(!config.serve_stale_on_error);
        // Missing TTL means "always stale", never an error
        assert_eq!(config.target("air-quality").unwrap().ttl_ms, 0);
    }

    #[test]
    fn test_invalid_numeric_value_is_an_error() {
        let mut env = full_env();
        env.insert("PORT", "not-a-port");

        let err = load(&env).expect_err("Load should fail");
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "PORT"));
    }
}
