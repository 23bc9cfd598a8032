//! Process configuration from the environment and command line.
//!
//! Environment variables:
//!   JWT_SECRET, ADMIN_USERNAME, ADMIN_PASSWORD   required
//!   PORT                    API port (default: 8090)
//!   DATABASE_PATH           SQLite file (default: data/localhavencms.db)
//!   ENVIRONMENT             development | production (default: development)
//!   TRUSTED_PROXIES         comma-separated IPs/CIDRs
//!   RATE_LIMIT_DISABLED     "true" disables rate limiting
//!   LOGIN_FAILURE_DELAY_MS  delay before a failed login answers (default: 1000)
//!   CACHE_TTL_SECS          results cache lifetime (default: 300)

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::api::client_ip::{InvalidProxy, TrustedProxies, DEFAULT_TRUSTED_PROXIES};

pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_DATABASE_PATH: &str = "data/localhavencms.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("Failed to configure trusted proxies: {0}")]
    TrustedProxies(#[from] InvalidProxy),
}

/// Deployment mode; production quiets logging and skips `.env` loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    /// Mode from the process environment, before any `.env` file is read
    pub fn from_env() -> Self {
        Self::from_name(&std::env::var("ENVIRONMENT").unwrap_or_default())
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            Self::Production => "info",
            Self::Development => "debug",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub environment: Environment,
    pub jwt_secret: String,
    pub admin_username: String,
    pub admin_password: String,
    pub trusted_proxies: TrustedProxies,
    pub rate_limit_disabled: bool,
    pub login_failure_delay: Duration,
    pub cache_ttl: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("environment", &self.environment)
            .field("jwt_secret", &"<redacted>")
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("trusted_proxies", &self.trusted_proxies)
            .field("rate_limit_disabled", &self.rate_limit_disabled)
            .field("login_failure_delay", &self.login_failure_delay)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl Config {
    /// Read the environment, then apply command-line overrides. Call
    /// `load_dotenv` first so `.env` values are visible here.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.apply_args(std::env::args().skip(1))?;
        Ok(config)
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let jwt_secret = required("JWT_SECRET")?;
        let admin_username = required("ADMIN_USERNAME")?;
        let admin_password = required("ADMIN_PASSWORD")?;

        let trusted_proxies = match get("TRUSTED_PROXIES") {
            Some(list) => TrustedProxies::parse_list(&list)?,
            None => TrustedProxies::parse_list(&DEFAULT_TRUSTED_PROXIES.join(","))?,
        };

        Ok(Self {
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            environment: get("ENVIRONMENT")
                .map(|v| Environment::from_name(&v))
                .unwrap_or_default(),
            jwt_secret,
            admin_username,
            admin_password,
            trusted_proxies,
            rate_limit_disabled: get("RATE_LIMIT_DISABLED")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            login_failure_delay: Duration::from_millis(parse_or(
                "LOGIN_FAILURE_DELAY_MS",
                get("LOGIN_FAILURE_DELAY_MS"),
                1000,
            )?),
            cache_ttl: Duration::from_secs(parse_or("CACHE_TTL_SECS", get("CACHE_TTL_SECS"), 300)?),
        })
    }

    /// `--port <PORT>` and `--db <PATH>` override the environment
    pub fn apply_args<I>(&mut self, args: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--port" => self.port = parse_or("--port", args.next(), self.port)?,
                "--db" => {
                    if let Some(path) = args.next() {
                        self.database_path = PathBuf::from(path);
                    }
                }
                other => warn!("Ignoring unknown argument {}", other),
            }
        }
        Ok(())
    }
}

/// Load `./.env` unless the process runs in production. Values already in
/// the environment win. Returns the file that was read, if any.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    if Environment::from_env().is_production() {
        return Ok(None);
    }
    dotenvy::dotenv().map(Some)
}

/// `load_dotenv` for an explicit file
pub fn load_dotenv_from(path: &Path) -> Result<Option<PathBuf>, dotenvy::Error> {
    if Environment::from_env().is_production() {
        return Ok(None);
    }
    dotenvy::from_path(path).map(|_| Some(path.to_path_buf()))
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name, value: v }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("JWT_SECRET", "secret"),
        ("ADMIN_USERNAME", "admin"),
        ("ADMIN_PASSWORD", "pw"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(env(&REQUIRED)).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(config.environment, Environment::Development);
        assert!(!config.rate_limit_disabled);
        assert_eq!(config.login_failure_delay, Duration::from_secs(1));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert!(config.trusted_proxies.contains(&"172.17.0.1".parse().unwrap()));
    }

    #[test]
    fn test_missing_required_variable() {
        for skip in ["JWT_SECRET", "ADMIN_USERNAME", "ADMIN_PASSWORD"] {
            let pairs: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != skip).collect();
            match Config::from_lookup(env(&pairs)) {
                Err(ConfigError::Missing(name)) => assert_eq!(name, skip),
                other => panic!("expected missing {skip}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_overrides_from_environment() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("PORT", "9000"),
            ("ENVIRONMENT", "production"),
            ("RATE_LIMIT_DISABLED", "true"),
            ("TRUSTED_PROXIES", "203.0.113.0/24"),
            ("DATABASE_PATH", "/tmp/survey.db"),
        ]);
        let config = Config::from_lookup(env(&pairs)).unwrap();

        assert_eq!(config.port, 9000);
        assert!(config.environment.is_production());
        assert!(config.rate_limit_disabled);
        assert!(config.trusted_proxies.contains(&"203.0.113.5".parse().unwrap()));
        assert!(!config.trusted_proxies.contains(&"127.0.0.1".parse().unwrap()));
        assert_eq!(config.database_path, PathBuf::from("/tmp/survey.db"));
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TRUSTED_PROXIES", "10.0.0.0/8,not-an-ip"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::TrustedProxies(_))
        ));
    }

    #[test]
    fn test_command_line_overrides() {
        let mut config = Config::from_lookup(env(&REQUIRED)).unwrap();
        config
            .apply_args(["--port", "7000", "--db", "other.db"].map(String::from))
            .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.database_path, PathBuf::from("other.db"));
    }

    // The only test that touches the process environment.
    #[test]
    fn test_dotenv_values_reach_the_environment_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "ENVIRONMENT=production\nHAVEN_SURVEY_DOTENV_MARKER=1\n").unwrap();
        std::env::remove_var("ENVIRONMENT");

        assert_eq!(load_dotenv_from(&path).unwrap(), Some(path.clone()));
        assert!(Environment::from_env().is_production());
        assert_eq!(std::env::var("HAVEN_SURVEY_DOTENV_MARKER").as_deref(), Ok("1"));

        // Production never reads the file again
        assert_eq!(load_dotenv_from(&path).unwrap(), None);
        std::env::remove_var("ENVIRONMENT");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_lookup(env(&REQUIRED)).unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("secret\""));
        assert!(!printed.contains("\"pw\""));
        assert!(printed.contains("<redacted>"));
    }
}
