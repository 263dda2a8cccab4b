//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in `SecretString` so it never
//! shows up in logs.

pub mod secrets;

use std::str::FromStr;
use std::time::Duration;

use crate::analyzer::AnalyzerConfig;
use crate::error::{Error, Result};
use crate::queue::QueueConfig;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub db_max_connections: u32,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub queue: QueueConfig,
    pub analyzer: AnalyzerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let queue = QueueConfig {
            workers: vars.parse_or("QUEUE_WORKERS", 3)?,
            buffer_size: vars.parse_or("QUEUE_BUFFER_SIZE", 100)?,
            max_retries: vars.parse_or("QUEUE_MAX_RETRIES", 3)?,
            retry_delay: Duration::from_millis(vars.parse_or("QUEUE_RETRY_DELAY_MS", 5_000)?),
        };
        queue.validate()?;

        let defaults = AnalyzerConfig::default();
        let analyzer = AnalyzerConfig {
            timeout: Duration::from_secs(vars.parse_or("CRAWLER_TIMEOUT_SECS", 30)?),
            user_agent: vars.get("CRAWLER_USER_AGENT").unwrap_or(defaults.user_agent),
            max_links_to_check: vars
                .parse_or("CRAWLER_MAX_LINKS_CHECK", defaults.max_links_to_check)?,
        };

        Ok(Self {
            database_url: SecretString::from(vars.required("DATABASE_URL")?),
            db_max_connections: vars.parse_or("DB_MAX_OPEN", 10)?,
            otel_endpoint: vars.get("OTEL_ENDPOINT"),
            log_level: vars.get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            queue,
            analyzer,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank are treated the same.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.get(name)
            .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
            None => Ok(default),
        }
    }
}
