//! Runtime configuration read from environment variables.
//!
//! | Variable                     | Default                      |
//! |------------------------------|------------------------------|
//! | `CONTAINERS_DIR`             | `/var/lib/docker/containers` |
//! | `TAIL_POLICY`                | `replay` (`replay`, `tail`)  |
//! | `TAIL_POLL_INTERVAL_MS`      | `1000`                       |
//! | `LOG_FILE_WAIT_TIMEOUT_SECS` | `300`                        |
//! | `LOG_FILE_REAPPEAR_SECS`     | `5`                          |
//! | `TAIL_MAX_LINE_BYTES`        | `1048576`                    |
//! | `OPENSEARCH_HOST`            | `localhost`                  |
//! | `OPENSEARCH_PORT`            | `9200`                       |
//! | `OPENSEARCH_INDEX`           | `docker-logs`                |
//! | `DASHBOARDS_HOST`            | `dashboards`                 |
//! | `DASHBOARDS_PORT`            | `5601`                       |
//! | `SKIP_BOOTSTRAP`             | `false`                      |
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::tail::{DEFAULT_MAX_LINE_LEN, TailConfig, TailPolicy};

pub const DEFAULT_CONTAINERS_DIR: &str = "/var/lib/docker/containers";
pub const DEFAULT_INDEX: &str = "docker-logs";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSearchConfig {
    pub host: String,
    pub port: u16,
    pub index: String,
}

impl OpenSearchConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardsConfig {
    pub host: String,
    pub port: u16,
}

impl DashboardsConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub containers_dir: PathBuf,
    pub tail: TailConfig,
    pub opensearch: OpenSearchConfig,
    pub dashboards: DashboardsConfig,
    /// Whether the OpenSearch index and Dashboards index pattern are set up at startup.
    pub bootstrap: bool,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a variable
    /// or `None` if it is unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if a set variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let string = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_owned())
        };

        let policy = parse(&lookup, "TAIL_POLICY", TailPolicy::default(), |value| {
            value.parse::<TailPolicy>()
        })?;
        let poll_interval_ms = parse(&lookup, "TAIL_POLL_INTERVAL_MS", 1000, positive)?;
        let wait_timeout_secs = parse(&lookup, "LOG_FILE_WAIT_TIMEOUT_SECS", 300, positive)?;
        let reappear_secs = parse(&lookup, "LOG_FILE_REAPPEAR_SECS", 5, positive)?;
        let max_line_len = parse(
            &lookup,
            "TAIL_MAX_LINE_BYTES",
            DEFAULT_MAX_LINE_LEN as u64,
            positive,
        )?;
        let skip_bootstrap = parse(&lookup, "SKIP_BOOTSTRAP", false, parse_bool)?;

        Ok(Self {
            containers_dir: PathBuf::from(string("CONTAINERS_DIR", DEFAULT_CONTAINERS_DIR)),
            tail: TailConfig {
                policy,
                poll_interval: Duration::from_millis(poll_interval_ms),
                file_wait_timeout: Duration::from_secs(wait_timeout_secs),
                reappear_timeout: Duration::from_secs(reappear_secs),
                max_line_len: usize::try_from(max_line_len).unwrap_or(usize::MAX),
            },
            opensearch: OpenSearchConfig {
                host: string("OPENSEARCH_HOST", "localhost"),
                port: parse(&lookup, "OPENSEARCH_PORT", 9200, port)?,
                index: string("OPENSEARCH_INDEX", DEFAULT_INDEX),
            },
            dashboards: DashboardsConfig {
                host: string("DASHBOARDS_HOST", "dashboards"),
                port: parse(&lookup, "DASHBOARDS_PORT", 5601, port)?,
            },
            bootstrap: !skip_bootstrap,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    parse_value: impl FnOnce(&str) -> std::result::Result<T, String>,
) -> Result<T> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => {
            parse_value(value.trim()).map_err(|reason| Error::InvalidValue { key, value, reason })
        }
        _ => Ok(default),
    }
}

fn positive(value: &str) -> std::result::Result<u64, String> {
    match u64::from_str(value) {
        Ok(0) => Err("must be greater than zero".to_owned()),
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}

fn port(value: &str) -> std::result::Result<u16, String> {
    u16::from_str(value).map_err(|err| err.to_string())
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err("expected a boolean".to_owned()),
    }
}
