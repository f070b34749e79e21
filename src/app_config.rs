use std::{env, fmt, fs, path::Path, path::PathBuf, time::Duration};

use config::{Environment, File, FileFormat};
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::hue::FetchRetryPolicy;
use crate::store::{StoreBackend, StoreConfig, StoreRetryPolicy};

/// Prefix of environment overrides, e.g. `HUESTATS_INFLUX_DB__PASSWORD`.
pub const ENV_PREFIX: &str = "HUESTATS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable {0} is not set and has no default")]
    MissingVariable(String),

    #[error("unterminated placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),

    #[error("invalid configuration")]
    Invalid(#[from] config::ConfigError),

    #[error("no sensor intervals configured to derive the sleep from")]
    NoInterval,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub hue_bridge: HueBridgeConfig,

    /// Seconds between polls, per sensor type.
    pub intervals: IndexMap<String, u64>,

    pub influx_db: StoreConfig,

    #[serde(default)]
    pub store_backend: StoreBackend,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Deserialize)]
pub struct HueBridgeConfig {
    pub url: String,

    pub user_key: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl fmt::Debug for HueBridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HueBridgeConfig")
            .field("url", &self.url)
            .field("user_key", &"***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub bridge_retries: u32,

    pub bridge_backoff_factor: f64,

    pub store_retries: u32,

    pub store_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let fetch = FetchRetryPolicy::default();
        let store = StoreRetryPolicy::default();

        Self {
            bridge_retries: fetch.retries,
            bridge_backoff_factor: fetch.backoff_factor,
            store_retries: store.retries,
            store_delay_secs: store.delay.as_secs(),
        }
    }
}

impl RetryConfig {
    pub fn fetch_policy(&self) -> FetchRetryPolicy {
        FetchRetryPolicy {
            retries: self.bridge_retries,
            backoff_factor: self.bridge_backoff_factor,
        }
    }

    pub fn store_policy(&self) -> StoreRetryPolicy {
        StoreRetryPolicy {
            retries: self.store_retries,
            delay: Duration::from_secs(self.store_delay_secs),
        }
    }
}

impl Config {
    /// Reads a YAML file, substituting `${VAR}` / `${VAR:-default}` from the
    /// environment, then applies `HUESTATS_*` overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let yaml = interpolate(&raw, |name| env::var(name).ok())?;

        let config = config::Config::builder()
            .add_source(File::from_str(&yaml, FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parses YAML without interpolation or environment overrides.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// The override when given, otherwise the shortest configured interval.
    pub fn sleep_interval(&self, override_secs: Option<u64>) -> Result<Duration, ConfigError> {
        let secs = match override_secs {
            Some(secs) => secs,
            None => self
                .intervals
                .values()
                .copied()
                .min()
                .ok_or(ConfigError::NoInterval)?,
        };

        Ok(Duration::from_secs(secs))
    }
}

pub fn interpolate(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);

        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::UnterminatedPlaceholder(raw.len() - rest.len() + start));
        };

        let placeholder = &after[..end];
        let (name, default) = match placeholder.split_once(":-") {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (placeholder.trim(), None),
        };

        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => match default {
                Some(default) => out.push_str(default),
                None => return Err(ConfigError::MissingVariable(name.to_owned())),
            },
        }

        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
