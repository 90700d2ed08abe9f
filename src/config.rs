use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use axum::http::HeaderName;
use thiserror::Error;

use crate::{lookup::KeyPolicy, rate_limit::ClientIdentity};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_path: PathBuf,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,
    pub key_policy: KeyPolicy,
    pub rate_limit: usize,
    pub rate_limit_window: Duration,
    pub client_identity: ClientIdentity,
    /// None waits forever
    pub lock_wait_timeout: Option<Duration>,
    pub maintenance_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_path: PathBuf::from("./data/doc.geojson"),
            // 30 minutes
            cache_ttl: Duration::from_secs(1800),
            cache_max_capacity: 10_000,
            key_policy: KeyPolicy::Exact,
            rate_limit: 100,
            rate_limit_window: Duration::from_secs(60),
            client_identity: ClientIdentity::PeerAddress,
            lock_wait_timeout: Some(Duration::from_secs(30)),
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// reads the config from the environment, falling back to the defaults
    /// for anything that isn't set
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(addr) = parsed(&var, "BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(path) = var("DATA_PATH") {
            config.data_path = path.into();
        }
        if let Some(secs) = positive(&var, "CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = positive(&var, "CACHE_MAX_CAPACITY")? {
            config.cache_max_capacity = capacity;
        }
        if let Some(decimals) = parsed::<u32>(&var, "CACHE_KEY_DECIMALS")? {
            if decimals > 15 {
                return Err(invalid(
                    "CACHE_KEY_DECIMALS",
                    decimals.to_string(),
                    "must be at most 15",
                ));
            }
            config.key_policy = KeyPolicy::Rounded { decimals };
        }
        if let Some(limit) = positive(&var, "RATE_LIMIT")? {
            config.rate_limit = limit as usize;
        }
        if let Some(secs) = positive(&var, "RATE_LIMIT_WINDOW_SECS")? {
            config.rate_limit_window = Duration::from_secs(secs);
        }
        if let Some(header) = var("RATE_LIMIT_CLIENT_HEADER").filter(|h| !h.is_empty()) {
            let name = HeaderName::from_str(&header)
                .map_err(|e| invalid("RATE_LIMIT_CLIENT_HEADER", header.clone(), e))?;
            config.client_identity = ClientIdentity::Header(name);
        }
        if let Some(secs) = parsed::<u64>(&var, "LOCK_WAIT_TIMEOUT_SECS")? {
            config.lock_wait_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = positive(&var, "MAINTENANCE_INTERVAL_SECS")? {
            config.maintenance_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parsed<T>(var: impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    var(name)
        .map(|value| value.trim().parse().map_err(|e| invalid(name, value.clone(), e)))
        .transpose()
}

fn positive(
    var: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match parsed::<u64>(var, name)? {
        Some(0) => Err(invalid(name, "0".to_string(), "must be greater than 0")),
        other => Ok(other),
    }
}

fn invalid(name: &'static str, value: String, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value,
        reason: reason.to_string(),
    }
}
