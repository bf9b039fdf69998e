use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Bunny stream library, storage zone and pull zone settings.
#[derive(Clone)]
pub struct BunnyConfig {
    pub stream_base_url: String,
    pub storage_base_url: String,
    pub cdn_url: String,
    pub embed_url: String,
    pub library_id: String,
    pub stream_access_key: String,
    pub storage_access_key: String,
}

#[derive(Clone)]
pub struct Config {
    pub bunny: BunnyConfig,
    pub database_url: String,
    pub auth_service_url: String,
    pub bind_address: String,
    pub upload_rate_limit_max: u32,
    pub upload_rate_limit_window: Duration,
    pub reconcile_interval: Duration,
    pub intent_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bunny = BunnyConfig {
            stream_base_url: base_url(required(&lookup, "BUNNY_STREAM_BASE_URL")?),
            storage_base_url: base_url(required(&lookup, "BUNNY_STORAGE_BASE_URL")?),
            cdn_url: base_url(required(&lookup, "BUNNY_CDN_URL")?),
            embed_url: base_url(required(&lookup, "BUNNY_EMBED_URL")?),
            library_id: required(&lookup, "BUNNY_LIBRARY_ID")?,
            stream_access_key: required(&lookup, "BUNNY_STREAM_ACCESS_KEY")?,
            storage_access_key: required(&lookup, "BUNNY_STORAGE_ACCESS_KEY")?,
        };

        Ok(Config {
            bunny,
            database_url: required(&lookup, "DATABASE_URL")?,
            auth_service_url: base_url(required(&lookup, "AUTH_SERVICE_URL")?),
            bind_address: try_load(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".to_string())?,
            upload_rate_limit_max: try_load(&lookup, "UPLOAD_RATE_LIMIT_MAX", 2)?,
            upload_rate_limit_window: Duration::from_secs(try_load(&lookup, "UPLOAD_RATE_LIMIT_WINDOW_SECS", 60)?),
            reconcile_interval: Duration::from_secs(try_load(&lookup, "RECONCILE_INTERVAL_SECS", 300)?),
            intent_grace: Duration::from_secs(try_load(&lookup, "INTENT_GRACE_SECS", 900)?),
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}

fn base_url(value: String) -> String {
    value.trim_end_matches('/').to_string()
}
