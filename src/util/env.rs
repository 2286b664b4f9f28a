//! Environment configuration.
//!
//! Raw variables are pulled through `dotenvy` (so a `.env` file works in development) and
//! deserialised into [`Env`] with serde. [`Config`] is the typed view the rest of the crate uses.

use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use serde::de::value::MapDeserializer;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::bot::DEFAULT_PREFIX;

static CONFIG: LazyLock<OnceCell<Config>> = LazyLock::new(OnceCell::new);

/// Process-wide configuration, loaded on first use.
pub async fn config() -> ConfigResult<&'static Config> {
    CONFIG
        .get_or_try_init(|| async { Config::from_env(Env::new()?) })
        .await
}

fn default_redis_url() -> String {
    String::from("redis://127.0.0.1:6379/0")
}

fn default_store_backend() -> String {
    String::from("redis")
}

fn default_timeout_ms() -> String {
    String::from("2000")
}

fn default_recount_secs() -> String {
    String::from("3600")
}

fn default_irc_port() -> String {
    String::from("6697")
}

fn default_log_filter() -> String {
    String::from("luna_quotes=debug,sqlx=info,irc=info,info")
}

fn default_service_name() -> String {
    String::from("luna-quotes")
}

fn default_command_prefix() -> String {
    String::from(DEFAULT_PREFIX)
}

/// Raw variables, every value still a string. Empty means unset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_store_backend")]
    pub store_backend: String,
    #[serde(default = "default_timeout_ms")]
    pub store_timeout_ms: String,
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default = "default_recount_secs")]
    pub recount_interval_secs: String,
    #[serde(default)]
    pub irc_server: String,
    #[serde(default = "default_irc_port")]
    pub irc_port: String,
    #[serde(default)]
    pub irc_nickname: String,
    #[serde(default)]
    pub irc_password: String,
    #[serde(default)]
    pub irc_channels: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub log_json: String,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Env {
    pub fn new() -> ConfigResult<Self> {
        Self::from_iter(dotenvy::vars())
    }

    pub fn from_iter<I>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let deserializer =
            MapDeserializer::<_, serde::de::value::Error>::new(vars.into_iter());
        Ok(Env::deserialize(deserializer)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcSettings {
    pub server: String,
    pub port: u16,
    pub nickname: String,
    pub password: Option<String>,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub store_backend: StoreBackend,
    pub store_timeout: Duration,
    pub key_prefix: Option<String>,
    pub database_url: Option<String>,
    pub command_prefix: String,
    pub recount_interval: Duration,
    pub irc: Option<IrcSettings>,
    pub log_filter: String,
    pub log_json: bool,
    pub otel_endpoint: Option<String>,
    pub service_name: String,
}

impl Config {
    pub fn from_env(env: Env) -> ConfigResult<Self> {
        let store_backend = match env.store_backend.trim().to_lowercase().as_str() {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigErr::Invalid {
                    var: "STORE_BACKEND",
                    value: other.to_owned(),
                });
            }
        };

        let store_timeout =
            Duration::from_millis(parse_num("STORE_TIMEOUT_MS", &env.store_timeout_ms)?);
        let recount_interval =
            Duration::from_secs(parse_num("RECOUNT_INTERVAL_SECS", &env.recount_interval_secs)?);
        if store_timeout.is_zero() || recount_interval.is_zero() {
            return Err(ConfigErr::Invalid {
                var: "STORE_TIMEOUT_MS/RECOUNT_INTERVAL_SECS",
                value: String::from("0"),
            });
        }

        let irc = match non_empty(env.irc_server) {
            Some(server) => Some(IrcSettings {
                server,
                port: parse_num("IRC_PORT", &env.irc_port)?,
                nickname: non_empty(env.irc_nickname).ok_or(ConfigErr::Missing("IRC_NICKNAME"))?,
                password: non_empty(env.irc_password),
                channels: env
                    .irc_channels
                    .split(',')
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .map(|c| format!("#{}", c.trim_start_matches('#')))
                    .collect(),
            }),
            None => None,
        };

        Ok(Self {
            redis_url: env.redis_url,
            store_backend,
            store_timeout,
            key_prefix: non_empty(env.key_prefix),
            database_url: non_empty(env.database_url),
            command_prefix: non_empty(env.command_prefix)
                .unwrap_or_else(default_command_prefix),
            recount_interval,
            irc,
            log_filter: env.log_filter,
            log_json: matches!(env.log_json.trim(), "1" | "true" | "yes"),
            otel_endpoint: non_empty(env.otel_exporter_otlp_endpoint),
            service_name: env.service_name,
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn parse_num<T: core::str::FromStr>(var: &'static str, value: &str) -> ConfigResult<T> {
    value.trim().parse::<T>().map_err(|_| ConfigErr::Invalid {
        var,
        value: value.to_owned(),
    })
}

pub type ConfigResult<T> = core::result::Result<T, ConfigErr>;

#[derive(Debug, Error)]
pub enum ConfigErr {
    #[error("env deserialization error: {0}")]
    DeserializationError(#[from] serde::de::value::Error),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let env = Env::from_iter(vars(&[("PATH", "/usr/bin")])).unwrap();
        let config = Config::from_env(env).unwrap();

        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.store_timeout, Duration::from_secs(2));
        assert_eq!(config.recount_interval, Duration::from_secs(3600));
        assert_eq!(config.command_prefix, "--");
        assert_eq!(config.key_prefix, None);
        assert_eq!(config.database_url, None);
        assert_eq!(config.irc, None);
        assert!(!config.log_json);
    }

    #[test]
    fn test_irc_settings() {
        let env = Env::from_iter(vars(&[
            ("STORE_BACKEND", "Memory"),
            ("KEY_PREFIX", "luna"),
            ("IRC_SERVER", "irc.libera.chat"),
            ("IRC_NICKNAME", "lunabot"),
            ("IRC_CHANNELS", "#quotes, lounge,,"),
        ]))
        .unwrap();
        let config = Config::from_env(env).unwrap();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.key_prefix.as_deref(), Some("luna"));

        let irc = config.irc.unwrap();
        assert_eq!(irc.port, 6697);
        assert_eq!(irc.password, None);
        assert_eq!(irc.channels, vec!["#quotes", "#lounge"]);
    }

    #[test]
    fn test_invalid_values() {
        let env = Env::from_iter(vars(&[("STORE_TIMEOUT_MS", "soon")])).unwrap();
        assert!(matches!(
            Config::from_env(env),
            Err(ConfigErr::Invalid { var: "STORE_TIMEOUT_MS", .. })
        ));

        let env = Env::from_iter(vars(&[("IRC_SERVER", "irc.libera.chat")])).unwrap();
        assert!(matches!(
            Config::from_env(env),
            Err(ConfigErr::Missing("IRC_NICKNAME"))
        ));

        let env = Env::from_iter(vars(&[("STORE_BACKEND", "mongo")])).unwrap();
        assert!(Config::from_env(env).is_err());
    }
}
