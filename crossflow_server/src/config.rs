use std::{env, time::Duration};

use cfp_common::{helpers::parse_boolean_flag, Secret};
use log::*;

const DEFAULT_CFP_HOST: &str = "127.0.0.1";
const DEFAULT_CFP_PORT: u16 = 8360;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The sink URL that signed webhook payloads are POSTed to.
    pub webhook_url: String,
    pub webhook_secret: Secret<String>,
    pub webhooks_enabled: bool,
    /// Upstream exchange-rate API. When unset, the static rate table is used.
    pub rate_api_url: Option<String>,
    pub rate_api_key: Option<Secret<String>>,
    pub provider_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CFP_HOST.to_string(),
            port: DEFAULT_CFP_PORT,
            database_url: String::default(),
            webhook_url: String::default(),
            webhook_secret: Secret::default(),
            webhooks_enabled: false,
            rate_api_url: None,
            rate_api_key: None,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("CFP_HOST").ok().unwrap_or_else(|| DEFAULT_CFP_HOST.into());
        let port = env::var("CFP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("{s} is not a valid port for CFP_PORT. {e} Using the default, {DEFAULT_CFP_PORT}, instead.");
                    DEFAULT_CFP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CFP_PORT);
        let database_url = env::var("CFP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("CFP_DATABASE_URL is not set. Please set it to the URL for the CrossFlow database.");
            String::default()
        });
        let webhook_url = env::var("CFP_WEBHOOK_URL").ok().unwrap_or_default();
        let webhook_secret = Secret::new(env::var("CFP_WEBHOOK_SECRET").ok().unwrap_or_default());
        let webhooks_enabled = parse_boolean_flag(env::var("CFP_WEBHOOKS_ENABLED").ok(), false);
        let rate_api_url = env::var("CFP_RATE_API_URL").ok().filter(|s| !s.is_empty());
        let rate_api_key = env::var("CFP_RATE_API_KEY").ok().filter(|s| !s.is_empty()).map(Secret::new);
        let provider_timeout = env::var("CFP_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS));
        Self {
            host,
            port,
            database_url,
            webhook_url,
            webhook_secret,
            webhooks_enabled,
            rate_api_url,
            rate_api_key,
            provider_timeout,
        }
    }
}
