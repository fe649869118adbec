use std::path::PathBuf;

use secrecy::Secret;
use serde::Deserialize;

use crate::services::delivery::DeliveryMode;
use crate::services::token::DEFAULT_TTL_SECS;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,

    // Signing
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,

    // WooCommerce REST API (product catalog)
    pub catalog_api_url: Option<String>,
    pub catalog_consumer_key: Option<String>,
    pub catalog_consumer_secret: Option<Secret<String>>,

    pub vod: VodSettings,
}

/// Settings shared by the token issuer and the delivery guard.
#[derive(Debug, Clone, Deserialize)]
pub struct VodSettings {
    pub token_ttl_secs: i64,
    pub delivery_mode: DeliveryMode,
    pub storage_root: PathBuf,
    /// Enables `?dbg=1` diagnostics on the watch and stream endpoints.
    pub debug: bool,
    pub login_url: String,
}

impl Default for VodSettings {
    fn default() -> Self {
        Self {
            token_ttl_secs: DEFAULT_TTL_SECS,
            delivery_mode: DeliveryMode::Redirect,
            storage_root: PathBuf::from("media"),
            debug: false,
            login_url: "/login".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let defaults = VodSettings::default();
        let delivery_mode = match config.get::<String>("delivery_mode") {
            Ok(mode) => parse_delivery_mode(&mode)?,
            Err(_) => defaults.delivery_mode,
        };

        Ok(Self {
            database_url: config.get("database_url")?,
            base_url: config.get("base_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            secret_key: Secret::new(config.get("secret_key")?),
            webhook_secret: Secret::new(config.get("webhook_secret")?),

            catalog_api_url: config.get("catalog_api_url").ok(),
            catalog_consumer_key: config.get("catalog_consumer_key").ok(),
            catalog_consumer_secret: config
                .get::<String>("catalog_consumer_secret")
                .ok()
                .map(Secret::new),

            vod: VodSettings {
                token_ttl_secs: config
                    .get("token_ttl_secs")
                    .unwrap_or(defaults.token_ttl_secs),
                delivery_mode,
                storage_root: config
                    .get::<String>("storage_root")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage_root),
                debug: config.get("vod_debug").unwrap_or(defaults.debug),
                login_url: config.get("login_url").unwrap_or(defaults.login_url),
            },
        })
    }
}

fn parse_delivery_mode(raw: &str) -> Result<DeliveryMode, config::ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "redirect" => Ok(DeliveryMode::Redirect),
        "proxy" => Ok(DeliveryMode::Proxy),
        other => Err(config::ConfigError::Message(format!(
            "DELIVERY_MODE must be `redirect` or `proxy`, got `{}`",
            other
        ))),
    }
}
