//! Runtime configuration, deserialized from `VITALSYNC_`-prefixed environment
//! variables (a `.env` file is honored via dotenvy in `main`).
//!
//! The config value is loaded once and threaded explicitly into the storage
//! and provider constructors; there is no global singleton.

use crate::error::SyncError;
use figment::{Figment, providers::Env};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Fitbit app credentials used for the refresh-token exchange.
    /// Required: a deployment without them could never refresh a token.
    pub fitbit_client_id: String,
    pub fitbit_client_secret: String,

    #[serde(default = "default_fitbit_api_base")]
    pub fitbit_api_base: Url,
    #[serde(default = "default_fitbit_token_url")]
    pub fitbit_token_url: Url,

    #[serde(default = "default_healthplanet_api_base")]
    pub healthplanet_api_base: Url,

    /// Fallback log filter when RUST_LOG is not set.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
}

impl Config {
    pub fn load() -> Result<Self, SyncError> {
        let cfg = Figment::new().merge(Env::prefixed("VITALSYNC_")).extract()?;
        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            fitbit_client_id: String::new(),
            fitbit_client_secret: String::new(),
            fitbit_api_base: default_fitbit_api_base(),
            fitbit_token_url: default_fitbit_token_url(),
            healthplanet_api_base: default_healthplanet_api_base(),
            loglevel: default_loglevel(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:vitalsync.sqlite".to_string()
}

fn default_fitbit_api_base() -> Url {
    Url::parse("https://api.fitbit.com").expect("static URL")
}

fn default_fitbit_token_url() -> Url {
    Url::parse("https://api.fitbit.com/oauth2/token").expect("static URL")
}

fn default_healthplanet_api_base() -> Url {
    Url::parse("https://www.healthplanet.jp").expect("static URL")
}

fn default_loglevel() -> String {
    "info".to_string()
}
