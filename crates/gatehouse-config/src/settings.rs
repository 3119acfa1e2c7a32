//! The configuration tree.
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. a TOML file
//! 3. `GATEHOUSE__<SECTION>__<KEY>` environment variables
//! 4. the short aliases `GATEHOUSE_DATABASE_URL`, `GATEHOUSE_ACCESS_TOKEN_LIFESPAN`,
//!    `GATEHOUSE_LOG_LEVEL` and `DATASTORE_EMULATOR_HOST`

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::datastore::{DatastoreUrl, EMULATOR_HOST_VAR};
use crate::logging::LogFormat;
use crate::{ConfigError, Result};

pub const DATABASE_URL_VAR: &str = "GATEHOUSE_DATABASE_URL";
pub const ACCESS_TOKEN_LIFESPAN_VAR: &str = "GATEHOUSE_ACCESS_TOKEN_LIFESPAN";
pub const LOG_LEVEL_VAR: &str = "GATEHOUSE_LOG_LEVEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatehouseConfig {
    #[serde(default)]
    pub datastore: DatastoreConfig,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    #[serde(default = "default_datastore_url")]
    pub url: String,
    /// Host of a local emulator; disables credential files.
    #[serde(default)]
    pub emulator_host: Option<String>,
}

fn default_datastore_url() -> String {
    "datastore://".into()
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            url: default_datastore_url(),
            emulator_host: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    /// Access tokens requested longer ago than this are flushable.
    #[serde(default = "default_access_token_lifespan", with = "humantime_serde")]
    pub access_token_lifespan: Duration,
}

fn default_access_token_lifespan() -> Duration {
    Duration::from_secs(3600)
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            access_token_lifespan: default_access_token_lifespan(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl GatehouseConfig {
    /// Parses a TOML document; missing sections take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ConfigError::parse(e.to_string()))
    }

    /// Loads `.env`, the file at `path` (if it exists) and the environment,
    /// then validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!(error = %e, "failed to load .env file");
            }
        }

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("GATEHOUSE")
                .try_parsing(true)
                .separator("__"),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the short environment aliases through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(DATABASE_URL_VAR) {
            self.datastore.url = url;
        }
        if let Some(raw) = lookup(ACCESS_TOKEN_LIFESPAN_VAR) {
            self.oauth2.access_token_lifespan = humantime_serde::re::humantime::parse_duration(&raw)
                .map_err(|e| ConfigError::parse(format!("{ACCESS_TOKEN_LIFESPAN_VAR}: {e}")))?;
        }
        if let Some(level) = lookup(LOG_LEVEL_VAR) {
            self.logging.level = level;
        }
        if let Some(host) = lookup(EMULATOR_HOST_VAR) {
            self.datastore.emulator_host = Some(host);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.datastore_url()?;
        if self.oauth2.access_token_lifespan.is_zero() {
            return Err(ConfigError::validation("oauth2.access_token_lifespan must be > 0"));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::validation("logging.level must not be empty"));
        }
        Ok(())
    }

    /// The parsed datastore URL, honoring the configured emulator.
    pub fn datastore_url(&self) -> Result<DatastoreUrl> {
        DatastoreUrl::parse_with_emulator(&self.datastore.url, self.datastore.emulator_host.as_deref())
    }
}
