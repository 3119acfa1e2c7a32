//! Configuration for gatehouse deployments.
//!
//! - [`settings`] - the [`GatehouseConfig`] tree, loaded from TOML and the environment
//! - [`datastore`] - parsing of `datastore://` connection URLs
//! - [`logging`] - tracing subscriber setup
//!
//! ```ignore
//! use gatehouse_config::{GatehouseConfig, logging};
//!
//! let config = GatehouseConfig::load(Some("gatehouse.toml".as_ref()))?;
//! logging::init_tracing(&config.logging);
//! let url = config.datastore_url()?;
//! ```

pub mod datastore;
pub mod logging;
pub mod settings;

pub use datastore::{DATASTORE_SCHEME, DatastoreUrl};
pub use logging::{LogFormat, init_tracing};
pub use settings::{DatastoreConfig, GatehouseConfig, LoggingConfig, OAuth2Config};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid datastore URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
