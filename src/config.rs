//! Application configuration

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::{
    errors::AisTrackerError,
    models::{BoundingBox, Mmsi},
    subscription::SubscriptionRequest,
};

pub const DEFAULT_STREAM_URL: &str = "wss://stream.aisstream.io/v0/stream";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub stream: StreamConfig,
    /// Without a database, positions are kept in memory only
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_url")]
    pub url: String,
    pub api_key: String,
    pub bounding_boxes: Vec<BoundingBox>,
    #[serde(default)]
    pub mmsi: Vec<Mmsi>,
    #[serde(default)]
    pub message_types: Vec<String>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Reconnect attempts after a transport failure; 0 makes failures fatal
    #[serde(default)]
    pub max_retries: u32,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_max_backoff")]
    pub max_backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: Duration,
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_table() -> String {
    "vessel_positions".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(10)
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("AISTRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("stream.mmsi")
                    .with_list_parse_key("stream.message_types"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), AisTrackerError> {
        self.stream.validate()?;
        match &self.database {
            Some(database) => database.validate()?,
            None => warn!("No database configured, positions will only be kept in memory"),
        }
        Ok(())
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), AisTrackerError> {
        if !(self.url.starts_with("wss://") || self.url.starts_with("ws://")) {
            return Err(AisTrackerError::ConfigurationError {
                message: format!("Stream URL must be a websocket URL: {}", self.url),
            });
        }
        self.reconnect.validate()?;
        self.subscription().map(|_| ())
    }

    /// Build the subscription request sent on every (re)connect
    pub fn subscription(&self) -> Result<SubscriptionRequest, AisTrackerError> {
        Ok(SubscriptionRequest::new(
            self.api_key.clone(),
            self.bounding_boxes.clone(),
            self.mmsi.iter().copied(),
        )?
        .with_message_types(self.message_types.iter().cloned()))
    }
}

impl ReconnectConfig {
    fn validate(&self) -> Result<(), AisTrackerError> {
        if self.max_retries > 0 && self.initial_backoff.is_zero() {
            return Err(AisTrackerError::ConfigurationError {
                message: "Initial backoff must be greater than zero".to_string(),
            });
        }
        if self.max_backoff < self.initial_backoff {
            return Err(AisTrackerError::ConfigurationError {
                message: "Maximum backoff must not be less than initial backoff".to_string(),
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), AisTrackerError> {
        if self.url.trim().is_empty() {
            return Err(AisTrackerError::ConfigurationError {
                message: "Database URL cannot be empty".to_string(),
            });
        }
        if !is_identifier(&self.table) {
            return Err(AisTrackerError::ConfigurationError {
                message: format!("Invalid table name: {}", self.table),
            });
        }
        if self.max_connections == 0 {
            return Err(AisTrackerError::ConfigurationError {
                message: "Database pool needs at least one connection".to_string(),
            });
        }
        Ok(())
    }
}

/// Plain, unquoted SQL identifier
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
