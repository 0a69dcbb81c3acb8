//! Errors for AIS tracker
use std::fmt;

use thiserror::Error;

use crate::models::Mmsi;

/// Pipeline stage in which a fatal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Connect,
    Subscribe,
    Receive,
    StoreWrite,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Connect => "connect",
            Stage::Subscribe => "subscribe",
            Stage::Receive => "receive",
            Stage::StoreWrite => "store-write",
        };
        f.write_str(name)
    }
}

/// Fatal errors, each of which terminates the tracker
#[derive(Error, Debug)]
pub enum AisTrackerError {
    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Invalid MMSI: {0}")]
    InvalidMmsi(String),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}

impl AisTrackerError {
    /// Stage to report in the terminal diagnostic
    pub fn stage(&self) -> Stage {
        match self {
            AisTrackerError::Stream(e) => e.stage(),
            AisTrackerError::Store(_) | AisTrackerError::DatabaseError(_) => Stage::StoreWrite,
            _ => Stage::Config,
        }
    }
}

/// A single inbound frame could not be turned into an envelope.
///
/// Never fatal: the frame is dropped and the stream continues.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{0} frame carries no {0} payload")]
    MissingPayload(&'static str),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        source: serde_json::Error,
    },

    #[error("invalid MMSI {0}")]
    InvalidMmsi(u32),

    #[error("position out of range for MMSI {mmsi}: lat={lat} lon={lon}")]
    InvalidPosition { mmsi: Mmsi, lat: f64, lon: f64 },

    #[error("frame carries no MessageType")]
    MissingMessageType,

    /// Error reported by the feed itself, e.g. a rejected API key
    #[error("feed reported an error: {0}")]
    Feed(String),
}

impl DecodeError {
    /// The frame was an error report from the feed rather than data
    pub fn is_feed_error(&self) -> bool {
        matches!(self, DecodeError::Feed(_))
    }
}

/// Transport failures of the feed connection
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("connect to {url} failed: {source}")]
    Connect {
        url: String,
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("sending subscription failed: {0}")]
    Subscribe(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("receive failed: {0}")]
    Receive(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("feed closed the connection: {reason}")]
    ClosedByFeed { reason: String },
}

impl StreamError {
    pub fn stage(&self) -> Stage {
        match self {
            StreamError::Connect { .. } => Stage::Connect,
            StreamError::Subscribe(_) => Stage::Subscribe,
            StreamError::Receive(_) | StreamError::ClosedByFeed { .. } => Stage::Receive,
        }
    }
}

/// Outcome of a failed position write
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store refused this one write; later writes may still succeed.
    #[error("write for MMSI {mmsi} rejected: {message}")]
    Request { mmsi: Mmsi, message: String },

    /// The store cannot be used at all.
    #[error("store unavailable: {message}")]
    Connectivity { message: String },
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Connectivity { .. })
    }
}
