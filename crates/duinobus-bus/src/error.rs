use std::path::PathBuf;
use std::time::Duration;

use duinobus_frame::{FrameError, UnpackError};
use duinobus_transport::TransportError;

/// Errors surfaced by bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The underlying byte transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A packet could not be framed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A packet payload did not hold the expected fields.
    #[error("malformed payload: {0}")]
    Unpack(#[from] UnpackError),

    /// The bus has not been opened, or has been closed.
    #[error("bus is not open")]
    NotOpen,

    /// `open` was called on a bus that is already running.
    #[error("bus is already open")]
    AlreadyOpen,

    /// No response arrived within the deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The reader stopped while the bus was still open.
    #[error("bus reader stopped; close and reopen the bus")]
    Disconnected,

    /// A thread panicked while holding bus state.
    #[error("bus {0} lock poisoned")]
    LockPoisoned(&'static str),

    /// The bus configuration could not be parsed.
    #[error("invalid bus configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The bus configuration holds a value the bus cannot run with.
    #[error("invalid bus configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// The bus configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BusError {
    /// Returns true if waiting longer might have produced a response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BusError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
