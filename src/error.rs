use std::time::Duration;
use thiserror::Error;

use crate::model::Dialect;

/// Result type for Anthem operations
pub type Result<T> = std::result::Result<T, AnthemError>;

/// Errors that can occur when talking to an Anthem receiver
#[derive(Error, Debug)]
pub enum AnthemError {
    /// I/O error while dialing or talking to the device
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection was closed and will not be re-established
    #[error("Connection closed")]
    ConnectionClosed,

    /// No live transport to send on
    #[error("Not connected to receiver")]
    NotConnected,

    /// Model and MAC address were not learned before the deadline
    #[error("Device not ready after {0:?}")]
    DeviceNotReady(Duration),

    /// A setter argument was outside its documented range
    #[error("Invalid {what}: {value}")]
    InvalidValue {
        /// Which setting was rejected
        what: &'static str,
        /// The rejected value
        value: String,
    },

    /// No configured input has this name
    #[error("Unknown input: {0}")]
    UnknownInput(String),

    /// Zone number is not present on this model
    #[error("Unknown zone: {0}")]
    UnknownZone(u8),

    /// The active dialect has no command for this setting
    #[error("{feature} is not supported by {dialect} models")]
    Unsupported {
        /// The setting that was requested
        feature: &'static str,
        /// The dialect the device speaks
        dialect: Dialect,
    },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl AnthemError {
    pub(crate) fn invalid(what: &'static str, value: impl ToString) -> Self {
        AnthemError::InvalidValue {
            what,
            value: value.to_string(),
        }
    }
}
