//! Driver error taxonomy
//!
//! These errors never leave the connection layer: they are logged there and
//! folded into the boolean result the command surface works with.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    /// The platform has no connectable handle for this address
    #[error("Device {0} not found by the bluetooth stack")]
    DeviceNotFound(String),

    #[error("Connection failed after {attempts} attempt(s): {reason}")]
    ConnectionFailed { attempts: u32, reason: String },

    /// Write or notify characteristic missing after connect
    #[error("Required characteristics not found")]
    CharacteristicsMissing,

    #[error("Failed to enable notifications: {0}")]
    SubscribeFailed(String),

    #[error("Error writing to device: {0}")]
    WriteFailed(String),

    #[error("Link lost without a driver-initiated disconnect")]
    UnexpectedDisconnect,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid bluetooth address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;
