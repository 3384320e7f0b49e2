//! # Error Definitions
//!
//! Failures that can occur while preparing a value to cross the channel.

/// Failures in the wire layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The byte buffer was already moved to a peer by a previous transfer.
    BufferDetached,
    /// The port was already moved to a peer by a previous transfer.
    PortDetached,
    /// Ports cannot be deep-copied; they must appear in the transfer list.
    PortRequiresTransfer,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BufferDetached => {
                write!(f, "The byte buffer has been detached by a previous transfer.")
            }
            Self::PortDetached => {
                write!(f, "The port has been detached by a previous transfer.")
            }
            Self::PortRequiresTransfer => {
                write!(f, "Ports can only cross the channel by transfer.")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for wire-layer operations.
pub type Result<T> = std::result::Result<T, Error>;
