//! Error types for the address model and the transfer engine.
//!
//! # Design
//! Each subsystem gets its own enum so callers never match on variants that
//! cannot occur on their path. `PathTooLong` carries both the offending
//! length and the platform capacity because the capacity differs by OS and
//! callers usually want to report it. Transport failures keep the raw code
//! opaque; the engine passes it through without interpretation.

use thiserror::Error;

use crate::addr::AddressFamily;

/// Errors returned by socket address construction and conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The text is not a valid presentation-form address for the family.
    #[error("invalid address string for {family:?}")]
    InvalidFormat { family: AddressFamily },

    /// Binary-to-text conversion failed (family and byte layout disagree).
    #[error("cannot render address bytes as {family:?}")]
    Conversion { family: AddressFamily },

    /// A UNIX path does not fit in `sun_path`, terminator included.
    /// The stored path is left untouched when this is returned.
    #[error("unix socket path of {len} bytes exceeds capacity {max} (including terminator)")]
    PathTooLong { len: usize, max: usize },
}

/// A failure reported by the transport collaborator.
///
/// The code is opaque to the engine; its meaning is defined by whichever
/// transport implementation produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport error {code}: {message}")]
pub struct TransportFailure {
    pub code: i32,
    pub message: String,
}

impl TransportFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors returned by `TransferSession` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The blocking transfer failed. Terminal for the session.
    #[error(transparent)]
    Transport(#[from] TransportFailure),

    /// A result accessor was called before `perform` completed.
    #[error("transfer has not been performed yet")]
    NotYetPerformed,

    /// Pull-style header iteration was requested but the transport library
    /// version does not provide it.
    #[error("transport library does not support header iteration")]
    UnsupportedCapability,
}
