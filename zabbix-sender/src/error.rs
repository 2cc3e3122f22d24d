use std::{io, time::Duration};

use thiserror::Error;

/// Errors that could occur while sending a batch of items to the trapper.
///
/// Whatever the kind, the items of the failed batch have already been requeued (if still fresh) or dropped by the
/// time the error is handed to the caller.
#[derive(Debug, Error)]
pub enum SendError {
    /// The round trip did not complete within the configured timeout.
    #[error("socket timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established, or failed while in use.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The request could not be encoded, or the server replied with something that is not a valid trapper response.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SendError {
    /// Returns `true` if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SendError::Timeout(_))
    }

    /// Returns `true` if this error is a protocol error.
    pub fn is_protocol(&self) -> bool {
        matches!(self, SendError::Protocol(_))
    }
}

/// Errors that could occur while encoding a request or decoding a trapper response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The response did not start with the expected magic and version bytes.
    #[error("invalid response header")]
    InvalidHeader,

    /// The payload could not be converted to or from JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// The encoded request payload does not fit in the frame's 32-bit length field.
    #[error("payload of {0} bytes exceeds the maximum frame size")]
    PayloadTooLarge(usize),
}

/// Errors that could occur when adding an item to the backlog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    /// The item key was empty.
    #[error("item key must not be empty")]
    EmptyKey,

    /// The nanosecond component of the item timestamp was outside `0..=999_999_999`.
    #[error("nanoseconds out of range: {0}")]
    NanosecondsOutOfRange(u32),
}
