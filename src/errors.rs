// SPDX-License-Identifier: GPL-3.0-only

//! Error types for capture sessions

use thiserror::Error;

/// Result type alias for session-level operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can end or prevent a capture session
///
/// `Configuration`, `Resource` and `Device` are fatal to session startup and
/// trigger a full rollback of partially acquired resources. `Frame` is
/// recoverable: the frame is dropped and the request recycled.
/// `ProtocolViolation` indicates a broken state-machine contract and is fatal.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid format, size or role requested
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Buffer allocation or mapping failed
    #[error("resource error: {0}")]
    Resource(String),
    /// The device refused to acquire, configure, start or queue
    #[error("device error: {0}")]
    Device(String),
    /// A completed request reported a non-success status
    #[error("frame error: {0}")]
    Frame(String),
    /// A request was driven through an invalid state transition
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl From<MapError> for SessionError {
    fn from(err: MapError) -> Self {
        SessionError::Resource(err.to_string())
    }
}

/// Errors from mapping frame buffer planes into process memory
#[derive(Debug, Error)]
pub enum MapError {
    /// The buffer descriptor has no planes
    #[error("buffer has no planes")]
    NoPlanes,
    /// A plane has zero length
    #[error("plane {plane} has zero length")]
    EmptyPlane { plane: usize },
    /// A plane does not fit inside its backing handle
    #[error(
        "plane {plane} is out of range: offset {offset} + length {length} \
         exceeds handle size {size}"
    )]
    OutOfRange {
        plane: usize,
        offset: usize,
        length: usize,
        size: u64,
    },
    /// Querying the total size of a backing handle failed
    #[error("failed to query handle size: {0}")]
    SizeQuery(#[source] std::io::Error),
    /// The underlying mapping call failed
    #[error("failed to map handle: {0}")]
    MapFailed(#[source] std::io::Error),
}

impl MapError {
    /// Platform error code of the underlying failure, if there is one
    pub fn os_error(&self) -> Option<i32> {
        match self {
            MapError::SizeQuery(e) | MapError::MapFailed(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
