use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::CodecError;
use crate::registry::ConnectionHandle;

/// Classification reported to the host alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    OutOfRange,
    Connect,
    NotConnected,
    AlreadyClosed,
    BadEncoding,
    IoFailure,
    Shutdown,
    /// Host-side failure that is not a socket error (e.g. a reply that could
    /// not be serialized). Never produced by [`SocketError::kind`].
    Internal,
}

/// Handle lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("client {handle} is out of range (registry holds {len} connections)")]
    OutOfRange { handle: ConnectionHandle, len: usize },
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("failed to connect to {address}:{port}: {source}")]
    Connect {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("socket not connected (client {0})")]
    NotConnected(ConnectionHandle),

    #[error("client {0} is already closed")]
    AlreadyClosed(ConnectionHandle),

    #[error("bad encoding: {0}")]
    BadEncoding(#[from] CodecError),

    #[error("i/o failure on client {handle}: {source}")]
    Io {
        handle: ConnectionHandle,
        #[source]
        source: io::Error,
    },

    #[error("socket client is shut down")]
    Shutdown,
}

impl SocketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SocketError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SocketError::Lookup(LookupError::OutOfRange { .. }) => ErrorKind::OutOfRange,
            SocketError::Connect { .. } => ErrorKind::Connect,
            SocketError::NotConnected(_) => ErrorKind::NotConnected,
            SocketError::AlreadyClosed(_) => ErrorKind::AlreadyClosed,
            SocketError::BadEncoding(_) => ErrorKind::BadEncoding,
            SocketError::Io { .. } => ErrorKind::IoFailure,
            SocketError::Shutdown => ErrorKind::Shutdown,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SocketError::InvalidArgument(message.into())
    }
}

pub type SocketResult<T> = Result<T, SocketError>;
