//! Connection handles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SocketError;

/// Opaque index of a connection in the registry.
///
/// Handles are assigned in allocation order starting at 0 and are never
/// reused, even after the connection behind them has been closed.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(usize);

impl ConnectionHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// Value handed back to the host (`client`).
    pub fn as_client_id(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-side client ids are signed; negative values never name a connection.
impl TryFrom<i64> for ConnectionHandle {
    type Error = SocketError;

    fn try_from(client: i64) -> Result<Self, Self::Error> {
        usize::try_from(client)
            .map(ConnectionHandle)
            .map_err(|_| SocketError::invalid(format!("client must be >= 0, got {client}")))
    }
}
