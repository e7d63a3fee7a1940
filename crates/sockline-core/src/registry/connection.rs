//! Connection record: remote endpoint + transport + liveness.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use super::ConnectionHandle;

/// Connection state.
///
/// State transitions:
/// - (connecting) -> Live -> Closed
///
/// `Connecting` only exists inside `ConnectionRegistry::connect` and is never
/// stored. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Live,
    Closed,
}

struct Transport {
    stream: Option<TcpStream>,
    state: ConnectionState,
}

/// One logical connection owned by the registry.
pub struct Connection {
    handle: ConnectionHandle,
    address: String,
    port: u16,
    transport: Mutex<Transport>,

    /// Serializes send/read on this handle. Held for the whole operation,
    /// including the time a read spends waiting for data.
    io_gate: Arc<AsyncMutex<()>>,
}

impl Connection {
    pub(crate) fn new(handle: ConnectionHandle, address: String, port: u16, stream: TcpStream) -> Self {
        Self {
            handle,
            address,
            port,
            transport: Mutex::new(Transport {
                stream: Some(stream),
                state: ConnectionState::Live,
            }),
            io_gate: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.lock().state
    }

    pub fn is_live(&self) -> bool {
        self.state() == ConnectionState::Live
    }

    pub(crate) fn io_gate(&self) -> Arc<AsyncMutex<()>> {
        Arc::clone(&self.io_gate)
    }

    /// Duplicate the socket for an I/O job. `None` once the transport is released.
    pub(crate) fn clone_stream(&self) -> Option<io::Result<TcpStream>> {
        self.transport.lock().stream.as_ref().map(TcpStream::try_clone)
    }

    /// Ask the socket whether the peer is still there.
    ///
    /// Non-blocking peek: EOF or a hard error means the stream is dead,
    /// `WouldBlock` or pending bytes mean it is usable. The socket stays in
    /// non-blocking mode, which the bridge's tokio I/O relies on.
    pub(crate) fn probe(&self) -> bool {
        let guard = self.transport.lock();
        if guard.state == ConnectionState::Closed {
            return false;
        }
        let Some(stream) = guard.stream.as_ref() else {
            return false;
        };

        if stream.peer_addr().is_err() {
            return false;
        }
        if stream.set_nonblocking(true).is_err() {
            return false;
        }
        let mut buf = [0u8; 1];
        match stream.peek(&mut buf) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) => matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted),
        }
    }

    /// Release the transport and mark the connection closed.
    ///
    /// Returns `true` if this call performed the Live -> Closed transition.
    /// Close failures are logged and swallowed.
    pub(crate) fn close(&self) -> bool {
        let (stream, was_live) = {
            let mut guard = self.transport.lock();
            let was_live = guard.state == ConnectionState::Live;
            guard.state = ConnectionState::Closed;
            (guard.stream.take(), was_live)
        };

        if let Some(stream) = stream
            && let Err(e) = stream.shutdown(Shutdown::Both)
            && e.kind() != io::ErrorKind::NotConnected
        {
            debug!(client = %self.handle, error = %e, "close failed (ignored)");
        }
        was_live
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}
