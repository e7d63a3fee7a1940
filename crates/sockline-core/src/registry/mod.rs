//! Connection registry: handle allocation, lookup, liveness and close.

mod connection;
mod handle;

pub use connection::{Connection, ConnectionState};
pub use handle::ConnectionHandle;

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{LookupError, SocketError, SocketResult};
use crate::observability::RegistryCounts;

/// Append-only list of connections addressed by index.
///
/// Design:
/// - `connect` performs the TCP handshake without holding the lock, then
///   appends under the write lock. The handle is the index it lands at.
/// - Entries are never removed, so a handle stays resolvable for the life
///   of the registry even after its connection is closed.
/// - After `shutdown_all` the registry stays shut: `connect` fails with
///   `Shutdown` and a handshake that finishes late is closed, not appended.
/// - All methods here are synchronous; `connect` blocks on the network and
///   is driven from a blocking thread by [`crate::bridge::IoBridge`].
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<Connection>>>,
    // connections の write lock を持っている間だけ書き換える
    shut_down: AtomicBool,
    connect_timeout: Option<Duration>,
    nodelay: bool,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::from_config(&ClientConfig::default())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            connect_timeout: config.connect_timeout(),
            nodelay: config.nodelay,
        }
    }

    /// Open a new TCP stream and register it.
    pub fn connect(&self, address: &str, port: u16) -> SocketResult<ConnectionHandle> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SocketError::invalid("must provide ip address to connect"));
        }
        if port == 0 {
            return Err(SocketError::invalid("port must be 1-65535"));
        }
        if self.is_shut_down() {
            return Err(SocketError::Shutdown);
        }

        let stream = self
            .open_stream(address, port)
            // bridge は tokio の non-blocking I/O で読み書きする
            .and_then(|stream| stream.set_nonblocking(true).map(|()| stream))
            .map_err(|source| {
                warn!(address, port, error = %source, "connection failed");
                SocketError::Connect {
                    address: address.to_string(),
                    port,
                    source,
                }
            })?;
        if self.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            debug!(address, port, error = %e, "set_nodelay failed (ignored)");
        }

        let handle = {
            let mut connections = self.connections.write();
            if self.is_shut_down() {
                drop(connections);
                let _ = stream.shutdown(Shutdown::Both);
                info!(address, port, "registry shut down during connect, dropping stream");
                return Err(SocketError::Shutdown);
            }
            let handle = ConnectionHandle::new(connections.len());
            connections.push(Arc::new(Connection::new(
                handle,
                address.to_string(),
                port,
                stream,
            )));
            handle
        };
        info!(client = %handle, address, port, "connected");
        Ok(handle)
    }

    fn open_stream(&self, address: &str, port: u16) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect((address, port));
        };

        // 解決できたアドレスを順に試し、全部失敗したら最後のエラーを返す
        let mut last_error = None;
        for addr in (address, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {address}"),
            )
        }))
    }

    pub fn resolve(&self, handle: ConnectionHandle) -> Result<Arc<Connection>, LookupError> {
        let connections = self.connections.read();
        connections
            .get(handle.index())
            .cloned()
            .ok_or(LookupError::OutOfRange {
                handle,
                len: connections.len(),
            })
    }

    /// Check that the transport is still usable.
    ///
    /// A dead transport is closed on the spot and the connection is marked
    /// `Closed`, so later callers never see a stale `Live`.
    pub fn check_liveness(&self, connection: &Connection) -> bool {
        if connection.probe() {
            return true;
        }
        if connection.close() {
            info!(client = %connection.handle(), "peer closed the stream");
        }
        false
    }

    /// Close one connection. Returns the handle as acknowledgment.
    pub fn disconnect(&self, handle: ConnectionHandle) -> SocketResult<ConnectionHandle> {
        let connection = self.resolve(handle)?;
        if !connection.close() {
            return Err(SocketError::AlreadyClosed(handle));
        }
        info!(client = %handle, "disconnected");
        Ok(handle)
    }

    /// Close every transport regardless of state and stop accepting connects.
    /// Used at process teardown.
    ///
    /// Returns the number of connections that were still live.
    pub fn shutdown_all(&self) -> usize {
        let connections = self.connections.write();
        self.shut_down.store(true, Ordering::SeqCst);
        let closed = connections.iter().filter(|c| c.close()).count();
        info!(closed, total = connections.len(), "registry shut down");
        closed
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn is_live(&self, handle: ConnectionHandle) -> bool {
        self.resolve(handle).map(|c| c.is_live()).unwrap_or(false)
    }

    pub fn counts(&self) -> RegistryCounts {
        let connections = self.connections.read();
        let live = connections.iter().filter(|c| c.is_live()).count();
        RegistryCounts {
            total: connections.len(),
            live,
            closed: connections.len() - live,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
