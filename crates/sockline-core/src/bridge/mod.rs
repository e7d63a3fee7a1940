//! IoBridge - handle を検証してから socket I/O を worker に投げる
//!
//! Flow for `send` / `receive`:
//! 1. resolve the handle in the registry
//! 2. take the connection's I/O gate (one operation in flight per handle)
//! 3. liveness check (dead transports are closed and reported as NotConnected)
//! 4. run the socket call on the worker pool (non-blocking tokio I/O)
//! 5. convert bytes <-> text through the codec
//!
//! The calling task only awaits; it never touches the socket itself. A read
//! waiting for data parks its own task, not a worker, so idle handles never
//! starve other handles.

mod pool;

pub use pool::IoWorkerPool;

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::codec::{self, Encoding};
use crate::config::ClientConfig;
use crate::error::{SocketError, SocketResult};
use crate::registry::{Connection, ConnectionHandle, ConnectionRegistry};

/// Bytes read by [`IoBridge::receive`], already converted to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub result: String,
    /// Encoding actually applied. Differs from the requested one only when
    /// utf8 was requested and the bytes were not valid UTF-8 (then base64).
    pub encoding: Encoding,
}

pub struct IoBridge {
    registry: Arc<ConnectionRegistry>,
    pool: IoWorkerPool,
    io_timeout: Option<Duration>,
}

impl IoBridge {
    /// Build a bridge and spawn its workers. Must be called inside a tokio runtime.
    pub fn new(registry: Arc<ConnectionRegistry>, config: &ClientConfig) -> Self {
        Self {
            registry,
            pool: IoWorkerPool::spawn(config.workers, config.queue_capacity),
            io_timeout: config.io_timeout(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Connect on tokio's blocking threads (DNS + handshake block), outside
    /// the pool so a slow handshake never delays send/read.
    pub async fn connect(&self, address: &str, port: u16) -> SocketResult<ConnectionHandle> {
        if self.pool.is_shutdown() {
            return Err(SocketError::Shutdown);
        }
        let registry = Arc::clone(&self.registry);
        let address = address.to_string();
        tokio::task::spawn_blocking(move || registry.connect(&address, port))
            .await
            .map_err(|e| {
                warn!(error = %e, "connect task failed");
                SocketError::Shutdown
            })?
    }

    pub async fn send(
        &self,
        handle: ConnectionHandle,
        data: &str,
        encoding: Encoding,
        timeout: Option<Duration>,
    ) -> SocketResult<()> {
        let (connection, gate) = self.acquire(handle).await?;
        let bytes = codec::decode(data, encoding)?;
        let mut stream = worker_stream(&connection)?;
        let timeout = timeout.or(self.io_timeout);
        let len = bytes.len();

        self.pool
            .submit(async move {
                let _gate = gate;
                with_timeout(timeout, async {
                    stream.write_all(&bytes).await?;
                    stream.flush().await
                })
                .await
            })
            .await?
            .map_err(|source| SocketError::Io { handle, source })?;

        debug!(client = %handle, bytes = len, %encoding, "sent");
        Ok(())
    }

    /// One bounded read of at most `max_length` bytes.
    ///
    /// A read that returns no bytes yields an empty result, not an error.
    pub async fn receive(
        &self,
        handle: ConnectionHandle,
        max_length: usize,
        encoding: Encoding,
        timeout: Option<Duration>,
    ) -> SocketResult<Received> {
        if max_length == 0 {
            return Err(SocketError::invalid("read length must be > 0"));
        }
        let (connection, gate) = self.acquire(handle).await?;
        let mut stream = worker_stream(&connection)?;
        let timeout = timeout.or(self.io_timeout);

        let bytes = self
            .pool
            .submit(async move {
                let _gate = gate;
                let mut buf = vec![0u8; max_length];
                let n = with_timeout(timeout, stream.read(&mut buf)).await?;
                buf.truncate(n);
                Ok::<_, io::Error>(buf)
            })
            .await?
            .map_err(|source| SocketError::Io { handle, source })?;

        let encoded = codec::encode(&bytes, encoding);
        if encoded.fell_back(encoding) {
            info!(client = %handle, bytes = bytes.len(), "payload is not valid utf8, returning base64");
        }
        debug!(client = %handle, bytes = bytes.len(), encoding = %encoded.encoding, "received");

        Ok(Received {
            result: encoded.text,
            encoding: encoded.encoding,
        })
    }

    /// Local close only, so no worker is involved.
    pub fn disconnect(&self, handle: ConnectionHandle) -> SocketResult<ConnectionHandle> {
        self.registry.disconnect(handle)
    }

    /// Stop taking work, close every connection, then join the workers.
    ///
    /// The registry refuses connects from here on, so a handshake still in
    /// flight cannot register a live connection after teardown. Closing the
    /// sockets wakes reads parked on them; they return an empty result.
    pub async fn shutdown(&self) {
        self.pool.request_shutdown();
        self.registry.shutdown_all();
        self.pool.shutdown_and_join().await;
    }

    async fn acquire(
        &self,
        handle: ConnectionHandle,
    ) -> SocketResult<(Arc<Connection>, OwnedMutexGuard<()>)> {
        let connection = self.registry.resolve(handle)?;
        // 同じ handle への send/read は gate で直列化する
        let gate = connection.io_gate().lock_owned().await;
        if !self.registry.check_liveness(&connection) {
            return Err(SocketError::NotConnected(handle));
        }
        Ok((connection, gate))
    }
}

/// Duplicate the connection's socket and register the copy with the runtime.
fn worker_stream(connection: &Connection) -> SocketResult<TcpStream> {
    let handle = connection.handle();
    match connection.clone_stream() {
        Some(stream) => stream
            .and_then(TcpStream::from_std)
            .map_err(|source| SocketError::Io { handle, source }),
        None => Err(SocketError::NotConnected(handle)),
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    io: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    let Some(limit) = timeout else {
        return io.await;
    };
    tokio::time::timeout(limit, io).await.map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("operation timed out after {limit:?}"),
        )
    })?
}
