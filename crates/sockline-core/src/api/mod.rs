//! API - ホスト向けの型付き呼び出し面
//!
//! [`SocketPlugin`] is the seam the host binds to: four calls taking typed
//! option structs. [`TcpSocket`] implements it on top of the registry and
//! the I/O bridge, validating arguments before any transport action.

pub mod host;
pub mod options;

pub use self::host::{Call, ErrorBody, Reply, Request, dispatch};
pub use self::options::{
    ConnectOptions, ConnectResult, DisconnectOptions, DisconnectResult, ReadOptions, ReadResult,
    SendOptions,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::IoBridge;
use crate::config::ClientConfig;
use crate::error::{SocketError, SocketResult};
use crate::registry::{ConnectionHandle, ConnectionRegistry};

#[async_trait]
pub trait SocketPlugin: Send + Sync {
    async fn connect(&self, options: ConnectOptions) -> SocketResult<ConnectResult>;

    async fn send(&self, options: SendOptions) -> SocketResult<()>;

    async fn read(&self, options: ReadOptions) -> SocketResult<ReadResult>;

    async fn disconnect(&self, options: DisconnectOptions) -> SocketResult<DisconnectResult>;
}

/// Handle-addressed TCP client.
///
/// # 使用例
/// ```ignore
/// let socket = TcpSocket::new(ClientConfig::default());
/// let ConnectResult { client } = socket
///     .connect(ConnectOptions { ip_address: Some("127.0.0.1".into()), port: Some(9100) })
///     .await?;
/// socket.send(SendOptions { client: Some(client), data: "48656c6c6f".into(),
///     encoding: Some(Encoding::Hex), timeout: None }).await?;
/// ```
pub struct TcpSocket {
    bridge: IoBridge,
    config: ClientConfig,
}

impl TcpSocket {
    /// Must be called inside a tokio runtime (spawns the I/O workers).
    pub fn new(config: ClientConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::from_config(&config));
        Self {
            bridge: IoBridge::new(registry, &config),
            config,
        }
    }

    pub fn bridge(&self) -> &IoBridge {
        &self.bridge
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.bridge.registry()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Teardown hook for the host process.
    pub async fn shutdown(&self) {
        self.bridge.shutdown().await;
    }
}

#[async_trait]
impl SocketPlugin for TcpSocket {
    async fn connect(&self, options: ConnectOptions) -> SocketResult<ConnectResult> {
        let address = options
            .ip_address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| SocketError::invalid("must provide ip address to connect"))?;
        let port = match options.port {
            None => self.config.default_port,
            Some(p) => u16::try_from(p)
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| SocketError::invalid(format!("port must be 1-65535, got {p}")))?,
        };

        let handle = self.bridge.connect(&address, port).await?;
        Ok(ConnectResult {
            client: handle.as_client_id(),
        })
    }

    async fn send(&self, options: SendOptions) -> SocketResult<()> {
        let handle = client_handle(options.client)?;
        let timeout = timeout_secs(options.timeout)?;
        self.bridge
            .send(
                handle,
                &options.data,
                options.encoding.unwrap_or_default(),
                timeout,
            )
            .await
    }

    async fn read(&self, options: ReadOptions) -> SocketResult<ReadResult> {
        let handle = client_handle(options.client)?;
        let max_length = match options.expect_len {
            None => self.config.default_read_len,
            Some(n) => usize::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| SocketError::invalid(format!("expectLen must be > 0, got {n}")))?,
        };
        let timeout = timeout_secs(options.timeout)?;

        let received = self
            .bridge
            .receive(
                handle,
                max_length,
                options.encoding.unwrap_or_default(),
                timeout,
            )
            .await?;
        Ok(ReadResult {
            result: received.result,
            encoding: received.encoding,
        })
    }

    async fn disconnect(&self, options: DisconnectOptions) -> SocketResult<DisconnectResult> {
        let handle = client_handle(options.client)?;
        let handle = self.bridge.disconnect(handle)?;
        Ok(DisconnectResult {
            client: handle.as_client_id(),
        })
    }
}

fn client_handle(client: Option<i64>) -> SocketResult<ConnectionHandle> {
    let client = client.ok_or_else(|| SocketError::invalid("no client specified"))?;
    ConnectionHandle::try_from(client)
}

fn timeout_secs(timeout: Option<u64>) -> SocketResult<Option<Duration>> {
    match timeout {
        None => Ok(None),
        Some(0) => Err(SocketError::invalid("timeout must be > 0 seconds")),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
    }
}
