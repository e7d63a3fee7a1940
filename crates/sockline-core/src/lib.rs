//! sockline-core
//!
//! Handle-addressed TCP client registry with non-blocking send/read and a
//! text encoding bridge (utf8 / base64 / hex).
//!
//! # モジュール構成
//! - **codec**: bytes <-> text 変換（utf8 失敗時は base64 にフォールバック）
//! - **registry**: ConnectionHandle の払い出し、lookup、liveness、close
//! - **bridge**: handle 検証 → worker pool で blocking I/O → codec
//! - **api**: ホスト向けの型付き request/response と `SocketPlugin` trait
//! - **config**: ClientConfig（TOML + 環境変数）
//! - **error**: SocketError / ErrorKind
//! - **observability**: logging 初期化と RegistryCounts

pub mod api;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod observability;
pub mod registry;

pub use api::{SocketPlugin, TcpSocket};
pub use bridge::{IoBridge, Received};
pub use codec::{Encoding, decode, encode};
pub use config::ClientConfig;
pub use error::{ErrorKind, LookupError, SocketError, SocketResult};
pub use registry::{Connection, ConnectionHandle, ConnectionRegistry, ConnectionState};
