//! Typed request / response structs, one pair per operation.
//!
//! Field names follow the host's camelCase wire format (`ipAddress`,
//! `expectLen`). Everything a caller may omit is `Option` and is defaulted
//! or validated by [`super::TcpSocket`], not by serde, so a missing field
//! surfaces as `InvalidArgument` rather than a parse error.

use serde::{Deserialize, Serialize};

use crate::codec::Encoding;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Defaults to `ClientConfig::default_port` (9100).
    #[serde(default)]
    pub port: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub client: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default)]
    pub client: Option<i64>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub encoding: Option<Encoding>,
    /// Seconds. Overrides `ClientConfig::io_timeout_ms` for this call.
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    #[serde(default)]
    pub client: Option<i64>,
    /// Defaults to `ClientConfig::default_read_len` (1024).
    #[serde(default)]
    pub expect_len: Option<i64>,
    /// Seconds. Overrides `ClientConfig::io_timeout_ms` for this call.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub encoding: Option<Encoding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    pub result: String,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectOptions {
    #[serde(default)]
    pub client: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResult {
    pub client: i64,
}
