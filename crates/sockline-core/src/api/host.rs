//! Host marshalling: one JSON request in, one JSON reply out.
//!
//! ```text
//! {"id": 1, "method": "connect", "ipAddress": "127.0.0.1", "port": 9100}
//! {"id": 1, "ok": true, "value": {"client": 0}}
//! {"id": 2, "ok": false, "error": {"kind": "not_connected", "message": "..."}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::SocketPlugin;
use super::options::{ConnectOptions, DisconnectOptions, ReadOptions, SendOptions};
use crate::error::{ErrorKind, SocketError, SocketResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Call {
    Connect(ConnectOptions),
    Send(SendOptions),
    Read(ReadOptions),
    Disconnect(DisconnectOptions),
}

impl Call {
    pub fn method(&self) -> &'static str {
        match self {
            Call::Connect(_) => "connect",
            Call::Send(_) => "send",
            Call::Read(_) => "read",
            Call::Disconnect(_) => "disconnect",
        }
    }
}

/// A call plus an optional caller-chosen id echoed in the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SocketError> for ErrorBody {
    fn from(err: &SocketError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn success(id: Option<Value>, value: Value) -> Self {
        Self {
            id,
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: ErrorBody) -> Self {
        Self {
            id,
            ok: false,
            value: None,
            error: Some(error),
        }
    }
}

/// Run one request against a plugin and build the reply.
pub async fn dispatch(plugin: &dyn SocketPlugin, request: Request) -> Reply {
    let Request { id, call } = request;
    debug!(id = ?id, method = call.method(), "dispatching call");
    let result = match call {
        Call::Connect(opts) => reply_value(plugin.connect(opts).await),
        Call::Send(opts) => reply_value(
            plugin
                .send(opts)
                .await
                .map(|()| Value::Object(Default::default())),
        ),
        Call::Read(opts) => reply_value(plugin.read(opts).await),
        Call::Disconnect(opts) => reply_value(plugin.disconnect(opts).await),
    };

    match result {
        Ok(value) => Reply::success(id, value),
        Err(body) => Reply::failure(id, body),
    }
}

fn reply_value<T: Serialize>(result: SocketResult<T>) -> Result<Value, ErrorBody> {
    let value = result.map_err(|err| ErrorBody::from(&err))?;
    serde_json::to_value(value).map_err(|e| {
        warn!(error = %e, "failed to serialize result");
        ErrorBody {
            kind: ErrorKind::Internal,
            message: format!("failed to serialize result: {e}"),
        }
    })
}
