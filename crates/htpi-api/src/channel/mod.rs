//! Event channel abstraction.
//!
//! The gateway speaks named JSON events over a single persistent
//! connection. This module defines the seam between the connection
//! manager in `htpi-core` and a concrete wire transport: a
//! [`ChannelTransport`] opens authenticated [`ChannelLink`]s and reports
//! everything the peer sends through an unbounded [`ChannelSignal`] queue.
//!
//! The production transport is [`socketio::SocketIoTransport`]; tests
//! substitute an in-memory fake.

pub mod socketio;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Error;

pub use socketio::{SocketIoConfig, SocketIoTransport};

/// Acknowledgement callback attached to an emitted event.
///
/// Transports may invoke it zero, one, or several times; callers must
/// tolerate all three.
pub type AckHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Something the remote side of a link did.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// A named event arrived.
    Event { name: String, payload: Value },
    /// The link went away without being asked to.
    Closed { reason: String },
}

/// Opens authenticated links to the gateway.
pub trait ChannelTransport: Send + Sync {
    /// Open a new link, presenting `token` in the handshake.
    ///
    /// Inbound events and the eventual close are pushed into `signals`
    /// in the order the transport received them.
    fn open<'a>(
        &'a self,
        token: &'a SecretString,
        signals: mpsc::UnboundedSender<ChannelSignal>,
    ) -> BoxFuture<'a, Result<Arc<dyn ChannelLink>, Error>>;

    /// Human-readable endpoint description for logs and errors.
    fn endpoint(&self) -> String;
}

/// One live connection to the gateway.
pub trait ChannelLink: Send + Sync {
    /// Write an event, optionally requesting an acknowledgement.
    fn emit<'a>(
        &'a self,
        event: &'a str,
        payload: Value,
        ack: Option<AckHandler>,
    ) -> BoxFuture<'a, Result<(), Error>>;

    /// Close the link. Closing twice is harmless.
    fn close(&self) -> BoxFuture<'_, ()>;
}

// ── Acknowledgement envelope ─────────────────────────────────────────

/// Structured error carried inside an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// The `{ success, data?, error? }` shape every acknowledgement carries.
///
/// Some gateway handlers put a bare `message` next to `success: false`
/// instead of an `error` object; both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "lenient_error")]
    pub error: Option<AckError>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AckEnvelope {
    /// Best available failure description.
    pub fn failure_message(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.message.clone())
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "request rejected by gateway".into())
    }

    pub fn failure_code(&self) -> Option<String> {
        self.error.as_ref().and_then(|e| e.code.clone())
    }
}

/// Accept `error` as an object, a plain string, or null.
fn lenient_error<'de, D>(deserializer: D) -> Result<Option<AckError>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Structured(AckError),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Structured(e)) => Some(e),
        Some(Raw::Text(message)) => Some(AckError {
            code: None,
            message,
        }),
        None => None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_with_data() {
        let env: AckEnvelope =
            serde_json::from_value(json!({ "success": true, "data": { "id": "P1" } })).unwrap();
        assert!(env.success);
        assert_eq!(env.data, Some(json!({ "id": "P1" })));
    }

    #[test]
    fn envelope_with_structured_error() {
        let env: AckEnvelope = serde_json::from_value(json!({
            "success": false,
            "error": { "code": "NOT_FOUND", "message": "Patient not found" }
        }))
        .unwrap();
        assert_eq!(env.failure_message(), "Patient not found");
        assert_eq!(env.failure_code().as_deref(), Some("NOT_FOUND"));
    }

    #[test]
    fn envelope_with_string_error_or_message() {
        let env: AckEnvelope =
            serde_json::from_value(json!({ "success": false, "error": "denied" })).unwrap();
        assert_eq!(env.failure_message(), "denied");
        assert!(env.failure_code().is_none());

        let env: AckEnvelope =
            serde_json::from_value(json!({ "success": false, "message": "try later" })).unwrap();
        assert_eq!(env.failure_message(), "try later");
    }
}
