//! Socket.IO implementation of the event channel.
//!
//! Wraps `rust_socketio`'s async client. The library's own reconnection is
//! switched off: reconnect policy belongs to the connection manager, which
//! opens a fresh link per attempt.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload, TransportType};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::{AckHandler, ChannelLink, ChannelSignal, ChannelTransport};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Where and how to reach the gateway's Socket.IO endpoint.
#[derive(Debug, Clone)]
pub struct SocketIoConfig {
    /// Gateway base URL, e.g. `http://localhost:8000`.
    pub url: Url,
    /// Socket.IO namespace (`/` for the default namespace).
    pub namespace: String,
    /// TLS settings shared with the REST client.
    pub transport: TransportConfig,
    /// How long the library keeps an ack callback registered.
    pub ack_timeout: Duration,
}

/// Opens Socket.IO links to the gateway.
pub struct SocketIoTransport {
    config: SocketIoConfig,
}

impl SocketIoTransport {
    pub fn new(config: SocketIoConfig) -> Self {
        Self { config }
    }
}

impl ChannelTransport for SocketIoTransport {
    fn open<'a>(
        &'a self,
        token: &'a SecretString,
        signals: mpsc::UnboundedSender<ChannelSignal>,
    ) -> BoxFuture<'a, Result<Arc<dyn ChannelLink>, Error>> {
        async move {
            info!(url = %self.config.url, namespace = %self.config.namespace, "opening Socket.IO channel");

            let mut builder = ClientBuilder::new(self.config.url.as_str())
                .namespace(self.config.namespace.as_str())
                .transport_type(TransportType::Websocket)
                .auth(json!({ "token": token.expose_secret() }))
                .reconnect(false);

            if let Some(connector) = self.config.transport.build_tls_connector()? {
                builder = builder.tls_config(connector);
            }

            let on_event = signals.clone();
            let on_close = signals.clone();
            let on_error = signals;

            let client = builder
                .on_any(move |event, payload, _| {
                    let tx = on_event.clone();
                    async move {
                        let name = String::from(event);
                        let payload = first_value(payload).unwrap_or(Value::Null);
                        debug!(event = %name, "channel event received");
                        let _ = tx.send(ChannelSignal::Event { name, payload });
                    }
                    .boxed()
                })
                .on(Event::Close, move |_, _| {
                    let tx = on_close.clone();
                    async move {
                        warn!("Socket.IO channel closed");
                        let _ = tx.send(ChannelSignal::Closed {
                            reason: "closed by peer".into(),
                        });
                    }
                    .boxed()
                })
                .on(Event::Error, move |payload, _| {
                    let tx = on_error.clone();
                    async move {
                        let reason = first_value(payload)
                            .map_or_else(|| "transport error".to_owned(), |v| v.to_string());
                        warn!(%reason, "Socket.IO channel error");
                        let _ = tx.send(ChannelSignal::Closed { reason });
                    }
                    .boxed()
                })
                .connect()
                .await
                .map_err(classify_connect_error)?;

            info!("Socket.IO channel connected");

            let link: Arc<dyn ChannelLink> = Arc::new(SocketIoLink {
                client,
                ack_timeout: self.config.ack_timeout,
            });
            Ok(link)
        }
        .boxed()
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.config.url, self.config.namespace.trim_start_matches('/'))
    }
}

// ── Link ─────────────────────────────────────────────────────────────

struct SocketIoLink {
    client: Client,
    ack_timeout: Duration,
}

impl ChannelLink for SocketIoLink {
    fn emit<'a>(
        &'a self,
        event: &'a str,
        payload: Value,
        ack: Option<AckHandler>,
    ) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            let result = match ack {
                None => self.client.emit(event, payload).await,
                Some(ack) => {
                    self.client
                        .emit_with_ack(event, payload, self.ack_timeout, move |reply, _| {
                            let ack = Arc::clone(&ack);
                            async move {
                                match first_value(reply) {
                                    Some(value) => ack(value),
                                    None => debug!("ack without JSON payload ignored"),
                                }
                            }
                            .boxed()
                        })
                        .await
                }
            };
            result.map_err(|e| Error::ChannelEmit(e.to_string()))
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        async move {
            if let Err(e) = self.client.disconnect().await {
                debug!(error = %e, "Socket.IO disconnect error (ignored)");
            }
        }
        .boxed()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// First JSON value of a payload; binary payloads carry nothing we use.
fn first_value(payload: Payload) -> Option<Value> {
    match payload {
        Payload::Text(values) => values.into_iter().next(),
        _ => None,
    }
}

/// Separate handshake rejections from plain connectivity failures.
fn classify_connect_error(err: rust_socketio::Error) -> Error {
    let message = err.to_string();
    if looks_like_auth_rejection(&message) {
        Error::ChannelRejected { message }
    } else {
        Error::ChannelConnect(message)
    }
}

fn looks_like_auth_rejection(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["unauthorized", "authentication", "invalid token", "forbidden"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_takes_leading_json() {
        let payload = Payload::Text(vec![json!({ "success": true }), json!(2)]);
        assert_eq!(first_value(payload), Some(json!({ "success": true })));
    }

    #[test]
    fn empty_text_payload_has_no_value() {
        assert_eq!(first_value(Payload::Text(Vec::new())), None);
    }

    #[test]
    fn auth_rejection_detection() {
        assert!(looks_like_auth_rejection("Connect error: Unauthorized"));
        assert!(looks_like_auth_rejection("invalid token supplied"));
        assert!(!looks_like_auth_rejection("connection refused (os error 111)"));
    }

    #[test]
    fn endpoint_includes_namespace() {
        let transport = SocketIoTransport::new(SocketIoConfig {
            url: Url::parse("http://localhost:8000").unwrap_or_else(|_| unreachable!()),
            namespace: "/portal".into(),
            transport: TransportConfig::default(),
            ack_timeout: Duration::from_secs(30),
        });
        assert_eq!(transport.endpoint(), "http://localhost:8000/portal");
    }
}
