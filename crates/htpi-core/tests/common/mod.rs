// In-memory channel transport for integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;

use htpi_api::{AckHandler, ChannelLink, ChannelSignal, ChannelTransport, Error};
use htpi_core::{ConnectionManager, CredentialStore, ReconnectPolicy};

/// What the next `open()` does.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Accept,
    /// Transient failure (counts against the reconnect budget).
    Refuse,
    /// Handshake rejected (not retried).
    Reject,
    /// Opens, then the gateway closes the link straight away.
    Flap,
}

/// Answers emitted events with zero or more acks.
pub type Responder = Arc<dyn Fn(&str, &Value) -> Vec<Value> + Send + Sync>;

pub struct FakeTransport {
    state: Mutex<TransportState>,
}

struct TransportState {
    script: VecDeque<Outcome>,
    opens: usize,
    tokens: Vec<String>,
    links: Vec<Arc<FakeLink>>,
    signals: Option<mpsc::UnboundedSender<ChannelSignal>>,
    responder: Responder,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TransportState {
                script: VecDeque::new(),
                opens: 0,
                tokens: Vec::new(),
                links: Vec::new(),
                signals: None,
                responder: Arc::new(|_, _| Vec::new()),
            }),
        })
    }

    /// Outcomes for the next `open()` calls; afterwards every open succeeds.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    pub fn respond_with(&self, responder: impl Fn(&str, &Value) -> Vec<Value> + Send + Sync + 'static) {
        self.state.lock().unwrap().responder = Arc::new(responder);
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }

    /// Links opened and not yet closed.
    pub fn live_links(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| !l.is_closed())
            .count()
    }

    pub fn last_link(&self) -> Option<Arc<FakeLink>> {
        self.state.lock().unwrap().links.last().cloned()
    }

    /// Deliver an event as if the gateway pushed it.
    pub fn push_event(&self, name: &str, payload: Value) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = &state.signals {
            let _ = tx.send(ChannelSignal::Event {
                name: name.to_owned(),
                payload,
            });
        }
    }

    /// Drop the current link from the gateway side.
    pub fn drop_link(&self) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = &state.signals {
            let _ = tx.send(ChannelSignal::Closed {
                reason: "server went away".into(),
            });
        }
    }
}

impl ChannelTransport for FakeTransport {
    fn open<'a>(
        &'a self,
        token: &'a SecretString,
        signals: mpsc::UnboundedSender<ChannelSignal>,
    ) -> BoxFuture<'a, Result<Arc<dyn ChannelLink>, Error>> {
        async move {
            tokio::task::yield_now().await;
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            state.tokens.push(token.expose_secret().to_owned());

            match state.script.pop_front().unwrap_or(Outcome::Accept) {
                Outcome::Accept => {
                    let link = Arc::new(FakeLink {
                        closed: AtomicBool::new(false),
                        emitted: Mutex::new(Vec::new()),
                        unanswered: Mutex::new(Vec::new()),
                        responder: Arc::clone(&state.responder),
                    });
                    state.links.push(Arc::clone(&link));
                    state.signals = Some(signals);
                    let link: Arc<dyn ChannelLink> = link;
                    Ok(link)
                }
                Outcome::Flap => {
                    let link = Arc::new(FakeLink {
                        closed: AtomicBool::new(false),
                        emitted: Mutex::new(Vec::new()),
                        unanswered: Mutex::new(Vec::new()),
                        responder: Arc::clone(&state.responder),
                    });
                    state.links.push(Arc::clone(&link));
                    let _ = signals.send(ChannelSignal::Closed {
                        reason: "namespace connect rejected".into(),
                    });
                    state.signals = Some(signals);
                    let link: Arc<dyn ChannelLink> = link;
                    Ok(link)
                }
                Outcome::Refuse => Err(Error::ChannelConnect("connection refused".into())),
                Outcome::Reject => Err(Error::ChannelRejected {
                    message: "invalid token".into(),
                }),
            }
        }
        .boxed()
    }

    fn endpoint(&self) -> String {
        "fake://gateway".into()
    }
}

pub struct FakeLink {
    closed: AtomicBool,
    emitted: Mutex<Vec<(String, Value)>>,
    unanswered: Mutex<Vec<(String, AckHandler)>>,
    responder: Responder,
}

impl FakeLink {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn emitted_count(&self, event: &str) -> usize {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }

    /// Ack every emit the responder left unanswered.
    pub fn ack_unanswered(&self, reply: &Value) -> usize {
        let handlers: Vec<AckHandler> = self
            .unanswered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in &handlers {
            handler(reply.clone());
        }
        handlers.len()
    }
}

impl ChannelLink for FakeLink {
    fn emit<'a>(
        &'a self,
        event: &'a str,
        payload: Value,
        ack: Option<AckHandler>,
    ) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            if self.is_closed() {
                return Err(Error::ChannelEmit("link closed".into()));
            }
            let replies = (self.responder)(event, &payload);
            self.emitted
                .lock()
                .unwrap()
                .push((event.to_owned(), payload));

            if let Some(ack) = ack {
                if replies.is_empty() {
                    self.unanswered
                        .lock()
                        .unwrap()
                        .push((event.to_owned(), ack));
                } else {
                    for reply in replies {
                        ack(reply);
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.closed.store(true, Ordering::SeqCst);
        async {}.boxed()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub fn store_with_token(token: &str) -> CredentialStore {
    let store = CredentialStore::in_memory();
    store
        .store_token(&SecretString::from(token.to_owned()))
        .unwrap();
    store
}

pub fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        max_attempts,
    }
}

pub fn manager(transport: &Arc<FakeTransport>, store: CredentialStore) -> ConnectionManager {
    let transport: Arc<dyn ChannelTransport> = transport.clone();
    ConnectionManager::new(transport, store, fast_policy(5))
}

/// Poll `condition` until it holds, failing after ~2s of (virtual) time.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
