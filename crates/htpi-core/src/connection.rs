// ── Connection manager ──
//
// Owns the single live event channel. Connect is authenticated with the
// stored token and serialized so at most one link exists; a dropped link is
// re-established in the background under the shared `ReconnectPolicy`.
// Listeners are held here rather than on the link, so they survive
// reconnects without re-registration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use htpi_api::{AckHandler, ChannelLink, ChannelSignal, ChannelTransport, ReconnectPolicy};

use crate::credentials::CredentialStore;
use crate::error::CoreError;

/// Local event dispatched to listeners after a dropped link is re-established.
pub const RECONNECT_EVENT: &str = "reconnect";

/// A link that stays up this long, or delivers an event, resets the drop count.
const STABLE_LINK: Duration = Duration::from_secs(10);

// ── ConnectionStatus ─────────────────────────────────────────────────

/// Channel state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnection gave up or the gateway refused the credentials.
    Failed,
}

// ── Listener registry ────────────────────────────────────────────────

/// Handle returned by [`ConnectionManager::on`] for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    by_event: DashMap<String, Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn add(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_event
            .entry(event.to_owned())
            .or_default()
            .push((id, listener));
        id
    }

    fn remove(&self, event: &str, id: Option<ListenerId>) {
        match id {
            None => {
                self.by_event.remove(event);
            }
            Some(id) => {
                let now_empty = self.by_event.get_mut(event).is_some_and(|mut list| {
                    list.retain(|(lid, _)| *lid != id);
                    list.is_empty()
                });
                if now_empty {
                    self.by_event.remove_if(event, |_, list| list.is_empty());
                }
            }
        }
    }

    /// Invoke every listener for `event` in registration order.
    ///
    /// Handlers run outside the map lock so they may register or remove
    /// listeners themselves.
    fn dispatch(&self, event: &str, payload: &Value) {
        let handlers: Vec<Listener> = self
            .by_event
            .get(event)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(event, "no listener for channel event");
        }
        for handler in handlers {
            handler(payload);
        }
    }

    fn count(&self, event: &str) -> usize {
        self.by_event.get(event).map_or(0, |list| list.len())
    }
}

// ── ConnectionManager ────────────────────────────────────────────────

/// The single owner of the gateway event channel.
///
/// Cheaply cloneable via `Arc<ConnectionInner>`.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    transport: Arc<dyn ChannelTransport>,
    credentials: CredentialStore,
    policy: ReconnectPolicy,
    status: watch::Sender<ConnectionStatus>,
    /// Consecutive failed attempts in the current connect/reconnect run.
    attempts: AtomicU32,
    /// Consecutive drops of links that never proved stable.
    drops: AtomicU32,
    /// Set once a link has been established since the last explicit disconnect.
    was_connected: AtomicBool,
    link: Mutex<LinkState>,
    /// Serializes connect and reconnect runs.
    connect_lock: Mutex<()>,
    listeners: ListenerRegistry,
}

struct LinkState {
    link: Option<Arc<dyn ChannelLink>>,
    /// Cancelled by `disconnect()`; replaced with a fresh token each time.
    cancel: CancellationToken,
    /// Bumped per installed link so a stale pump cannot tear down a newer one.
    generation: u64,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        credentials: CredentialStore,
        policy: ReconnectPolicy,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(ConnectionInner {
                transport,
                credentials,
                policy,
                status,
                attempts: AtomicU32::new(0),
                drops: AtomicU32::new(0),
                was_connected: AtomicBool::new(false),
                link: Mutex::new(LinkState {
                    link: None,
                    cancel: CancellationToken::new(),
                    generation: 0,
                }),
                connect_lock: Mutex::new(()),
                listeners: ListenerRegistry::default(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the channel with the stored token.
    ///
    /// Fails immediately with [`CoreError::MissingToken`] when no token is
    /// stored, leaving the status untouched. Returns at once when already
    /// connected; otherwise waits for any in-flight attempt, then retries
    /// under the reconnect policy until connected or exhausted.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.inner.credentials.token().is_none() {
            return Err(CoreError::MissingToken);
        }

        let _guard = self.inner.connect_lock.lock().await;
        if self.status() == ConnectionStatus::Connected {
            debug!("connect: already connected");
            return Ok(());
        }

        self.inner.attempts.store(0, Ordering::SeqCst);
        self.inner.drops.store(0, Ordering::SeqCst);
        let cancel = self.inner.link.lock().await.cancel.clone();
        establish(Arc::clone(&self.inner), cancel).await
    }

    /// Close the channel and stop any pending reconnection.
    pub async fn disconnect(&self) {
        let link = {
            let mut state = self.inner.link.lock().await;
            let old = std::mem::replace(&mut state.cancel, CancellationToken::new());
            old.cancel();
            state.link.take()
        };

        if let Some(link) = link {
            link.close().await;
        }

        self.inner.attempts.store(0, Ordering::SeqCst);
        self.inner.drops.store(0, Ordering::SeqCst);
        self.inner.was_connected.store(false, Ordering::SeqCst);
        self.inner.status.send_replace(ConnectionStatus::Disconnected);
        info!("channel disconnected");
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Send an event, attaching `ack` as the acknowledgement callback.
    ///
    /// Returns `false` without touching the transport when not connected,
    /// and `false` when the transport refused the write.
    pub async fn emit(&self, event: &str, payload: Value, ack: Option<AckHandler>) -> bool {
        let link = {
            let state = self.inner.link.lock().await;
            if self.status() == ConnectionStatus::Connected {
                state.link.clone()
            } else {
                None
            }
        };

        let Some(link) = link else {
            warn!(event, status = %self.status(), "emit while channel not connected, dropped");
            return false;
        };

        match link.emit(event, payload, ack).await {
            Ok(()) => true,
            Err(e) => {
                warn!(event, error = %e, "channel emit failed");
                false
            }
        }
    }

    /// Register `handler` for `event`. Survives reconnects.
    pub fn on(&self, event: &str, handler: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.inner.listeners.add(event, Arc::new(handler))
    }

    /// Remove one listener, or all listeners for `event` when `id` is `None`.
    pub fn off(&self, event: &str, id: Option<ListenerId>) {
        self.inner.listeners.remove(event, id);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.count(event)
    }

    // ── Status ───────────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Failed attempts in the current connect/reconnect run.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.policy.max_attempts
    }

    pub fn endpoint(&self) -> String {
        self.inner.transport.endpoint()
    }
}

// ── Connection run ───────────────────────────────────────────────────

/// Attempt to open a link until success, exhaustion or cancellation.
///
/// Callers hold `connect_lock`. Boxed because the pump it spawns may in
/// turn spawn a reconnect run.
fn establish(
    inner: Arc<ConnectionInner>,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<(), CoreError>> {
    async move {
        let endpoint = inner.transport.endpoint();

        loop {
            if cancel.is_cancelled() {
                return Err(aborted(&inner, &endpoint));
            }
            inner.status.send_replace(ConnectionStatus::Connecting);

            let Some(token) = inner.credentials.token() else {
                warn!("stored token disappeared, giving up on the channel");
                inner.status.send_replace(ConnectionStatus::Failed);
                return Err(CoreError::MissingToken);
            };

            let (signals_tx, signals_rx) = mpsc::unbounded_channel();
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(aborted(&inner, &endpoint)),
                result = inner.transport.open(&token, signals_tx) => result,
            };

            match opened {
                Ok(link) => {
                    let generation = {
                        let mut state = inner.link.lock().await;
                        if cancel.is_cancelled() {
                            drop(state);
                            link.close().await;
                            return Err(aborted(&inner, &endpoint));
                        }
                        state.generation += 1;
                        state.link = Some(Arc::clone(&link));
                        state.generation
                    };

                    inner.attempts.store(0, Ordering::SeqCst);
                    inner.status.send_replace(ConnectionStatus::Connected);
                    info!(%endpoint, "channel connected");

                    tokio::spawn(pump(
                        Arc::clone(&inner),
                        signals_rx,
                        cancel.clone(),
                        generation,
                    ));

                    if inner.was_connected.swap(true, Ordering::SeqCst) {
                        info!("channel re-established, notifying listeners");
                        inner.listeners.dispatch(RECONNECT_EVENT, &Value::Null);
                    }
                    return Ok(());
                }
                Err(e) if !e.is_transient() => {
                    warn!(%endpoint, error = %e, "channel refused, not retrying");
                    inner.status.send_replace(ConnectionStatus::Failed);
                    return Err(e.into());
                }
                Err(e) => {
                    let failed = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if inner.policy.exhausted(failed) {
                        warn!(%endpoint, attempts = failed, error = %e, "reconnection attempts exhausted");
                        inner.status.send_replace(ConnectionStatus::Failed);
                        return Err(CoreError::ConnectionFailed {
                            url: endpoint,
                            reason: format!("gave up after {failed} attempts: {e}"),
                        });
                    }

                    let delay = inner.policy.delay_for(failed);
                    info!(
                        attempt = failed,
                        max = inner.policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "channel connect failed, retrying"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(aborted(&inner, &endpoint)),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
    .boxed()
}

/// Forward one link's signals to listeners until it closes or is cancelled.
///
/// A drop counts against the reconnect policy unless the link proved
/// itself first, so a link that opens and closes at once cannot loop.
async fn pump(
    inner: Arc<ConnectionInner>,
    mut signals: mpsc::UnboundedReceiver<ChannelSignal>,
    cancel: CancellationToken,
    generation: u64,
) {
    let opened_at = Instant::now();
    let mut proven = false;
    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            signal = signals.recv() => match signal {
                Some(ChannelSignal::Event { name, payload }) => {
                    proven = true;
                    inner.listeners.dispatch(&name, &payload);
                }
                Some(ChannelSignal::Closed { reason }) => break reason,
                None => break "signal stream ended".to_owned(),
            },
        }
    };

    let dropped = {
        let mut state = inner.link.lock().await;
        if state.generation != generation || cancel.is_cancelled() {
            None
        } else {
            state.link.take()
        }
    };
    let Some(link) = dropped else {
        return;
    };

    link.close().await;

    let drops = if proven || opened_at.elapsed() >= STABLE_LINK {
        inner.drops.store(1, Ordering::SeqCst);
        1
    } else {
        inner.drops.fetch_add(1, Ordering::SeqCst) + 1
    };
    if inner.policy.exhausted(drops) {
        warn!(%reason, drops, "channel keeps dropping, giving up");
        inner.status.send_replace(ConnectionStatus::Failed);
        return;
    }

    let delay = inner.policy.delay_for(drops);
    warn!(
        %reason,
        drops,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        "channel dropped, reconnecting"
    );
    inner.status.send_replace(ConnectionStatus::Connecting);
    tokio::spawn(reconnect(inner, cancel, delay, drops));
}

/// Reopen after a drop, continuing the failure count from `drops`.
async fn reconnect(
    inner: Arc<ConnectionInner>,
    cancel: CancellationToken,
    delay: Duration,
    drops: u32,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(delay) => {}
    }

    let _guard = inner.connect_lock.lock().await;
    if cancel.is_cancelled() || *inner.status.borrow() == ConnectionStatus::Connected {
        return;
    }
    inner.attempts.store(drops, Ordering::SeqCst);
    if let Err(e) = establish(Arc::clone(&inner), cancel).await {
        warn!(error = %e, "background reconnection ended");
    }
}

/// Exit path for a run cut short by `disconnect()`.
fn aborted(inner: &ConnectionInner, endpoint: &str) -> CoreError {
    inner.status.send_replace(ConnectionStatus::Disconnected);
    CoreError::ConnectionFailed {
        url: endpoint.to_owned(),
        reason: "cancelled by disconnect".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(ConnectionStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn registry_dispatches_in_order_and_removes() {
        let registry = ListenerRegistry::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let first = registry.add("patient_created", Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        let h = Arc::clone(&hits);
        registry.add("patient_created", Arc::new(move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        }));

        registry.dispatch("patient_created", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        registry.remove("patient_created", Some(first));
        registry.dispatch("patient_created", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 21);
        assert_eq!(registry.count("patient_created"), 1);

        registry.remove("patient_created", None);
        assert_eq!(registry.count("patient_created"), 0);
    }

    #[test]
    fn removing_last_listener_drops_the_event() {
        let registry = ListenerRegistry::default();
        let id = registry.add("claim_updated", Arc::new(|_| {}));
        registry.remove("claim_updated", Some(id));
        assert!(registry.by_event.get("claim_updated").is_none());
    }
}
