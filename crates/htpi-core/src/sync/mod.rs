// ── Data synchronization ──
//
// Request/response over channel acknowledgements, a read-through cache in
// front of it, and the broadcast subscriptions that keep that cache honest.
// Reads serve fresh entries locally; stale or missing entries are fetched
// before the read returns. Writes and broadcasts only ever invalidate or
// patch, through the cache reducer.

pub mod cache;
pub mod correlator;
pub mod resource;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use htpi_api::AckHandler;
use htpi_api::channel::AckEnvelope;

use crate::connection::{ConnectionManager, ListenerId, RECONNECT_EVENT};
use crate::error::CoreError;

use self::cache::{CacheEvent, EntryKind, QueryCache};
use self::correlator::PendingTable;
use self::resource::{Change, Operation, Resource};

/// Correlated requests and the cache they feed.
///
/// Cheaply cloneable via `Arc<SyncInner>`.
#[derive(Clone)]
pub struct DataSync {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    connection: ConnectionManager,
    cache: QueryCache,
    pending: Arc<PendingTable>,
    request_timeout: Option<Duration>,
    /// Broadcast listeners per resource, registered on first use.
    subscriptions: DashMap<&'static str, Vec<(String, ListenerId)>>,
    resync_listener: Mutex<Option<ListenerId>>,
}

impl DataSync {
    pub fn new(connection: ConnectionManager, request_timeout: Option<Duration>) -> Self {
        let inner = Arc::new(SyncInner {
            connection,
            cache: QueryCache::new(),
            pending: PendingTable::new(),
            request_timeout,
            subscriptions: DashMap::new(),
            resync_listener: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let id = inner.connection.on(RECONNECT_EVENT, move |_| {
            if let Some(inner) = weak.upgrade() {
                debug!("channel re-established, marking cache stale");
                inner.cache.apply(CacheEvent::Resynced);
            }
        });
        if let Ok(mut slot) = inner.resync_listener.lock() {
            *slot = Some(id);
        }

        Self { inner }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Requests still waiting for an acknowledgement.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    // ── Correlated requests ──────────────────────────────────────────

    /// Emit `operation` and wait for its acknowledgement.
    ///
    /// Returns the envelope's `data` (or `null`). Operations on a built-in
    /// resource (`patient:get`, `claim:update`, ...) also update the cache.
    /// Fails at once with [`CoreError::ChannelUnavailable`] when the channel
    /// is down.
    pub async fn request(&self, operation: &str, payload: Value) -> Result<Value, CoreError> {
        let target = Resource::parse_operation(operation);
        if let Some((resource, _)) = target {
            self.ensure_subscribed(resource);
        }

        let data = self.exchange(operation, payload.clone()).await?;
        if let Some((resource, op)) = target {
            self.reconcile(resource, op, &payload, &data);
        }
        Ok(data)
    }

    /// One emit/ack round trip through the correlation table.
    async fn exchange(&self, operation: &str, payload: Value) -> Result<Value, CoreError> {
        let (guard, reply) = self.inner.pending.register();
        let request_id = guard.id();

        let table = Arc::clone(&self.inner.pending);
        let ack: AckHandler = Arc::new(move |value| {
            table.resolve(request_id, value);
        });

        debug!(%request_id, operation, "sending request");
        if !self.inner.connection.emit(operation, payload, Some(ack)).await {
            return Err(CoreError::ChannelUnavailable);
        }

        let reply = match self.inner.request_timeout {
            Some(limit) => tokio::time::timeout(limit, reply).await.map_err(|_| {
                warn!(%request_id, operation, "request timed out");
                CoreError::RequestTimeout {
                    operation: operation.to_owned(),
                    timeout_secs: limit.as_secs(),
                }
            })?,
            None => reply.await,
        }
        .map_err(|_| CoreError::RequestAbandoned)?;
        drop(guard);

        parse_ack(operation, reply)
    }

    /// Fold a successful response into the cache.
    fn reconcile(&self, resource: Resource, op: Operation, payload: &Value, data: &Value) {
        let at = Utc::now();
        let event = match op {
            Operation::List => CacheEvent::ResponseReceived {
                key: resource.list_key(payload),
                collection: resource.collection.to_owned(),
                kind: EntryKind::List,
                value: Arc::new(data.clone()),
                at,
            },
            Operation::Get => {
                let Some(id) = resource.extract_id(payload) else {
                    debug!(%resource, "get without record id, not cached");
                    return;
                };
                CacheEvent::ResponseReceived {
                    key: resource.item_key(&id),
                    collection: resource.collection.to_owned(),
                    kind: EntryKind::Item { id },
                    value: Arc::new(resource.unwrap_record(data).clone()),
                    at,
                }
            }
            Operation::Create => CacheEvent::WriteSucceeded {
                resource,
                change: Change::Created,
                id: resource.extract_id(data),
                record: None,
                at,
            },
            Operation::Update => {
                let record = resource.unwrap_record(data);
                CacheEvent::WriteSucceeded {
                    resource,
                    change: Change::Updated,
                    id: resource
                        .extract_id(payload)
                        .or_else(|| resource.extract_id(record)),
                    record: record.is_object().then(|| record.clone()),
                    at,
                }
            }
            Operation::Delete => CacheEvent::WriteSucceeded {
                resource,
                change: Change::Deleted,
                id: resource.extract_id(payload),
                record: None,
                at,
            },
        };
        self.inner.cache.apply(event);
    }

    // ── Resource operations ──────────────────────────────────────────

    /// List a collection, served from cache while fresh.
    pub async fn list(&self, resource: Resource, params: Value) -> Result<Arc<Value>, CoreError> {
        let key = resource.list_key(&params);
        if let Some(hit) = self.inner.cache.fresh(&key) {
            debug!(%key, "cache hit");
            return Ok(hit);
        }

        let data = self
            .request(&resource.operation(Operation::List), params)
            .await?;
        Ok(self
            .inner
            .cache
            .fresh(&key)
            .unwrap_or_else(|| Arc::new(data)))
    }

    /// Fetch one record, served from cache while fresh.
    pub async fn get(&self, resource: Resource, id: &str) -> Result<Arc<Value>, CoreError> {
        let key = resource.item_key(id);
        if let Some(hit) = self.inner.cache.fresh(&key) {
            debug!(%key, "cache hit");
            return Ok(hit);
        }

        let data = self
            .request(&resource.operation(Operation::Get), resource.id_payload(id))
            .await?;
        Ok(self
            .inner
            .cache
            .fresh(&key)
            .unwrap_or_else(|| Arc::new(resource.unwrap_record(&data).clone())))
    }

    pub async fn create(&self, resource: Resource, record: Value) -> Result<Value, CoreError> {
        let data = self
            .request(&resource.operation(Operation::Create), record)
            .await?;
        Ok(resource.unwrap_record(&data).clone())
    }

    /// Send `changes` for record `id`. The id field is added to the payload.
    pub async fn update(
        &self,
        resource: Resource,
        id: &str,
        changes: Value,
    ) -> Result<Value, CoreError> {
        let data = self
            .request(
                &resource.operation(Operation::Update),
                with_id(resource, id, changes),
            )
            .await?;
        Ok(resource.unwrap_record(&data).clone())
    }

    pub async fn delete(&self, resource: Resource, id: &str) -> Result<(), CoreError> {
        self.request(&resource.operation(Operation::Delete), resource.id_payload(id))
            .await?;
        Ok(())
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Listen for `resource`'s broadcasts, once.
    pub fn ensure_subscribed(&self, resource: Resource) {
        let Entry::Vacant(slot) = self.inner.subscriptions.entry(resource.name) else {
            return;
        };

        let listeners = Change::iter()
            .map(|change| {
                let event = resource.broadcast(change);
                let weak: Weak<SyncInner> = Arc::downgrade(&self.inner);
                let id = self.inner.connection.on(&event, move |payload| {
                    if let Some(inner) = weak.upgrade() {
                        inner.cache.apply(CacheEvent::BroadcastReceived {
                            resource,
                            change,
                            payload: payload.clone(),
                            at: Utc::now(),
                        });
                    }
                });
                (event, id)
            })
            .collect();

        debug!(%resource, "subscribed to broadcasts");
        slot.insert(listeners);
    }

    pub fn is_subscribed(&self, resource: Resource) -> bool {
        self.inner.subscriptions.contains_key(resource.name)
    }

    /// Forget everything: cache, broadcast subscriptions, waiting requests.
    pub fn reset(&self) {
        let names: Vec<&'static str> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| *entry.key())
            .collect();
        for name in names {
            if let Some((_, listeners)) = self.inner.subscriptions.remove(name) {
                for (event, id) in listeners {
                    self.inner.connection.off(&event, Some(id));
                }
            }
        }
        self.inner.pending.clear();
        self.inner.cache.apply(CacheEvent::Cleared);
        debug!("data sync reset");
    }
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.resync_listener.lock() {
            if let Some(id) = slot.take() {
                self.connection.off(RECONNECT_EVENT, Some(id));
            }
        }
    }
}

/// Unwrap an acknowledgement into its data or a rejection.
fn parse_ack(operation: &str, reply: Value) -> Result<Value, CoreError> {
    let envelope: AckEnvelope = match serde_json::from_value(reply.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(operation, error = %e, "ack is not an envelope, using it as data");
            return Ok(reply);
        }
    };

    if envelope.success {
        Ok(envelope.data.unwrap_or(Value::Null))
    } else {
        Err(CoreError::Rejected {
            code: envelope.failure_code(),
            message: envelope.failure_message(),
        })
    }
}

fn with_id(resource: Resource, id: &str, changes: Value) -> Value {
    match changes {
        Value::Object(mut map) => {
            map.insert(resource.id_field.to_owned(), Value::String(id.to_owned()));
            Value::Object(map)
        }
        Value::Null => resource.id_payload(id),
        other => {
            let mut map = Map::new();
            map.insert(resource.id_field.to_owned(), Value::String(id.to_owned()));
            map.insert("data".to_owned(), other);
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn successful_ack_yields_data() {
        let data = parse_ack("patient:get", json!({ "success": true, "data": { "patient_id": "P1" } }));
        assert!(matches!(data, Ok(v) if v["patient_id"] == "P1"));
    }

    #[test]
    fn failed_ack_is_rejected() {
        let err = parse_ack(
            "patient:delete",
            json!({ "success": false, "error": { "code": "FORBIDDEN", "message": "no" } }),
        );
        assert!(matches!(
            err,
            Err(CoreError::Rejected { code: Some(ref c), .. }) if c == "FORBIDDEN"
        ));
    }

    #[test]
    fn update_payload_carries_id() {
        let payload = with_id(Resource::CLAIM, "C1", json!({ "status": "paid" }));
        assert_eq!(payload, json!({ "claim_id": "C1", "status": "paid" }));
        assert_eq!(
            with_id(Resource::CLAIM, "C1", Value::Null),
            json!({ "claim_id": "C1" })
        );
    }
}
