// ── Query cache ──
//
// Locally held, possibly stale copies of server records and listings.
// All mutation goes through `CacheState::apply`, a reducer over
// `CacheEvent`s; `QueryCache` publishes each new state on a `watch`
// channel so front ends can re-render from it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::trace;

use super::resource::{Change, Resource};

// ── CacheKey ─────────────────────────────────────────────────────────

/// `patient:P1` for items, `patients:list:{"page":1}` for listings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn item(resource: &str, id: &str) -> Self {
        Self(format!("{resource}:{id}"))
    }

    /// List key with parameters in canonical form, so the same query
    /// written with different key order shares one entry.
    pub fn list(collection: &str, params: &Value) -> Self {
        Self(format!("{collection}:list:{}", canonical_json(params)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize with object keys sorted at every depth.
fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sort(v))).collect();
                Value::Object(
                    sorted
                        .into_iter()
                        .map(|(k, v)| (k.clone(), v))
                        .collect::<Map<String, Value>>(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    match value {
        Value::Null => "{}".to_owned(),
        other => sort(other).to_string(),
    }
}

// ── Entries ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Item { id: String },
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Arc<Value>,
    /// Must be refetched before the next read returns.
    pub stale: bool,
    pub collection: String,
    pub kind: EntryKind,
    pub fetched_at: DateTime<Utc>,
}

// ── Events ───────────────────────────────────────────────────────────

/// Everything that can change the cache.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A read completed.
    ResponseReceived {
        key: CacheKey,
        collection: String,
        kind: EntryKind,
        value: Arc<Value>,
        at: DateTime<Utc>,
    },
    /// A write this client issued was acknowledged.
    WriteSucceeded {
        resource: Resource,
        change: Change,
        id: Option<String>,
        /// Record returned by the gateway, when any.
        record: Option<Value>,
        at: DateTime<Utc>,
    },
    /// The gateway pushed a change notification.
    BroadcastReceived {
        resource: Resource,
        change: Change,
        payload: Value,
        at: DateTime<Utc>,
    },
    /// The channel was re-established; anything may have changed.
    Resynced,
    /// Logout.
    Cleared,
}

// ── CacheState ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CacheState {
    entries: BTreeMap<CacheKey, CacheEntry>,
}

impl CacheState {
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Value of a present, non-stale entry.
    pub fn fresh(&self, key: &CacheKey) -> Option<Arc<Value>> {
        self.entries
            .get(key)
            .filter(|e| !e.stale)
            .map(|e| Arc::clone(&e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &CacheEntry)> {
        self.entries.iter()
    }

    /// Apply one event. Returns whether anything changed.
    ///
    /// Every arm is idempotent: replaying an event leaves the same state.
    pub fn apply(&mut self, event: CacheEvent) -> bool {
        match event {
            CacheEvent::ResponseReceived {
                key,
                collection,
                kind,
                value,
                at,
            } => {
                self.entries.insert(
                    key,
                    CacheEntry {
                        value,
                        stale: false,
                        collection,
                        kind,
                        fetched_at: at,
                    },
                );
                true
            }
            CacheEvent::WriteSucceeded {
                resource,
                change,
                id,
                record,
                at,
            } => {
                let mut changed = self.invalidate_lists(resource.collection);
                let Some(id) = id else {
                    return changed;
                };
                let key = resource.item_key(&id);
                match change {
                    Change::Created => {}
                    Change::Updated => match record {
                        Some(record) if record.is_object() => {
                            self.entries.insert(
                                key,
                                CacheEntry {
                                    value: Arc::new(record),
                                    stale: false,
                                    collection: resource.collection.to_owned(),
                                    kind: EntryKind::Item { id },
                                    fetched_at: at,
                                },
                            );
                            changed = true;
                        }
                        _ => changed |= self.mark_stale(&key),
                    },
                    Change::Deleted => changed |= self.entries.remove(&key).is_some(),
                }
                changed
            }
            CacheEvent::BroadcastReceived {
                resource,
                change,
                payload,
                at,
            } => {
                let mut changed = self.invalidate_lists(resource.collection);
                let Some(id) = resource.extract_id(&payload) else {
                    trace!(%resource, %change, "broadcast without record id");
                    return changed;
                };
                let key = resource.item_key(&id);
                match change {
                    Change::Created => {}
                    Change::Updated => {
                        let record = resource.unwrap_record(&payload);
                        changed |= self.merge_item(&key, record, at);
                    }
                    Change::Deleted => changed |= self.entries.remove(&key).is_some(),
                }
                changed
            }
            CacheEvent::Resynced => {
                let mut changed = false;
                for entry in self.entries.values_mut() {
                    changed |= !entry.stale;
                    entry.stale = true;
                }
                changed
            }
            CacheEvent::Cleared => {
                let changed = !self.entries.is_empty();
                self.entries.clear();
                changed
            }
        }
    }

    fn invalidate_lists(&mut self, collection: &str) -> bool {
        let mut changed = false;
        for entry in self.entries.values_mut() {
            if entry.kind == EntryKind::List && entry.collection == collection && !entry.stale {
                entry.stale = true;
                changed = true;
            }
        }
        changed
    }

    fn mark_stale(&mut self, key: &CacheKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if !entry.stale => {
                entry.stale = true;
                true
            }
            _ => false,
        }
    }

    /// Shallow-merge broadcast fields into an existing item entry.
    ///
    /// Items nobody has read stay absent.
    fn merge_item(&mut self, key: &CacheKey, patch: &Value, at: DateTime<Utc>) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let Value::Object(fields) = patch else {
            return false;
        };

        let mut merged = (*entry.value).clone();
        match &mut merged {
            Value::Object(target) => {
                for (k, v) in fields {
                    target.insert(k.clone(), v.clone());
                }
            }
            other => *other = patch.clone(),
        }

        if merged == *entry.value {
            return false;
        }
        entry.value = Arc::new(merged);
        entry.fetched_at = at;
        true
    }
}

// ── QueryCache ───────────────────────────────────────────────────────

/// Shared, observable cache. Cheaply cloneable.
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<watch::Sender<CacheState>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CacheState::default());
        Self {
            state: Arc::new(state),
        }
    }

    /// Run the reducer; subscribers are notified only on change.
    pub fn apply(&self, event: CacheEvent) -> bool {
        self.state.send_if_modified(|state| state.apply(event))
    }

    pub fn fresh(&self, key: &CacheKey) -> Option<Arc<Value>> {
        self.state.borrow().fresh(key)
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.borrow().get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    /// Current state (clones the entry map).
    pub fn snapshot(&self) -> CacheState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn item(resource: Resource, id: &str, value: Value) -> CacheEvent {
        CacheEvent::ResponseReceived {
            key: resource.item_key(id),
            collection: resource.collection.into(),
            kind: EntryKind::Item { id: id.into() },
            value: Arc::new(value),
            at: now(),
        }
    }

    fn list(resource: Resource, params: &Value, value: Value) -> CacheEvent {
        CacheEvent::ResponseReceived {
            key: resource.list_key(params),
            collection: resource.collection.into(),
            kind: EntryKind::List,
            value: Arc::new(value),
            at: now(),
        }
    }

    fn broadcast(resource: Resource, change: Change, payload: Value) -> CacheEvent {
        CacheEvent::BroadcastReceived {
            resource,
            change,
            payload,
            at: now(),
        }
    }

    #[test]
    fn list_key_is_order_independent() {
        let a = CacheKey::list("patients", &json!({ "page": 1, "search": "ada" }));
        let b = CacheKey::list("patients", &json!({ "search": "ada", "page": 1 }));
        assert_eq!(a, b);
        assert_eq!(CacheKey::list("patients", &Value::Null).as_str(), "patients:list:{}");
    }

    #[test]
    fn write_marks_collection_lists_stale_only() {
        let mut state = CacheState::default();
        let params = json!({});
        state.apply(list(Resource::PATIENT, &params, json!([])));
        state.apply(list(Resource::CLAIM, &params, json!([])));

        state.apply(CacheEvent::WriteSucceeded {
            resource: Resource::PATIENT,
            change: Change::Created,
            id: Some("P9".into()),
            record: None,
            at: now(),
        });

        assert!(state.fresh(&Resource::PATIENT.list_key(&params)).is_none());
        assert!(state.fresh(&Resource::CLAIM.list_key(&params)).is_some());
    }

    #[test]
    fn update_write_seeds_item() {
        let mut state = CacheState::default();
        state.apply(CacheEvent::WriteSucceeded {
            resource: Resource::PATIENT,
            change: Change::Updated,
            id: Some("P1".into()),
            record: Some(json!({ "patient_id": "P1", "name": "Ada" })),
            at: now(),
        });
        let value = state.fresh(&Resource::PATIENT.item_key("P1")).unwrap();
        assert_eq!(value["name"], "Ada");
    }

    #[test]
    fn update_without_record_marks_item_stale() {
        let mut state = CacheState::default();
        state.apply(item(Resource::PATIENT, "P1", json!({ "patient_id": "P1" })));
        state.apply(CacheEvent::WriteSucceeded {
            resource: Resource::PATIENT,
            change: Change::Updated,
            id: Some("P1".into()),
            record: None,
            at: now(),
        });
        assert!(state.get(&Resource::PATIENT.item_key("P1")).unwrap().stale);
    }

    #[test]
    fn delete_broadcast_is_idempotent() {
        let mut state = CacheState::default();
        state.apply(item(Resource::PATIENT, "P1", json!({ "patient_id": "P1" })));

        let event = broadcast(Resource::PATIENT, Change::Deleted, json!({ "patient_id": "P1" }));
        assert!(state.apply(event.clone()));
        assert!(!state.apply(event));
        assert!(state.get(&Resource::PATIENT.item_key("P1")).is_none());
    }

    #[test]
    fn update_broadcast_merges_into_existing_item() {
        let mut state = CacheState::default();
        state.apply(item(
            Resource::CLAIM,
            "C1",
            json!({ "claim_id": "C1", "status": "draft", "amount": 120 }),
        ));

        let event = broadcast(
            Resource::CLAIM,
            Change::Updated,
            json!({ "claim": { "claim_id": "C1", "status": "submitted" } }),
        );
        assert!(state.apply(event.clone()));
        assert!(!state.apply(event));

        let value = state.fresh(&Resource::CLAIM.item_key("C1")).unwrap();
        assert_eq!(value["status"], "submitted");
        assert_eq!(value["amount"], 120);
    }

    #[test]
    fn update_broadcast_for_unread_item_creates_nothing() {
        let mut state = CacheState::default();
        state.apply(broadcast(
            Resource::CLAIM,
            Change::Updated,
            json!({ "claim_id": "C7", "status": "paid" }),
        ));
        assert!(state.is_empty());
    }

    #[test]
    fn resync_marks_everything_stale() {
        let mut state = CacheState::default();
        state.apply(item(Resource::PATIENT, "P1", json!({})));
        state.apply(list(Resource::CLAIM, &json!({}), json!([])));

        assert!(state.apply(CacheEvent::Resynced));
        assert!(state.iter().all(|(_, e)| e.stale));
        assert!(!state.apply(CacheEvent::Resynced));
    }

    #[test]
    fn query_cache_notifies_only_on_change() {
        let cache = QueryCache::new();
        let mut rx = cache.subscribe();

        assert!(!cache.apply(CacheEvent::Cleared));
        assert!(!rx.has_changed().unwrap());

        cache.apply(item(Resource::PATIENT, "P1", json!({ "patient_id": "P1" })));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
