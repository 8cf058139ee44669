// ── Resource descriptors ──
//
// Maps a portal resource to its channel event names, broadcast names and
// cache keys. Event naming is `{name}:{operation}` for requests and
// `{name}_{change}` for broadcasts.

use std::fmt;

use serde_json::{Map, Value};

use super::cache::CacheKey;

/// Request operation on a resource.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// Kind of server-side change, for both local writes and broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Change {
    Created,
    Updated,
    Deleted,
}

/// A record type the gateway serves over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resource {
    /// Singular event prefix, e.g. `patient`.
    pub name: &'static str,
    /// Plural collection name, e.g. `patients`.
    pub collection: &'static str,
    /// Primary key field in payloads, e.g. `patient_id`.
    pub id_field: &'static str,
}

impl Resource {
    pub const PATIENT: Self = Self {
        name: "patient",
        collection: "patients",
        id_field: "patient_id",
    };

    pub const CLAIM: Self = Self {
        name: "claim",
        collection: "claims",
        id_field: "claim_id",
    };

    pub const INSURANCE_POLICY: Self = Self {
        name: "insurance_policy",
        collection: "insurance_policies",
        id_field: "policy_id",
    };

    pub const ALL: [Self; 3] = [Self::PATIENT, Self::CLAIM, Self::INSURANCE_POLICY];

    /// Find a built-in resource by singular or collection name.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.name == name || r.collection == name)
    }

    /// Split `patient:get` into a built-in resource and operation.
    pub fn parse_operation(event: &str) -> Option<(Self, Operation)> {
        let (name, op) = event.split_once(':')?;
        Some((Self::lookup(name)?, op.parse().ok()?))
    }

    /// `patient:get`
    pub fn operation(&self, op: Operation) -> String {
        format!("{}:{op}", self.name)
    }

    /// `patient_deleted`
    pub fn broadcast(&self, change: Change) -> String {
        format!("{}_{change}", self.name)
    }

    pub fn item_key(&self, id: &str) -> CacheKey {
        CacheKey::item(self.name, id)
    }

    pub fn list_key(&self, params: &Value) -> CacheKey {
        CacheKey::list(self.collection, params)
    }

    /// `{ "patient_id": id }`
    pub fn id_payload(&self, id: &str) -> Value {
        let mut map = Map::new();
        map.insert(self.id_field.to_owned(), Value::String(id.to_owned()));
        Value::Object(map)
    }

    /// The record inside a response or broadcast payload.
    ///
    /// Accepts both `{ "patient": {...} }` and the bare record.
    pub fn unwrap_record<'a>(&self, payload: &'a Value) -> &'a Value {
        match payload.get(self.name) {
            Some(inner @ Value::Object(_)) => inner,
            _ => payload,
        }
    }

    /// Records of a list response: a bare array, `{ "patients": [...] }`,
    /// or `{ "items": [...] }`.
    pub fn unwrap_list<'a>(&self, payload: &'a Value) -> &'a [Value] {
        if let Value::Array(items) = payload {
            return items;
        }
        [self.collection, "items", "data"]
            .into_iter()
            .find_map(|field| payload.get(field).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Identifier of a record, from `id_field` or a generic `id`.
    pub fn extract_id(&self, payload: &Value) -> Option<String> {
        let record = self.unwrap_record(payload);
        [self.id_field, "id"]
            .into_iter()
            .find_map(|field| record.get(field))
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_names() {
        let r = Resource::PATIENT;
        assert_eq!(r.operation(Operation::Get), "patient:get");
        assert_eq!(r.operation(Operation::List), "patient:list");
        assert_eq!(r.broadcast(Change::Deleted), "patient_deleted");
        assert_eq!(
            Resource::INSURANCE_POLICY.broadcast(Change::Created),
            "insurance_policy_created"
        );
    }

    #[test]
    fn parse_operation_round_trips() {
        assert_eq!(
            Resource::parse_operation("claim:update"),
            Some((Resource::CLAIM, Operation::Update))
        );
        assert_eq!(Resource::parse_operation("claim:archive"), None);
        assert_eq!(Resource::parse_operation("dashboard:stats"), None);
    }

    #[test]
    fn lookup_accepts_both_names() {
        assert_eq!(Resource::lookup("claims"), Some(Resource::CLAIM));
        assert_eq!(Resource::lookup("claim"), Some(Resource::CLAIM));
        assert_eq!(Resource::lookup("invoices"), None);
    }

    #[test]
    fn extract_id_from_wrapped_or_bare_records() {
        let r = Resource::PATIENT;
        assert_eq!(r.extract_id(&json!({ "patient_id": "P1" })).as_deref(), Some("P1"));
        assert_eq!(
            r.extract_id(&json!({ "patient": { "patient_id": "P2" } })).as_deref(),
            Some("P2")
        );
        assert_eq!(r.extract_id(&json!({ "id": 42 })).as_deref(), Some("42"));
        assert_eq!(r.extract_id(&json!({ "name": "x" })), None);
    }

    #[test]
    fn unwrap_list_shapes() {
        let r = Resource::CLAIM;
        assert_eq!(r.unwrap_list(&json!([1, 2])).len(), 2);
        assert_eq!(r.unwrap_list(&json!({ "claims": [1] })).len(), 1);
        assert_eq!(r.unwrap_list(&json!({ "items": [1, 2, 3] })).len(), 3);
        assert!(r.unwrap_list(&json!({ "total": 0 })).is_empty());
    }
}
