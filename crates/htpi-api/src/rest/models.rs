// REST response and request types
//
// The identity record is owned by the backend; fields beyond the ones the
// client reads are preserved in `extra` so nothing is lost when the cached
// identity is written back to storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Response Envelope ────────────────────────────────────────────────

/// Envelope wrapping every REST response.
///
/// ```json
/// { "success": true, "data": { ... } }
/// { "success": false, "error": { "code": "...", "message": "..." } }
/// ```
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl<T> ApiResponse<T> {
    /// Failure description from whichever field the backend filled in.
    pub fn failure_message(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or_else(|| self.message.clone())
                .unwrap_or_else(|| "request failed".into()),
            _ => self
                .message
                .clone()
                .unwrap_or_else(|| "request failed".into()),
        }
    }

    pub fn failure_code(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

// ── Identity ─────────────────────────────────────────────────────────

/// The authenticated user as returned by login and profile endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "user_id")]
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Catch-all for fields the client does not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl User {
    /// `first last`, falling back to the email address.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Payload of a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(alias = "access_token")]
    pub token: String,
    pub user: User,
}

// ── Requests ─────────────────────────────────────────────────────────

/// Partial profile update; only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
    }
}

/// Body of `POST /api/auth/change-password`. Built from secrets at the
/// call site and dropped immediately after serialization.
#[derive(Serialize)]
pub struct PasswordChange<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_keeps_unknown_fields() {
        let user: User = serde_json::from_value(json!({
            "id": "U1",
            "email": "a@example.com",
            "first_name": "Ada",
            "phone": "555-0100"
        }))
        .unwrap();
        assert_eq!(user.extra.get("phone"), Some(&json!("555-0100")));

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["phone"], json!("555-0100"));
        assert!(back.get("last_name").is_none());
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let user: User =
            serde_json::from_value(json!({ "id": "U1", "email": "a@example.com" })).unwrap();
        assert_eq!(user.display_name(), "a@example.com");
    }

    #[test]
    fn envelope_failure_variants() {
        let resp: ApiResponse<Value> = serde_json::from_value(json!({
            "success": false,
            "error": { "code": "INVALID", "message": "bad input" }
        }))
        .unwrap();
        assert_eq!(resp.failure_message(), "bad input");
        assert_eq!(resp.failure_code().as_deref(), Some("INVALID"));

        let resp: ApiResponse<Value> =
            serde_json::from_value(json!({ "success": false, "message": "nope" })).unwrap();
        assert_eq!(resp.failure_message(), "nope");
        assert!(resp.failure_code().is_none());
    }

    #[test]
    fn envelope_data_needs_no_default() {
        let resp: ApiResponse<LoginData> = serde_json::from_value(json!({
            "success": true,
            "data": { "token": "t1", "user": { "id": "U1", "email": "a@example.com" } }
        }))
        .unwrap();
        assert_eq!(resp.data.unwrap().token, "t1");

        let resp: ApiResponse<LoginData> =
            serde_json::from_value(json!({ "success": false, "message": "nope" })).unwrap();
        assert!(resp.data.is_none());
    }

    #[test]
    fn empty_profile_update() {
        assert!(ProfileUpdate::default().is_empty());
        let update = ProfileUpdate {
            phone: Some("1".into()),
            ..ProfileUpdate::default()
        };
        assert!(!update.is_empty());
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "phone": "1" }));
    }
}
