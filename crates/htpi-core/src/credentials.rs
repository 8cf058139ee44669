// ── Credential store ──
//
// Sole owner of the durable `auth_token` and `user` keys. Values go through
// a `CredentialBackend` so the CLI can choose the OS keyring while tests use
// memory or a temp file. Unreadable identity data is treated as absent.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use htpi_api::{TokenSource, User};

use crate::error::CoreError;

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "auth_token";

/// Storage key holding the JSON-encoded identity.
pub const IDENTITY_KEY: &str = "user";

/// Durable string storage addressed by key.
pub trait CredentialBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn save(&self, key: &str, value: &str) -> Result<(), CoreError>;
    /// Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<(), CoreError>;
}

// ── MemoryBackend ────────────────────────────────────────────────────

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.values.remove(key);
        Ok(())
    }
}

// ── FileBackend ──────────────────────────────────────────────────────

/// A JSON object on disk mapping keys to values.
///
/// A missing or unparseable file reads as empty; the next save rewrites it.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_map(&self) -> BTreeMap<String, String> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "credential file is corrupt, ignoring");
            BTreeMap::new()
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(storage_error)?;
        }
        let raw = serde_json::to_string_pretty(map).map_err(storage_error)?;
        std::fs::write(&self.path, raw).map_err(storage_error)?;
        restrict_permissions(&self.path);
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), CoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CoreError::Internal("credential file lock poisoned".into()))?;
        let mut map = self.read_map();
        f(&mut map);
        self.write_map(&map)
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.read_map().remove(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.modify(|map| {
            map.insert(key.to_owned(), value.to_owned());
        })
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|map| {
            map.remove(key);
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        debug!(error = %e, "could not restrict credential file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) {}

#[allow(clippy::needless_pass_by_value)]
fn storage_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::Storage {
        message: e.to_string(),
    }
}

// ── CredentialStore ──────────────────────────────────────────────────

/// Token and identity persistence.
///
/// Cheaply cloneable; all clones share one backend.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn CredentialBackend>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self { backend }
    }

    /// In-memory store for tests and one-off sessions.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn store_token(&self, token: &SecretString) -> Result<(), CoreError> {
        self.backend.save(TOKEN_KEY, token.expose_secret())
    }

    pub fn store_identity(&self, user: &User) -> Result<(), CoreError> {
        let encoded = serde_json::to_string(user).map_err(storage_error)?;
        self.backend.save(IDENTITY_KEY, &encoded)
    }

    /// The stored token. Backend failures read as absence.
    pub fn token(&self) -> Option<SecretString> {
        match self.backend.load(TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => Some(SecretString::from(token)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to read stored token");
                None
            }
        }
    }

    /// The stored identity, or `None` when missing or unparseable.
    pub fn identity(&self) -> Option<User> {
        let raw = match self.backend.load(IDENTITY_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "failed to read stored identity");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "stored identity is malformed, ignoring");
                None
            }
        }
    }

    /// Remove both keys. Attempts each even if the first fails.
    pub fn clear(&self) -> Result<(), CoreError> {
        let token = self.backend.delete(TOKEN_KEY);
        let identity = self.backend.delete(IDENTITY_KEY);
        debug!("stored credentials cleared");
        token.and(identity)
    }
}

impl TokenSource for CredentialStore {
    fn token(&self) -> Option<SecretString> {
        CredentialStore::token(self)
    }

    fn revoke(&self) {
        if let Err(e) = self.clear() {
            warn!(error = %e, "failed to clear revoked credentials");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> User {
        serde_json::from_value(json!({ "id": "U1", "email": "ada@example.com" })).unwrap()
    }

    #[test]
    fn token_and_identity_round_trip() {
        let store = CredentialStore::in_memory();
        assert!(store.token().is_none());

        store.store_token(&SecretString::from("tok".to_string())).unwrap();
        store.store_identity(&user()).unwrap();

        assert_eq!(store.token().unwrap().expose_secret(), "tok");
        assert_eq!(store.identity().unwrap().id, "U1");
    }

    #[test]
    fn malformed_identity_reads_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        backend.save(IDENTITY_KEY, "{not json").unwrap();
        let store = CredentialStore::new(backend);
        assert!(store.identity().is_none());
    }

    #[test]
    fn clear_removes_both_keys() {
        let store = CredentialStore::in_memory();
        store.store_token(&SecretString::from("tok".to_string())).unwrap();
        store.store_identity(&user()).unwrap();

        store.clear().unwrap();
        assert!(store.token().is_none());
        assert!(store.identity().is_none());
    }

    #[test]
    fn revoke_clears_credentials() {
        let store = CredentialStore::in_memory();
        store.store_token(&SecretString::from("tok".to_string())).unwrap();
        TokenSource::revoke(&store);
        assert!(TokenSource::token(&store).is_none());
    }

    #[test]
    fn file_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        FileBackend::new(&path).save(TOKEN_KEY, "tok").unwrap();
        let reopened = FileBackend::new(&path);
        assert_eq!(reopened.load(TOKEN_KEY).unwrap().as_deref(), Some("tok"));

        reopened.delete(TOKEN_KEY).unwrap();
        assert!(reopened.load(TOKEN_KEY).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "garbage").unwrap();

        let backend = FileBackend::new(&path);
        assert!(backend.load(TOKEN_KEY).unwrap().is_none());

        backend.save(TOKEN_KEY, "fresh").unwrap();
        assert_eq!(backend.load(TOKEN_KEY).unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn deleting_from_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("absent.json"));
        backend.delete(TOKEN_KEY).unwrap();
        assert!(!backend.path().exists());
    }
}
