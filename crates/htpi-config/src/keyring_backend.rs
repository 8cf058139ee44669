// OS keyring credential backend
//
// Entries live under the `htpi` service with `{profile}/{key}` accounts, so
// each profile keeps its own token and identity.

use tracing::debug;

use htpi_core::{CoreError, CredentialBackend};

use crate::KEYRING_SERVICE;

#[derive(Debug, Clone)]
pub struct KeyringBackend {
    profile: String,
}

impl KeyringBackend {
    pub fn new(profile: &str) -> Self {
        Self {
            profile: profile.to_owned(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, CoreError> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("{}/{key}", self.profile))
            .map_err(storage_error)
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self, key: &str) -> Result<Option<String>, CoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entry(key)?.set_password(value).map_err(storage_error)
    }

    fn delete(&self, key: &str) -> Result<(), CoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                debug!(profile = %self.profile, key, error = %e, "keyring delete failed");
                Err(storage_error(e))
            }
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn storage_error(e: keyring::Error) -> CoreError {
    CoreError::Storage {
        message: format!("keyring: {e}"),
    }
}
