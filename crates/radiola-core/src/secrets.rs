//! Account password storage in the platform keyring, keyed by email.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::platform::APP_ID;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Storage behind [`SecretService`].
pub trait SecretBackend: Send + Sync {
    fn get(&self, email: &str) -> Result<Option<String>, SecretError>;
    fn set(&self, email: &str, label: &str, password: &str) -> Result<(), SecretError>;
    /// Deleting a missing entry is not an error.
    fn delete(&self, email: &str) -> Result<(), SecretError>;
}

/// Platform keyring (Secret Service on Linux, Keychain, Credential Manager).
pub struct Keyring {
    service: String,
}

impl Keyring {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, email: &str) -> Result<keyring::Entry, SecretError> {
        Ok(keyring::Entry::new(&self.service, email)?)
    }
}

impl SecretBackend for Keyring {
    fn get(&self, email: &str) -> Result<Option<String>, SecretError> {
        match self.entry(email)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, email: &str, _label: &str, password: &str) -> Result<(), SecretError> {
        self.entry(email)?.set_password(password)?;
        Ok(())
    }

    fn delete(&self, email: &str) -> Result<(), SecretError> {
        match self.entry(email)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

const ACCOUNT_LABEL: &str = "Radiola Account";

#[derive(Clone)]
pub struct SecretService {
    backend: Arc<dyn SecretBackend>,
}

impl Default for SecretService {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretService {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(Keyring::new(format!("{APP_ID}.Account"))))
    }

    pub fn with_backend(backend: Arc<dyn SecretBackend>) -> Self {
        Self { backend }
    }

    /// Stored password for `email`, or an empty string.
    pub fn get_account_password(&self, email: &str) -> String {
        match self.backend.get(email) {
            Ok(password) => password.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to look up password for {}: {}", email, e);
                String::new()
            }
        }
    }

    pub fn clear_account_password(&self, email: &str) -> Result<(), SecretError> {
        self.backend.delete(email)
    }

    /// Store `password` for `email`.
    ///
    /// When `previous_email` differs from `email` its entry is cleared first.
    /// An empty password clears the entry.  Returns `Ok(false)` when the
    /// stored password was already `password`.
    pub fn set_account_password(
        &self,
        email: &str,
        password: &str,
        previous_email: Option<&str>,
    ) -> Result<bool, SecretError> {
        if let Some(previous) = previous_email.filter(|p| !p.is_empty() && *p != email) {
            if let Err(e) = self.clear_account_password(previous) {
                warn!("Failed to clear previous account password: {}", e);
            }
        }

        if password.is_empty() {
            self.clear_account_password(email)?;
            return Ok(true);
        }

        if self.get_account_password(email) == password {
            debug!("Account password unchanged");
            return Ok(false);
        }

        self.backend.set(email, ACCOUNT_LABEL, password)?;
        Ok(true)
    }

    pub async fn get_account_password_async(&self, email: &str) -> String {
        let this = self.clone();
        let email = email.to_string();
        match tokio::task::spawn_blocking(move || this.get_account_password(&email)).await {
            Ok(password) => password,
            Err(e) => {
                warn!("Password lookup task failed: {}", e);
                String::new()
            }
        }
    }

    pub async fn clear_account_password_async(&self, email: &str) -> Result<(), SecretError> {
        let this = self.clone();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || this.clear_account_password(&email)).await?
    }

    pub async fn set_account_password_async(
        &self,
        email: &str,
        password: &str,
        previous_email: Option<&str>,
    ) -> Result<bool, SecretError> {
        let this = self.clone();
        let email = email.to_string();
        let password = password.to_string();
        let previous = previous_email.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            this.set_account_password(&email, &password, previous.as_deref())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryBackend {
        entries: Mutex<HashMap<String, String>>,
        writes: Mutex<usize>,
    }

    impl SecretBackend for MemoryBackend {
        fn get(&self, email: &str) -> Result<Option<String>, SecretError> {
            Ok(self.entries.lock().unwrap().get(email).cloned())
        }

        fn set(&self, email: &str, label: &str, password: &str) -> Result<(), SecretError> {
            assert_eq!(label, ACCOUNT_LABEL);
            *self.writes.lock().unwrap() += 1;
            self.entries
                .lock()
                .unwrap()
                .insert(email.to_string(), password.to_string());
            Ok(())
        }

        fn delete(&self, email: &str) -> Result<(), SecretError> {
            self.entries.lock().unwrap().remove(email);
            Ok(())
        }
    }

    fn service() -> (Arc<MemoryBackend>, SecretService) {
        let backend = Arc::new(MemoryBackend::default());
        (backend.clone(), SecretService::with_backend(backend))
    }

    #[test]
    fn missing_password_is_empty() {
        let (_, secrets) = service();
        assert_eq!(secrets.get_account_password("nobody@example.com"), "");
    }

    #[test]
    fn unchanged_password_is_not_rewritten() {
        let (backend, secrets) = service();
        assert!(secrets.set_account_password("a@example.com", "pw", None).unwrap());
        assert!(!secrets.set_account_password("a@example.com", "pw", None).unwrap());
        assert_eq!(*backend.writes.lock().unwrap(), 1);
        assert_eq!(secrets.get_account_password("a@example.com"), "pw");
    }

    #[test]
    fn empty_password_clears() {
        let (_, secrets) = service();
        secrets.set_account_password("a@example.com", "pw", None).unwrap();
        assert!(secrets.set_account_password("a@example.com", "", None).unwrap());
        assert_eq!(secrets.get_account_password("a@example.com"), "");
    }

    #[test]
    fn changing_email_clears_previous_entry() {
        let (backend, secrets) = service();
        secrets.set_account_password("old@example.com", "pw", None).unwrap();
        secrets
            .set_account_password("new@example.com", "pw", Some("old@example.com"))
            .unwrap();
        let entries = backend.entries.lock().unwrap();
        assert!(!entries.contains_key("old@example.com"));
        assert_eq!(entries["new@example.com"], "pw");
    }

    #[tokio::test]
    async fn async_variants_match_sync_behavior() {
        let (_, secrets) = service();
        assert!(secrets
            .set_account_password_async("a@example.com", "secret", None)
            .await
            .unwrap());
        assert_eq!(secrets.get_account_password_async("a@example.com").await, "secret");
        secrets.clear_account_password_async("a@example.com").await.unwrap();
        assert_eq!(secrets.get_account_password_async("a@example.com").await, "");
    }
}
