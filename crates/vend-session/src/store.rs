use std::sync::RwLock;

use crate::credential::Credential;

/// Synchronized holder for the current short-lived credential.
///
/// Deliberately dumb: no validation, no expiry checks. The coordinator is
/// the single writer (always under its single-flight guard); the
/// outbound-request layer and UI read through it.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an already-issued credential (sign-in path).
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: RwLock::new(Some(credential)),
        }
    }

    /// The currently stored credential, if any.
    #[must_use]
    pub fn current(&self) -> Option<Credential> {
        self.current.read().unwrap().clone()
    }

    pub fn save(&self, credential: Credential) {
        *self.current.write().unwrap() = Some(credential);
    }

    pub fn clear(&self) {
        *self.current.write().unwrap() = None;
    }
}
