use std::fs;
use std::path::PathBuf;

use crate::credential::DurableCredential;
use crate::error::SessionError;

const DEFAULT_KEYRING_SERVICE: &str = "vend-storefront";
const KEYRING_USER: &str = "refresh-credential";
const CREDENTIAL_FILE_NAME: &str = "refresh_credential";

/// Read access to wherever the long-lived renewal credential lives.
///
/// The coordinator only ever reads through this trait; writing happens at
/// the sign-in/sign-out edges, outside the refresh path.
pub trait DurableSource: Send + Sync {
    fn load(&self) -> Option<DurableCredential>;
}

/// Durable credential persistence: OS keychain with file fallback.
///
/// Load priority: keyring → `VEND_SESSION__DURABLE_CREDENTIAL` env →
/// file (`~/.vend/refresh_credential`).
#[derive(Debug, Default)]
pub struct DurableCredentialStore;

/// Returns the keyring service name.
///
/// Defaults to `"vend-storefront"`. Override via `VEND_KEYRING_SERVICE` env
/// var for testing to avoid touching production credentials.
fn keyring_service() -> String {
    std::env::var("VEND_KEYRING_SERVICE").unwrap_or_else(|_| DEFAULT_KEYRING_SERVICE.to_string())
}

impl DurableCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Persist the durable credential in the OS keychain. Falls back to
    /// file if keyring is unavailable.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreError` if both keyring and file storage fail.
    pub fn store(&self, secret: &str) -> Result<(), SessionError> {
        match keyring::Entry::new(&keyring_service(), KEYRING_USER) {
            Ok(entry) => match entry.set_password(secret) {
                Ok(()) => Ok(()),
                Err(error) => {
                    tracing::warn!(%error, "keyring store failed; falling back to file");
                    store_file(secret)
                }
            },
            Err(error) => {
                tracing::warn!(%error, "keyring unavailable; falling back to file");
                store_file(secret)
            }
        }
    }

    /// Delete the stored durable credential from keyring and file.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreError` if the credential file cannot be removed.
    pub fn delete(&self) -> Result<(), SessionError> {
        // Delete from keyring (ignore errors — may not exist)
        if let Ok(entry) = keyring::Entry::new(&keyring_service(), KEYRING_USER) {
            let _ = entry.delete_credential();
        }

        let path = credential_path()?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                SessionError::StoreError(format!("failed to delete {}: {e}", path.display()))
            })?;
        }

        Ok(())
    }
}

impl DurableSource for DurableCredentialStore {
    fn load(&self) -> Option<DurableCredential> {
        // 1. Keyring
        if let Ok(entry) = keyring::Entry::new(&keyring_service(), KEYRING_USER)
            && let Ok(secret) = entry.get_password()
            && !secret.is_empty()
        {
            return Some(DurableCredential::new(secret));
        }

        // 2. Environment variable
        if let Ok(secret) = std::env::var("VEND_SESSION__DURABLE_CREDENTIAL") {
            if !secret.is_empty() {
                return Some(DurableCredential::new(secret));
            }
        }

        // 3. File fallback
        load_file().map(DurableCredential::new)
    }
}

/// Fixed in-memory durable source, for tests and embedded hosts that
/// manage the long-lived secret themselves.
#[derive(Debug, Clone)]
pub struct StaticDurableSource(Option<DurableCredential>);

impl StaticDurableSource {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Some(DurableCredential::new(secret)))
    }

    /// A source with no durable credential at all.
    #[must_use]
    pub const fn empty() -> Self {
        Self(None)
    }
}

impl DurableSource for StaticDurableSource {
    fn load(&self) -> Option<DurableCredential> {
        self.0.clone()
    }
}

// --- Private file helpers ---

fn credential_path() -> Result<PathBuf, SessionError> {
    dirs::home_dir()
        .map(|h| h.join(".vend").join(CREDENTIAL_FILE_NAME))
        .ok_or_else(|| {
            SessionError::StoreError("home directory not found — cannot store credentials".into())
        })
}

fn store_file(secret: &str) -> Result<(), SessionError> {
    let path = credential_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SessionError::StoreError(format!("mkdir {}: {e}", parent.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700)) {
                tracing::warn!("failed to chmod 0700 {}: {e}", parent.display());
            }
        }
    }
    fs::write(&path, secret)
        .map_err(|e| SessionError::StoreError(format!("write {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(|e| SessionError::StoreError(format!("chmod {}: {e}", path.display())))?;
    }

    Ok(())
}

fn load_file() -> Option<String> {
    let path = credential_path().ok()?;
    fs::read_to_string(&path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
