use chrono::{DateTime, TimeDelta, Utc};

use crate::claims;
use crate::error::SessionError;

/// A short-lived bearer credential plus its decoded expiry.
///
/// Produced by sign-in or renewal, held by [`CredentialStore`](crate::store::CredentialStore),
/// handed to the outbound-request layer. Never stored or returned once expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Raw bearer token (attached as the `Authorization` header).
    pub token: String,
    /// Expiration instant (from the `exp` claim).
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a raw token by decoding its expiry claim.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MalformedCredential` if the expiry cannot
    /// be decoded.
    pub fn from_raw(raw: impl Into<String>) -> Result<Self, SessionError> {
        let token = raw.into();
        let expires_at = claims::expiry_of(&token)?;
        Ok(Self { token, expires_at })
    }

    /// Check if the credential is expired or expires within `buffer`.
    #[must_use]
    pub fn is_near_expiry(&self, buffer: TimeDelta) -> bool {
        self.expires_at <= Utc::now() + buffer
    }
}

/// The long-lived secret exchanged for new short-lived credentials.
///
/// Owned by the durable store; the coordinator only reads it to pass to
/// the renewal client. Never exposed to session observers.
#[derive(Clone, PartialEq, Eq)]
pub struct DurableCredential(String);

impl DurableCredential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for the renewal request body only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// The secret must never leak through logs or panic messages.
impl std::fmt::Debug for DurableCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DurableCredential(<redacted>)")
    }
}
