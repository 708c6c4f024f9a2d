use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::credential::{Credential, DurableCredential};
use crate::error::SessionError;

/// One network call: exchange the durable credential for a fresh
/// short-lived credential.
///
/// Implementations must classify failures: unreachable endpoint →
/// [`SessionError::Transport`] (retryable), explicit rejection →
/// [`SessionError::RenewalRejected`] (terminal). The coordinator
/// guarantees at most one call is in flight at any instant.
pub trait RenewalClient: Send + Sync + 'static {
    fn renew(
        &self,
        durable: &DurableCredential,
    ) -> impl Future<Output = Result<Credential, SessionError>> + Send;
}

#[derive(Debug, Serialize)]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RenewalResponse {
    access_token: String,
}

/// Production renewal client: POSTs the durable credential to the
/// configured renewal endpoint.
#[derive(Debug, Clone)]
pub struct HttpRenewalClient {
    http: reqwest::Client,
    renewal_url: String,
}

impl HttpRenewalClient {
    /// Build a client from the session configuration.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transport` if the underlying HTTP client
    /// cannot be constructed (TLS backend initialization).
    pub fn new(config: &vend_config::SessionConfig) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SessionError::Transport(format!("http client init: {e}")))?;
        Ok(Self {
            http,
            renewal_url: config.renewal_url.clone(),
        })
    }
}

impl RenewalClient for HttpRenewalClient {
    async fn renew(&self, durable: &DurableCredential) -> Result<Credential, SessionError> {
        let response = self
            .http
            .post(&self.renewal_url)
            .json(&RenewalRequest {
                refresh_token: durable.expose(),
            })
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "renewal endpoint rejected the durable credential");
            return Err(SessionError::RenewalRejected(format!("{status}: {body}")));
        }
        if !status.is_success() {
            // 5xx and friends say nothing about the durable credential.
            return Err(SessionError::Transport(format!(
                "renewal endpoint returned {status}"
            )));
        }

        let payload: RenewalResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Transport(format!("renewal response body: {e}")))?;

        // An access token we cannot decode an expiry from is unusable.
        Credential::from_raw(payload.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renewal_request_serializes_expected_wire_format() {
        let body = serde_json::to_string(&RenewalRequest {
            refresh_token: "durable_abc",
        })
        .expect("serialize");
        assert_eq!(body, r#"{"refresh_token":"durable_abc"}"#);
    }

    #[test]
    fn renewal_response_deserializes_and_ignores_extras() {
        let payload: RenewalResponse = serde_json::from_str(
            r#"{"access_token":"jwt.like.token","token_type":"Bearer","expires_in":900}"#,
        )
        .expect("deserialize");
        assert_eq!(payload.access_token, "jwt.like.token");
    }
}
