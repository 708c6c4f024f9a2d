use base64::Engine as _;

use crate::error::SessionError;

/// Decode a bearer token's `exp` claim without signature validation.
///
/// This is a best-effort check — the coordinator only needs the expiry
/// instant for scheduling; authenticity is the server's problem on every
/// request that carries the token.
///
/// # Errors
///
/// Returns `SessionError::MalformedCredential` if the token format is
/// invalid or the `exp` claim is missing or cannot be parsed.
pub fn expiry_of(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, SessionError> {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() != 3 {
        return Err(SessionError::MalformedCredential(
            "invalid JWT format".into(),
        ));
    }
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| SessionError::MalformedCredential(format!("base64 decode failed: {e}")))?;
    let value: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| SessionError::MalformedCredential(format!("JSON parse failed: {e}")))?;
    let exp = value["exp"]
        .as_i64()
        .ok_or_else(|| SessionError::MalformedCredential("missing exp claim".into()))?;
    chrono::DateTime::from_timestamp(exp, 0)
        .ok_or_else(|| SessionError::MalformedCredential("invalid exp timestamp".into()))
}

#[cfg(test)]
pub(crate) fn make_jwt_with_exp(exp: i64) -> String {
    let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#);
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(format!(r#"{{"sub":"cust_123","exp":{exp}}}"#));
    let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("fake_sig");
    format!("{header}.{payload}.{signature}")
}
