//! # Webhook Signature Verification
//!
//! This module verifies Patreon webhook deliveries using HMAC-SHA256 over
//! the raw request body with constant-time comparison to prevent timing
//! attacks. Each campaign carries its own webhook secret, so verification
//! happens after the target campaign has been resolved.

use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC of the request body.
pub const SIGNATURE_HEADER: &str = "x-patreon-signature";

/// Header naming the trigger, e.g. `members:pledge:create`.
pub const EVENT_HEADER: &str = "x-patreon-event";

/// Errors that can occur during webhook signature verification
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Missing required event header: {header}")]
    MissingEvent { header: String },

    #[error("Webhook secret not configured for campaign")]
    NotConfigured,
}

impl VerificationError {
    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VerificationError::MissingSignature { .. } => StatusCode::UNAUTHORIZED,
            VerificationError::InvalidSignatureFormat { .. } => StatusCode::UNAUTHORIZED,
            VerificationError::VerificationFailed => StatusCode::UNAUTHORIZED,
            VerificationError::MissingEvent { .. } => StatusCode::BAD_REQUEST,
            VerificationError::NotConfigured => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Result type for webhook verification
pub type VerificationResult<T> = Result<T, VerificationError>;

/// Verifies a Patreon webhook signature using HMAC-SHA256
pub fn verify_patreon_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult<()> {
    debug!(
        body_size = body.len(),
        "Starting Patreon signature verification"
    );

    if signature_header.is_empty() {
        return Err(VerificationError::MissingSignature {
            header: "X-Patreon-Signature".to_string(),
        });
    }

    // Compute HMAC-SHA256 of the body
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(body);
    let expected_bytes = mac.finalize().into_bytes();

    // Decode the provided signature
    let provided_bytes =
        hex::decode(signature_header).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: "X-Patreon-Signature contains invalid hex".to_string(),
        })?;

    // Compare signatures using constant-time comparison to prevent timing attacks
    let expected_bytes_array: &[u8] = expected_bytes.as_ref();
    if subtle::ConstantTimeEq::ct_eq(expected_bytes_array, &provided_bytes[..]).into() {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Extract and verify the delivery against the campaign's webhook secret,
/// returning the event trigger name on success.
pub fn verify_delivery(
    headers: &HeaderMap,
    body: &[u8],
    secret: Option<&str>,
) -> VerificationResult<String> {
    let secret = secret.ok_or(VerificationError::NotConfigured)?;

    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    verify_patreon_signature(body, signature_header, secret)?;

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| VerificationError::MissingEvent {
            header: "X-Patreon-Event".to_string(),
        })?;

    Ok(event.to_string())
}

/// Compute the hex signature for a payload (used by tests and local tooling).
pub fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_signature_verification_success() {
        let secret = "test_secret";
        let body = b"test payload";
        let signature = sign_payload(body, secret);

        assert!(verify_patreon_signature(body, &signature, secret).is_ok());
    }

    #[test]
    fn test_signature_verification_wrong_secret() {
        let body = b"test payload";
        let signature = sign_payload(body, "secret-a");

        assert!(matches!(
            verify_patreon_signature(body, &signature, "secret-b"),
            Err(VerificationError::VerificationFailed)
        ));
    }

    #[test]
    fn test_signature_verification_tampered_body() {
        let secret = "test_secret";
        let signature = sign_payload(b"original payload", secret);

        assert!(verify_patreon_signature(b"tampered payload", &signature, secret).is_err());
    }

    #[test]
    fn test_signature_verification_missing_signature() {
        assert!(matches!(
            verify_patreon_signature(b"test payload", "", "secret"),
            Err(VerificationError::MissingSignature { .. })
        ));
    }

    #[test]
    fn test_signature_verification_invalid_hex() {
        assert!(matches!(
            verify_patreon_signature(b"test payload", "not-hex!", "secret"),
            Err(VerificationError::InvalidSignatureFormat { .. })
        ));
    }

    #[test]
    fn test_verify_delivery_returns_event() {
        let secret = "campaign-secret";
        let body = br#"{"data":{}}"#;
        let signature = sign_payload(body, secret);

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        headers.insert(EVENT_HEADER, HeaderValue::from_static("members:create"));

        let event = verify_delivery(&headers, body, Some(secret)).unwrap();
        assert_eq!(event, "members:create");
    }

    #[test]
    fn test_verify_delivery_missing_event_header() {
        let secret = "campaign-secret";
        let body = br#"{"data":{}}"#;
        let signature = sign_payload(body, secret);

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());

        assert!(matches!(
            verify_delivery(&headers, body, Some(secret)),
            Err(VerificationError::MissingEvent { .. })
        ));
    }

    #[test]
    fn test_verify_delivery_unconfigured_secret() {
        let headers = HeaderMap::new();

        assert!(matches!(
            verify_delivery(&headers, b"{}", None),
            Err(VerificationError::NotConfigured)
        ));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            VerificationError::VerificationFailed.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            VerificationError::MissingEvent {
                header: "X-Patreon-Event".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            VerificationError::NotConfigured.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
