use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Requests older than this are treated as replays.
const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

/// Verify a Slack request signature.
///
/// Slack sends `X-Slack-Signature: v0=<hex>` where the MAC covers
/// `v0:{X-Slack-Request-Timestamp}:{raw body}`.
pub fn verify_signature(
    secret: &str,
    timestamp_header: &str,
    payload: &[u8],
    signature_header: &str,
    now: i64,
) -> Result<()> {
    let timestamp_raw = timestamp_header.trim();
    let timestamp: i64 = timestamp_raw
        .parse()
        .map_err(|_| AppError::SignatureVerification("Invalid request timestamp".to_string()))?;

    if (now - timestamp).abs() > MAX_REQUEST_AGE_SECS {
        return Err(AppError::SignatureVerification(
            "Request timestamp outside the allowed window".to_string(),
        ));
    }

    let signature_hex = signature_header
        .strip_prefix("v0=")
        .ok_or_else(|| AppError::SignatureVerification("Missing v0= prefix".to_string()))?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| AppError::SignatureVerification(format!("Invalid hex in signature: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::SignatureVerification(format!("Invalid HMAC key: {e}")))?;

    mac.update(b"v0:");
    // Slack signs the header text as sent
    mac.update(timestamp_raw.as_bytes());
    mac.update(b":");
    mac.update(payload);

    mac.verify_slice(&signature_bytes)
        .map_err(|_| AppError::SignatureVerification("Signature mismatch".to_string()))
}

/// Compute the `v0=` signature for a body. Used by tests and local tooling.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::SignatureVerification(format!("Invalid HMAC key: {e}")))?;
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(payload);
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}
