use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Check an `X-Hub-Signature-256` header (`sha256=<hex>`) against the raw
/// request body. The comparison is constant-time.
pub fn verify_signature(secret: &str, payload: &[u8], signature_header: &str) -> Result<()> {
    let expected = decode_header(signature_header)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::WebhookVerification(format!("Invalid HMAC key: {e}")))?;
    mac.update(payload);

    mac.verify_slice(&expected)
        .map_err(|_| AppError::WebhookVerification("Signature mismatch".to_string()))
}

fn decode_header(signature_header: &str) -> Result<Vec<u8>> {
    let hex_digest = signature_header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| AppError::WebhookVerification("Missing sha256= prefix".to_string()))?;

    hex::decode(hex_digest)
        .map_err(|e| AppError::WebhookVerification(format!("Invalid hex in signature: {e}")))
}
