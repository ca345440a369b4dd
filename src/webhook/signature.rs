//! Webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Prefix the provider puts in front of the hex signature
const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a webhook body against its `sha256=<hex>` signature header
///
/// Computes HMAC-SHA256 of the raw body under the shared secret and
/// compares in constant time. Anything malformed (missing prefix, bad hex)
/// fails verification.
#[must_use]
pub fn verify_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    let Some(signature_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    // Constant-time comparison to prevent timing attacks
    computed.as_slice().ct_eq(&signature_bytes).into()
}

/// Produce the signature header value for a body (test helper for fakes)
#[cfg(test)]
pub fn sign(body: &[u8], secret: &str) -> String {
    #[allow(clippy::unwrap_used)]
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "signature_test.rs"]
mod tests;
