//! Delivery signature verification.
//!
//! The platform signs every webhook body with HMAC-SHA256 under the app's
//! shared secret and sends the base64 digest in `x-shopify-hmac-sha256`.
//! Verification must run over the exact raw bytes received, before any JSON
//! parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the base64 signature of `body` under `secret`.
#[must_use]
pub fn compute_signature(body: &[u8], secret: &str) -> String {
    BASE64.encode(digest(body, secret))
}

/// Returns true if `signature` is the valid signature of `body` under `secret`.
///
/// Malformed base64 or a digest of the wrong length is a mismatch. The
/// comparison runs in constant time.
#[must_use]
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(provided) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let expected = digest(body, secret);
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn digest(body: &[u8], secret: &str) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}
