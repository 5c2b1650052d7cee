//! HMAC-SHA256 webhook signatures
//!
//! Accepted header forms: `sha256=<hex>` (scheme case-insensitive) or bare
//! `<hex>`. Comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "sha256";

/// Decode the digest carried by a signature header.
///
/// Returns `None` for an unknown scheme, invalid hex, or a digest that is
/// not 32 bytes long.
#[must_use]
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let header = header.trim();
    let hex_part = match header.split_once('=') {
        Some((scheme, digest)) if scheme.trim().eq_ignore_ascii_case(SCHEME) => digest.trim(),
        Some(_) => return None,
        None => header,
    };
    let digest = hex::decode(hex_part).ok()?;
    (digest.len() == 32).then_some(digest)
}

/// Check `header_signature` against the HMAC of `body` under `secret`.
#[must_use]
pub fn verify(secret: &[u8], body: &[u8], header_signature: &str) -> bool {
    let Some(expected) = parse_signature_header(header_signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature header value for `body`, in `sha256=<hex>` form.
#[must_use]
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{SCHEME}={}", hex::encode(mac.finalize().into_bytes()))
}
