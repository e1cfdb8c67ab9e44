//! `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

const PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &SecretString, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    mac
}

/// Returns `true` if no secret is configured, or if `signature` is `sha256=<lowercase hex>` of
/// the HMAC-SHA256 of `body` keyed by `secret`.
///
/// The digest comparison is constant-time.
pub fn verify(body: &[u8], signature: Option<&str>, secret: Option<&SecretString>) -> bool {
    let Some(secret) = secret.filter(|s| !s.expose_secret().is_empty()) else {
        return true;
    };
    let Some(hex) = signature.and_then(|s| s.strip_prefix(PREFIX)) else {
        return false;
    };
    // the header is compared as text upstream, so an uppercase digest is a different signature
    if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return false;
    }
    let Ok(digest) = hex::decode(hex) else {
        return false;
    };
    mac(secret, body).verify_slice(&digest).is_ok()
}

/// Computes the `sha256=...` header value for `body`.
pub fn sign(body: &[u8], secret: &SecretString) -> String {
    format!(
        "{PREFIX}{}",
        hex::encode(mac(secret, body).finalize().into_bytes())
    )
}
