//! Webhook signature verification.
//!
//! Each gateway canonicalizes its payload differently, but all of them
//! recompute the expected digest with the shared secret and compare it to the
//! supplied one in constant time. Nothing in the payload may be trusted before
//! one of the `verify_*` functions returns `true`.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message`
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Hex-encoded MD5 of the `|`-joined field tuple
pub fn md5_tuple_hex(fields: &[&str]) -> String {
    let mut hasher = Md5::new();
    hasher.update(fields.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two hex signatures (case-insensitive)
pub fn signatures_match(expected: &str, supplied: &str) -> bool {
    let expected = expected.trim().to_ascii_lowercase();
    let supplied = supplied.trim().to_ascii_lowercase();

    if expected.is_empty() || expected.len() != supplied.len() {
        return false;
    }

    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}

/// Verify an HMAC-SHA256 signature over a canonical message
pub fn verify_hmac_sha256(message: &str, signature: &str, secret: &str) -> bool {
    signatures_match(&hmac_sha256_hex(secret, message), signature)
}

/// Verify an MD5 signature over a fixed field tuple
pub fn verify_md5_tuple(fields: &[&str], signature: &str) -> bool {
    signatures_match(&md5_tuple_hex(fields), signature)
}
