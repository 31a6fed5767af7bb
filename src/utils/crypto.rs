// Cryptographic utilities for generating secure state tokens and nonces

use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;

/// Entropy carried by a CSRF state token (256 bits)
pub const STATE_TOKEN_BYTES: usize = 32;

/// Generate a cryptographically secure CSRF state token
///
/// 32 bytes (256 bits) of entropy, base64url-encoded without padding so it is
/// safe to carry in a query parameter.
#[must_use]
pub fn generate_state_token() -> String {
    generate_nonce(STATE_TOKEN_BYTES)
}

/// Generate a cryptographically secure nonce of the given byte length
///
/// # Returns
///
/// A base64url-encoded string representing `length` bytes of random data
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}
