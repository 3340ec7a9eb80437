//! Per-attempt randomness: the PKCE pair and the `state` parameter.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// `code_challenge_method` sent with every authorization request.
pub const CHALLENGE_METHOD: &str = "S256";

const VERIFIER_BYTES: usize = 48;
const STATE_BYTES: usize = 16;

fn random_urlsafe<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random code verifier: 64 base64url characters (RFC 7636 allows 43-128).
#[must_use]
pub fn generate_code_verifier() -> String {
    random_urlsafe::<VERIFIER_BYTES>()
}

/// `BASE64URL(SHA256(verifier))`
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random `state`, 22 base64url characters.
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe::<STATE_BYTES>()
}
