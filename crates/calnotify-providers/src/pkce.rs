//! PKCE (RFC 7636) material and anti-forgery request keys.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Random bytes in a request key.
const REQUEST_KEY_LENGTH: usize = 16;

/// A PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Sent on code exchange.
    pub verifier: String,
    /// Embedded in the authorization URL.
    pub challenge: String,
}

impl PkceChallenge {
    /// Generates a fresh random verifier.
    pub fn generate() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

/// Generates an unguessable key identifying one authorization request.
pub fn generate_request_key() -> String {
    random_token(REQUEST_KEY_LENGTH)
}

/// Compares two request keys without short-circuiting on the first
/// differing byte.
///
/// Both sides are hashed first so the comparison length never depends on
/// the submitted value.
pub fn request_keys_match(expected: &str, submitted: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let submitted = Sha256::digest(submitted.as_bytes());
    expected
        .iter()
        .zip(submitted.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}
