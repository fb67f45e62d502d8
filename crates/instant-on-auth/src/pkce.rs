//! PKCE (Proof Key for Code Exchange) values per RFC 7636
//!
//! The verifier stays local until the token exchange; the challenge goes to
//! the authorization endpoint. The state value for each authorization request
//! is drawn the same way as the verifier but from an independent sample.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Length of verifier, challenge and state strings.
pub const PKCE_VALUE_LEN: usize = 43;

/// Verifier and the challenge derived from it, created together so they
/// cannot drift apart within one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a fresh verifier and its S256 challenge.
pub fn generate_verifier_and_challenge() -> PkcePair {
    let verifier = generate_verifier();
    let challenge = compute_challenge(&verifier);
    PkcePair {
        verifier,
        challenge,
    }
}

/// 32 CSPRNG bytes, URL-safe base64 without padding, cut to 43 characters.
pub fn generate_verifier() -> String {
    random_token()
}

/// Anti-CSRF state for one authorization request.
pub fn generate_state() -> String {
    random_token()
}

/// `challenge = BASE64URL(SHA256(verifier))[..43]`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    let mut challenge = URL_SAFE_NO_PAD.encode(hash);
    challenge.truncate(PKCE_VALUE_LEN);
    challenge
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    let mut token = URL_SAFE_NO_PAD.encode(bytes);
    token.truncate(PKCE_VALUE_LEN);
    token
}
