//! Usage: PKCE verifier/challenge and `state` generation for the authorization-code flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub(crate) struct PkcePair {
    pub(crate) code_verifier: String,
    pub(crate) code_challenge: String,
}

fn random_url_safe(len: usize) -> String {
    let mut random = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut random);
    URL_SAFE_NO_PAD.encode(random)
}

pub(crate) fn generate_pkce_pair() -> PkcePair {
    let code_verifier = random_url_safe(64);
    let code_challenge = code_challenge_s256(&code_verifier);
    PkcePair {
        code_verifier,
        code_challenge,
    }
}

pub(crate) fn generate_state() -> String {
    random_url_safe(32)
}

pub(crate) fn code_challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
