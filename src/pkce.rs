use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::OAuthError;

const VERIFIER_BYTES: usize = 32;
const S256: &str = "S256";

/// Proof Key for Code Exchange (RFC 7636). Lives for a single sign-in
/// attempt and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl PkcePair {
    pub fn generate() -> Result<Self, OAuthError> {
        let mut bytes = [0u8; VERIFIER_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| OAuthError::auth(format!("os rng error: {err}")))?;
        Ok(Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let digest = hasher.finalize();
        let code_challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: S256.to_string(),
        }
    }
}
