//! PKCE (Proof Key for Code Exchange) verifier and S256 challenge.
//!
//! The verifier is drawn from the 66-character unreserved URI alphabet using
//! the operating system's CSPRNG. The challenge is
//! `BASE64URL-NOPAD(SHA256(verifier))` and is never persisted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rootcause::prelude::Report;
use sha2::{Digest, Sha256};

use crate::error::SessionError;

/// Characters allowed in a code verifier: `[A-Za-z0-9-._~]`.
pub const UNRESERVED_ALPHABET: &[u8; 66] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Shortest verifier accepted by RFC 7636.
pub const MIN_VERIFIER_LENGTH: usize = 43;

/// Longest verifier accepted by RFC 7636.
pub const MAX_VERIFIER_LENGTH: usize = 128;

/// Verifier length used for every login attempt.
pub const DEFAULT_VERIFIER_LENGTH: usize = MAX_VERIFIER_LENGTH;

/// Challenge method sent with the authorization request.
pub const CHALLENGE_METHOD: &str = "S256";

/// Generates a code verifier of exactly `length` characters.
///
/// Each random byte is reduced modulo the alphabet size. The modulo bias
/// this introduces is accepted.
///
/// # Errors
///
/// Returns `InvalidVerifierLength` for lengths outside 43..=128 and
/// `RandomSourceFailed` if the CSPRNG cannot be read.
pub fn generate_verifier(length: usize) -> Result<String, Report<SessionError>> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(SessionError::InvalidVerifierLength { length }.into());
    }

    let mut bytes = vec![0u8; length];
    getrandom::fill(&mut bytes).map_err(|e| SessionError::RandomSourceFailed {
        details: e.to_string(),
    })?;

    Ok(bytes
        .iter()
        .map(|byte| char::from(UNRESERVED_ALPHABET[usize::from(*byte) % UNRESERVED_ALPHABET.len()]))
        .collect())
}

/// Derives the S256 code challenge for `verifier`.
#[must_use]
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// A verifier together with its challenge, generated for one login attempt.
#[derive(Clone)]
pub struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    /// Generates a fresh verifier of `length` characters and its challenge.
    ///
    /// # Errors
    ///
    /// See [`generate_verifier`].
    pub fn generate(length: usize) -> Result<Self, Report<SessionError>> {
        let verifier = generate_verifier(length)?;
        let challenge = compute_challenge(&verifier);
        Ok(Self {
            verifier,
            challenge,
        })
    }

    /// Returns the secret verifier.
    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Returns the public challenge.
    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}
