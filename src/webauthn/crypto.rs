//! `WebAuthn` cryptography helpers
//!
//! Challenge generation, hashing, and the base64url encoding used for every
//! byte field that crosses the wire.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use ring::digest;

use super::errors::CeremonyError;

/// Number of random bytes in a challenge (256 bits)
pub const CHALLENGE_LENGTH: usize = 32;

/// Generate a secure random challenge
#[must_use]
pub fn generate_challenge() -> Vec<u8> {
    let mut bytes = vec![0u8; CHALLENGE_LENGTH];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Opaque user handle for a subject
///
/// The handle is the subject id's UTF-8 bytes, so the same subject always maps
/// to the same handle and an assertion's `userHandle` can be checked against it.
#[must_use]
pub fn user_handle(subject_id: &str) -> Vec<u8> {
    subject_id.as_bytes().to_vec()
}

#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let hash = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_ref());
    out
}

#[must_use]
pub fn encode_b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a base64url field from a client response
///
/// Browsers always send unpadded base64url, but some client libraries pad it.
///
/// # Errors
///
/// Returns `MalformedResponse` naming the field if the value is not base64url.
pub fn decode_b64url(value: &str, field: &str) -> Result<Vec<u8>, CeremonyError> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|_| CeremonyError::malformed(format!("Invalid base64url in {field}")))
}
