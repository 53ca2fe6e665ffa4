//! Challenge derivation and answer signatures.
//!
//! The challenge is a deterministic BLAKE3 fingerprint over the attributes
//! that identify a client to this instance. The gate and the answer endpoint
//! never share state about an issued challenge; they agree because both
//! re-derive it from the same request identity.

use ed25519_dalek::{Signer, SigningKey};

use crate::constants::{IV1, IV2};

/// Request attributes the challenge is derived from
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAttrs<'a> {
    /// `Accept-Language` header, empty if absent
    pub accept_language: &'a str,
    /// Extracted client IP, as the host reported it
    pub client_ip: &'a str,
    /// `User-Agent` header, empty if absent
    pub user_agent: &'a str,
}

/// Derive the challenge for a client identity: 64 hex chars of
/// BLAKE3 over the canonical attribute string.
pub fn challenge_for(attrs: &ClientAttrs<'_>, fingerprint: &str, difficulty: u32) -> String {
    let payload = format!(
        "Accept-Language={},X-Real-IP={},User-Agent={},Fingerprint={},Difficulty={},IV={}",
        attrs.accept_language, attrs.client_ip, attrs.user_agent, fingerprint, difficulty, IV1,
    );

    hex::encode(blake3::hash(payload.as_bytes()).as_bytes())
}

/// Sign `(challenge, nonce, ts)` so the answer endpoint can later check the
/// tuple was issued by this instance.
pub fn calc_signature(challenge: &str, nonce: u32, ts: i64, key: &SigningKey) -> String {
    let payload = format!("Challenge={challenge},Nonce={nonce},TS={ts},IV={IV2}");

    hex::encode(key.sign(payload.as_bytes()).to_bytes())
}
