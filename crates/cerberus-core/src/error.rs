//! Common error types for the Cerberus core.

use thiserror::Error;

/// Errors surfaced by the core state machine
#[derive(Debug, Error)]
pub enum CerberusError {
    /// Configuration rejected at provision time
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Signing key material could not be loaded
    #[error("failed to load ed25519 key: {0}")]
    KeyLoad(String),

    /// A cache could not be constructed from the memory budget
    #[error("cache construction failed: {0}")]
    CacheConstruction(String),

    /// Client address could not be turned into an aggregate key
    #[error("invalid client address: {0}")]
    IpExtraction(String),

    /// Approval cookie or its JWT was rejected
    #[error("token rejected: {0}")]
    Token(String),

    /// Signing the approval token failed
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl CerberusError {
    /// HTTP status code this error maps to when it reaches a client
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::KeyLoad(_) => 500,
            Self::CacheConstruction(_) => 500,
            Self::IpExtraction(_) => 400,
            Self::Token(_) => 403,
            Self::Signing(_) => 500,
        }
    }
}
