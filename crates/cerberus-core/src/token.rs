//! EdDSA approval tokens carried in the client cookie.

use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::CerberusError;
use crate::state::InstanceState;

/// Claims of a signed approval cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalClaims {
    /// Challenge the client solved, re-checked on every gate pass
    pub challenge: String,
    /// Accepted proof-of-work response hash
    pub response: String,
    /// Approval counter id (hyphenated UUID)
    pub approval_id: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Sign approval claims into a compact JWS.
pub fn sign_approval(
    state: &InstanceState,
    claims: &ApprovalClaims,
) -> Result<String, CerberusError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::EdDSA),
        claims,
        state.jwt_encoding_key(),
    )
    .map_err(|e| CerberusError::Signing(e.to_string()))
}

/// Verify a cookie token against this instance's key. The algorithm is
/// pinned to EdDSA and `exp` is enforced.
pub fn verify_approval(
    state: &InstanceState,
    token: &str,
) -> Result<ApprovalClaims, CerberusError> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);
    // A cookie is expired the moment exp passes; no grace window.
    validation.leeway = 0;

    jsonwebtoken::decode::<ApprovalClaims>(token, state.jwt_decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| CerberusError::Token(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_state(seed_byte: &str) -> InstanceState {
        let mut config = Config::default();
        config.max_mem_usage = 1 << 20;
        config.ed25519_key = Some(seed_byte.repeat(32));
        InstanceState::new(&config).unwrap()
    }

    fn claims(now: i64) -> ApprovalClaims {
        ApprovalClaims {
            challenge: "c".repeat(64),
            response: "0".repeat(64),
            approval_id: uuid::Uuid::new_v4().to_string(),
            iat: now,
            nbf: now - 60,
            exp: now + 3600,
        }
    }

    fn unix_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[tokio::test]
    async fn sign_and_verify_round_trip() {
        let state = test_state("ab");
        let claims = claims(unix_now());

        let token = sign_approval(&state, &claims).unwrap();
        let parsed = verify_approval(&state, &token).unwrap();

        assert_eq!(parsed.challenge, claims.challenge);
        assert_eq!(parsed.approval_id, claims.approval_id);
        assert_eq!(parsed.exp, claims.exp);
    }

    #[tokio::test]
    async fn rejects_foreign_signature() {
        let signer = test_state("ab");
        let verifier = test_state("cd");

        let token = sign_approval(&signer, &claims(unix_now())).unwrap();
        assert!(verify_approval(&verifier, &token).is_err());
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let state = test_state("ab");
        let mut expired = claims(unix_now() - 7200);
        expired.exp = unix_now() - 3600;

        let token = sign_approval(&state, &expired).unwrap();
        assert!(verify_approval(&state, &token).is_err());
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let state = test_state("ab");
        assert!(verify_approval(&state, "not.a.jwt").is_err());
        assert!(verify_approval(&state, "").is_err());
    }
}
