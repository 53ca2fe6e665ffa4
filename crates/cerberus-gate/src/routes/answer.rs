//! The answer endpoint: verifies a submitted proof of work and issues the
//! signed approval cookie.

use axum::extract::{FromRequest, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Form;
use chrono::Utc;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use cerberus_core::challenge::{calc_signature, challenge_for};
use cerberus_core::constants::{status, NONCE_TTL};
use cerberus_core::token::{self, ApprovalClaims};
use cerberus_core::Config;

use crate::client_ip;
use crate::pages;
use crate::routes::gate::{set_status, OwnedAttrs};
use crate::state::AppState;

/// Form fields posted by the challenge page
#[derive(Debug, Deserialize)]
pub struct AnswerForm {
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub redir: String,
}

/// `POST {base}/answer`
pub async fn handle(State(state): State<AppState>, req: Request) -> Response {
    let (config, core) = state.instance.snapshot();
    let base = &state.settings.base_url;

    let client = client_ip::extract(&req, config.prefix_cfg);
    let attrs = OwnedAttrs::from_request(&req, &client);

    let form = match Form::<AnswerForm>::from_request(req, &()).await {
        Ok(Form(form)) => form,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse answer form");
            return fail(&config, base, StatusCode::BAD_REQUEST, "malformed form submission");
        }
    };

    if form.nonce.is_empty() {
        return fail(&config, base, StatusCode::BAD_REQUEST, "nonce is empty");
    }
    let nonce: u32 = match form.nonce.parse() {
        Ok(nonce) => nonce,
        Err(_) => return fail(&config, base, StatusCode::BAD_REQUEST, "nonce is not an integer"),
    };
    if !core.insert_used_nonce(nonce) {
        tracing::info!(nonce, "nonce already used");
        return fail(&config, base, StatusCode::BAD_REQUEST, "nonce already used");
    }

    if form.ts.is_empty() {
        return fail(&config, base, StatusCode::BAD_REQUEST, "ts is empty");
    }
    let ts: i64 = match form.ts.parse() {
        Ok(ts) => ts,
        Err(_) => return fail(&config, base, StatusCode::BAD_REQUEST, "ts is not an integer"),
    };
    let now = Utc::now().timestamp();
    if ts < now - NONCE_TTL.as_secs() as i64 || ts > now {
        tracing::info!(ts, now, "timestamp outside the accepted window");
        return fail(&config, base, StatusCode::FORBIDDEN, "invalid ts");
    }

    if form.signature.is_empty() {
        return fail(&config, base, StatusCode::BAD_REQUEST, "signature is empty");
    }
    if form.response.is_empty() {
        return fail(&config, base, StatusCode::BAD_REQUEST, "response is empty");
    }
    if form.solution.is_empty() {
        return fail(&config, base, StatusCode::BAD_REQUEST, "solution is empty");
    }
    let solution: i64 = match form.solution.parse() {
        Ok(solution) => solution,
        Err(_) => {
            return fail(&config, base, StatusCode::BAD_REQUEST, "solution is not an integer")
        }
    };

    let challenge = challenge_for(&attrs.as_attrs(), core.fingerprint(), config.difficulty);

    // The signature proves this (challenge, nonce, ts) tuple was issued by
    // us; it is over server-generated data, so a plain compare suffices.
    let expected_signature = calc_signature(&challenge, nonce, ts, core.signing_key());
    if form.signature != expected_signature {
        tracing::debug!("signature mismatch");
        return fail(&config, base, StatusCode::FORBIDDEN, "signature mismatch");
    }

    let answer = hex::encode(
        blake3::hash(
            format!("{challenge}|{nonce}|{ts}|{}|{solution}", form.signature).as_bytes(),
        )
        .as_bytes(),
    );

    if !meets_difficulty(&form.response, config.difficulty) {
        tracing::info!(difficulty = config.difficulty, "response does not meet difficulty");
        return fail_clearing_cookie(&config, base, StatusCode::FORBIDDEN, "wrong response");
    }

    if !bool::from(answer.as_bytes().ct_eq(form.response.as_bytes())) {
        tracing::info!("response mismatch");
        return fail_clearing_cookie(&config, base, StatusCode::FORBIDDEN, "response mismatch");
    }

    // Challenge passed: issue an approval and hand the client its cookie.
    let approval_id = core.issue_approval(config.access_per_approval);
    let claims = ApprovalClaims {
        challenge,
        response: form.response.clone(),
        approval_id: approval_id.to_string(),
        iat: now,
        nbf: now - 60,
        exp: now + config.approval_ttl.as_secs() as i64,
    };
    let token = match token::sign_approval(&core, &claims) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %e, "failed to sign token");
            return fail(&config, base, StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };

    let Ok(location) = HeaderValue::from_str(&form.redir) else {
        return fail(&config, base, StatusCode::BAD_REQUEST, "invalid redirect target");
    };

    tracing::debug!(approval_id = %approval_id, "user passed the challenge");

    if let Some(block) = client.block {
        core.dec_pending(block);
    }

    let cookie = pages::approval_cookie(&config.cookie_name, &token, config.approval_ttl);
    let mut res = Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header(header::LOCATION, location)
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        res.headers_mut().insert(header::SET_COOKIE, value);
    }
    res
}

/// True iff the response hash has `difficulty` leading zero half-bytes:
/// the first `difficulty / 2` hex digits must be `'0'`, and for an odd
/// difficulty the next digit must sort below `'8'`.
fn meets_difficulty(response: &str, difficulty: u32) -> bool {
    let full = (difficulty / 2) as usize;
    let bytes = response.as_bytes();

    if bytes.len() < full + (difficulty % 2) as usize {
        return false;
    }
    if !bytes[..full].iter().all(|&b| b == b'0') {
        return false;
    }
    if difficulty % 2 == 1 && bytes[full] >= b'8' {
        return false;
    }
    true
}

fn fail(config: &Config, base: &str, code: StatusCode, msg: &str) -> Response {
    let html = pages::error_page(config, base, "An error occurred", msg);
    let mut res = (code, Html(html)).into_response();
    set_status(&mut res, config, status::FAIL);
    res
}

fn fail_clearing_cookie(config: &Config, base: &str, code: StatusCode, msg: &str) -> Response {
    let mut res = fail(config, base, code, msg);
    if let Ok(value) = HeaderValue::from_str(&pages::clear_cookie(&config.cookie_name)) {
        res.headers_mut().insert(header::SET_COOKIE, value);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_counts_half_bytes() {
        // Even difficulty: exact number of leading zero digits
        assert!(meets_difficulty(&format!("00{}", "f".repeat(62)), 4));
        assert!(!meets_difficulty(&format!("0f{}", "f".repeat(62)), 4));

        // Odd difficulty: next digit must be below '8'
        assert!(meets_difficulty(&format!("07{}", "f".repeat(62)), 3));
        assert!(!meets_difficulty(&format!("08{}", "f".repeat(62)), 3));
        assert!(meets_difficulty(&format!("7{}", "f".repeat(63)), 1));
        assert!(!meets_difficulty(&format!("8{}", "f".repeat(63)), 1));

        // Degenerate inputs
        assert!(!meets_difficulty("", 1));
        assert!(!meets_difficulty("0", 4));
    }
}
