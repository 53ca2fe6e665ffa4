//! The gate: screens every request headed for the origin.
//!
//! Decision per request: pass (valid unexhausted approval), challenge
//! (anything wrong with the cookie), reject (blocked IP aggregate), or drop
//! the connection outright.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use uuid::Uuid;

use cerberus_core::challenge::{calc_signature, challenge_for, ClientAttrs};
use cerberus_core::constants::status;
use cerberus_core::{randpool, token, Config, InstanceState, IpBlock};

use crate::client_ip::{self, ClientAddr};
use crate::pages::{self, ChallengeData};
use crate::state::AppState;

/// Gate middleware wrapped around the origin routes.
pub async fn screen(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (config, core) = state.instance.snapshot();
    let base = &state.settings.base_url;

    if !config.enabled {
        let mut res = next.run(req).await;
        set_status(&mut res, &config, status::DISABLED);
        return res;
    }

    let client = client_ip::extract(&req, config.prefix_cfg);

    if let Some(block) = client.block {
        if core.contains_blocklist(block) {
            tracing::debug!(ip = %block.to_ip_net(config.prefix_cfg), "IP is blocked");
            return respond_blocked(&config, base);
        }
    }

    let attrs = OwnedAttrs::from_request(&req, &client);
    let redir = req.uri().to_string();

    let Some(cookie) = cookie_value(req.headers(), &config.cookie_name) else {
        tracing::debug!("cookie not found");
        return issue_challenge(&config, &core, base, &attrs, client.block, redir);
    };

    let claims = match token::verify_approval(&core, &cookie) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "invalid token");
            return issue_challenge(&config, &core, base, &attrs, client.block, redir);
        }
    };

    let approval_id = match Uuid::parse_str(&claims.approval_id) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(error = %e, "token carries malformed approval id");
            return issue_challenge(&config, &core, base, &attrs, client.block, redir);
        }
    };

    if !core.dec_approval(&approval_id) {
        tracing::debug!(approval_id = %approval_id, "approval unknown or exhausted");
        return issue_challenge(&config, &core, base, &attrs, client.block, redir);
    }

    // Re-derive the fingerprint so a cookie lifted from another client
    // identity cannot be replayed here.
    let expected = challenge_for(&attrs.as_attrs(), core.fingerprint(), config.difficulty);
    if claims.challenge != expected {
        tracing::info!("challenge mismatch: cookie does not match this client");
        return issue_challenge(&config, &core, base, &attrs, client.block, redir);
    }

    let mut res = next.run(req).await;
    set_status(&mut res, &config, status::PASS);
    res
}

/// Serve the interstitial challenge page, tracking the attempt against the
/// client's IP aggregate.
pub(crate) fn issue_challenge(
    config: &Config,
    core: &InstanceState,
    base: &str,
    attrs: &OwnedAttrs,
    block: Option<IpBlock>,
    redir: String,
) -> Response {
    if let Some(block) = block {
        let count = core.inc_pending(block);
        if count > config.max_pending {
            tracing::info!(
                ip = %block.to_ip_net(config.prefix_cfg),
                count,
                "max failed/active challenges reached for IP block, rejecting"
            );
            core.insert_blocklist(block);
            core.remove_pending(block);
            return respond_blocked(config, base);
        }
    }

    let challenge = challenge_for(&attrs.as_attrs(), core.fingerprint(), config.difficulty);
    let nonce = randpool::read_u32();
    let ts = Utc::now().timestamp();
    let signature = calc_signature(&challenge, nonce, ts, core.signing_key());

    let html = pages::challenge_page(
        config,
        base,
        &ChallengeData {
            challenge,
            difficulty: config.difficulty,
            nonce,
            ts,
            signature,
            redir,
        },
    );

    let mut res = (StatusCode::OK, Html(html)).into_response();
    set_status(&mut res, &config, status::CHALLENGE);
    insert_header(&mut res, header::CACHE_CONTROL, "no-cache");
    insert_header(&mut res, header::SET_COOKIE, &pages::clear_cookie(&config.cookie_name));
    res
}

/// 403 with the BLOCK tag, or an aborted connection when `drop` is set.
pub(crate) fn respond_blocked(config: &Config, base: &str) -> Response {
    if config.drop {
        return abort_connection();
    }

    let html = pages::error_page(
        config,
        base,
        "Access restricted",
        "Your network has sent too many failed challenges. Wait before retrying.",
    );
    let mut res = (StatusCode::FORBIDDEN, Html(html)).into_response();
    set_status(&mut res, config, status::BLOCK);
    insert_header(&mut res, header::CONNECTION, "close");
    res
}

/// A response whose body stream errors immediately, making the server abort
/// the connection instead of completing a reply.
fn abort_connection() -> Response {
    let stream = futures::stream::once(async {
        Err::<axum::body::Bytes, std::io::Error>(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "connection dropped by policy",
        ))
    });

    Response::builder()
        .status(StatusCode::FORBIDDEN)
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::FORBIDDEN.into_response())
}

pub(crate) fn set_status(res: &mut Response, config: &Config, value: &'static str) {
    if let Ok(name) = header::HeaderName::try_from(config.header_name.as_str()) {
        res.headers_mut().insert(name, HeaderValue::from_static(value));
    }
}

fn insert_header(res: &mut Response, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        res.headers_mut().insert(name, value);
    }
}

/// Find the named cookie across all `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for raw in headers.get_all(header::COOKIE) {
        let Ok(raw) = raw.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Owned copy of the challenge-relevant request attributes.
#[derive(Debug, Clone)]
pub(crate) struct OwnedAttrs {
    accept_language: String,
    client_ip: String,
    user_agent: String,
}

impl OwnedAttrs {
    pub(crate) fn from_request(req: &Request, client: &ClientAddr) -> Self {
        Self {
            accept_language: client_ip::header_str(req, header::ACCEPT_LANGUAGE).to_string(),
            client_ip: client.ip.clone(),
            user_agent: client_ip::header_str(req, header::USER_AGENT).to_string(),
        }
    }

    pub(crate) fn as_attrs(&self) -> ClientAttrs<'_> {
        ClientAttrs {
            accept_language: &self.accept_language,
            client_ip: &self.client_ip,
            user_agent: &self.user_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_handles_multiple_pairs() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("a=1; cerberus-auth=tok; b=2"),
        );
        assert_eq!(cookie_value(&headers, "cerberus-auth"), Some("tok".into()));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_counts_as_absent() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("cerberus-auth="));
        assert_eq!(cookie_value(&headers, "cerberus-auth"), None);
    }
}
