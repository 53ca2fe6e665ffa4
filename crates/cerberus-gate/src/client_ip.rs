//! Client address extraction.
//!
//! The reverse proxy in front of the gate reports the real client in
//! `X-Real-IP`; without it we fall back to the socket peer. A client whose
//! address cannot be parsed still gets challenged, just without an attached
//! aggregate (the pending/blocklist logic needs a valid block key).

use std::net::{IpAddr, SocketAddr};

use axum::extract::connect_info::ConnectInfo;
use axum::extract::Request;
use axum::http::header;

use cerberus_core::{IpBlock, PrefixConfig};

/// What the gate knows about the requesting client
#[derive(Debug, Clone, Default)]
pub struct ClientAddr {
    /// Client IP as reported, used verbatim in the challenge derivation
    pub ip: String,

    /// Aggregate key, absent when the address did not parse
    pub block: Option<IpBlock>,
}

/// Extract the client address from a request.
pub fn extract(req: &Request, prefix_cfg: PrefixConfig) -> ClientAddr {
    let ip = header_ip(req).or_else(|| peer_ip(req));

    let Some(ip) = ip else {
        tracing::debug!("no client address available, skipping block tracking");
        return ClientAddr::default();
    };

    let block = match ip.parse::<IpAddr>() {
        Ok(addr) => match IpBlock::new(addr, prefix_cfg) {
            Ok(block) => Some(block),
            Err(e) => {
                tracing::debug!(error = %e, ip = %ip, "failed to derive IP block");
                None
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, ip = %ip, "client address is not an IP");
            None
        }
    };

    ClientAddr { ip, block }
}

fn header_ip(req: &Request) -> Option<String> {
    req.headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn peer_ip(req: &Request) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

/// Request header value, empty string when absent or non-UTF-8.
pub fn header_str<'a>(req: &'a Request, name: header::HeaderName) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn prefix() -> PrefixConfig {
        PrefixConfig {
            v4_prefix: 24,
            v6_prefix: 64,
        }
    }

    #[test]
    fn prefers_real_ip_header() {
        let req = Request::builder()
            .header("X-Real-IP", "10.1.2.3")
            .body(Body::empty())
            .unwrap();
        let mut req = req;
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.1:4711".parse::<SocketAddr>().unwrap()));

        let addr = extract(&req, prefix());
        assert_eq!(addr.ip, "10.1.2.3");
        assert!(addr.block.is_some());
    }

    #[test]
    fn falls_back_to_peer() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.1:4711".parse::<SocketAddr>().unwrap()));

        let addr = extract(&req, prefix());
        assert_eq!(addr.ip, "192.0.2.1");
        assert!(addr.block.is_some());
    }

    #[test]
    fn unparseable_address_has_no_block() {
        let req = Request::builder()
            .header("X-Real-IP", "not-an-ip")
            .body(Body::empty())
            .unwrap();

        let addr = extract(&req, prefix());
        assert_eq!(addr.ip, "not-an-ip");
        assert!(addr.block.is_none());
    }

    #[test]
    fn missing_everything_is_empty() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let addr = extract(&req, prefix());
        assert!(addr.ip.is_empty());
        assert!(addr.block.is_none());
    }
}
