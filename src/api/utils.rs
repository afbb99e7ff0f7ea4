//! Shared helpers for API handlers

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Resolve the origin address of a request.
///
/// When the hub sits behind a trusted reverse proxy, the forwarded headers
/// carry the real client address; otherwise only the transport-level remote
/// address is believed.
pub fn resolve_origin(headers: &HeaderMap, remote: SocketAddr, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        if let Some(ip) = header_ip(headers, "x-real-ip") {
            return ip;
        }
        if let Some(ip) = forwarded_for_ip(headers) {
            return ip;
        }
    }

    remote.ip()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<IpAddr>()
        .ok()
}

fn forwarded_for_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // first hop in the chain is the originating client
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse::<IpAddr>()
        .ok()
}
