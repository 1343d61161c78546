//! Client identity extraction for rate limiting.
//!
//! The identity is a best-effort source IP. It is not authenticated and is
//! only used to group requests for quota purposes.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use std::net::{IpAddr, SocketAddr};

/// Proxy headers consulted in order of preference.
pub const PROXY_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Derive the client identity from proxy headers, falling back to the peer
/// address. Returns `None` when no usable signal exists.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    PROXY_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(ip_from_header)
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
}

/// Identity of the client that sent `request`.
pub fn identify<B>(request: &Request<B>) -> Option<String> {
    client_identity(request.headers(), peer_addr(request))
}

/// Transport peer address recorded by the server, if any.
pub fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

// For X-Forwarded-For only the first hop is the original client.
fn ip_from_header(value: &str) -> Option<IpAddr> {
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    first.parse().ok()
}
