//! Client IP resolution behind trusted reverse proxies.

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Networks used when `TRUSTED_PROXIES` is not set: Docker bridge,
/// user-defined and overlay ranges, plus loopback.
pub const DEFAULT_TRUSTED_PROXIES: [&str; 4] =
    ["172.16.0.0/12", "192.168.0.0/16", "10.0.0.0/8", "127.0.0.1"];

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid proxy address: {0}")]
pub struct InvalidProxy(pub String);

/// Peers whose forwarding headers are believed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustedProxies(Vec<IpNet>);

impl TrustedProxies {
    /// Parse a comma-separated list of addresses and CIDR ranges
    pub fn parse_list(list: &str) -> Result<Self, InvalidProxy> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.iter().any(|net| net.contains(ip))
    }
}

impl fmt::Display for TrustedProxies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", entries.join(", "))
    }
}

fn parse_entry(entry: &str) -> Result<IpNet, InvalidProxy> {
    if entry.contains('/') {
        return entry.parse::<IpNet>().map_err(|_| InvalidProxy(entry.to_string()));
    }
    let host = match entry.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ipv4Net::new(v4, 32).map(IpNet::V4),
        Ok(IpAddr::V6(v6)) => Ipv6Net::new(v6, 128).map(IpNet::V6),
        Err(_) => return Err(InvalidProxy(entry.to_string())),
    };
    host.map_err(|_| InvalidProxy(entry.to_string()))
}

/// Walk `X-Forwarded-For` from the right, skipping trusted hops; the first
/// untrusted address is the client. Entries left of it are client-written.
/// An unparseable hop ends the walk and `X-Real-IP` is tried instead.
fn forwarded_ip(headers: &HeaderMap, proxies: &TrustedProxies) -> Option<IpAddr> {
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let hops: Vec<&str> = v.split(',').map(str::trim).collect();
            for (i, hop) in hops.iter().enumerate().rev() {
                let ip: IpAddr = hop.parse().ok()?;
                if i == 0 || !proxies.contains(&ip) {
                    return Some(ip);
                }
            }
            None
        });

    forwarded_for.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

/// Resolve the client address for a peer. Forwarding headers are honoured
/// only when the peer itself is a trusted proxy.
pub fn resolve_client_ip(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    proxies: &TrustedProxies,
) -> Option<IpAddr> {
    match peer {
        Some(ip) if proxies.contains(&ip) => forwarded_ip(headers, proxies).or(Some(ip)),
        other => other,
    }
}

/// Rate-limit key for a request: the client IP, or `unknown`
pub fn client_key(request: &Request, proxies: &TrustedProxies) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    resolve_client_ip(peer, request.headers(), proxies)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
