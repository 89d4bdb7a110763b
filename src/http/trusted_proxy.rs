//! Client IP resolution through trusted reverse proxies (spec §3
//! `TrustedProxySet`, §4.F, §9 "Trusted-proxy CIDRs").
//!
//! CIDR containment follows `ipnet::Ipv4Net::contains`, the same idiom
//! this pack's other PXE/DHCP tooling (`pixie-core`) uses for its own
//! proxy allowlist.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::ProxyConfigError;

/// A pre-parsed set of CIDR ranges whose X-Forwarded-For header this
/// service trusts (spec §4.F).
#[derive(Debug, Clone, Default)]
pub struct TrustedProxySet {
    nets: Vec<IpNet>,
}

impl TrustedProxySet {
    /// Parse a list of bare IPs or CIDR ranges. Bare IPs are promoted to
    /// host-mask CIDRs (spec §9); an unparseable entry is a hard failure
    /// — "silent tolerance here is a security foot-gun".
    pub fn parse(entries: &[impl AsRef<str>]) -> Result<Self, ProxyConfigError> {
        let nets = entries
            .iter()
            .map(|entry| parse_entry(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { nets })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(&ip))
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }
}

fn parse_entry(entry: &str) -> Result<IpNet, ProxyConfigError> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    entry
        .parse::<IpAddr>()
        .map(|ip| IpNet::new(ip, if ip.is_ipv4() { 32 } else { 128 }).expect("host mask is always valid"))
        .map_err(|_| ProxyConfigError::InvalidCidr(entry.to_string()))
}

/// Resolve the effective client IP for one request (spec §4.F).
///
/// `peer` is the direct TCP socket peer. `forwarded_for` is the raw
/// X-Forwarded-For header value, if present. When `peer` is outside the
/// trusted set, the header is ignored entirely (testable property 8).
pub fn resolve_client_ip(peer: IpAddr, forwarded_for: Option<&str>, trusted: &TrustedProxySet) -> IpAddr {
    if !trusted.contains(peer) {
        return peer;
    }

    let Some(header) = forwarded_for else {
        return peer;
    };

    // RFC 7239 / the de facto X-Forwarded-For convention: entries are
    // appended left-to-right as the request passes through proxies, so
    // scan right-to-left and stop at the first hop we don't trust.
    for hop in header.split(',').rev() {
        let hop = hop.trim();
        let Ok(hop_ip) = hop.parse::<IpAddr>() else {
            break;
        };
        if !trusted.contains(hop_ip) {
            return hop_ip;
        }
    }

    peer
}
