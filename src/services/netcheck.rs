use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::Url;

/// The lowercased hostname of a listing URL, the unit over which edit-token
/// recovery applies. Exact host match only; `api.example.com` is not
/// `example.com`.
pub fn effective_domain(raw_url: &str) -> Option<String> {
    let parsed = Url::parse(raw_url).ok()?;
    parsed.host_str().map(|host| host.to_ascii_lowercase())
}

/// `scheme://host[:port]` of a listing URL, path and query stripped.
pub fn domain_root(raw_url: &str) -> Option<String> {
    let parsed = Url::parse(raw_url).ok()?;
    let host = parsed.host_str()?;
    let mut root = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        root.push_str(&format!(":{}", port));
    }
    Some(root)
}

/// Resolve `host` and require every answer to be publicly routable.
///
/// Fails closed: unresolvable hostnames, empty answers, and any single
/// private/reserved A or AAAA record all veto the fetch. Runs before any
/// outbound request is made.
pub async fn resolves_public(host: &str) -> bool {
    // Url keeps IPv6 literals bracketed; strip for parsing.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return is_public_ip(ip);
    }

    match tokio::net::lookup_host((bare, 443)).await {
        Ok(addrs) => {
            let mut resolved_any = false;
            for addr in addrs {
                resolved_any = true;
                if !is_public_ip(addr.ip()) {
                    return false;
                }
            }
            resolved_any
        }
        Err(_) => false,
    }
}

pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_link_local()
        || ip.is_private()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast()
        // 240.0.0.0/4 reserved
        || ip.octets()[0] >= 240)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    // An IPv4-mapped address answers for its embedded IPv4.
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_v4(mapped);
    }
    let segments = ip.segments();
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (segments[0] & 0xffc0) == 0xfe80)
}
