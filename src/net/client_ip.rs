use std::net::IpAddr;

use thiserror::Error;

use super::TrustedProxies;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientIpError {
    #[error("Not a valid IP address: {0}")]
    InvalidRemoteAddress(String),
}

/// The authoritative client address plus the full hop chain
/// (`"xff1, xff2, remote"`) kept for forensic logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr {
    pub ip: IpAddr,
    pub chain: String,
}

/// Resolve the client IP from the socket peer (`host:port`) and an
/// `X-Forwarded-For` value.
///
/// The chain is walked right to left; trusted proxies are skipped and the
/// first untrusted hop wins. An unparseable hop stops the walk so that a
/// forged header cannot push trust leftward; the peer address is used then,
/// and whenever every hop is trusted.
pub fn parse_client_ip(
    remote: &str,
    xff: &str,
    trusted: &TrustedProxies,
) -> Result<ClientAddr, ClientIpError> {
    let host = split_host_port(remote)
        .ok_or_else(|| ClientIpError::InvalidRemoteAddress(remote.to_string()))?;

    let hops: Vec<&str> = xff
        .split([',', ' '])
        .chain(std::iter::once(host))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .collect();
    let chain = hops.join(", ");

    for hop in hops.iter().rev() {
        let ip: IpAddr = match hop.parse() {
            Ok(ip) => ip,
            Err(_) => {
                tracing::warn!("Unparseable address {:?} in forwarding chain {:?}", hop, chain);
                break;
            }
        };

        if trusted.contains(&ip) {
            continue;
        }

        return Ok(ClientAddr { ip, chain });
    }

    let ip = host
        .parse()
        .map_err(|_| ClientIpError::InvalidRemoteAddress(remote.to_string()))?;

    Ok(ClientAddr { ip, chain })
}

/// `"1.2.3.4:80"` -> `"1.2.3.4"`, `"[::1]:80"` -> `"::1"`. A port is required.
fn split_host_port(remote: &str) -> Option<&str> {
    if let Some(rest) = remote.strip_prefix('[') {
        let (host, port) = rest.split_once("]:")?;
        return (!port.is_empty()).then_some(host);
    }
    let (host, port) = remote.rsplit_once(':')?;
    if host.contains(':') || port.is_empty() {
        return None;
    }
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_trusted() -> TrustedProxies {
        TrustedProxies::parse(&["127.0.0.1/8".to_string()]).unwrap()
    }

    fn resolve(remote: &str, xff: &str) -> (String, String) {
        let addr = parse_client_ip(remote, xff, &loopback_trusted()).unwrap();
        (addr.ip.to_string(), addr.chain)
    }

    #[test]
    fn test_local_peer_without_forwarding() {
        assert_eq!(
            resolve("127.0.0.1:12345", ""),
            ("127.0.0.1".to_string(), "127.0.0.1".to_string())
        );
    }

    #[test]
    fn test_untrusted_peer_wins() {
        assert_eq!(
            resolve("192.0.2.1:12345", "192.0.2.2"),
            ("192.0.2.1".to_string(), "192.0.2.2, 192.0.2.1".to_string())
        );
    }

    #[test]
    fn test_trusted_peer_uses_forwarded_hop() {
        assert_eq!(
            resolve("127.0.0.1:12345", "192.0.2.2"),
            ("192.0.2.2".to_string(), "192.0.2.2, 127.0.0.1".to_string())
        );
    }

    #[test]
    fn test_space_separated_header_is_normalized() {
        assert_eq!(
            resolve("127.0.0.1:12345", "127.0.0.1 192.0.2.2"),
            (
                "192.0.2.2".to_string(),
                "127.0.0.1, 192.0.2.2, 127.0.0.1".to_string()
            )
        );
    }

    #[test]
    fn test_garbage_hop_stops_the_walk() {
        let (ip, chain) = resolve("127.0.0.1:1", "198.51.100.1, bogus");
        assert_eq!(ip, "127.0.0.1");
        assert_eq!(chain, "198.51.100.1, bogus, 127.0.0.1");
    }

    #[test]
    fn test_wider_trust_moves_left() {
        let narrow = parse_client_ip("127.0.0.1:1", "198.51.100.1, 10.0.0.2", &loopback_trusted()).unwrap();
        assert_eq!(narrow.ip.to_string(), "10.0.0.2");

        let wide = TrustedProxies::parse(&["127.0.0.1/8".to_string(), "10.0.0.0/8".to_string()]).unwrap();
        let wider = parse_client_ip("127.0.0.1:1", "198.51.100.1, 10.0.0.2", &wide).unwrap();
        assert_eq!(wider.ip.to_string(), "198.51.100.1");
    }

    #[test]
    fn test_ipv6_peer() {
        let addr = parse_client_ip("[2001:db8::1]:443", "", &loopback_trusted()).unwrap();
        assert_eq!(addr.ip.to_string(), "2001:db8::1");
    }

    #[test]
    fn test_invalid_remote() {
        for remote in ["", "no-port", "host.example:80", "1.2.3.4:"] {
            assert!(
                matches!(
                    parse_client_ip(remote, "", &loopback_trusted()),
                    Err(ClientIpError::InvalidRemoteAddress(_))
                ),
                "{remote} should be rejected"
            );
        }
    }
}
