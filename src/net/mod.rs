pub mod client_ip;

use std::net::IpAddr;

use ipnet::IpNet;
use thiserror::Error;

pub use client_ip::{parse_client_ip, ClientAddr, ClientIpError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid network {0:?}")]
    Invalid(String),
}

/// Parse "192.168.1.0/24", "fe80::/10" or a bare address (single host).
pub fn parse_network(raw: &str) -> Result<IpNet, NetworkError> {
    let candidate = raw.trim();
    if let Ok(net) = candidate.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    candidate
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| NetworkError::Invalid(candidate.to_string()))
}

/// A parsed list of networks, used both for trusted forwarding proxies and
/// for the system-administrator source restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    networks: Vec<IpNet>,
}

impl TrustedProxies {
    pub fn parse(entries: &[String]) -> Result<Self, NetworkError> {
        let networks = entries
            .iter()
            .map(|e| parse_network(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    /// IPv4-mapped IPv6 addresses match their IPv4 networks.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(*ip),
            IpAddr::V4(_) => *ip,
        };
        self.networks.iter().any(|n| n.contains(&ip))
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }
}

/// Loopback check that also accepts IPv4-mapped loopback addresses.
pub fn is_loopback(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.is_loopback(),
            None => v6.is_loopback(),
        },
    }
}
