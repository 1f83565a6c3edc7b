//! CIDR matching shared by trusted-proxy checks and private network blocking.

use std::net::IpAddr;

/// Parsed CIDR network range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse CIDR notation (`10.0.0.0/8`, `fc00::/7`) or a bare address,
    /// which is treated as a single-host range.
    ///
    /// Returns `None` if the address or prefix length is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = Self::max_prefix(&network);
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Prefix length of this range.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Check if an address falls inside this range.
    ///
    /// IPv4 and IPv6 never match each other; callers that care about
    /// IPv4-mapped IPv6 addresses should unmap them first.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
                u32::from(net) & mask == u32::from(*addr) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u128::from(net) & mask == u128::from(*addr) & mask
            }
            _ => false,
        }
    }

    fn max_prefix(ip: &IpAddr) -> u8 {
        match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }
}

/// Parse a list of CIDR strings, dropping (and logging) invalid entries.
pub fn parse_cidr_list(cidrs: &[String]) -> Vec<CidrRange> {
    cidrs
        .iter()
        .filter_map(|cidr| {
            let parsed = CidrRange::parse(cidr);
            if parsed.is_none() {
                tracing::warn!(cidr = %cidr, "Invalid CIDR range, skipping");
            }
            parsed
        })
        .collect()
}
