use crate::domain::errors::{ConfigError, MetricError};
use std::net::IpAddr;
use std::str::FromStr;

/// CIDR block that agent addresses (`X-Real-IP`) must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    network: IpAddr,
    prefix: u8,
}

impl TrustedSubnet {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }

    /// Check a raw header value. Missing or unparsable addresses are untrusted.
    pub fn check(&self, real_ip: Option<&str>) -> Result<IpAddr, MetricError> {
        let raw = real_ip.map(str::trim).unwrap_or_default();
        let ip = IpAddr::from_str(raw)
            .map_err(|_| MetricError::UntrustedSource(format!("unparsable address {:?}", raw)))?;
        if self.contains(ip) {
            Ok(ip)
        } else {
            Err(MetricError::UntrustedSource(format!(
                "{} is outside {}",
                ip, self
            )))
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for TrustedSubnet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "trusted_subnet",
            reason: format!("{:?}: {}", s, reason),
        };

        let (addr, prefix) = s.trim().split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let network = IpAddr::from_str(addr).map_err(|_| invalid("bad network address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix length"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid("prefix length out of range"));
        }
        Ok(Self { network, prefix })
    }
}

impl std::fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
