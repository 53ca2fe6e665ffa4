//! IP prefix aggregation keys.
//!
//! An [`IpBlock`] collapses a client address to a 64-bit key covering the
//! configured IPv4 or IPv6 prefix. IPv6 blocks keep the first 8 bytes of the
//! masked address; IPv4 blocks live in the reserved `2001:db8::/32` prefix so
//! both families share the key space without collisions.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Deserialize;

use crate::constants::{DEFAULT_IPV4_PREFIX, DEFAULT_IPV6_PREFIX};
use crate::error::CerberusError;

/// Marker prefix for IPv4 blocks: 2001:db8::/32
const V4_MARKER: u64 = 0x2001_0db8_0000_0000;
const V4_MARKER_MASK: u64 = 0xffff_ffff_0000_0000;

/// Prefix lengths used when aggregating client addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PrefixConfig {
    /// Prefix length for IPv4 blocks
    #[serde(default = "default_v4_prefix")]
    pub v4_prefix: u8,

    /// Prefix length for IPv6 blocks
    #[serde(default = "default_v6_prefix")]
    pub v6_prefix: u8,
}

fn default_v4_prefix() -> u8 {
    DEFAULT_IPV4_PREFIX
}

fn default_v6_prefix() -> u8 {
    DEFAULT_IPV6_PREFIX
}

impl Default for PrefixConfig {
    fn default() -> Self {
        Self {
            v4_prefix: DEFAULT_IPV4_PREFIX,
            v6_prefix: DEFAULT_IPV6_PREFIX,
        }
    }
}

impl PrefixConfig {
    /// Check the prefix lengths are usable.
    ///
    /// IPv6 is capped at /64 since the key only holds 8 bytes of address.
    pub fn validate(&self) -> Result<(), CerberusError> {
        if self.v4_prefix < 1 || self.v4_prefix > 32 {
            return Err(CerberusError::Config(format!(
                "v4_prefix must be between 1 and 32, got {}",
                self.v4_prefix
            )));
        }
        if self.v6_prefix < 1 || self.v6_prefix > 64 {
            return Err(CerberusError::Config(format!(
                "v6_prefix must be between 1 and 64, got {}",
                self.v6_prefix
            )));
        }
        Ok(())
    }
}

/// A 64-bit aggregate key for either an IPv4 or IPv6 block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpBlock {
    data: u64,
}

impl IpBlock {
    /// Collapse an address to its configured prefix aggregate.
    pub fn new(ip: IpAddr, cfg: PrefixConfig) -> Result<Self, CerberusError> {
        // Out-of-range prefixes would shift past the word size below.
        cfg.validate()?;

        match ip.to_canonical() {
            IpAddr::V4(v4) => {
                let mask = u32::MAX << (32 - u32::from(cfg.v4_prefix));
                let masked = u32::from(v4) & mask;
                Ok(Self {
                    data: V4_MARKER | u64::from(masked),
                })
            }
            IpAddr::V6(v6) => {
                let hi = (u128::from(v6) >> 64) as u64;
                let mask = u64::MAX << (64 - u64::from(cfg.v6_prefix));
                Ok(Self { data: hi & mask })
            }
        }
    }

    /// The raw key value.
    pub fn to_u64(self) -> u64 {
        self.data
    }

    /// Reverse the encoding into the network this block covers.
    pub fn to_ip_net(self, cfg: PrefixConfig) -> IpNet {
        if self.data & V4_MARKER_MASK == V4_MARKER {
            let addr = Ipv4Addr::from((self.data & 0xffff_ffff) as u32);
            return IpNet {
                addr: IpAddr::V4(addr),
                prefix: cfg.v4_prefix,
            };
        }

        let addr = Ipv6Addr::from(u128::from(self.data) << 64);
        IpNet {
            addr: IpAddr::V6(addr),
            prefix: cfg.v6_prefix,
        }
    }
}

/// A network recovered from an [`IpBlock`], mainly for log output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl fmt::Display for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(v4: u8, v6: u8) -> PrefixConfig {
        PrefixConfig {
            v4_prefix: v4,
            v6_prefix: v6,
        }
    }

    fn block(ip: &str, cfg: PrefixConfig) -> IpBlock {
        IpBlock::new(ip.parse().unwrap(), cfg).unwrap()
    }

    #[test]
    fn v4_round_trip() {
        let net = block("192.168.1.7", cfg(24, 64)).to_ip_net(cfg(24, 64));
        assert_eq!(net.addr, "192.168.1.0".parse::<IpAddr>().unwrap());
        assert_eq!(net.prefix, 24);
    }

    #[test]
    fn v4_full_prefix_round_trip() {
        let net = block("10.0.0.1", cfg(32, 64)).to_ip_net(cfg(32, 64));
        assert_eq!(net.to_string(), "10.0.0.1/32");
    }

    #[test]
    fn v6_round_trip() {
        let net = block("2a00:1450:4001:800::200e", cfg(32, 64)).to_ip_net(cfg(32, 64));
        assert_eq!(net.addr, "2a00:1450::".parse::<IpAddr>().unwrap());
        assert_eq!(net.prefix, 64);
    }

    #[test]
    fn same_prefix_aggregates() {
        let c = cfg(24, 64);
        assert_eq!(block("10.0.0.1", c), block("10.0.0.250", c));
        assert_ne!(block("10.0.0.1", c), block("10.0.1.1", c));
    }

    #[test]
    fn v6_same_prefix_aggregates() {
        let c = cfg(32, 64);
        assert_eq!(
            block("2001:4860::1", c),
            block("2001:4860:0:1234::1", c)
        );
        assert_ne!(block("2001:4860::1", c), block("2001:4861::1", c));
    }

    #[test]
    fn v4_and_v6_never_collide() {
        // 32-bit v4 space sits inside the reserved marker prefix
        let v4 = block("1.2.3.4", cfg(32, 64));
        let v6 = block("::1.2.3.4", cfg(32, 64));
        assert_ne!(v4.to_u64() & super::V4_MARKER_MASK, 0);
        assert_ne!(v4, v6);
    }

    #[test]
    fn v4_mapped_v6_treated_as_v4() {
        let c = cfg(24, 64);
        assert_eq!(block("::ffff:10.0.0.1", c), block("10.0.0.9", c));
    }

    #[test]
    fn prefix_config_bounds() {
        assert!(cfg(0, 64).validate().is_err());
        assert!(cfg(33, 64).validate().is_err());
        assert!(cfg(32, 0).validate().is_err());
        assert!(cfg(32, 65).validate().is_err());
        assert!(cfg(1, 1).validate().is_ok());
        assert!(cfg(32, 64).validate().is_ok());
    }
}
