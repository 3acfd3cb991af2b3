//! CIDR parsing and reduction

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// An address with a prefix length, e.g. `10.144.1.5/16`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl Cidr {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(Error::NetworkParse(format!(
                "prefix length {} is out of range for {}",
                prefix_len, addr
            )));
        }
        Ok(Self { addr, prefix_len })
    }

    /// The network this address belongs to: host bits cleared
    pub fn network(&self) -> Cidr {
        let addr = match self.addr {
            IpAddr::V4(v4) => {
                let bits = u32::from(v4);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(self.prefix_len))
                };
                IpAddr::V4(Ipv4Addr::from(bits & mask))
            }
            IpAddr::V6(v6) => {
                let bits = u128::from(v6);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - u32::from(self.prefix_len))
                };
                IpAddr::V6(Ipv6Addr::from(bits & mask))
            }
        };
        Cidr {
            addr,
            prefix_len: self.prefix_len,
        }
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::NetworkParse(format!("{:?} is not in CIDR notation", s)))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|e| Error::NetworkParse(format!("invalid address in {:?}: {}", s, e)))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|e| Error::NetworkParse(format!("invalid prefix length in {:?}: {}", s, e)))?;
        Cidr::new(addr, prefix_len)
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// Render a CIDR list the way the cluster config expects: comma separated
pub fn join_cidrs(cidrs: &[Cidr]) -> String {
    cidrs
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
