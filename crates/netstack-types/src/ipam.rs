use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

impl TryFrom<u8> for IpVersion {
    type Error = TypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            other => Err(TypeError::UnknownIpVersion(other)),
        }
    }
}

impl std::fmt::Display for IpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IPv{}", self.number())
    }
}

// Address pools speak the numeric form ("version": 4).
impl Serialize for IpVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for IpVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        IpVersion::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// Address range registered with the address pool for one network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddressBlock {
    pub cidr: IpNet,
    pub version: IpVersion,
    #[serde(default)]
    pub netmask: Option<IpAddr>,
    #[serde(default)]
    pub gateway: Option<IpAddr>,
    #[serde(default)]
    pub broadcast: Option<IpAddr>,
}

impl AddressBlock {
    pub fn new(cidr: IpNet) -> Self {
        let version = IpVersion::of(&cidr.addr());
        Self {
            cidr,
            version,
            netmask: None,
            gateway: None,
            broadcast: None,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        self.cidr.prefix_len()
    }

    /// Stored netmask, or the one implied by the prefix
    pub fn effective_netmask(&self) -> IpAddr {
        self.netmask.unwrap_or_else(|| self.cidr.netmask())
    }
}

/// A lease handed out by the address pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub address: IpAddr,
    pub version: IpVersion,
    #[serde(default)]
    pub ip_block: Option<AddressBlock>,
}

impl Address {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            version: IpVersion::of(&address),
            ip_block: None,
        }
    }

    pub fn with_block(mut self, block: AddressBlock) -> Self {
        self.ip_block = Some(block);
        self
    }

    pub fn is_v4(&self) -> bool {
        self.version == IpVersion::V4
    }

    pub fn is_v6(&self) -> bool {
        self.version == IpVersion::V6
    }
}
