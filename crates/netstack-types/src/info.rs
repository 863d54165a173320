//! Per-network configuration handed to the hypervisor layer

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::{MacAddr, VifId};

/// v4 addresses carry a dotted mask, v6 addresses a prefix length
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Netmask {
    Dotted(String),
    PrefixLength(u8),
}

impl std::fmt::Display for Netmask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Netmask::Dotted(mask) => write!(f, "{}", mask),
            Netmask::PrefixLength(len) => write!(f, "{}", len),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub ip: String,
    pub netmask: Netmask,
    pub enabled: String,
}

impl IpInfo {
    pub fn enabled(ip: IpAddr, netmask: Netmask) -> Self {
        Self {
            ip: ip.to_string(),
            netmask,
            enabled: "1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub label: String,
    pub gateway: Option<String>,
    pub broadcast: Option<String>,
    pub mac: MacAddr,
    pub vif_id: VifId,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub ips: Vec<IpInfo>,
    pub gateway6: Option<String>,
    #[serde(default)]
    pub ips6: Vec<IpInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netmask_serializes_untagged() {
        let v4 = IpInfo::enabled(
            "10.1.1.2".parse().unwrap(),
            Netmask::Dotted("255.255.255.0".to_string()),
        );
        let v6 = IpInfo::enabled("fe::2".parse().unwrap(), Netmask::PrefixLength(96));

        let v4_json = serde_json::to_value(&v4).unwrap();
        let v6_json = serde_json::to_value(&v6).unwrap();

        assert_eq!(v4_json["netmask"], "255.255.255.0");
        assert_eq!(v4_json["enabled"], "1");
        assert_eq!(v6_json["netmask"], 96);
    }
}
