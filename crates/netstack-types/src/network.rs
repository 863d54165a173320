use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};

use crate::{NetworkId, ProjectId};

/// Attributes of a network before the repository assigns it an id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNetwork {
    pub label: String,
    /// `None` marks a shared (public) network visible to every project
    pub project_id: Option<ProjectId>,
    /// Handle of the logical network in the port plugin
    pub port_network_id: String,
    pub cidr: Ipv4Net,
    pub cidr_v6: Option<Ipv6Net>,
    pub netmask: Ipv4Addr,
    pub netmask_v6: Option<u8>,
    pub gateway: Option<Ipv4Addr>,
    pub gateway_v6: Option<Ipv6Addr>,
    pub broadcast: Option<Ipv4Addr>,
    pub dns1: Option<IpAddr>,
    pub dns2: Option<IpAddr>,
    pub priority: i32,
    pub multi_host: bool,
    pub bridge: Option<String>,
    pub bridge_interface: Option<String>,
    pub vlan: Option<u16>,
    pub vpn_start: Option<u16>,
}

impl NewNetwork {
    /// Minimal attribute set; derived addressing fields come from `cidr`
    pub fn new(label: impl Into<String>, port_network_id: impl Into<String>, cidr: Ipv4Net) -> Self {
        let gateway = first_host_v4(&cidr);
        Self {
            label: label.into(),
            project_id: None,
            port_network_id: port_network_id.into(),
            cidr,
            cidr_v6: None,
            netmask: cidr.netmask(),
            netmask_v6: None,
            gateway,
            gateway_v6: None,
            broadcast: Some(cidr.broadcast()),
            dns1: None,
            dns2: None,
            priority: 1,
            multi_host: false,
            bridge: None,
            bridge_interface: None,
            vlan: None,
            vpn_start: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cidr_v6(mut self, cidr_v6: Ipv6Net) -> Self {
        self.cidr_v6 = Some(cidr_v6);
        self.netmask_v6 = Some(cidr_v6.prefix_len());
        self.gateway_v6 = first_host_v6(&cidr_v6);
        self
    }

    pub fn into_network(self, id: NetworkId) -> Network {
        Network {
            id,
            label: self.label,
            project_id: self.project_id,
            port_network_id: self.port_network_id,
            cidr: self.cidr,
            cidr_v6: self.cidr_v6,
            netmask: self.netmask,
            netmask_v6: self.netmask_v6,
            gateway: self.gateway,
            gateway_v6: self.gateway_v6,
            broadcast: self.broadcast,
            dns1: self.dns1,
            dns2: self.dns2,
            priority: self.priority,
            multi_host: self.multi_host,
            bridge: self.bridge,
            bridge_interface: self.bridge_interface,
            vlan: self.vlan,
            vpn_start: self.vpn_start,
        }
    }
}

/// A tenant (or shared) network carved out by the partitioner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    pub id: NetworkId,
    pub label: String,
    pub project_id: Option<ProjectId>,
    pub port_network_id: String,
    pub cidr: Ipv4Net,
    pub cidr_v6: Option<Ipv6Net>,
    pub netmask: Ipv4Addr,
    pub netmask_v6: Option<u8>,
    pub gateway: Option<Ipv4Addr>,
    pub gateway_v6: Option<Ipv6Addr>,
    pub broadcast: Option<Ipv4Addr>,
    pub dns1: Option<IpAddr>,
    pub dns2: Option<IpAddr>,
    pub priority: i32,
    pub multi_host: bool,
    pub bridge: Option<String>,
    pub bridge_interface: Option<String>,
    pub vlan: Option<u16>,
    pub vpn_start: Option<u16>,
}

impl Network {
    pub fn is_shared(&self) -> bool {
        self.project_id.is_none()
    }

    /// Whether `project_id` may attach instances to this network
    pub fn is_visible_to(&self, project_id: &str) -> bool {
        match &self.project_id {
            None => true,
            Some(owner) => owner == project_id,
        }
    }

    pub fn dns_servers(&self) -> Vec<IpAddr> {
        self.dns1.iter().chain(self.dns2.iter()).copied().collect()
    }
}

/// First usable host of a v4 subnet, the conventional gateway
pub fn first_host_v4(cidr: &Ipv4Net) -> Option<Ipv4Addr> {
    if cidr.prefix_len() >= 31 {
        return None;
    }
    Some(Ipv4Addr::from(u32::from(cidr.network()) + 1))
}

pub fn first_host_v6(cidr: &Ipv6Net) -> Option<Ipv6Addr> {
    if cidr.prefix_len() >= 127 {
        return None;
    }
    Some(Ipv6Addr::from(u128::from(cidr.network()) + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_network_derives_addressing() {
        let net = NewNetwork::new("private", "qnet-1", "10.1.1.0/24".parse().unwrap());
        assert_eq!(net.netmask, "255.255.255.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(net.gateway, Some("10.1.1.1".parse().unwrap()));
        assert_eq!(net.broadcast, Some("10.1.1.255".parse().unwrap()));
        assert!(net.project_id.is_none());
    }

    #[test]
    fn shared_network_visible_to_all_projects() {
        let shared = NewNetwork::new("public", "qnet-2", "77.1.1.0/24".parse().unwrap())
            .into_network(1);
        let private = NewNetwork::new("private", "qnet-3", "10.0.0.0/24".parse().unwrap())
            .with_project("project1")
            .into_network(2);

        assert!(shared.is_shared());
        assert!(shared.is_visible_to("anyone"));
        assert!(private.is_visible_to("project1"));
        assert!(!private.is_visible_to("project2"));
    }

    #[test]
    fn v6_gateway_is_first_host() {
        let net = NewNetwork::new("dual", "qnet-4", "10.0.0.0/24".parse().unwrap())
            .with_cidr_v6("fe::/96".parse().unwrap());
        assert_eq!(net.netmask_v6, Some(96));
        assert_eq!(net.gateway_v6, Some("fe::1".parse().unwrap()));
    }
}
