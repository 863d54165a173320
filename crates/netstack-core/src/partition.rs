//! Splitting a parent CIDR into per-tenant networks

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use netstack_types::network::{first_host_v4, first_host_v6};
use netstack_types::{Network, NewNetwork, ProjectId};

use crate::context::RequestContext;
use crate::error::{BackendError, NetstackError, Operation, ValidationError};
use crate::manager::NetworkManager;
use crate::Result;

/// Prefix length of every v6 subnet handed to a network
pub const V6_SUBNET_PREFIX: u8 = 64;

/// Smallest network that still has room for a gateway and a broadcast
pub const MIN_NETWORK_SIZE: u64 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateNetworksRequest {
    pub label: String,
    pub cidr: Ipv4Net,
    pub num_networks: u64,
    pub network_size: u64,
    /// `None` creates shared networks
    pub project_id: Option<ProjectId>,
    pub cidr_v6: Option<Ipv6Net>,
    pub gateway_v6: Option<Ipv6Addr>,
    /// Priority of the first network; later ones count up from here
    pub priority: i32,
    pub multi_host: bool,
    pub bridge: Option<String>,
    pub bridge_interface: Option<String>,
    pub vlan_start: Option<u16>,
    pub vpn_start: Option<u16>,
    pub dns1: Option<IpAddr>,
    pub dns2: Option<IpAddr>,
}

impl CreateNetworksRequest {
    pub fn new(label: impl Into<String>, cidr: Ipv4Net, num_networks: u64, network_size: u64) -> Self {
        Self {
            label: label.into(),
            cidr,
            num_networks,
            network_size,
            project_id: None,
            cidr_v6: None,
            gateway_v6: None,
            priority: 1,
            multi_host: false,
            bridge: None,
            bridge_interface: None,
            vlan_start: None,
            vpn_start: None,
            dns1: None,
            dns2: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_cidr_v6(mut self, cidr_v6: Ipv6Net) -> Self {
        self.cidr_v6 = Some(cidr_v6);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn label_for(&self, index: u64) -> String {
        if self.num_networks > 1 {
            format!("{}_{}", self.label, index)
        } else {
            self.label.clone()
        }
    }

    /// `start + index`, rejecting values that leave the u16 range
    fn offset(start: Option<u16>, index: u64, field: &'static str) -> std::result::Result<Option<u16>, ValidationError> {
        match start {
            None => Ok(None),
            Some(start) => u16::try_from(u64::from(start) + index)
                .map(Some)
                .map_err(|_| ValidationError::InvalidField {
                    field,
                    reason: format!("{} + {} exceeds 65535", start, index),
                }),
        }
    }
}

pub fn parse_cidr_v4(value: &str) -> std::result::Result<Ipv4Net, ValidationError> {
    value.parse().map_err(|e: ipnet::AddrParseError| ValidationError::InvalidCidr {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_cidr_v6(value: &str) -> std::result::Result<Ipv6Net, ValidationError> {
    value.parse().map_err(|e: ipnet::AddrParseError| ValidationError::InvalidCidr {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Split `parent` into `count` contiguous subnets of `size` addresses,
/// lowest first
pub fn split_v4(
    parent: &Ipv4Net,
    count: u64,
    size: u64,
) -> std::result::Result<Vec<Ipv4Net>, ValidationError> {
    if count == 0 {
        return Err(ValidationError::NoNetworks);
    }
    if !size.is_power_of_two() || size < MIN_NETWORK_SIZE || size > 1u64 << 32 {
        return Err(ValidationError::InvalidNetworkSize { size });
    }
    if parent.addr() != parent.network() {
        return Err(ValidationError::InvalidCidr {
            value: parent.to_string(),
            reason: "host bits are set".to_string(),
        });
    }

    let parent_size = 1u64 << (32 - u32::from(parent.prefix_len()));
    let needed = count
        .checked_mul(size)
        .filter(|needed| *needed <= parent_size)
        .ok_or_else(|| ValidationError::InsufficientSpace {
            cidr: parent.to_string(),
            count,
            size,
        })?;
    log::debug!("Using {} of {} addresses in {}", needed, parent_size, parent);

    let prefix = (32 - size.trailing_zeros()) as u8;
    let base = u64::from(u32::from(parent.network()));

    (0..count)
        .map(|i| {
            let start = Ipv4Addr::from((base + i * size) as u32);
            Ipv4Net::new(start, prefix).map_err(|e| ValidationError::InvalidCidr {
                value: format!("{}/{}", start, prefix),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Split `parent` into `count` contiguous /64 subnets, lowest first
pub fn split_v6(parent: &Ipv6Net, count: u64) -> std::result::Result<Vec<Ipv6Net>, ValidationError> {
    if count == 0 {
        return Err(ValidationError::NoNetworks);
    }
    if parent.addr() != parent.network() {
        return Err(ValidationError::InvalidCidr {
            value: parent.to_string(),
            reason: "host bits are set".to_string(),
        });
    }

    let prefix = parent.prefix_len();
    if prefix > V6_SUBNET_PREFIX {
        return Err(ValidationError::InsufficientSpaceV6 {
            cidr: parent.to_string(),
            count,
        });
    }

    let available = 1u128 << (V6_SUBNET_PREFIX - prefix);
    if u128::from(count) > available {
        return Err(ValidationError::InsufficientSpaceV6 {
            cidr: parent.to_string(),
            count,
        });
    }

    let base = u128::from(parent.network());
    let stride = 1u128 << (128 - u32::from(V6_SUBNET_PREFIX));

    (0..count)
        .map(|i| {
            let start = Ipv6Addr::from(base + u128::from(i) * stride);
            Ipv6Net::new(start, V6_SUBNET_PREFIX).map_err(|e| ValidationError::InvalidCidr {
                value: format!("{}/{}", start, V6_SUBNET_PREFIX),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl NetworkManager {
    /// Partition `request.cidr` (and optionally `request.cidr_v6`) into
    /// networks and register each with the port plugin, the repository
    /// and the address pool.
    ///
    /// Networks and blocks created before a failure stay in place; calling
    /// again with the same request reuses networks whose CIDR already
    /// exists for the project.
    pub async fn create_networks(
        &self,
        ctx: &RequestContext,
        request: &CreateNetworksRequest,
    ) -> Result<Vec<Network>> {
        let subnets = split_v4(&request.cidr, request.num_networks, request.network_size)?;

        let cidr_v6 = match request.cidr_v6 {
            Some(cidr_v6) if !self.config.use_ipv6 => {
                log::warn!("IPv6 disabled, ignoring {} for {}", cidr_v6, request.label);
                None
            }
            other => other,
        };
        let subnets_v6 = match cidr_v6 {
            Some(cidr_v6) => Some(split_v6(&cidr_v6, request.num_networks)?),
            None => None,
        };

        log::info!(
            "Creating {} network(s) of {} addresses from {} for project {}",
            request.num_networks,
            request.network_size,
            request.cidr,
            request.project_id.as_deref().unwrap_or("<shared>")
        );

        let existing = self.existing_networks(ctx, request).await?;
        let mut networks = Vec::with_capacity(subnets.len());

        for (index, cidr) in subnets.into_iter().enumerate() {
            let index = index as u64;
            let cidr_v6 = subnets_v6.as_ref().map(|s| s[index as usize]);

            if let Some(found) = existing.iter().find(|n| n.cidr == cidr) {
                log::warn!(
                    "Network {} already exists for {} as {}, reusing it",
                    cidr,
                    request.project_id.as_deref().unwrap_or("<shared>"),
                    found.id
                );
                // A previous run may have stopped between the row and its blocks
                self.register_blocks(ctx, found).await?;
                networks.push(found.clone());
                continue;
            }

            let network = self.create_one(ctx, request, index, cidr, cidr_v6).await?;
            networks.push(network);
        }

        log::info!("Created {} network(s) from {}", networks.len(), request.cidr);
        Ok(networks)
    }

    /// Register the v4 block, then the v6 block, of `network` with the
    /// address pool. Registering an already known block is a no-op.
    async fn register_blocks(&self, ctx: &RequestContext, network: &Network) -> Result<()> {
        let mut blocks = vec![IpNet::V4(network.cidr)];
        blocks.extend(network.cidr_v6.map(IpNet::V6));

        for block in blocks {
            self.call(
                ctx,
                Operation::RegisterBlock,
                self.address_pool.create_block(
                    ctx,
                    network.id,
                    block,
                    network.project_id.clone(),
                ),
            )
            .await
            .map_err(|source| NetstackError::Registration {
                cidr: block.to_string(),
                operation: Operation::RegisterBlock,
                source,
            })?;
            log::debug!("Registered block {} for network {}", block, network.id);
        }
        Ok(())
    }

    async fn existing_networks(
        &self,
        ctx: &RequestContext,
        request: &CreateNetworksRequest,
    ) -> Result<Vec<Network>> {
        let lookup_key = request.project_id.clone().unwrap_or_default();
        let visible = self
            .call(ctx, Operation::ListNetworks, async {
                self.repository
                    .get_networks_by_project(&lookup_key)
                    .await
                    .map_err(BackendError::from)
            })
            .await
            .map_err(|source| NetstackError::Registration {
                cidr: request.cidr.to_string(),
                operation: Operation::ListNetworks,
                source,
            })?;

        Ok(visible
            .into_iter()
            .filter(|n| n.project_id == request.project_id)
            .collect())
    }

    async fn create_one(
        &self,
        ctx: &RequestContext,
        request: &CreateNetworksRequest,
        index: u64,
        cidr: Ipv4Net,
        cidr_v6: Option<Ipv6Net>,
    ) -> Result<Network> {
        let label = request.label_for(index);
        let registration_error = |operation: Operation| {
            let cidr = cidr.to_string();
            move |source: BackendError| NetstackError::Registration {
                cidr,
                operation,
                source,
            }
        };

        let port_network_id = self
            .call(
                ctx,
                Operation::CreatePortNetwork,
                self.port_plugin
                    .create_network(ctx, &label, request.project_id.clone()),
            )
            .await
            .map_err(registration_error(Operation::CreatePortNetwork))?;

        let new_network = NewNetwork {
            label,
            project_id: request.project_id.clone(),
            port_network_id,
            cidr,
            cidr_v6,
            netmask: cidr.netmask(),
            netmask_v6: cidr_v6.map(|c| c.prefix_len()),
            gateway: first_host_v4(&cidr),
            gateway_v6: cidr_v6.and_then(|c| request.gateway_v6.or_else(|| first_host_v6(&c))),
            broadcast: Some(cidr.broadcast()),
            dns1: request.dns1,
            dns2: request.dns2,
            priority: request.priority + index as i32,
            multi_host: request.multi_host,
            bridge: request.bridge.clone(),
            bridge_interface: request.bridge_interface.clone(),
            vlan: CreateNetworksRequest::offset(request.vlan_start, index, "vlan_start")?,
            vpn_start: CreateNetworksRequest::offset(request.vpn_start, index, "vpn_start")?,
        };

        let network = self
            .call(ctx, Operation::PersistNetwork, async {
                self.repository
                    .create_network(new_network)
                    .await
                    .map_err(BackendError::from)
            })
            .await
            .map_err(registration_error(Operation::PersistNetwork))?;

        self.register_blocks(ctx, &network).await?;

        log::info!(
            "Network {} '{}' ready: {}{}",
            network.id,
            network.label,
            network.cidr,
            network
                .cidr_v6
                .map(|c| format!(" + {}", c))
                .unwrap_or_default()
        );
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn v6(s: &str) -> Ipv6Net {
        s.parse().unwrap()
    }

    #[test]
    fn single_network_sized_subnet() {
        let subnets = split_v4(&v4("10.1.1.0/24"), 1, 64).unwrap();
        assert_eq!(subnets, vec![v4("10.1.1.0/26")]);
    }

    #[test]
    fn multiple_contiguous_subnets() {
        let subnets = split_v4(&v4("10.1.0.0/20"), 3, 256).unwrap();
        let rendered: Vec<String> = subnets.iter().map(|s| s.to_string()).collect();
        assert_eq!(rendered, vec!["10.1.0.0/24", "10.1.1.0/24", "10.1.2.0/24"]);
    }

    #[test]
    fn subnets_never_overlap_and_stay_inside_parent() {
        let cases: &[(&str, u64, u64)] = &[
            ("10.0.0.0/8", 16, 65536),
            ("192.168.0.0/16", 7, 1024),
            ("172.16.0.0/24", 64, 4),
            ("10.1.1.0/24", 1, 256),
            ("0.0.0.0/0", 2, 1 << 31),
        ];

        for &(parent, count, size) in cases {
            let parent = v4(parent);
            let subnets = split_v4(&parent, count, size).unwrap();
            assert_eq!(subnets.len() as u64, count);

            for (i, subnet) in subnets.iter().enumerate() {
                let addresses = 1u64 << (32 - u32::from(subnet.prefix_len()));
                assert_eq!(addresses, size, "{} in {}", subnet, parent);
                assert!(parent.contains(subnet), "{} outside {}", subnet, parent);

                for other in &subnets[i + 1..] {
                    assert!(!subnet.contains(other) && !other.contains(subnet));
                    assert!(subnet.network() < other.network());
                }
            }
        }
    }

    #[test]
    fn rejects_uneven_partitions() {
        assert_eq!(
            split_v4(&v4("10.1.1.0/24"), 0, 64),
            Err(ValidationError::NoNetworks)
        );
        assert_eq!(
            split_v4(&v4("10.1.1.0/24"), 1, 100),
            Err(ValidationError::InvalidNetworkSize { size: 100 })
        );
        assert_eq!(
            split_v4(&v4("10.1.1.0/24"), 1, 2),
            Err(ValidationError::InvalidNetworkSize { size: 2 })
        );
        assert!(matches!(
            split_v4(&v4("10.1.1.0/24"), 5, 64),
            Err(ValidationError::InsufficientSpace { count: 5, size: 64, .. })
        ));
        assert!(matches!(
            split_v4(&v4("10.1.1.0/24"), 1, 512),
            Err(ValidationError::InsufficientSpace { .. })
        ));
        assert!(matches!(
            split_v4(&v4("10.1.1.7/24"), 1, 64),
            Err(ValidationError::InvalidCidr { .. })
        ));
    }

    #[test]
    fn v6_subnets_are_consecutive_slash_64s() {
        let subnets = split_v6(&v6("fe::/60"), 2).unwrap();
        let rendered: Vec<String> = subnets.iter().map(|s| s.to_string()).collect();
        assert_eq!(rendered, vec!["fe::/64", "fe:0:0:1::/64"]);

        let single = split_v6(&v6("fe::/60"), 1).unwrap();
        assert_eq!(single, vec![v6("fe::/64")]);
    }

    #[test]
    fn v6_parent_must_fit_requested_count() {
        assert!(split_v6(&v6("fe::/60"), 16).is_ok());
        assert!(matches!(
            split_v6(&v6("fe::/60"), 17),
            Err(ValidationError::InsufficientSpaceV6 { count: 17, .. })
        ));
        assert!(matches!(
            split_v6(&v6("fe::/96"), 1),
            Err(ValidationError::InsufficientSpaceV6 { .. })
        ));
        assert_eq!(split_v6(&v6("::/0"), 3).unwrap().len(), 3);
    }

    #[test]
    fn labels_and_offsets() {
        let request = CreateNetworksRequest::new("private", v4("10.0.0.0/16"), 3, 256);
        assert_eq!(request.label_for(2), "private_2");

        let single = CreateNetworksRequest::new("private", v4("10.0.0.0/16"), 1, 256);
        assert_eq!(single.label_for(0), "private");

        assert_eq!(CreateNetworksRequest::offset(Some(100), 2, "vlan_start"), Ok(Some(102)));
        assert_eq!(CreateNetworksRequest::offset(None, 2, "vlan_start"), Ok(None));
        assert!(CreateNetworksRequest::offset(Some(u16::MAX), 1, "vlan_start").is_err());
    }

    #[test]
    fn parse_helpers_report_input() {
        assert_eq!(parse_cidr_v4("10.1.1.0/24").unwrap(), v4("10.1.1.0/24"));
        match parse_cidr_v4("10.1.1.0/33") {
            Err(ValidationError::InvalidCidr { value, .. }) => assert_eq!(value, "10.1.1.0/33"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_cidr_v6("fe::/60").is_ok());
    }
}
