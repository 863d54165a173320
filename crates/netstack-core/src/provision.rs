//! Attaching an instance to its eligible networks

use netstack_types::{
    Address, InstanceId, IpInfo, Netmask, Network, NetworkInfo, NewVirtualInterface, ProjectId,
    VirtualInterface,
};

use crate::address_pool::AddressScope;
use crate::context::RequestContext;
use crate::error::{BackendError, NetstackError, Operation};
use crate::manager::NetworkManager;
use crate::port_plugin::PortPlacement;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub instance_id: InstanceId,
    pub project_id: ProjectId,
    pub host: String,
    pub instance_type_id: u32,
    pub vpn: Option<String>,
}

impl InstanceRequest {
    pub fn new(instance_id: InstanceId, project_id: impl Into<ProjectId>, host: impl Into<String>) -> Self {
        Self {
            instance_id,
            project_id: project_id.into(),
            host: host.into(),
            instance_type_id: 1,
            vpn: None,
        }
    }

    fn placement(&self) -> PortPlacement {
        PortPlacement {
            instance_id: self.instance_id,
            host: self.host.clone(),
            instance_type_id: self.instance_type_id,
        }
    }
}

/// Order networks by priority, ties by id
pub fn sort_by_priority(networks: &mut [Network]) {
    networks.sort_by_key(|n| (n.priority, n.id));
}

impl NetworkManager {
    /// Create an interface, a plugged port and address leases on every eligible
    /// network of the instance.
    ///
    /// Ports are created and plugged before addresses are requested. The
    /// first failure aborts the call; interfaces created so far stay in
    /// the repository for `deallocate_for_instance` to clean up, and a
    /// repeated call reuses them.
    pub async fn allocate_for_instance(
        &self,
        ctx: &RequestContext,
        request: &InstanceRequest,
    ) -> Result<Vec<(Network, NetworkInfo)>> {
        let networks = self.list_networks(ctx, &request.project_id).await?;
        if networks.is_empty() {
            return Err(NetstackError::not_found(format!(
                "eligible network for project {}",
                request.project_id
            )));
        }

        log::info!(
            "Allocating {} network(s) for instance {} on {}",
            networks.len(),
            request.instance_id,
            request.host
        );
        if let Some(vpn) = &request.vpn {
            log::debug!("Instance {} vpn endpoint {}", request.instance_id, vpn);
        }

        let existing = self
            .list_instance_interfaces(ctx, request.instance_id)
            .await?;

        let mut result = Vec::with_capacity(networks.len());
        for network in networks {
            let reused = existing.iter().find(|v| v.network_id == network.id).cloned();
            let info = self
                .attach(ctx, request, &network, reused)
                .await
                .map_err(|(operation, source)| {
                    log::error!(
                        "Allocation for instance {} failed on network {} during {}: {}",
                        request.instance_id,
                        network.id,
                        operation,
                        source
                    );
                    NetstackError::Allocation {
                        network_id: network.id,
                        operation,
                        source,
                    }
                })?;
            result.push((network, info));
        }

        log::info!(
            "Allocated {} network(s) for instance {}",
            result.len(),
            request.instance_id
        );
        Ok(result)
    }

    async fn attach(
        &self,
        ctx: &RequestContext,
        request: &InstanceRequest,
        network: &Network,
        reused: Option<VirtualInterface>,
    ) -> std::result::Result<NetworkInfo, (Operation, BackendError)> {
        let is_retry = reused.is_some();
        let vif = match reused {
            Some(vif) => {
                log::warn!(
                    "Reusing interface {} of instance {} on network {}",
                    vif.id,
                    request.instance_id,
                    network.id
                );
                vif
            }
            None => {
                let new_vif = NewVirtualInterface {
                    instance_id: request.instance_id,
                    network_id: network.id,
                    project_id: request.project_id.clone(),
                    mac_address: self.mac_generator.generate(),
                };
                self.call(ctx, Operation::CreateVif, async {
                    self.repository
                        .create_vif(new_vif)
                        .await
                        .map_err(BackendError::from)
                })
                .await
                .map_err(|e| (Operation::CreateVif, e))?
            }
        };

        self.ensure_port(ctx, request, network, &vif, is_retry).await?;

        let scope = AddressScope::new(network.id, vif.id, network.project_id.clone());
        let mut addresses = if is_retry {
            self.call(
                ctx,
                Operation::ListAddresses,
                self.address_pool.get_allocated_ips(ctx, &scope),
            )
            .await
            .map_err(|e| (Operation::ListAddresses, e))?
        } else {
            Vec::new()
        };

        if addresses.is_empty() {
            addresses = self
                .call(
                    ctx,
                    Operation::AllocateAddresses,
                    self.address_pool.allocate_ip(ctx, &scope, vif.mac_address),
                )
                .await
                .map_err(|e| (Operation::AllocateAddresses, e))?;
        }

        if !addresses.iter().any(Address::is_v4) {
            return Err((
                Operation::AllocateAddresses,
                BackendError::rejected("address-pool", format!("no IPv4 lease for {}", scope)),
            ));
        }
        if network.cidr_v6.is_some() && !addresses.iter().any(Address::is_v6) {
            log::warn!("Network {} is dual-stack but {} got no IPv6 lease", network.id, scope);
        }

        Ok(build_network_info(network, &vif, &addresses))
    }

    /// Create and plug a port unless a retry finds one already attached
    async fn ensure_port(
        &self,
        ctx: &RequestContext,
        request: &InstanceRequest,
        network: &Network,
        vif: &VirtualInterface,
        is_retry: bool,
    ) -> std::result::Result<(), (Operation, BackendError)> {
        let net = network.port_network_id.as_str();
        let attachment = vif.attachment_id();

        if is_retry {
            let found = self
                .call(
                    ctx,
                    Operation::LookupPort,
                    self.port_plugin.get_port_by_attachment(ctx, net, &attachment),
                )
                .await
                .map_err(|e| (Operation::LookupPort, e))?;
            if let Some(port_id) = found {
                log::debug!("Interface {} already plugged into port {}", vif.id, port_id);
                return Ok(());
            }
        }

        let port_id = self
            .call(ctx, Operation::CreatePort, self.port_plugin.create_port(ctx, net))
            .await
            .map_err(|e| (Operation::CreatePort, e))?;

        let plugged = self
            .call(
                ctx,
                Operation::PlugInterface,
                self.port_plugin
                    .plug_interface(ctx, net, &port_id, &attachment, &request.placement()),
            )
            .await;

        if let Err(e) = plugged {
            // The empty port would otherwise outlive the failed attempt
            if let Err(cleanup) = self
                .call(ctx, Operation::DeletePort, self.port_plugin.delete_port(ctx, net, &port_id))
                .await
            {
                log::warn!("Failed to remove unplugged port {} on {}: {}", port_id, net, cleanup);
            }
            return Err((Operation::PlugInterface, e));
        }

        log::debug!(
            "Plugged interface {} into port {} on {}",
            vif.id,
            port_id,
            net
        );
        Ok(())
    }
}

/// Assemble the hypervisor-facing description of one attachment
pub fn build_network_info(
    network: &Network,
    vif: &VirtualInterface,
    addresses: &[Address],
) -> NetworkInfo {
    let v4_block = addresses
        .iter()
        .filter(|a| a.is_v4())
        .find_map(|a| a.ip_block.as_ref());
    let v6_block = addresses
        .iter()
        .filter(|a| a.is_v6())
        .find_map(|a| a.ip_block.as_ref());

    let ips = addresses
        .iter()
        .filter(|a| a.is_v4())
        .map(|a| {
            let netmask = a
                .ip_block
                .as_ref()
                .map(|b| b.effective_netmask().to_string())
                .unwrap_or_else(|| network.netmask.to_string());
            IpInfo::enabled(a.address, Netmask::Dotted(netmask))
        })
        .collect();

    let ips6 = addresses
        .iter()
        .filter(|a| a.is_v6())
        .map(|a| {
            let prefix = a
                .ip_block
                .as_ref()
                .map(|b| b.prefix_len())
                .or(network.netmask_v6)
                .unwrap_or(64);
            IpInfo::enabled(a.address, Netmask::PrefixLength(prefix))
        })
        .collect();

    NetworkInfo {
        label: network.label.clone(),
        gateway: v4_block
            .and_then(|b| b.gateway)
            .map(|g| g.to_string())
            .or_else(|| network.gateway.map(|g| g.to_string())),
        broadcast: v4_block
            .and_then(|b| b.broadcast)
            .map(|b| b.to_string())
            .or_else(|| network.broadcast.map(|b| b.to_string())),
        mac: vif.mac_address,
        vif_id: vif.id,
        dns: network.dns_servers().iter().map(|d| d.to_string()).collect(),
        ips,
        gateway6: v6_block
            .and_then(|b| b.gateway)
            .map(|g| g.to_string())
            .or_else(|| network.gateway_v6.map(|g| g.to_string())),
        ips6,
    }
}
