//! Read paths over networks, interfaces and leases

use netstack_types::{Address, InstanceId, Network, VirtualInterface};

use crate::address_pool::AddressScope;
use crate::context::RequestContext;
use crate::error::{BackendError, NetstackError, Operation};
use crate::manager::NetworkManager;
use crate::provision::sort_by_priority;
use crate::Result;

impl NetworkManager {
    /// Addresses currently leased to `vif`
    pub async fn get_ips(&self, ctx: &RequestContext, vif: &VirtualInterface) -> Result<Vec<Address>> {
        let network = self
            .call(ctx, Operation::LoadNetwork, async {
                self.repository
                    .get_network(vif.network_id)
                    .await
                    .map_err(BackendError::from)
            })
            .await
            .map_err(NetstackError::backend(Operation::LoadNetwork))?
            .ok_or_else(|| NetstackError::not_found(format!("network {}", vif.network_id)))?;

        let scope = AddressScope::new(network.id, vif.id, network.project_id);
        self.call(
            ctx,
            Operation::ListAddresses,
            self.address_pool.get_allocated_ips(ctx, &scope),
        )
        .await
        .map_err(NetstackError::backend(Operation::ListAddresses))
    }

    /// Networks `project_id` may attach to, in presentation order
    pub async fn list_networks(&self, ctx: &RequestContext, project_id: &str) -> Result<Vec<Network>> {
        let mut networks = self
            .call(ctx, Operation::ListNetworks, async {
                self.repository
                    .get_networks_by_project(project_id)
                    .await
                    .map_err(BackendError::from)
            })
            .await
            .map_err(NetstackError::backend(Operation::ListNetworks))?;

        networks.retain(|n| n.is_visible_to(project_id));
        sort_by_priority(&mut networks);
        Ok(networks)
    }

    pub async fn list_instance_interfaces(
        &self,
        ctx: &RequestContext,
        instance_id: InstanceId,
    ) -> Result<Vec<VirtualInterface>> {
        self.call(ctx, Operation::ListInterfaces, async {
            self.repository
                .get_vifs_by_instance(instance_id)
                .await
                .map_err(BackendError::from)
        })
        .await
        .map_err(NetstackError::backend(Operation::ListInterfaces))
    }
}
