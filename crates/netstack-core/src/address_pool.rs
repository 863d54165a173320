//! Address pool (IPAM) abstraction

use async_trait::async_trait;
use ipnet::IpNet;

use netstack_types::{Address, AddressBlock, MacAddr, NetworkId, ProjectId, VifId};

use crate::context::RequestContext;
use crate::error::BackendError;

/// Owner of a set of leases: one interface on one network, within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressScope {
    pub network_id: NetworkId,
    pub vif_id: VifId,
    /// `None` for shared networks
    pub project_id: Option<ProjectId>,
}

impl AddressScope {
    pub fn new(network_id: NetworkId, vif_id: VifId, project_id: Option<ProjectId>) -> Self {
        Self {
            network_id,
            vif_id,
            project_id,
        }
    }
}

impl std::fmt::Display for AddressScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "network {} / vif {} / project {}",
            self.network_id,
            self.vif_id,
            self.project_id.as_deref().unwrap_or("<shared>")
        )
    }
}

/// Client of the external address management service.
///
/// Implementations must hand out each address at most once and must treat
/// a repeated allocation for the same scope as returning its existing
/// leases.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressPool: Send + Sync {
    /// Register `cidr` as an address block of `network_id`
    async fn create_block(
        &self,
        ctx: &RequestContext,
        network_id: NetworkId,
        cidr: IpNet,
        project_id: Option<ProjectId>,
    ) -> Result<AddressBlock, BackendError>;

    /// Lease one address from every block of the scope's network
    async fn allocate_ip(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
        mac_address: MacAddr,
    ) -> Result<Vec<Address>, BackendError>;

    /// Release every lease held by the scope
    async fn deallocate_ips(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
    ) -> Result<(), BackendError>;

    async fn get_allocated_ips(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
    ) -> Result<Vec<Address>, BackendError>;
}
