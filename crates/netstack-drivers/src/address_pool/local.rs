//! In-process address pool
//!
//! Keeps blocks and leases in memory, optionally mirrored to a JSON file.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use netstack_core::storage;
use netstack_core::{AddressPool, AddressScope, BackendError, RequestContext};
use netstack_types::{Address, AddressBlock, MacAddr, NetworkId, ProjectId, VifId};

const SERVICE: &str = "address-pool";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockEntry {
    block: AddressBlock,
    project_id: Option<ProjectId>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseEntry {
    address: IpAddr,
    network_id: NetworkId,
    vif_id: VifId,
    project_id: Option<ProjectId>,
    mac_address: MacAddr,
    allocated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PoolState {
    blocks: IndexMap<NetworkId, Vec<BlockEntry>>,
    leases: Vec<LeaseEntry>,
}

impl PoolState {
    fn leases_of<'a>(&'a self, scope: &'a AddressScope) -> impl Iterator<Item = &'a LeaseEntry> {
        self.leases
            .iter()
            .filter(move |l| l.network_id == scope.network_id && l.vif_id == scope.vif_id)
    }

    fn to_address(&self, lease: &LeaseEntry) -> Address {
        let block = self.blocks.get(&lease.network_id).and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b.block.cidr.contains(&lease.address))
                .map(|b| b.block.clone())
        });

        let address = Address::new(lease.address);
        match block {
            Some(block) => address.with_block(block),
            None => address,
        }
    }

    fn is_leased(&self, network_id: NetworkId, address: &IpAddr) -> bool {
        self.leases
            .iter()
            .any(|l| l.network_id == network_id && l.address == *address)
    }

    /// Lowest host of `block` that is neither reserved nor leased
    fn next_free(&self, network_id: NetworkId, block: &AddressBlock) -> Option<IpAddr> {
        let network = block.cidr.network();
        block.cidr.hosts().find(|candidate| {
            *candidate != network
                && Some(*candidate) != block.gateway
                && Some(*candidate) != block.broadcast
                && !self.is_leased(network_id, candidate)
        })
    }
}

/// Address pool backed by process memory
pub struct LocalAddressPool {
    state: Arc<RwLock<PoolState>>,
    storage_path: Option<PathBuf>,
}

impl LocalAddressPool {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PoolState::default())),
            storage_path: None,
        }
    }

    /// Open a pool persisted at `path`, loading existing blocks and leases
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let path = path.into();
        let state = storage::load_json::<PoolState>(&path)
            .await
            .map_err(storage_error)?
            .unwrap_or_default();

        log::info!(
            "Opened address pool {} ({} networks, {} leases)",
            path.display(),
            state.blocks.len(),
            state.leases.len()
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            storage_path: Some(path),
        })
    }

    async fn persist(&self, state: &PoolState) -> Result<(), BackendError> {
        if let Some(path) = &self.storage_path {
            storage::save_json(path, state)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }

    /// Number of live leases across all networks
    pub async fn lease_count(&self) -> usize {
        self.state.read().await.leases.len()
    }
}

impl Default for LocalAddressPool {
    fn default() -> Self {
        Self::new()
    }
}

fn storage_error(error: std::io::Error) -> BackendError {
    BackendError::Storage {
        message: error.to_string(),
    }
}

/// Derive gateway, netmask and broadcast for a freshly registered block
fn describe_block(cidr: IpNet) -> AddressBlock {
    let mut block = AddressBlock::new(cidr.trunc());
    block.netmask = Some(cidr.netmask());
    block.gateway = match cidr.trunc() {
        IpNet::V4(net) => netstack_types::network::first_host_v4(&net).map(IpAddr::V4),
        IpNet::V6(net) => netstack_types::network::first_host_v6(&net).map(IpAddr::V6),
    };
    block.broadcast = match cidr {
        IpNet::V4(net) if net.prefix_len() < 31 => Some(IpAddr::V4(net.broadcast())),
        _ => None,
    };
    block
}

fn check_project(
    expected: &Option<ProjectId>,
    scope: &AddressScope,
    what: &str,
) -> Result<(), BackendError> {
    if *expected != scope.project_id {
        return Err(BackendError::rejected(
            SERVICE,
            format!(
                "{} belongs to project {}, not {}",
                what,
                expected.as_deref().unwrap_or("<shared>"),
                scope.project_id.as_deref().unwrap_or("<shared>")
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl AddressPool for LocalAddressPool {
    async fn create_block(
        &self,
        ctx: &RequestContext,
        network_id: NetworkId,
        cidr: IpNet,
        project_id: Option<ProjectId>,
    ) -> Result<AddressBlock, BackendError> {
        let mut state = self.state.write().await;
        let block = describe_block(cidr);

        if let Some(existing) = state
            .blocks
            .get(&network_id)
            .and_then(|blocks| blocks.iter().find(|b| b.block.version == block.version))
        {
            if existing.block.cidr == block.cidr {
                log::debug!("[{}] Block {} already registered", ctx.request_id, cidr);
                return Ok(existing.block.clone());
            }
            return Err(BackendError::rejected(
                SERVICE,
                format!(
                    "network {} already has {} block {}",
                    network_id, block.version, existing.block.cidr
                ),
            ));
        }

        let overlapping = state.blocks.values().flatten().find(|b| {
            b.block.cidr.contains(&block.cidr.network()) || block.cidr.contains(&b.block.cidr.network())
        });
        if let Some(other) = overlapping {
            return Err(BackendError::rejected(
                SERVICE,
                format!("{} overlaps registered block {}", block.cidr, other.block.cidr),
            ));
        }

        let mut next = state.clone();
        next.blocks.entry(network_id).or_default().push(BlockEntry {
            block: block.clone(),
            project_id,
            created_at: Utc::now(),
        });
        self.persist(&next).await?;
        *state = next;

        log::info!("Registered block {} for network {}", block.cidr, network_id);
        Ok(block)
    }

    async fn allocate_ip(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
        mac_address: MacAddr,
    ) -> Result<Vec<Address>, BackendError> {
        let mut state = self.state.write().await;

        let blocks = state
            .blocks
            .get(&scope.network_id)
            .filter(|blocks| !blocks.is_empty())
            .cloned()
            .ok_or_else(|| {
                BackendError::not_found(SERVICE, format!("blocks of network {}", scope.network_id))
            })?;

        for entry in &blocks {
            check_project(&entry.project_id, scope, &format!("block {}", entry.block.cidr))?;
        }

        let held: Vec<Address> = state.leases_of(scope).map(|l| state.to_address(l)).collect();
        if !held.is_empty() {
            log::debug!("[{}] {} already holds {} lease(s)", ctx.request_id, scope, held.len());
            return Ok(held);
        }

        let mut picked = Vec::with_capacity(blocks.len());
        for entry in &blocks {
            let address = state
                .next_free(scope.network_id, &entry.block)
                .ok_or_else(|| {
                    BackendError::rejected(SERVICE, format!("block {} is exhausted", entry.block.cidr))
                })?;
            picked.push(address);
        }

        let now = Utc::now();
        let mut next = state.clone();
        for address in &picked {
            next.leases.push(LeaseEntry {
                address: *address,
                network_id: scope.network_id,
                vif_id: scope.vif_id,
                project_id: scope.project_id.clone(),
                mac_address,
                allocated_at: now,
            });
        }
        self.persist(&next).await?;
        *state = next;

        log::info!("Leased {:?} to {} ({})", picked, scope, mac_address);
        Ok(state.leases_of(scope).map(|l| state.to_address(l)).collect())
    }

    async fn deallocate_ips(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;

        if let Some(lease) = state.leases_of(scope).next() {
            check_project(&lease.project_id, scope, &format!("lease {}", lease.address))?;
        } else {
            log::debug!("[{}] {} holds no leases", ctx.request_id, scope);
            return Ok(());
        }

        let mut next = state.clone();
        next.leases
            .retain(|l| !(l.network_id == scope.network_id && l.vif_id == scope.vif_id));
        let released = state.leases.len() - next.leases.len();
        self.persist(&next).await?;
        *state = next;

        log::info!("Released {} lease(s) of {}", released, scope);
        Ok(())
    }

    async fn get_allocated_ips(
        &self,
        _ctx: &RequestContext,
        scope: &AddressScope,
    ) -> Result<Vec<Address>, BackendError> {
        let state = self.state.read().await;
        Ok(state.leases_of(scope).map(|l| state.to_address(l)).collect())
    }
}
