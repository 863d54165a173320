//! Persistence contract and the in-process reference repository

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use netstack_types::{
    InstanceId, Network, NetworkId, NewNetwork, NewVirtualInterface, VifId, VirtualInterface,
};

use crate::error::RepositoryError;
use crate::storage;

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// CRUD store for networks and virtual interfaces.
///
/// Newly created rows must be visible to subsequent reads, and at most one
/// virtual interface may exist per (instance, network) pair.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_network(&self, network: NewNetwork) -> RepositoryResult<Network>;
    async fn get_network(&self, id: NetworkId) -> RepositoryResult<Option<Network>>;
    /// Networks owned by `project_id` plus every shared network
    async fn get_networks_by_project(&self, project_id: &str) -> RepositoryResult<Vec<Network>>;
    async fn create_vif(&self, vif: NewVirtualInterface) -> RepositoryResult<VirtualInterface>;
    async fn get_vifs_by_instance(
        &self,
        instance_id: InstanceId,
    ) -> RepositoryResult<Vec<VirtualInterface>>;
    /// Deleting an id that no longer exists is not an error
    async fn delete_vif(&self, id: VifId) -> RepositoryResult<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RepositoryState {
    next_network_id: NetworkId,
    next_vif_id: VifId,
    networks: IndexMap<NetworkId, Network>,
    vifs: IndexMap<VifId, VirtualInterface>,
}

/// Repository kept in memory, optionally mirrored to a JSON file
pub struct LocalRepository {
    state: Arc<RwLock<RepositoryState>>,
    storage_path: Option<PathBuf>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RepositoryState::default())),
            storage_path: None,
        }
    }

    /// Open a repository backed by `path`, loading existing rows
    pub async fn open(path: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let path = path.into();
        let state = storage::load_json::<RepositoryState>(&path)
            .await?
            .unwrap_or_default();

        log::info!(
            "Opened repository {} ({} networks, {} interfaces)",
            path.display(),
            state.networks.len(),
            state.vifs.len()
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            storage_path: Some(path),
        })
    }

    async fn persist(&self, state: &RepositoryState) -> RepositoryResult<()> {
        if let Some(path) = &self.storage_path {
            storage::save_json(path, state).await?;
        }
        Ok(())
    }

    pub async fn list_networks(&self) -> Vec<Network> {
        self.state.read().await.networks.values().cloned().collect()
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for LocalRepository {
    async fn create_network(&self, network: NewNetwork) -> RepositoryResult<Network> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.next_network_id += 1;
        let id = next.next_network_id;

        let network = network.into_network(id);
        next.networks.insert(id, network.clone());
        self.persist(&next).await?;
        *state = next;

        log::debug!("Created network {} ({})", id, network.cidr);
        Ok(network)
    }

    async fn get_network(&self, id: NetworkId) -> RepositoryResult<Option<Network>> {
        Ok(self.state.read().await.networks.get(&id).cloned())
    }

    async fn get_networks_by_project(&self, project_id: &str) -> RepositoryResult<Vec<Network>> {
        let state = self.state.read().await;
        Ok(state
            .networks
            .values()
            .filter(|n| n.is_visible_to(project_id))
            .cloned()
            .collect())
    }

    async fn create_vif(&self, vif: NewVirtualInterface) -> RepositoryResult<VirtualInterface> {
        let mut state = self.state.write().await;

        if !state.networks.contains_key(&vif.network_id) {
            return Err(RepositoryError::NotFound {
                kind: "network",
                id: vif.network_id,
            });
        }

        if state
            .vifs
            .values()
            .any(|v| v.instance_id == vif.instance_id && v.network_id == vif.network_id)
        {
            return Err(RepositoryError::Conflict {
                message: format!(
                    "instance {} already has an interface on network {}",
                    vif.instance_id, vif.network_id
                ),
            });
        }

        let mut next = state.clone();
        next.next_vif_id += 1;
        let id = next.next_vif_id;
        let vif = VirtualInterface::from_new(id, vif);
        next.vifs.insert(id, vif.clone());
        self.persist(&next).await?;
        *state = next;

        log::debug!(
            "Created interface {} for instance {} on network {}",
            id,
            vif.instance_id,
            vif.network_id
        );
        Ok(vif)
    }

    async fn get_vifs_by_instance(
        &self,
        instance_id: InstanceId,
    ) -> RepositoryResult<Vec<VirtualInterface>> {
        let state = self.state.read().await;
        Ok(state
            .vifs
            .values()
            .filter(|v| v.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn delete_vif(&self, id: VifId) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        if !state.vifs.contains_key(&id) {
            return Ok(());
        }

        let mut next = state.clone();
        next.vifs.shift_remove(&id);
        self.persist(&next).await?;
        *state = next;

        log::debug!("Deleted interface {}", id);
        Ok(())
    }
}
