//! In-process port plugin

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use netstack_core::storage;
use netstack_core::{BackendError, PortPlacement, PortPlugin, RequestContext};
use netstack_types::ProjectId;

const SERVICE: &str = "port-plugin";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogicalPort {
    id: String,
    attachment: Option<String>,
    placement: Option<PortPlacement>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogicalNetwork {
    id: String,
    label: String,
    tenant: String,
    ports: IndexMap<String, LogicalPort>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PluginState {
    networks: IndexMap<String, LogicalNetwork>,
}

impl PluginState {
    fn network(&self, id: &str) -> Result<&LogicalNetwork, BackendError> {
        self.networks
            .get(id)
            .ok_or_else(|| BackendError::not_found(SERVICE, format!("network {}", id)))
    }

    fn network_mut(&mut self, id: &str) -> Result<&mut LogicalNetwork, BackendError> {
        self.networks
            .get_mut(id)
            .ok_or_else(|| BackendError::not_found(SERVICE, format!("network {}", id)))
    }
}

impl LogicalNetwork {
    fn port_mut(&mut self, id: &str) -> Result<&mut LogicalPort, BackendError> {
        let network = self.id.clone();
        self.ports
            .get_mut(id)
            .ok_or_else(|| BackendError::not_found(SERVICE, format!("port {} on {}", id, network)))
    }
}

/// Logical networks and ports kept in process memory
pub struct LocalPortPlugin {
    state: Arc<RwLock<PluginState>>,
    default_tenant: String,
    storage_path: Option<PathBuf>,
}

impl LocalPortPlugin {
    pub fn new(default_tenant: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(PluginState::default())),
            default_tenant: default_tenant.into(),
            storage_path: None,
        }
    }

    /// Open a plugin persisted at `path`
    pub async fn open(
        default_tenant: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, BackendError> {
        let path = path.into();
        let state = storage::load_json::<PluginState>(&path)
            .await
            .map_err(|e| BackendError::Storage {
                message: e.to_string(),
            })?
            .unwrap_or_default();

        log::info!(
            "Opened port plugin {} ({} networks)",
            path.display(),
            state.networks.len()
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            default_tenant: default_tenant.into(),
            storage_path: Some(path),
        })
    }

    async fn persist(&self, state: &PluginState) -> Result<(), BackendError> {
        if let Some(path) = &self.storage_path {
            storage::save_json(path, state)
                .await
                .map_err(|e| BackendError::Storage {
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Ports of `network_id`, with their attachments
    pub async fn ports(&self, network_id: &str) -> Result<Vec<(String, Option<String>)>, BackendError> {
        let state = self.state.read().await;
        Ok(state
            .network(network_id)?
            .ports
            .values()
            .map(|p| (p.id.clone(), p.attachment.clone()))
            .collect())
    }

    pub async fn tenant_of(&self, network_id: &str) -> Result<String, BackendError> {
        let state = self.state.read().await;
        Ok(state.network(network_id)?.tenant.clone())
    }
}

#[async_trait]
impl PortPlugin for LocalPortPlugin {
    async fn create_network(
        &self,
        _ctx: &RequestContext,
        label: &str,
        project_id: Option<ProjectId>,
    ) -> Result<String, BackendError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let id = Uuid::new_v4().to_string();
        let tenant = project_id.unwrap_or_else(|| self.default_tenant.clone());

        next.networks.insert(
            id.clone(),
            LogicalNetwork {
                id: id.clone(),
                label: label.to_string(),
                tenant: tenant.clone(),
                ports: IndexMap::new(),
            },
        );
        self.persist(&next).await?;
        *state = next;

        log::info!("Created logical network {} '{}' for {}", id, label, tenant);
        Ok(id)
    }

    async fn create_port(
        &self,
        _ctx: &RequestContext,
        network_id: &str,
    ) -> Result<String, BackendError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let network = next.network_mut(network_id)?;

        let id = Uuid::new_v4().to_string();
        network.ports.insert(
            id.clone(),
            LogicalPort {
                id: id.clone(),
                attachment: None,
                placement: None,
                created_at: Utc::now(),
            },
        );
        self.persist(&next).await?;
        *state = next;

        log::debug!("Created port {} on {}", id, network_id);
        Ok(id)
    }

    async fn plug_interface(
        &self,
        _ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
        attachment_id: &str,
        placement: &PortPlacement,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let network = next.network_mut(network_id)?;

        if let Some(holder) = network
            .ports
            .values()
            .find(|p| p.id != port_id && p.attachment.as_deref() == Some(attachment_id))
        {
            return Err(BackendError::rejected(
                SERVICE,
                format!("attachment {} already plugged into port {}", attachment_id, holder.id),
            ));
        }

        let port = network.port_mut(port_id)?;
        match port.attachment.as_deref() {
            Some(current) if current == attachment_id => {
                log::debug!("Port {} already carries {}", port_id, attachment_id);
                return Ok(());
            }
            Some(current) => {
                return Err(BackendError::rejected(
                    SERVICE,
                    format!("port {} already carries {}", port_id, current),
                ));
            }
            None => {}
        }

        port.attachment = Some(attachment_id.to_string());
        port.placement = Some(placement.clone());
        self.persist(&next).await?;
        *state = next;

        log::debug!(
            "Plugged {} into port {} (host {})",
            attachment_id,
            port_id,
            placement.host
        );
        Ok(())
    }

    async fn unplug_interface(
        &self,
        _ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let port = next.network_mut(network_id)?.port_mut(port_id)?;

        if let Some(attachment) = port.attachment.take() {
            port.placement = None;
            self.persist(&next).await?;
            *state = next;
            log::debug!("Unplugged {} from port {}", attachment, port_id);
        }
        Ok(())
    }

    async fn get_port_by_attachment(
        &self,
        _ctx: &RequestContext,
        network_id: &str,
        attachment_id: &str,
    ) -> Result<Option<String>, BackendError> {
        let state = self.state.read().await;
        let Some(network) = state.networks.get(network_id) else {
            log::debug!("Logical network {} is gone", network_id);
            return Ok(None);
        };

        Ok(network
            .ports
            .values()
            .find(|p| p.attachment.as_deref() == Some(attachment_id))
            .map(|p| p.id.clone()))
    }

    async fn delete_port(
        &self,
        _ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let network = next.network_mut(network_id)?;

        if let Some(attachment) = network.port_mut(port_id)?.attachment.clone() {
            return Err(BackendError::rejected(
                SERVICE,
                format!("port {} still carries {}", port_id, attachment),
            ));
        }

        network.ports.shift_remove(port_id);
        self.persist(&next).await?;
        *state = next;

        log::debug!("Deleted port {} on {}", port_id, network_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement() -> PortPlacement {
        PortPlacement {
            instance_id: 1,
            host: "compute-1".to_string(),
            instance_type_id: 1,
        }
    }

    #[tokio::test]
    async fn port_lifecycle() {
        let plugin = LocalPortPlugin::new("default");
        let ctx = RequestContext::new();

        let net = plugin.create_network(&ctx, "private", None).await.unwrap();
        assert_eq!(plugin.tenant_of(&net).await.unwrap(), "default");

        let port = plugin.create_port(&ctx, &net).await.unwrap();
        plugin
            .plug_interface(&ctx, &net, &port, "17", &placement())
            .await
            .unwrap();
        assert_eq!(
            plugin.get_port_by_attachment(&ctx, &net, "17").await.unwrap(),
            Some(port.clone())
        );

        let busy = plugin.delete_port(&ctx, &net, &port).await;
        assert!(matches!(busy, Err(BackendError::Rejected { .. })));

        plugin.unplug_interface(&ctx, &net, &port).await.unwrap();
        plugin.unplug_interface(&ctx, &net, &port).await.unwrap();
        plugin.delete_port(&ctx, &net, &port).await.unwrap();

        assert_eq!(plugin.get_port_by_attachment(&ctx, &net, "17").await.unwrap(), None);
        assert!(plugin.ports(&net).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attachment_lives_on_one_port() {
        let plugin = LocalPortPlugin::new("default");
        let ctx = RequestContext::new();
        let net = plugin
            .create_network(&ctx, "private", Some("project1".to_string()))
            .await
            .unwrap();
        assert_eq!(plugin.tenant_of(&net).await.unwrap(), "project1");

        let first = plugin.create_port(&ctx, &net).await.unwrap();
        let second = plugin.create_port(&ctx, &net).await.unwrap();
        plugin
            .plug_interface(&ctx, &net, &first, "3", &placement())
            .await
            .unwrap();

        let moved = plugin.plug_interface(&ctx, &net, &second, "3", &placement()).await;
        assert!(matches!(moved, Err(BackendError::Rejected { .. })));

        let occupied = plugin.plug_interface(&ctx, &net, &first, "4", &placement()).await;
        assert!(matches!(occupied, Err(BackendError::Rejected { .. })));
    }

    #[tokio::test]
    async fn unknown_network_and_port() {
        let plugin = LocalPortPlugin::new("default");
        let ctx = RequestContext::new();

        let missing = plugin.create_port(&ctx, "nope").await;
        assert!(matches!(missing, Err(BackendError::NotFound { .. })));
        assert_eq!(plugin.get_port_by_attachment(&ctx, "nope", "1").await.unwrap(), None);

        let net = plugin.create_network(&ctx, "private", None).await.unwrap();
        let no_port = plugin.unplug_interface(&ctx, &net, "nope").await;
        assert!(matches!(no_port, Err(BackendError::NotFound { .. })));
    }

    #[tokio::test]
    async fn ports_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ports.json");
        let ctx = RequestContext::new();

        let (net, port) = {
            let plugin = LocalPortPlugin::open("default", &path).await.unwrap();
            let net = plugin.create_network(&ctx, "private", None).await.unwrap();
            let port = plugin.create_port(&ctx, &net).await.unwrap();
            plugin
                .plug_interface(&ctx, &net, &port, "9", &placement())
                .await
                .unwrap();
            (net, port)
        };

        let reopened = LocalPortPlugin::open("default", &path).await.unwrap();
        assert_eq!(
            reopened.get_port_by_attachment(&ctx, &net, "9").await.unwrap(),
            Some(port)
        );
    }

    #[tokio::test]
    async fn failed_write_leaves_ports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let mut plugin = LocalPortPlugin::new("default");
        let ctx = RequestContext::new();
        let net = plugin.create_network(&ctx, "private", None).await.unwrap();

        plugin.storage_path = Some(blocker.join("ports.json"));
        let result = plugin.create_port(&ctx, &net).await;
        assert!(matches!(result, Err(BackendError::Storage { .. })));
        assert!(plugin.ports(&net).await.unwrap().is_empty());
    }
}
