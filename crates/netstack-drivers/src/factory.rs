//! Backend factory
//!
//! Builds the address pool, port plugin and repository named by the
//! configuration and wires them into a `NetworkManager`.

use std::sync::Arc;

use anyhow::{Context, Result};

use netstack_core::{
    AddressPool, AddressPoolBackend, AddressPoolConfig, LocalRepository, NetstackConfig,
    NetworkManager, PortPlugin, PortPluginBackend, PortPluginConfig, Repository,
    RepositoryConfig,
};

use crate::address_pool::{LocalAddressPool, MelangeClient};
use crate::port_plugin::{LocalPortPlugin, QuantumClient};

pub struct BackendFactory;

impl BackendFactory {
    /// Create the address pool selected by `config.backend`
    pub async fn create_address_pool(config: &AddressPoolConfig) -> Result<Arc<dyn AddressPool>> {
        match config.backend {
            AddressPoolBackend::Local => {
                let pool = match &config.storage_path {
                    Some(path) => LocalAddressPool::open(path)
                        .await
                        .with_context(|| format!("opening address pool {}", path.display()))?,
                    None => LocalAddressPool::new(),
                };
                Ok(Arc::new(pool))
            }
            AddressPoolBackend::Melange => {
                let client = MelangeClient::new(config)?;
                log::info!("Using Melange address pool at {:?}", config.url);
                Ok(Arc::new(client))
            }
        }
    }

    /// Create the port plugin selected by `config.backend`
    pub async fn create_port_plugin(config: &PortPluginConfig) -> Result<Arc<dyn PortPlugin>> {
        match config.backend {
            PortPluginBackend::Local => {
                let plugin = match &config.storage_path {
                    Some(path) => LocalPortPlugin::open(config.default_tenant.clone(), path)
                        .await
                        .with_context(|| format!("opening port plugin {}", path.display()))?,
                    None => LocalPortPlugin::new(config.default_tenant.clone()),
                };
                Ok(Arc::new(plugin))
            }
            PortPluginBackend::Quantum => {
                let client = QuantumClient::new(config)?;
                log::info!("Using Quantum port plugin at {:?}", config.url);
                Ok(Arc::new(client))
            }
        }
    }

    pub async fn create_repository(config: &RepositoryConfig) -> Result<Arc<dyn Repository>> {
        let repository = match &config.storage_path {
            Some(path) => LocalRepository::open(path)
                .await
                .with_context(|| format!("opening repository {}", path.display()))?,
            None => LocalRepository::new(),
        };
        Ok(Arc::new(repository))
    }

    /// Validate `config` and build a manager over its backends
    pub async fn create_manager(config: &NetstackConfig) -> Result<NetworkManager> {
        config.validate()?;

        let repository = Self::create_repository(&config.repository).await?;
        let address_pool = Self::create_address_pool(&config.address_pool).await?;
        let port_plugin = Self::create_port_plugin(&config.port_plugin).await?;

        Ok(NetworkManager::new(
            repository,
            address_pool,
            port_plugin,
            config.manager.clone(),
        ))
    }
}
