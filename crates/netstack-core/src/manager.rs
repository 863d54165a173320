//! Network manager
//!
//! Coordinates the repository, the address pool and the port plugin. The
//! operations themselves live in `partition`, `provision`, `reclaim` and
//! `query`.

use std::future::Future;
use std::sync::Arc;

use crate::address_pool::AddressPool;
use crate::config::ManagerConfig;
use crate::context::RequestContext;
use crate::error::{BackendError, Operation};
use crate::mac::{MacAddressGenerator, RandomMacGenerator};
use crate::port_plugin::PortPlugin;
use crate::repository::Repository;

pub struct NetworkManager {
    pub(crate) repository: Arc<dyn Repository>,
    pub(crate) address_pool: Arc<dyn AddressPool>,
    pub(crate) port_plugin: Arc<dyn PortPlugin>,
    pub(crate) mac_generator: Arc<dyn MacAddressGenerator>,
    pub(crate) config: ManagerConfig,
}

impl NetworkManager {
    /// Create a manager with random MAC generation
    pub fn new(
        repository: Arc<dyn Repository>,
        address_pool: Arc<dyn AddressPool>,
        port_plugin: Arc<dyn PortPlugin>,
        config: ManagerConfig,
    ) -> Self {
        log::info!(
            "Network manager ready (ipv6: {}, call timeout: {:?})",
            config.use_ipv6,
            config.call_timeout()
        );
        Self {
            repository,
            address_pool,
            port_plugin,
            mac_generator: Arc::new(RandomMacGenerator),
            config,
        }
    }

    /// Replace the MAC address source
    pub fn with_mac_generator(mut self, generator: Arc<dyn MacAddressGenerator>) -> Self {
        self.mac_generator = generator;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Run one backend call bounded by the request deadline and the
    /// configured per-call timeout
    pub(crate) async fn call<T, F>(
        &self,
        ctx: &RequestContext,
        operation: Operation,
        call: F,
    ) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        log::debug!("[{}] {}", ctx.request_id, operation);
        ctx.run(operation, self.config.call_timeout(), call).await
    }
}
