//! Instance attachment commands

use std::sync::Arc;

use anyhow::{Context, Result};

use netstack_core::{InstanceRequest, NetstackError, NetworkManager, RequestContext};
use netstack_types::InstanceId;

use crate::output::{render_addresses, render_allocation, render_reclaim, OutputFormat};

pub struct InstanceCommand {
    manager: Arc<NetworkManager>,
}

impl InstanceCommand {
    pub fn new(manager: Arc<NetworkManager>) -> Self {
        Self { manager }
    }

    /// Attach the instance to every network visible to its project
    pub async fn allocate(&self, request: InstanceRequest, format: OutputFormat) -> Result<String> {
        let ctx = RequestContext::new();
        let allocated = self
            .manager
            .allocate_for_instance(&ctx, &request)
            .await
            .with_context(|| format!("Failed to allocate networks for instance {}", request.instance_id))?;

        render_allocation(&allocated, format)
    }

    pub async fn deallocate(
        &self,
        instance_id: InstanceId,
        project: &str,
        format: OutputFormat,
    ) -> Result<String> {
        let ctx = RequestContext::new();
        match self
            .manager
            .deallocate_for_instance(&ctx, instance_id, project)
            .await
        {
            Ok(report) => render_reclaim(&report, format),
            Err(NetstackError::PartialFailure(partial)) => {
                for failure in &partial.failures {
                    log::error!("{}", failure);
                }
                Err(anyhow::Error::new(partial))
            }
            Err(e) => Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to deallocate networks for instance {}", instance_id)),
        }
    }

    /// Leased addresses of each interface of the instance
    pub async fn get_ips(&self, instance_id: InstanceId, format: OutputFormat) -> Result<String> {
        let ctx = RequestContext::new();
        let vifs = self
            .manager
            .list_instance_interfaces(&ctx, instance_id)
            .await
            .with_context(|| format!("Failed to list interfaces of instance {}", instance_id))?;

        let mut leases = Vec::with_capacity(vifs.len());
        for vif in vifs {
            let addresses = self
                .manager
                .get_ips(&ctx, &vif)
                .await
                .with_context(|| format!("Failed to read addresses of vif {}", vif.id))?;
            leases.push((vif, addresses));
        }

        render_addresses(&leases, format)
    }
}
