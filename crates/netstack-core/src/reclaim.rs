//! Tearing down the networking state of an instance

use netstack_types::{InstanceId, NetworkId, VifId, VirtualInterface};

use crate::address_pool::AddressScope;
use crate::context::RequestContext;
use crate::error::{BackendError, NetstackError, Operation, PartialFailure, TeardownFailure};
use crate::manager::NetworkManager;
use crate::Result;

/// Interfaces fully released by a reclamation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub instance_id: InstanceId,
    pub released: Vec<(NetworkId, VifId)>,
}

impl ReclaimReport {
    pub fn is_noop(&self) -> bool {
        self.released.is_empty()
    }
}

impl NetworkManager {
    /// Release ports, leases and interface records of `instance_id`.
    ///
    /// Each interface is torn down in the order unplug, delete port,
    /// release addresses, delete record. A failure stops that interface
    /// only; the record stays behind so a later call picks it up again.
    pub async fn deallocate_for_instance(
        &self,
        ctx: &RequestContext,
        instance_id: InstanceId,
        project_id: &str,
    ) -> Result<ReclaimReport> {
        let vifs = self
            .call(ctx, Operation::ListInterfaces, async {
                self.repository
                    .get_vifs_by_instance(instance_id)
                    .await
                    .map_err(BackendError::from)
            })
            .await
            .map_err(NetstackError::backend(Operation::ListInterfaces))?;

        let mut report = ReclaimReport {
            instance_id,
            released: Vec::with_capacity(vifs.len()),
        };

        if vifs.is_empty() {
            log::debug!("Instance {} has no interfaces to reclaim", instance_id);
            return Ok(report);
        }

        log::info!(
            "Reclaiming {} interface(s) of instance {} (project {})",
            vifs.len(),
            instance_id,
            project_id
        );

        let mut failures = Vec::new();
        for vif in vifs {
            match self.teardown(ctx, &vif).await {
                Ok(()) => report.released.push((vif.network_id, vif.id)),
                Err((operation, error)) => {
                    log::error!(
                        "Teardown of interface {} on network {} failed during {}: {}",
                        vif.id,
                        vif.network_id,
                        operation,
                        error
                    );
                    failures.push(TeardownFailure {
                        network_id: vif.network_id,
                        vif_id: vif.id,
                        operation,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            log::info!(
                "Reclaimed {} interface(s) of instance {}",
                report.released.len(),
                instance_id
            );
            Ok(report)
        } else {
            Err(PartialFailure {
                instance_id,
                failures,
            }
            .into())
        }
    }

    async fn teardown(
        &self,
        ctx: &RequestContext,
        vif: &VirtualInterface,
    ) -> std::result::Result<(), (Operation, BackendError)> {
        let network = self
            .call(ctx, Operation::LoadNetwork, async {
                self.repository
                    .get_network(vif.network_id)
                    .await
                    .map_err(BackendError::from)
            })
            .await
            .map_err(|e| (Operation::LoadNetwork, e))?
            .ok_or_else(|| {
                (
                    Operation::LoadNetwork,
                    BackendError::not_found("repository", format!("network {}", vif.network_id)),
                )
            })?;

        let net = network.port_network_id.as_str();
        let attachment = vif.attachment_id();

        let port = self
            .call(
                ctx,
                Operation::LookupPort,
                self.port_plugin.get_port_by_attachment(ctx, net, &attachment),
            )
            .await
            .map_err(|e| (Operation::LookupPort, e))?;

        match port {
            Some(port_id) => {
                self.call(
                    ctx,
                    Operation::UnplugInterface,
                    self.port_plugin.unplug_interface(ctx, net, &port_id),
                )
                .await
                .map_err(|e| (Operation::UnplugInterface, e))?;

                self.call(
                    ctx,
                    Operation::DeletePort,
                    self.port_plugin.delete_port(ctx, net, &port_id),
                )
                .await
                .map_err(|e| (Operation::DeletePort, e))?;

                log::debug!("Deleted port {} of interface {}", port_id, vif.id);
            }
            None => log::debug!("Interface {} has no port on {}", vif.id, net),
        }

        let scope = AddressScope::new(network.id, vif.id, network.project_id.clone());
        self.call(
            ctx,
            Operation::DeallocateAddresses,
            self.address_pool.deallocate_ips(ctx, &scope),
        )
        .await
        .map_err(|e| (Operation::DeallocateAddresses, e))?;

        self.call(ctx, Operation::DeleteVif, async {
            self.repository
                .delete_vif(vif.id)
                .await
                .map_err(BackendError::from)
        })
        .await
        .map_err(|e| (Operation::DeleteVif, e))?;

        Ok(())
    }
}
