//! Port plugin (SDN control plane) abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use netstack_types::{InstanceId, ProjectId};

use crate::context::RequestContext;
use crate::error::BackendError;

/// Placement hints forwarded when an interface is plugged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPlacement {
    pub instance_id: InstanceId,
    pub host: String,
    pub instance_type_id: u32,
}

/// Client of the external logical network/port service.
///
/// Ports are identified inside the logical network that owns them; the
/// attachment id is the virtual interface key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortPlugin: Send + Sync {
    /// Create a logical network, returning its handle
    async fn create_network(
        &self,
        ctx: &RequestContext,
        label: &str,
        project_id: Option<ProjectId>,
    ) -> Result<String, BackendError>;

    async fn create_port(
        &self,
        ctx: &RequestContext,
        network_id: &str,
    ) -> Result<String, BackendError>;

    async fn plug_interface(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
        attachment_id: &str,
        placement: &PortPlacement,
    ) -> Result<(), BackendError>;

    async fn unplug_interface(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
    ) -> Result<(), BackendError>;

    /// Port currently carrying `attachment_id`, if any
    async fn get_port_by_attachment(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        attachment_id: &str,
    ) -> Result<Option<String>, BackendError>;

    async fn delete_port(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
    ) -> Result<(), BackendError>;
}
