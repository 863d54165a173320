//! Network creation and listing

use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use netstack_core::partition::{parse_cidr_v4, parse_cidr_v6};
use netstack_core::{CreateNetworksRequest, NetworkManager, RequestContext};

use crate::output::{render_networks, OutputFormat};

/// Arguments of `create-networks`
#[derive(Debug, Clone, Args)]
pub struct CreateNetworksArgs {
    /// Label of the networks; numbered `<label>_<n>` when more than one
    #[arg(short, long)]
    pub label: String,

    /// IPv4 range to partition
    #[arg(long)]
    pub cidr: String,

    /// Number of networks to carve out
    #[arg(short, long, default_value_t = 1)]
    pub num_networks: u64,

    /// Addresses per network (power of two)
    #[arg(short = 's', long, default_value_t = 256)]
    pub network_size: u64,

    /// Owning project; networks are shared when omitted
    #[arg(short, long)]
    pub project: Option<String>,

    /// IPv6 range to partition alongside the v4 range
    #[arg(long)]
    pub cidr_v6: Option<String>,

    #[arg(long)]
    pub gateway_v6: Option<Ipv6Addr>,

    /// Lower values are attached first
    #[arg(long, default_value_t = 1)]
    pub priority: i32,

    #[arg(long)]
    pub multi_host: bool,

    #[arg(long)]
    pub bridge: Option<String>,

    #[arg(long)]
    pub bridge_interface: Option<String>,

    /// First VLAN; incremented per network
    #[arg(long)]
    pub vlan_start: Option<u16>,

    /// First VPN port; incremented per network
    #[arg(long)]
    pub vpn_start: Option<u16>,

    #[arg(long)]
    pub dns1: Option<IpAddr>,

    #[arg(long)]
    pub dns2: Option<IpAddr>,
}

impl CreateNetworksArgs {
    pub fn into_request(self) -> Result<CreateNetworksRequest> {
        let cidr = parse_cidr_v4(&self.cidr)?;
        let mut request =
            CreateNetworksRequest::new(self.label, cidr, self.num_networks, self.network_size)
                .with_priority(self.priority);

        if let Some(project) = self.project {
            request = request.with_project(project);
        }
        if let Some(cidr_v6) = self.cidr_v6 {
            request = request.with_cidr_v6(
                parse_cidr_v6(&cidr_v6).with_context(|| "Invalid --cidr-v6 value")?,
            );
        }

        request.gateway_v6 = self.gateway_v6;
        request.multi_host = self.multi_host;
        request.bridge = self.bridge;
        request.bridge_interface = self.bridge_interface;
        request.vlan_start = self.vlan_start;
        request.vpn_start = self.vpn_start;
        request.dns1 = self.dns1;
        request.dns2 = self.dns2;
        Ok(request)
    }
}

pub struct NetworksCommand {
    manager: Arc<NetworkManager>,
}

impl NetworksCommand {
    pub fn new(manager: Arc<NetworkManager>) -> Self {
        Self { manager }
    }

    pub async fn create(&self, args: CreateNetworksArgs, format: OutputFormat) -> Result<String> {
        let request = args.into_request()?;
        let ctx = RequestContext::new();

        let networks = self
            .manager
            .create_networks(&ctx, &request)
            .await
            .with_context(|| format!("Failed to create networks from {}", request.cidr))?;

        log::info!("Created {} network(s) labelled '{}'", networks.len(), request.label);
        render_networks(&networks, format)
    }

    /// Networks visible to `project`, in attachment order
    pub async fn list(&self, project: &str, format: OutputFormat) -> Result<String> {
        let ctx = RequestContext::new();
        let networks = self
            .manager
            .list_networks(&ctx, project)
            .await
            .with_context(|| format!("Failed to list networks of {}", project))?;

        render_networks(&networks, format)
    }
}
