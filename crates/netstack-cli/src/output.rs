//! Text and JSON rendering for command results

use clap::ValueEnum;
use serde_json::json;

use netstack_core::ReclaimReport;
use netstack_types::{Address, Network, NetworkInfo, VirtualInterface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn render_networks(networks: &[Network], format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(networks)?);
    }

    let mut out = format!(
        "{:<5} {:<16} {:<12} {:<18} {:<20} {:<8}\n",
        "ID", "Label", "Project", "CIDR", "CIDR v6", "Priority"
    );
    out.push_str(&"-".repeat(84));
    out.push('\n');
    for network in networks {
        out.push_str(&format!(
            "{:<5} {:<16} {:<12} {:<18} {:<20} {:<8}\n",
            network.id,
            network.label,
            network.project_id.as_deref().unwrap_or("(shared)"),
            network.cidr,
            or_dash(network.cidr_v6),
            network.priority
        ));
    }
    Ok(out)
}

pub fn render_allocation(
    allocated: &[(Network, NetworkInfo)],
    format: OutputFormat,
) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        let entries: Vec<_> = allocated
            .iter()
            .map(|(network, info)| json!({ "network": network, "info": info }))
            .collect();
        return Ok(serde_json::to_string_pretty(&entries)?);
    }

    let mut out = String::new();
    for (network, info) in allocated {
        out.push_str(&format!(
            "{} (network {}, vif {}, mac {})\n",
            info.label, network.id, info.vif_id, info.mac
        ));
        for ip in info.ips.iter().chain(info.ips6.iter()) {
            out.push_str(&format!("  {:<40} {}\n", ip.ip, ip.netmask));
        }
        out.push_str(&format!("  gateway  {}\n", or_dash(info.gateway.as_deref())));
        if info.gateway6.is_some() {
            out.push_str(&format!("  gateway6 {}\n", or_dash(info.gateway6.as_deref())));
        }
        if !info.dns.is_empty() {
            out.push_str(&format!("  dns      {}\n", info.dns.join(", ")));
        }
    }
    Ok(out)
}

pub fn render_addresses(
    leases: &[(VirtualInterface, Vec<Address>)],
    format: OutputFormat,
) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        let entries: Vec<_> = leases
            .iter()
            .map(|(vif, addresses)| {
                json!({
                    "vif_id": vif.id,
                    "network_id": vif.network_id,
                    "mac_address": vif.mac_address.to_string(),
                    "addresses": addresses
                        .iter()
                        .map(|a| a.address.to_string())
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&entries)?);
    }

    let mut out = format!(
        "{:<6} {:<8} {:<18} {}\n",
        "VIF", "Network", "MAC", "Addresses"
    );
    out.push_str(&"-".repeat(72));
    out.push('\n');
    for (vif, addresses) in leases {
        let listed: Vec<String> = addresses.iter().map(|a| a.address.to_string()).collect();
        out.push_str(&format!(
            "{:<6} {:<8} {:<18} {}\n",
            vif.id,
            vif.network_id,
            vif.mac_address,
            if listed.is_empty() { "-".to_string() } else { listed.join(", ") }
        ));
    }
    Ok(out)
}

pub fn render_reclaim(report: &ReclaimReport, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        let released: Vec<_> = report
            .released
            .iter()
            .map(|(network_id, vif_id)| json!({ "network_id": network_id, "vif_id": vif_id }))
            .collect();
        return Ok(serde_json::to_string_pretty(&json!({
            "instance_id": report.instance_id,
            "released": released,
        }))?);
    }

    if report.is_noop() {
        return Ok(format!(
            "Instance {} has no network attachments\n",
            report.instance_id
        ));
    }

    let mut out = format!(
        "Released {} attachment(s) of instance {}\n",
        report.released.len(),
        report.instance_id
    );
    for (network_id, vif_id) in &report.released {
        out.push_str(&format!("  network {} vif {}\n", network_id, vif_id));
    }
    Ok(out)
}
