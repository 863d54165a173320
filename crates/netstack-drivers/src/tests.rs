//! End-to-end flows over the in-process backends

use std::sync::Arc;

use netstack_core::{
    CreateNetworksRequest, InstanceRequest, LocalRepository, ManagerConfig, NetworkManager,
    PortPlugin, RequestContext,
};
use netstack_types::{Netmask, VirtualInterface};

use crate::{LocalAddressPool, LocalPortPlugin};

struct Harness {
    manager: NetworkManager,
    pool: Arc<LocalAddressPool>,
    plugin: Arc<LocalPortPlugin>,
}

fn harness() -> Harness {
    let pool = Arc::new(LocalAddressPool::new());
    let plugin = Arc::new(LocalPortPlugin::new("default"));
    let manager = NetworkManager::new(
        Arc::new(LocalRepository::new()),
        pool.clone(),
        plugin.clone(),
        ManagerConfig::default(),
    );
    Harness {
        manager,
        pool,
        plugin,
    }
}

async fn create_topology(harness: &Harness, ctx: &RequestContext) {
    let public = CreateNetworksRequest::new("public", "77.1.1.0/24".parse().unwrap(), 1, 256);
    harness.manager.create_networks(ctx, &public).await.unwrap();

    let private = CreateNetworksRequest::new("private", "10.1.0.0/20".parse().unwrap(), 2, 256)
        .with_project("project1")
        .with_cidr_v6("fe::/60".parse().unwrap());
    harness.manager.create_networks(ctx, &private).await.unwrap();
}

async fn interfaces(harness: &Harness, ctx: &RequestContext, instance: u64) -> Vec<VirtualInterface> {
    harness
        .manager
        .list_instance_interfaces(ctx, instance)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_instance_lifecycle() {
    let harness = harness();
    let ctx = RequestContext::new();
    create_topology(&harness, &ctx).await;

    let request = InstanceRequest::new(1, "project1", "compute-1");
    let allocated = harness
        .manager
        .allocate_for_instance(&ctx, &request)
        .await
        .unwrap();

    let labels: Vec<&str> = allocated.iter().map(|(n, _)| n.label.as_str()).collect();
    assert_eq!(labels, vec!["public", "private_0", "private_1"]);

    let (_, public) = &allocated[0];
    assert_eq!(public.ips[0].ip, "77.1.1.2");
    assert_eq!(public.gateway.as_deref(), Some("77.1.1.1"));
    assert!(public.ips6.is_empty());

    let (_, private) = &allocated[1];
    assert_eq!(private.ips[0].ip, "10.1.0.2");
    assert_eq!(private.ips[0].netmask, Netmask::Dotted("255.255.255.0".to_string()));
    assert_eq!(private.ips6[0].ip, "fe::2");
    assert_eq!(private.ips6[0].netmask, Netmask::PrefixLength(64));
    assert_eq!(private.gateway6.as_deref(), Some("fe::1"));
    assert_eq!(allocated[2].1.ips6[0].ip, "fe:0:0:1::2");

    let vifs = interfaces(&harness, &ctx, 1).await;
    assert_eq!(vifs.len(), 3);
    for ((network, info), vif) in allocated.iter().zip(&vifs) {
        assert_eq!(info.vif_id, vif.id);

        let leased: Vec<String> = harness
            .manager
            .get_ips(&ctx, vif)
            .await
            .unwrap()
            .iter()
            .map(|a| a.address.to_string())
            .collect();
        let reported: Vec<String> = info
            .ips
            .iter()
            .chain(info.ips6.iter())
            .map(|ip| ip.ip.clone())
            .collect();
        assert_eq!(leased, reported);

        let port = harness
            .plugin
            .get_port_by_attachment(&ctx, &network.port_network_id, &vif.attachment_id())
            .await
            .unwrap();
        assert!(port.is_some());
    }

    let report = harness
        .manager
        .deallocate_for_instance(&ctx, 1, "project1")
        .await
        .unwrap();
    assert_eq!(report.released.len(), 3);
    assert_eq!(harness.pool.lease_count().await, 0);
    for (network, _) in &allocated {
        assert!(harness
            .plugin
            .ports(&network.port_network_id)
            .await
            .unwrap()
            .is_empty());
    }
    for vif in &vifs {
        assert!(harness.manager.get_ips(&ctx, vif).await.unwrap().is_empty());
    }

    let again = harness
        .manager
        .deallocate_for_instance(&ctx, 1, "project1")
        .await
        .unwrap();
    assert!(again.is_noop());
    assert!(interfaces(&harness, &ctx, 1).await.is_empty());
}

#[tokio::test]
async fn test_instances_share_public_network() {
    let harness = harness();
    let ctx = RequestContext::new();
    create_topology(&harness, &ctx).await;

    harness
        .manager
        .allocate_for_instance(&ctx, &InstanceRequest::new(1, "project1", "compute-1"))
        .await
        .unwrap();
    let other = harness
        .manager
        .allocate_for_instance(&ctx, &InstanceRequest::new(2, "project2", "compute-2"))
        .await
        .unwrap();

    assert_eq!(other.len(), 1);
    assert_eq!(other[0].0.label, "public");
    assert_eq!(other[0].1.ips[0].ip, "77.1.1.3");
    assert_ne!(other[0].1.mac, interfaces(&harness, &ctx, 1).await[0].mac_address);
}

#[tokio::test]
async fn test_repeated_partition_reuses_networks() {
    let harness = harness();
    let ctx = RequestContext::new();
    create_topology(&harness, &ctx).await;
    create_topology(&harness, &ctx).await;

    let networks = harness.manager.list_networks(&ctx, "project1").await.unwrap();
    assert_eq!(networks.len(), 3);
}

#[tokio::test]
async fn test_reclaim_after_port_vanished() {
    let harness = harness();
    let ctx = RequestContext::new();
    create_topology(&harness, &ctx).await;

    let request = InstanceRequest::new(3, "project2", "compute-1");
    let allocated = harness
        .manager
        .allocate_for_instance(&ctx, &request)
        .await
        .unwrap();
    let (network, _) = &allocated[0];
    let vif = &interfaces(&harness, &ctx, 3).await[0];

    let port = harness
        .plugin
        .get_port_by_attachment(&ctx, &network.port_network_id, &vif.attachment_id())
        .await
        .unwrap()
        .unwrap();
    harness
        .plugin
        .unplug_interface(&ctx, &network.port_network_id, &port)
        .await
        .unwrap();
    harness
        .plugin
        .delete_port(&ctx, &network.port_network_id, &port)
        .await
        .unwrap();

    let report = harness
        .manager
        .deallocate_for_instance(&ctx, 3, "project2")
        .await
        .unwrap();
    assert_eq!(report.released, vec![(network.id, vif.id)]);
    assert_eq!(harness.pool.lease_count().await, 0);
}
