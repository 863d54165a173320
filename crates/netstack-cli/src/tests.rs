//! Unit tests for CLI commands

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clap::Parser;
    use netstack_core::{InstanceRequest, NetstackConfig, NetworkManager};
    use netstack_drivers::BackendFactory;

    use crate::commands::{ConfigCommand, CreateNetworksArgs, InstanceCommand, NetworksCommand};
    use crate::output::OutputFormat;

    #[derive(Parser)]
    struct ArgsHarness {
        #[command(flatten)]
        args: CreateNetworksArgs,
    }

    fn parse_args(argv: &[&str]) -> CreateNetworksArgs {
        let mut full = vec!["create-networks"];
        full.extend_from_slice(argv);
        ArgsHarness::parse_from(full).args
    }

    async fn manager() -> Arc<NetworkManager> {
        Arc::new(
            BackendFactory::create_manager(&NetstackConfig::default())
                .await
                .unwrap(),
        )
    }

    #[test]
    fn test_create_args_into_request() {
        let args = parse_args(&[
            "-l", "private", "--cidr", "10.1.0.0/20", "-n", "2", "-p", "project1", "--cidr-v6",
            "fe::/60", "--vlan-start", "100", "--dns1", "8.8.8.8",
        ]);
        let request = args.into_request().unwrap();

        assert_eq!(request.label, "private");
        assert_eq!(request.num_networks, 2);
        assert_eq!(request.network_size, 256);
        assert_eq!(request.priority, 1);
        assert_eq!(request.project_id.as_deref(), Some("project1"));
        assert_eq!(request.cidr_v6, Some("fe::/60".parse().unwrap()));
        assert_eq!(request.vlan_start, Some(100));
        assert_eq!(request.dns1, Some("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_create_args_reject_bad_cidr() {
        let args = parse_args(&["-l", "private", "--cidr", "10.1.0.0/33"]);
        assert!(args.into_request().is_err());

        let args = parse_args(&["-l", "private", "--cidr", "10.1.0.0/24", "--cidr-v6", "nope"]);
        assert!(args.into_request().is_err());
    }

    #[tokio::test]
    async fn test_create_and_list_networks() {
        let command = NetworksCommand::new(manager().await);

        let created = command
            .create(
                parse_args(&["-l", "public", "--cidr", "77.1.1.0/24"]),
                OutputFormat::Text,
            )
            .await
            .unwrap();
        assert!(created.contains("77.1.1.0/24"));
        assert!(created.contains("(shared)"));

        command
            .create(
                parse_args(&["-l", "private", "--cidr", "10.1.0.0/24", "-p", "project1", "--priority", "0"]),
                OutputFormat::Text,
            )
            .await
            .unwrap();

        let listed = command.list("project1", OutputFormat::Json).await.unwrap();
        let networks: serde_json::Value = serde_json::from_str(&listed).unwrap();
        let labels: Vec<&str> = networks
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["label"].as_str().unwrap())
            .collect();
        assert_eq!(labels, vec!["private", "public"]);

        let other = command.list("project2", OutputFormat::Json).await.unwrap();
        let networks: serde_json::Value = serde_json::from_str(&other).unwrap();
        assert_eq!(networks.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_networks_validation_error() {
        let command = NetworksCommand::new(manager().await);
        let result = command
            .create(
                parse_args(&["-l", "private", "--cidr", "10.1.0.0/24", "-s", "100"]),
                OutputFormat::Text,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_instance_lifecycle() {
        let manager = manager().await;
        NetworksCommand::new(manager.clone())
            .create(
                parse_args(&["-l", "private", "--cidr", "10.1.1.0/24", "-p", "project1"]),
                OutputFormat::Text,
            )
            .await
            .unwrap();

        let command = InstanceCommand::new(manager);
        let allocated = command
            .allocate(InstanceRequest::new(1, "project1", "compute-1"), OutputFormat::Text)
            .await
            .unwrap();
        assert!(allocated.contains("10.1.1.2"));
        assert!(allocated.contains("gateway  10.1.1.1"));

        let ips = command.get_ips(1, OutputFormat::Json).await.unwrap();
        let leases: serde_json::Value = serde_json::from_str(&ips).unwrap();
        assert_eq!(leases[0]["addresses"], serde_json::json!(["10.1.1.2"]));

        let released = command.deallocate(1, "project1", OutputFormat::Text).await.unwrap();
        assert!(released.contains("Released 1 attachment(s) of instance 1"));

        let again = command.deallocate(1, "project1", OutputFormat::Text).await.unwrap();
        assert!(again.contains("has no network attachments"));

        let ips = command.get_ips(1, OutputFormat::Json).await.unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&ips).unwrap(), serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_allocate_without_networks_fails() {
        let command = InstanceCommand::new(manager().await);
        let result = command
            .allocate(InstanceRequest::new(5, "project9", "compute-1"), OutputFormat::Text)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_state_persists_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NetstackConfig::default();
        config.repository.storage_path = Some(dir.path().join("repository.json"));
        config.address_pool.storage_path = Some(dir.path().join("address-pool.json"));
        config.port_plugin.storage_path = Some(dir.path().join("ports.json"));

        {
            let manager = Arc::new(BackendFactory::create_manager(&config).await.unwrap());
            NetworksCommand::new(manager.clone())
                .create(
                    parse_args(&["-l", "public", "--cidr", "77.1.1.0/24"]),
                    OutputFormat::Text,
                )
                .await
                .unwrap();
            InstanceCommand::new(manager)
                .allocate(InstanceRequest::new(1, "project1", "compute-1"), OutputFormat::Text)
                .await
                .unwrap();
        }

        let manager = Arc::new(BackendFactory::create_manager(&config).await.unwrap());
        let ips = InstanceCommand::new(manager.clone())
            .get_ips(1, OutputFormat::Text)
            .await
            .unwrap();
        assert!(ips.contains("77.1.1.2"));

        let released = InstanceCommand::new(manager)
            .deallocate(1, "project1", OutputFormat::Json)
            .await
            .unwrap();
        let report: serde_json::Value = serde_json::from_str(&released).unwrap();
        assert_eq!(report["released"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_show_config_masks_tokens() {
        let mut config = NetstackConfig::default();
        config.address_pool.token = Some("secret".to_string());

        let command = ConfigCommand::new(config);
        let json = command.show(OutputFormat::Json).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("********"));

        let text = command.show(OutputFormat::Text).unwrap();
        assert!(text.contains("[port_plugin]"));
        assert!(!text.contains("secret"));
    }
}
