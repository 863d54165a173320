//! Netstack CLI (netstackctl)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netstack_core::{InstanceRequest, NetstackConfig, NetworkManager};
use netstack_drivers::BackendFactory;
use netstack_types::InstanceId;
use netstack_cli::commands::{ConfigCommand, CreateNetworksArgs, InstanceCommand, NetworksCommand};
use netstack_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "netstackctl")]
#[command(about = "Tenant network and instance attachment management")]
#[command(long_about = "
Tenant network and instance attachment management

Partitions address ranges into tenant networks, registers them with the
address pool and port plugin backends, and attaches compute instances to
every network their project can see.

Examples:
  netstackctl create-networks -l public --cidr 77.1.1.0/24
  netstackctl create-networks -l private --cidr 10.1.0.0/20 -n 2 -p project1 --cidr-v6 fe::/60
  netstackctl list-networks -p project1
  netstackctl allocate 1 -p project1 --host compute-1
  netstackctl get-ips 1 -f json
  netstackctl deallocate 1 -p project1
  netstackctl -c ./netstack.toml show-config
")]
struct Cli {
    /// Configuration file (defaults to /etc/netstack/netstack.toml or ./netstack.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'V', long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition an address range into networks
    CreateNetworks(CreateNetworksArgs),

    /// Attach an instance to the networks of its project
    Allocate {
        instance_id: InstanceId,

        /// Project the instance belongs to
        #[arg(short, long)]
        project: String,

        /// Compute host running the instance
        #[arg(long, default_value = "localhost")]
        host: String,

        #[arg(long, default_value_t = 1)]
        instance_type_id: u32,

        /// VPN endpoint of the project
        #[arg(long)]
        vpn: Option<String>,
    },

    /// Release every network attachment of an instance
    Deallocate {
        instance_id: InstanceId,

        #[arg(short, long)]
        project: String,
    },

    /// Show the addresses leased to an instance
    GetIps { instance_id: InstanceId },

    /// List networks visible to a project
    ListNetworks {
        #[arg(short, long)]
        project: String,
    },

    /// Show the effective configuration
    ShowConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<NetstackConfig> {
    match path {
        Some(path) => NetstackConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => NetstackConfig::load_with_defaults().with_context(|| "Failed to load configuration"),
    }
}

async fn build_manager(config: &NetstackConfig) -> Result<Arc<NetworkManager>> {
    let manager = BackendFactory::create_manager(config)
        .await
        .with_context(|| "Failed to initialize backends")?;
    Ok(Arc::new(manager))
}

async fn run(cli: &Cli) -> Result<String> {
    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Commands::CreateNetworks(args) => {
            NetworksCommand::new(build_manager(&config).await?)
                .create(args.clone(), cli.format)
                .await
        }

        Commands::Allocate {
            instance_id,
            project,
            host,
            instance_type_id,
            vpn,
        } => {
            let mut request = InstanceRequest::new(*instance_id, project.clone(), host.clone());
            request.instance_type_id = *instance_type_id;
            request.vpn = vpn.clone();
            InstanceCommand::new(build_manager(&config).await?)
                .allocate(request, cli.format)
                .await
        }

        Commands::Deallocate {
            instance_id,
            project,
        } => {
            InstanceCommand::new(build_manager(&config).await?)
                .deallocate(*instance_id, project, cli.format)
                .await
        }

        Commands::GetIps { instance_id } => {
            InstanceCommand::new(build_manager(&config).await?)
                .get_ips(*instance_id, cli.format)
                .await
        }

        Commands::ListNetworks { project } => {
            NetworksCommand::new(build_manager(&config).await?)
                .list(project, cli.format)
                .await
        }

        Commands::ShowConfig => ConfigCommand::new(config).show(cli.format),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // Handle errors with appropriate exit codes
    match run(&cli).await {
        Ok(output) => {
            if !cli.quiet || cli.format == OutputFormat::Json {
                print!("{}", output);
                if cli.format == OutputFormat::Json {
                    println!();
                }
            }
            log::info!("Command completed successfully");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);

            // Print error chain if in verbose mode
            if cli.verbose || cli.debug {
                for cause in e.chain().skip(1) {
                    eprintln!("  Caused by: {}", cause);
                }
            }
            std::process::exit(1);
        }
    }
}
