//! CLI commands

pub mod config;
pub mod instance;
pub mod networks;

pub use config::ConfigCommand;
pub use instance::InstanceCommand;
pub use networks::{CreateNetworksArgs, NetworksCommand};
