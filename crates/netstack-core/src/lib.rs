//! Netstack core
//!
//! Carves tenant networks out of address ranges, attaches instances to
//! them through an address pool and a port plugin, and tears the
//! attachments down again.

pub mod address_pool;
pub mod config;
pub mod context;
pub mod error;
pub mod mac;
pub mod manager;
pub mod partition;
pub mod port_plugin;
pub mod provision;
pub mod query;
pub mod reclaim;
pub mod repository;
pub mod storage;


pub use address_pool::{AddressPool, AddressScope};
pub use config::{
    AddressPoolBackend, AddressPoolConfig, ManagerConfig, NetstackConfig, PortPluginBackend,
    PortPluginConfig, RepositoryConfig,
};
pub use context::RequestContext;
pub use error::{
    BackendError, ConfigError, NetstackError, Operation, PartialFailure, RepositoryError,
    TeardownFailure, ValidationError,
};
pub use mac::{FixedMacGenerator, MacAddressGenerator, RandomMacGenerator, SequenceMacGenerator};
pub use manager::NetworkManager;
pub use partition::CreateNetworksRequest;
pub use port_plugin::{PortPlacement, PortPlugin};
pub use provision::InstanceRequest;
pub use reclaim::ReclaimReport;
pub use repository::{LocalRepository, Repository, RepositoryResult};

pub type Result<T> = std::result::Result<T, NetstackError>;
