//! Error types for network provisioning

use thiserror::Error;

use netstack_types::{InstanceId, NetworkId, VifId};

/// Remote or repository step that failed, used to scope retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreatePortNetwork,
    PersistNetwork,
    RegisterBlock,
    ListNetworks,
    LoadNetwork,
    ListInterfaces,
    CreateVif,
    CreatePort,
    PlugInterface,
    AllocateAddresses,
    LookupPort,
    UnplugInterface,
    DeletePort,
    ListAddresses,
    DeallocateAddresses,
    DeleteVif,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::CreatePortNetwork => "create port network",
            Operation::PersistNetwork => "persist network",
            Operation::RegisterBlock => "register address block",
            Operation::ListNetworks => "list networks",
            Operation::LoadNetwork => "load network",
            Operation::ListInterfaces => "list virtual interfaces",
            Operation::CreateVif => "create virtual interface",
            Operation::CreatePort => "create port",
            Operation::PlugInterface => "plug interface",
            Operation::AllocateAddresses => "allocate addresses",
            Operation::LookupPort => "look up port by attachment",
            Operation::UnplugInterface => "unplug interface",
            Operation::DeletePort => "delete port",
            Operation::ListAddresses => "list addresses",
            Operation::DeallocateAddresses => "deallocate addresses",
            Operation::DeleteVif => "delete virtual interface",
        };
        f.write_str(name)
    }
}

/// Main error type for provisioning operations
#[derive(Debug, Error)]
pub enum NetstackError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Allocation failed on network {network_id} during {operation}: {source}")]
    Allocation {
        network_id: NetworkId,
        operation: Operation,
        #[source]
        source: BackendError,
    },

    #[error("Network creation failed for {cidr} during {operation}: {source}")]
    Registration {
        cidr: String,
        operation: Operation,
        #[source]
        source: BackendError,
    },

    #[error("{operation} failed: {source}")]
    Backend {
        operation: Operation,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    PartialFailure(#[from] PartialFailure),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl NetstackError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        NetstackError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn backend(operation: Operation) -> impl Fn(BackendError) -> Self {
        move |source| NetstackError::Backend { operation, source }
    }

    /// Whether re-invoking the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetstackError::Allocation { .. }
                | NetstackError::Backend { .. }
                | NetstackError::Registration { .. }
                | NetstackError::PartialFailure(_)
        )
    }
}

/// Rejected partition parameters
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid CIDR '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("Network count must be at least 1")]
    NoNetworks,

    #[error("Network size {size} must be a power of two and at least 4")]
    InvalidNetworkSize { size: u64 },

    #[error("{cidr} cannot hold {count} networks of {size} addresses")]
    InsufficientSpace { cidr: String, count: u64, size: u64 },

    #[error("{cidr} cannot produce {count} /64 subnets")]
    InsufficientSpaceV6 { cidr: String, count: u64 },

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failures reported by the address pool or port plugin
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{service} rejected request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },

    #[error("{service}: {resource} not found")]
    NotFound {
        service: &'static str,
        resource: String,
    },

    #[error("{operation} timed out")]
    Timeout { operation: Operation },

    #[error("Network error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Repository error: {source}")]
    Repository {
        #[from]
        source: RepositoryError,
    },
}

impl BackendError {
    pub fn rejected(service: &'static str, message: impl Into<String>) -> Self {
        BackendError::Rejected {
            service,
            message: message.into(),
        }
    }

    pub fn not_found(service: &'static str, resource: impl Into<String>) -> Self {
        BackendError::NotFound {
            service,
            resource: resource.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration for {section}: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}

/// One VIF whose teardown did not complete
#[derive(Debug)]
pub struct TeardownFailure {
    pub network_id: NetworkId,
    pub vif_id: VifId,
    pub operation: Operation,
    pub error: BackendError,
}

impl std::fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "network {} (vif {}): {} failed: {}",
            self.network_id, self.vif_id, self.operation, self.error
        )
    }
}

/// Reclamation finished with some networks still holding state
#[derive(Debug)]
pub struct PartialFailure {
    pub instance_id: InstanceId,
    pub failures: Vec<TeardownFailure>,
}

impl PartialFailure {
    pub fn network_ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.failures.iter().map(|f| f.network_id).collect();
        ids.dedup();
        ids
    }
}

impl std::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Teardown incomplete for instance {} on networks {:?}",
            self.instance_id,
            self.network_ids()
        )
    }
}

impl std::error::Error for PartialFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_lists_networks() {
        let failure = PartialFailure {
            instance_id: 7,
            failures: vec![
                TeardownFailure {
                    network_id: 2,
                    vif_id: 10,
                    operation: Operation::DeletePort,
                    error: BackendError::rejected("port-plugin", "port in use"),
                },
                TeardownFailure {
                    network_id: 5,
                    vif_id: 11,
                    operation: Operation::DeallocateAddresses,
                    error: BackendError::Timeout {
                        operation: Operation::DeallocateAddresses,
                    },
                },
            ],
        };

        assert_eq!(failure.network_ids(), vec![2, 5]);
        let message = failure.to_string();
        assert!(message.contains("instance 7"));
        assert!(message.contains("[2, 5]"));
        assert!(NetstackError::from(failure).is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = NetstackError::from(ValidationError::NoNetworks);
        assert!(!err.is_retryable());
    }
}
