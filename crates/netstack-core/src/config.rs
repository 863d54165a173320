//! Configuration for the provisioning manager and its backends
//!
//! Values come from an optional TOML/JSON file and `NETSTACK_*` environment
//! variables, e.g. `NETSTACK_MANAGER__USE_IPV6=false` or
//! `NETSTACK_ADDRESS_POOL__URL=http://melange:9898`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["/etc/netstack/netstack.toml", "./netstack.toml"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Honor v6 CIDRs when creating networks
    pub use_ipv6: bool,
    /// Upper bound for a single backend call
    pub call_timeout_secs: Option<u64>,
}

impl ManagerConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            use_ipv6: true,
            call_timeout_secs: Some(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressPoolBackend {
    #[default]
    Local,
    Melange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AddressPoolConfig {
    pub backend: AddressPoolBackend,
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// State file of the local backend
    pub storage_path: Option<PathBuf>,
}

impl Default for AddressPoolConfig {
    fn default() -> Self {
        Self {
            backend: AddressPoolBackend::Local,
            url: None,
            token: None,
            timeout_secs: 30,
            storage_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortPluginBackend {
    #[default]
    Local,
    Quantum,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortPluginConfig {
    pub backend: PortPluginBackend,
    pub url: Option<String>,
    /// Tenant that owns logical networks of shared networks
    pub default_tenant: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub storage_path: Option<PathBuf>,
}

impl Default for PortPluginConfig {
    fn default() -> Self {
        Self {
            backend: PortPluginBackend::Local,
            url: None,
            default_tenant: "default".to_string(),
            token: None,
            timeout_secs: 30,
            storage_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    pub storage_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetstackConfig {
    pub manager: ManagerConfig,
    pub address_pool: AddressPoolConfig,
    pub port_plugin: PortPluginConfig,
    pub repository: RepositoryConfig,
}

impl NetstackConfig {
    /// Load configuration from file, with environment overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()))
    }

    /// Load from the first existing default location, or defaults plus
    /// environment overrides when none exists
    pub fn load_with_defaults() -> Result<Self, ConfigError> {
        let path = DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists());

        match path {
            Some(path) => log::info!("Loading configuration from {}", path.display()),
            None => log::debug!("No configuration file found, using defaults"),
        }

        Self::load(path)
    }

    fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("NETSTACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: NetstackConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address_pool.backend == AddressPoolBackend::Melange
            && self.address_pool.url.is_none()
        {
            return Err(ConfigError::Invalid {
                section: "address_pool",
                reason: "melange backend requires url".to_string(),
            });
        }

        if self.port_plugin.backend == PortPluginBackend::Quantum && self.port_plugin.url.is_none()
        {
            return Err(ConfigError::Invalid {
                section: "port_plugin",
                reason: "quantum backend requires url".to_string(),
            });
        }

        if self.port_plugin.default_tenant.is_empty() {
            return Err(ConfigError::Invalid {
                section: "port_plugin",
                reason: "default_tenant cannot be empty".to_string(),
            });
        }

        if self.manager.call_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                section: "manager",
                reason: "call_timeout_secs must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_local_backends() {
        let config = NetstackConfig::default();
        assert!(config.manager.use_ipv6);
        assert_eq!(config.manager.call_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.address_pool.backend, AddressPoolBackend::Local);
        assert_eq!(config.port_plugin.backend, PortPluginBackend::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn remote_backends_require_urls() {
        let mut config = NetstackConfig::default();
        config.address_pool.backend = AddressPoolBackend::Melange;
        assert!(config.validate().is_err());

        config.address_pool.url = Some("http://melange:9898".to_string());
        assert!(config.validate().is_ok());

        config.port_plugin.backend = PortPluginBackend::Quantum;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netstack.toml");
        std::fs::write(
            &path,
            r#"
[manager]
use_ipv6 = false

[address_pool]
backend = "melange"
url = "http://melange:9898"

[repository]
storage_path = "/var/lib/netstack/repository.json"
"#,
        )
        .unwrap();

        let config = NetstackConfig::load_from_file(&path).unwrap();
        assert!(!config.manager.use_ipv6);
        assert_eq!(config.manager.call_timeout_secs, Some(30));
        assert_eq!(config.address_pool.backend, AddressPoolBackend::Melange);
        assert_eq!(config.port_plugin.backend, PortPluginBackend::Local);
        assert_eq!(
            config.repository.storage_path,
            Some(PathBuf::from("/var/lib/netstack/repository.json"))
        );
    }

    #[test]
    fn invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netstack.toml");
        std::fs::write(&path, "[port_plugin]\nbackend = \"quantum\"\n").unwrap();

        assert!(matches!(
            NetstackConfig::load_from_file(&path),
            Err(ConfigError::Invalid { section: "port_plugin", .. })
        ));
    }
}
