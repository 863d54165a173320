pub mod error;
pub mod info;
pub mod interface;
pub mod ipam;
pub mod network;

pub use error::TypeError;
pub use info::{IpInfo, Netmask, NetworkInfo};
pub use interface::{MacAddr, NewVirtualInterface, VirtualInterface};
pub use ipam::{Address, AddressBlock, IpVersion};
pub use network::{NewNetwork, Network};

/// Repository-assigned network identifier
pub type NetworkId = u64;
/// Repository-assigned virtual interface identifier
pub type VifId = u64;
/// Compute instance identifier
pub type InstanceId = u64;
/// Tenant identifier
pub type ProjectId = String;
