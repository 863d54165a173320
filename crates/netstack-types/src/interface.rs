use std::str::FromStr;

use chrono::{DateTime, Utc};
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::{InstanceId, NetworkId, ProjectId, VifId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub MacAddress);

impl MacAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        MacAddr(MacAddress::new(bytes))
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0.bytes()
    }

    /// U/L bit of the first octet
    pub fn is_locally_administered(&self) -> bool {
        self.bytes()[0] & 0x02 != 0
    }

    /// I/G bit of the first octet
    pub fn is_unicast(&self) -> bool {
        self.bytes()[0] & 0x01 == 0
    }
}

struct MacAddrVisitor;

impl<'de> serde::de::Visitor<'de> for MacAddrVisitor {
    type Value = MacAddr;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a MAC address string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse::<MacAddr>().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(MacAddrVisitor)
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl FromStr for MacAddr {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<MacAddress>()
            .map(MacAddr)
            .map_err(|_| TypeError::InvalidMac(s.to_string()))
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Attributes of a virtual interface before the repository assigns an id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewVirtualInterface {
    pub instance_id: InstanceId,
    pub network_id: NetworkId,
    pub project_id: ProjectId,
    pub mac_address: MacAddr,
}

/// Attachment of one instance to one network.
///
/// The VIF record outlives the port and the address leases it owns: the
/// reclaimer deletes it last, so a surviving record always means there is
/// still backend state to clean up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualInterface {
    pub id: VifId,
    pub instance_id: InstanceId,
    pub network_id: NetworkId,
    pub project_id: ProjectId,
    pub mac_address: MacAddr,
    pub created_at: DateTime<Utc>,
}

impl VirtualInterface {
    pub fn from_new(id: VifId, new: NewVirtualInterface) -> Self {
        Self {
            id,
            instance_id: new.instance_id,
            network_id: new.network_id,
            project_id: new.project_id,
            mac_address: new.mac_address,
            created_at: Utc::now(),
        }
    }

    /// Key under which the port plugin and the address pool know this VIF
    pub fn attachment_id(&self) -> String {
        self.id.to_string()
    }
}
