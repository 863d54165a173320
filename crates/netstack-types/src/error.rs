use thiserror::Error;

/// Rejected textual or numeric form of a model value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),
    #[error("unknown IP version {0}")]
    UnknownIpVersion(u8),
}
