//! Address pool backends

pub mod local;
pub mod melange;

pub use local::LocalAddressPool;
pub use melange::MelangeClient;
