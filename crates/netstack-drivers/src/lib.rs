//! Netstack drivers
//!
//! Address pool and port plugin backends: in-process reference
//! implementations and HTTP clients for Melange and Quantum.

pub mod address_pool;
pub mod factory;
pub mod port_plugin;

#[cfg(test)]
mod tests;

pub use address_pool::{LocalAddressPool, MelangeClient};
pub use factory::BackendFactory;
pub use port_plugin::{LocalPortPlugin, QuantumClient};
