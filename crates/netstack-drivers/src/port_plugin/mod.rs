//! Port plugin backends

pub mod local;
pub mod quantum;

pub use local::LocalPortPlugin;
pub use quantum::QuantumClient;
