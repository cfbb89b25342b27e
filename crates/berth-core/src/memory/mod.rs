//! In-process collaborators: a cluster substrate, a DNS zone and a route table.
//!
//! Used by tests and by the agent when no real substrate is configured.
mod cluster;
pub use cluster::{Call, MemoryCluster, MemoryOptions};

mod process;

mod dns;
pub use dns::MemoryDns;

mod routes;
pub use routes::MemoryRoutes;
