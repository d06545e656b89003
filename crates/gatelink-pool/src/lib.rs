//! Connector pool.
//!
//! Aggregates one or more protocol sessions, one of them designated main.
//! Singular operations delegate to the main connector; `*_all` variants
//! broadcast and collect per-connector results; queued sends are routed to
//! the least-loaded connector.

pub mod pool;

pub use pool::ClientPool;
