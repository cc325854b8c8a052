//! Proxy module
//!
//! This module owns everything about the proxies requests are routed through:
//! - `ProxyRecord`: one proxy with its usage counter and health flag
//! - `ProxyPool`: ordered pool with a single current proxy, rotation and
//!   liveness probing
//! - `ProxyRegistry`: external store the pool loads from and reports health to

mod pool;
mod record;

pub use pool::{ProxyPool, SelectedProxy};
pub use record::ProxyRecord;

use crate::storage::StorageResult;

/// External store of proxies
///
/// The pool reads the active proxies once at load time and pushes every
/// health change back. Its in-memory counters stay authoritative for the run.
pub trait ProxyRegistry: Send {
    /// Returns all proxies currently flagged active
    fn active_proxies(&self) -> StorageResult<Vec<ProxyRecord>>;

    /// Persists health, last use and usage counter of a known proxy
    ///
    /// Proxies the store does not know about are ignored.
    fn record_proxy_health(&mut self, proxy: &ProxyRecord) -> StorageResult<()>;
}
