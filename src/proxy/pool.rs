//! Proxy pool with rotation and health tracking
//!
//! The pool keeps exactly one proxy current while it is non-empty. Callers
//! never hold on to the current proxy: `get_working_proxy` hands out a
//! `SelectedProxy` snapshot which is handed back to `record_result` and
//! `mark_used`.

use crate::crawler::Transport;
use crate::proxy::{ProxyRecord, ProxyRegistry};
use crate::storage::StorageResult;
use chrono::Utc;

/// A proxy chosen for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedProxy {
    /// Position in the pool
    pub index: usize,
    /// Snapshot taken when the proxy was selected
    pub record: ProxyRecord,
}

/// Ordered pool of proxies with a single current selection
pub struct ProxyPool {
    proxies: Vec<ProxyRecord>,
    current: usize,
    max_requests_per_proxy: u32,
    registry: Option<Box<dyn ProxyRegistry>>,
}

impl ProxyPool {
    /// Creates an empty pool
    pub fn new(max_requests_per_proxy: u32) -> Self {
        Self {
            proxies: Vec::new(),
            current: 0,
            max_requests_per_proxy,
            registry: None,
        }
    }

    /// Creates a pool over the given proxies, the first one current
    pub fn from_proxies(proxies: Vec<ProxyRecord>, max_requests_per_proxy: u32) -> Self {
        Self {
            proxies,
            ..Self::new(max_requests_per_proxy)
        }
    }

    /// Attaches the registry health changes are pushed to
    pub fn with_registry(mut self, registry: Box<dyn ProxyRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Merges static proxies and the active proxies of `dynamic_source`
    ///
    /// Static entries come first. Entries sharing a host and port are kept
    /// as separate pool members. The first proxy becomes current.
    ///
    /// # Returns
    ///
    /// The resulting pool size
    pub fn load(
        &mut self,
        static_list: Vec<ProxyRecord>,
        dynamic_source: Option<&dyn ProxyRegistry>,
    ) -> StorageResult<usize> {
        let mut proxies = static_list;
        if let Some(source) = dynamic_source {
            let stored = source.active_proxies()?;
            tracing::debug!("Loaded {} active proxies from registry", stored.len());
            proxies.extend(stored);
        }

        self.proxies = proxies;
        self.current = 0;

        tracing::info!("Proxy pool loaded with {} proxies", self.proxies.len());
        Ok(self.proxies.len())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn proxies(&self) -> &[ProxyRecord] {
        &self.proxies
    }

    pub fn max_requests_per_proxy(&self) -> u32 {
        self.max_requests_per_proxy
    }

    /// Index of the current proxy, None when the pool is empty
    pub fn current_index(&self) -> Option<usize> {
        (!self.proxies.is_empty()).then_some(self.current)
    }

    /// Returns the current proxy without side effects
    pub fn current(&self) -> Option<&ProxyRecord> {
        self.proxies.get(self.current)
    }

    /// Advances to the next proxy (circularly) and resets its counter
    ///
    /// Returns None when the pool is empty.
    pub fn rotate(&mut self) -> Option<&ProxyRecord> {
        if self.proxies.is_empty() {
            return None;
        }

        let previous = self.current;
        self.current = (self.current + 1) % self.proxies.len();
        let next = &mut self.proxies[self.current];
        next.request_count = 0;

        tracing::debug!(
            "Rotated proxy {} -> {} ({})",
            previous,
            self.current,
            next.label()
        );

        Some(&self.proxies[self.current])
    }

    /// True once a proxy has served its share of requests
    pub fn should_rotate(&self, proxy: &ProxyRecord) -> bool {
        proxy.request_count >= self.max_requests_per_proxy
    }

    /// Records the health of a proxy and pushes it to the registry
    ///
    /// Registry failures are logged, the in-memory state is updated anyway.
    pub fn record_result(&mut self, proxy: &SelectedProxy, healthy: bool) {
        let Some(record) = self.proxies.get_mut(proxy.index) else {
            return;
        };

        record.is_active = healthy;
        record.last_used_at = Some(Utc::now());

        if let Some(registry) = self.registry.as_mut() {
            if let Err(e) = registry.record_proxy_health(record) {
                tracing::warn!("Failed to sync proxy {} health: {}", record.label(), e);
            }
        }
    }

    /// Counts a successful request and rotates once the proxy is used up
    pub fn mark_used(&mut self, proxy: &SelectedProxy) {
        let Some(record) = self.proxies.get_mut(proxy.index) else {
            return;
        };

        record.request_count += 1;
        record.last_used_at = Some(Utc::now());

        if proxy.index == self.current && self.should_rotate(&self.proxies[proxy.index]) {
            tracing::info!(
                "Proxy {} reached {} requests, rotating",
                self.proxies[proxy.index].label(),
                self.max_requests_per_proxy
            );
            self.rotate();
        }
    }

    /// Finds a proxy that answers the liveness probe
    ///
    /// Makes at most one pass over the pool starting at the current proxy.
    /// Proxies due for rotation are skipped without probing. Every skipped or
    /// failed proxy is recorded unhealthy and the pool rotates past it.
    ///
    /// # Returns
    ///
    /// * `Some(SelectedProxy)` - the first proxy whose probe succeeded
    /// * `None` - no proxy answered during a full pass
    pub async fn get_working_proxy<T>(&mut self, transport: &T) -> Option<SelectedProxy>
    where
        T: Transport + ?Sized,
    {
        for _ in 0..self.proxies.len() {
            let candidate = SelectedProxy {
                index: self.current,
                record: self.proxies[self.current].clone(),
            };

            if self.should_rotate(&candidate.record) {
                tracing::debug!(
                    "Skipping proxy {}: {} requests served",
                    candidate.record.label(),
                    candidate.record.request_count
                );
                self.record_result(&candidate, false);
                self.rotate();
                continue;
            }

            if transport.probe(&candidate.record).await {
                self.record_result(&candidate, true);
                return Some(SelectedProxy {
                    index: candidate.index,
                    record: self.proxies[candidate.index].clone(),
                });
            }

            tracing::warn!("Proxy {} failed liveness probe", candidate.record.label());
            self.record_result(&candidate, false);
            self.rotate();
        }

        tracing::error!("No working proxy after a full pass over {}", self.proxies.len());
        None
    }
}
