//! Shared key cache
//!
//! Key sets (e.g. every primary key of a referenced table) are expensive to
//! build, and several table workers may need the same one at once. The cache
//! builds each set once per identity, hands out shared read-only snapshots and
//! tracks which workers still use an entry. When the last worker releases an
//! entry it is freed after a grace period, unless someone claims it again
//! first.
//!
//! Identities name the owning table and the key fields, e.g.
//! `EMPLOYEE:emp (EmployeeID:id)`.

use arkmig_common::config::CacheConfig;
use arkmig_common::{Field, Result, Table};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

/// Set of key strings
pub type KeySet = HashSet<String>;

/// Identifies one table worker for claim tracking
pub type WorkerId = Uuid;

pub fn new_worker_id() -> WorkerId {
    Uuid::new_v4()
}

/// Name of a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheIdentity(String);

impl CacheIdentity {
    /// `TARGET:source (t1:s1, t2:s2)` for `fields` of `table`
    pub fn for_fields(table: &Table, fields: &[Arc<Field>]) -> Self {
        let members = fields
            .iter()
            .map(|f| format!("{}:{}", f.target_name(), f.source_name()))
            .collect::<Vec<_>>()
            .join(", ");
        Self(format!(
            "{}:{} ({})",
            table.target_name(),
            table.source_name(),
            members
        ))
    }

    /// Variant of this identity, e.g. restricted by a filter
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{} [{}]", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct KeyCacheConfig {
    /// Delay before an unclaimed entry is freed
    pub grace_period: Duration,
    /// Sleep between checks while another worker populates an entry
    pub poll_interval: Duration,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for KeyCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            grace_period: Duration::from_millis(config.grace_period_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

struct CacheEntry {
    active_workers: HashSet<WorkerId>,
    keys: Arc<KeySet>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheIdentity, CacheEntry>,
    populating: HashSet<CacheIdentity>,
}

/// Clears a population claim if the populating future is dropped early
struct PopulationGuard {
    state: Arc<Mutex<CacheState>>,
    identity: Option<CacheIdentity>,
}

impl PopulationGuard {
    fn disarm(&mut self) {
        self.identity = None;
    }
}

impl Drop for PopulationGuard {
    fn drop(&mut self) {
        let Some(identity) = self.identity.take() else {
            return;
        };
        let state = Arc::clone(&self.state);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    state.lock().await.populating.remove(&identity);
                });
            }
            Err(_) => warn!("Population of {} abandoned outside a runtime", identity),
        }
    }
}

/// Shared, claim-counted key sets
pub struct KeyCache {
    state: Arc<Mutex<CacheState>>,
    config: KeyCacheConfig,
    evictions: TaskTracker,
    shutdown: CancellationToken,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(KeyCacheConfig::default())
    }
}

impl KeyCache {
    pub fn new(config: KeyCacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            config,
            evictions: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Keys for `identity`, building them with `populate` if no entry exists
    ///
    /// Only one caller populates a given identity at a time; others wait and
    /// then share the result. On success `worker` holds a claim on the entry
    /// until [`KeyCache::release`]. A failed population leaves no entry and no
    /// claim behind, so a later caller may try again.
    pub async fn get_or_populate<F, Fut>(
        &self,
        identity: &CacheIdentity,
        worker: WorkerId,
        populate: F,
    ) -> Result<Arc<KeySet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<KeySet>>,
    {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(entry) = state.entries.get_mut(identity) {
                    entry.active_workers.insert(worker);
                    return Ok(Arc::clone(&entry.keys));
                }
                if state.populating.insert(identity.clone()) {
                    break;
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        let mut guard = PopulationGuard {
            state: Arc::clone(&self.state),
            identity: Some(identity.clone()),
        };
        debug!("Populating key cache entry {}", identity);
        let result = populate().await;

        let mut state = self.state.lock().await;
        state.populating.remove(identity);
        guard.disarm();

        let keys = Arc::new(result?);
        debug!("Cached {} keys for {}", keys.len(), identity);
        state.entries.insert(
            identity.clone(),
            CacheEntry {
                active_workers: HashSet::from([worker]),
                keys: Arc::clone(&keys),
            },
        );
        Ok(keys)
    }

    /// Add `keys` to the entry for `identity`, creating it if needed, and
    /// claim it for `worker`; returns the entry's new size
    pub async fn accumulate(
        &self,
        identity: &CacheIdentity,
        worker: WorkerId,
        keys: impl IntoIterator<Item = String>,
    ) -> usize {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .entry(identity.clone())
            .or_insert_with(|| CacheEntry {
                active_workers: HashSet::new(),
                keys: Arc::new(KeySet::new()),
            });
        entry.active_workers.insert(worker);
        Arc::make_mut(&mut entry.keys).extend(keys);
        entry.keys.len()
    }

    /// Current keys for `identity`, without claiming
    pub async fn snapshot(&self, identity: &CacheIdentity) -> Option<Arc<KeySet>> {
        let state = self.state.lock().await;
        state.entries.get(identity).map(|e| Arc::clone(&e.keys))
    }

    pub async fn contains(&self, identity: &CacheIdentity) -> bool {
        self.state.lock().await.entries.contains_key(identity)
    }

    /// Number of workers holding a claim on `identity`
    pub async fn active_workers(&self, identity: &CacheIdentity) -> usize {
        let state = self.state.lock().await;
        state
            .entries
            .get(identity)
            .map_or(0, |e| e.active_workers.len())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop `worker`'s claim on `identity`; the last release schedules the
    /// entry's eviction after the grace period
    pub async fn release(&self, identity: &CacheIdentity, worker: WorkerId) {
        let unclaimed = {
            let mut state = self.state.lock().await;
            match state.entries.get_mut(identity) {
                Some(entry) => {
                    entry.active_workers.remove(&worker);
                    entry.active_workers.is_empty()
                }
                None => false,
            }
        };
        if unclaimed {
            self.schedule_eviction(identity.clone());
        }
    }

    fn schedule_eviction(&self, identity: CacheIdentity) {
        let state = Arc::clone(&self.state);
        let grace_period = self.config.grace_period;
        let shutdown = self.shutdown.clone();

        self.evictions.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace_period) => {}
                _ = shutdown.cancelled() => {}
            }
            let mut state = state.lock().await;
            let unclaimed = state
                .entries
                .get(&identity)
                .is_some_and(|e| e.active_workers.is_empty());
            if unclaimed {
                state.entries.remove(&identity);
                debug!("Evicted key cache entry {}", identity);
            }
        });
    }

    /// Evict every unclaimed entry now and wait for pending evictions
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.evictions.close();
        self.evictions.wait().await;

        let mut state = self.state.lock().await;
        state.entries.retain(|_, e| !e.active_workers.is_empty());
        if !state.entries.is_empty() {
            warn!(
                "Key cache shut down with {} claimed entries",
                state.entries.len()
            );
        }
    }
}
