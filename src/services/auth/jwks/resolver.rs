use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::fetch::KeySetFetcher;
use super::types::{KeySnapshot, Lookup, ResolvedKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyResolveError {
    #[error("no key with this kid in the key set")]
    KeyNotFound,
    #[error("kid matches more than one key")]
    AmbiguousKey,
    #[error("key set unavailable")]
    KeySetUnavailable,
}

/// Caching knobs for the resolver.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// A snapshot older than this is refetched before use.
    pub ttl: Duration,
    /// A lookup miss does not refetch a snapshot younger than this.
    pub min_refresh_interval: Duration,
    /// Upper bound on one fetch.
    pub fetch_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            min_refresh_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of the last fetch, guarded by the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_failure: Option<Instant>,
}

/// Resolves verification keys by `kid` from a cached key set.
///
/// The current key set is an immutable `KeySnapshot` behind an `ArcSwapOption`: readers load it
/// without locking, refreshes build a complete new snapshot and publish it in one store. Only
/// refreshes serialize on `refresh`, so concurrent misses share a single fetch. A failed fetch is
/// shared the same way: tasks that queued behind it fail without fetching again, and no resolve
/// refetches within `min_refresh_interval` of a failure.
pub struct JwksResolver {
    fetcher: Arc<dyn KeySetFetcher>,
    snapshot: ArcSwapOption<KeySnapshot>,
    refresh: Mutex<RefreshState>,
    policy: CachePolicy,
}

impl std::fmt::Debug for JwksResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksResolver")
            .field("policy", &self.policy)
            .field("keys", &self.snapshot.load().as_ref().map(|s| s.len()))
            .finish_non_exhaustive()
    }
}

impl JwksResolver {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, policy: CachePolicy) -> Self {
        Self {
            fetcher,
            snapshot: ArcSwapOption::empty(),
            refresh: Mutex::new(RefreshState::default()),
            policy,
        }
    }

    /// The currently published snapshot, if any fetch has succeeded yet.
    pub fn snapshot(&self) -> Option<Arc<KeySnapshot>> {
        self.snapshot.load_full()
    }

    /// Resolve `kid` to exactly one key.
    ///
    /// A fresh snapshot answers directly. A stale or missing snapshot is refetched first. A miss
    /// on a fresh snapshot triggers at most one refetch (and none while the snapshot is younger
    /// than `min_refresh_interval`) before failing with `KeyNotFound`.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<ResolvedKey>, KeyResolveError> {
        let started = Instant::now();
        let current = self.snapshot.load_full();

        let observed = match current {
            Some(snap) if snap.age() < self.policy.ttl => {
                match snap.lookup(kid) {
                    Lookup::Found(key) => return Ok(Arc::clone(key)),
                    Lookup::Ambiguous => return Err(KeyResolveError::AmbiguousKey),
                    Lookup::Missing => {}
                }
                if snap.age() < self.policy.min_refresh_interval {
                    debug!(kid, "kid not in recently fetched key set");
                    return Err(KeyResolveError::KeyNotFound);
                }
                debug!(kid, "kid not in cached key set, refetching once");
                Some(snap)
            }
            other => other,
        };

        let snap = self.refresh_after(observed.as_ref(), started).await?;
        match snap.lookup(kid) {
            Lookup::Found(key) => Ok(Arc::clone(key)),
            Lookup::Ambiguous => Err(KeyResolveError::AmbiguousKey),
            Lookup::Missing => Err(KeyResolveError::KeyNotFound),
        }
    }

    /// Fetch and publish a new snapshot unconditionally. Returns the number of usable keys.
    pub async fn refresh(&self) -> Result<usize, KeyResolveError> {
        let mut state = self.refresh.lock().await;
        let snap = self.fetch_recorded(&mut state).await?;
        Ok(snap.len())
    }

    /// Refresh unless, while we waited for the lock, another task either published a fresh
    /// snapshot or failed to fetch one.
    async fn refresh_after(
        &self,
        observed: Option<&Arc<KeySnapshot>>,
        started: Instant,
    ) -> Result<Arc<KeySnapshot>, KeyResolveError> {
        let mut state = self.refresh.lock().await;

        if let Some(latest) = self.snapshot.load_full() {
            let replaced = observed.is_none_or(|o| !Arc::ptr_eq(o, &latest));
            if replaced && latest.age() < self.policy.ttl {
                return Ok(latest);
            }
        }

        if let Some(failed_at) = state.last_failure
            && (failed_at >= started || failed_at.elapsed() < self.policy.min_refresh_interval)
        {
            debug!("key set fetch failed recently, not refetching");
            return Err(KeyResolveError::KeySetUnavailable);
        }

        self.fetch_recorded(&mut state).await
    }

    async fn fetch_recorded(
        &self,
        state: &mut RefreshState,
    ) -> Result<Arc<KeySnapshot>, KeyResolveError> {
        let result = self.fetch_and_publish().await;
        state.last_failure = match result {
            Ok(_) => None,
            Err(_) => Some(Instant::now()),
        };
        result
    }

    async fn fetch_and_publish(&self) -> Result<Arc<KeySnapshot>, KeyResolveError> {
        let documents = match tokio::time::timeout(self.policy.fetch_timeout, self.fetcher.fetch())
            .await
        {
            Ok(Ok(documents)) => documents,
            Ok(Err(err)) => {
                error!(error = %err, "identity provider key set unavailable");
                return Err(KeyResolveError::KeySetUnavailable);
            }
            Err(_) => {
                error!(
                    timeout_ms = self.policy.fetch_timeout.as_millis() as u64,
                    "identity provider key set unavailable: fetch timed out"
                );
                return Err(KeyResolveError::KeySetUnavailable);
            }
        };

        let snap = KeySnapshot::from_documents(documents);
        if snap.is_empty() {
            error!("identity provider key set unavailable: no usable keys");
            return Err(KeyResolveError::KeySetUnavailable);
        }

        info!(keys = snap.len(), "published JWKS snapshot");
        let snap = Arc::new(snap);
        self.snapshot.store(Some(Arc::clone(&snap)));
        Ok(snap)
    }

    /// Refresh the key set every `every` until the resolver is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(resolver) = weak.upgrade() else {
                    break;
                };
                if let Err(err) = resolver.refresh().await {
                    warn!(error = %err, "background JWKS refresh failed");
                }
            }
        })
    }
}
