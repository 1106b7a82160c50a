//! Calculation cache with TTL expiry and single-flight computation.
//!
//! Each key moves through `absent -> computing -> present -> (expired |
//! invalidated) -> absent`. While a key is computing, every caller for it
//! awaits the same shared future, so the compute function runs at most once
//! per key at a time. Failures are handed to all waiters and never stored.
//!
//! The map is sharded (`DashMap`): lookups, cleanup and invalidation lock one
//! shard at a time, never the whole map.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use travelcost_core::clock::{Clock, SystemClock};
use travelcost_core::error::{CacheComputationError, CalculationError};
use travelcost_core::fingerprint::CacheKey;
use travelcost_core::models::{CalculationResult, EmployeeId, SubprojectId};

type Computation = Shared<BoxFuture<'static, Result<CalculationResult, CacheComputationError>>>;

/// A stored result. Read-only once created.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub result: CalculationResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// An entry is live strictly before its expiry instant
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

enum Slot {
    Ready(CacheEntry),
    InFlight { flight: u64, computation: Computation },
}

impl Slot {
    fn is_flight(&self, id: u64) -> bool {
        matches!(self, Slot::InFlight { flight, .. } if *flight == id)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Ready(entry) => f.debug_tuple("Ready").field(entry).finish(),
            Slot::InFlight { flight, .. } => {
                f.debug_struct("InFlight").field("flight", flight).finish_non_exhaustive()
            }
        }
    }
}

/// How a lookup was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A live entry existed
    Hit,
    /// This caller started the computation
    Miss,
    /// This caller joined a computation already in flight
    Coalesced,
}

impl CacheOutcome {
    /// Only a pre-existing entry counts as a hit; coalesced waiters do not.
    pub fn is_hit(self) -> bool {
        matches!(self, CacheOutcome::Hit)
    }
}

/// Result of `get_or_compute`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub result: CalculationResult,
    pub outcome: CacheOutcome,
}

/// Which entries an explicit invalidation removes. `None` fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationFilter {
    pub employee_id: Option<EmployeeId>,
    pub subproject_id: Option<SubprojectId>,
}

impl InvalidationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn employee(employee_id: EmployeeId) -> Self {
        Self {
            employee_id: Some(employee_id),
            subproject_id: None,
        }
    }

    pub fn subproject(subproject_id: SubprojectId) -> Self {
        Self {
            employee_id: None,
            subproject_id: Some(subproject_id),
        }
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        self.employee_id.map_or(true, |id| key.employee_id() == id)
            && self.subproject_id.map_or(true, |id| key.subproject_id() == id)
    }
}

struct CacheInner {
    slots: DashMap<CacheKey, Slot>,
    clock: Arc<dyn Clock>,
    next_flight: AtomicU64,
}

impl CacheInner {
    /// Store a finished computation, unless its slot was invalidated meanwhile
    fn settle(
        &self,
        key: &CacheKey,
        flight: u64,
        ttl: Duration,
        outcome: &Result<CalculationResult, CalculationError>,
    ) {
        match outcome {
            Ok(result) => {
                let expires_at = expiry(self.clock.now(), ttl);
                match self.slots.get_mut(key) {
                    Some(mut slot) if slot.is_flight(flight) => {
                        *slot = Slot::Ready(CacheEntry {
                            key: key.clone(),
                            result: result.clone(),
                            expires_at,
                        });
                        tracing::debug!(key = %key, expires_at = %expires_at, "Cached calculation");
                    }
                    _ => tracing::debug!(
                        key = %key,
                        "Computation was invalidated; result not stored"
                    ),
                }
            }
            Err(err) => {
                // No negative caching: free the slot so the next call retries.
                self.slots.remove_if(key, |_, slot| slot.is_flight(flight));
                tracing::debug!(key = %key, error = %err, "Computation failed; nothing cached");
            }
        }
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Memoizes calculation results per fingerprint
#[derive(Clone)]
pub struct CalculationCache {
    inner: Arc<CacheInner>,
}

impl CalculationCache {
    /// Create a cache on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: DashMap::new(),
                clock,
                next_flight: AtomicU64::new(0),
            }),
        }
    }

    /// Return the live entry for `key`, or compute it exactly once.
    ///
    /// Concurrent callers for the same key share one run of `compute`. The
    /// run is not tied to any single caller: dropping a waiting caller (for
    /// example on timeout) leaves it running for the others.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<CacheLookup, CacheComputationError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CalculationResult, CalculationError>> + Send + 'static,
    {
        let (computation, outcome) = match self.inner.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let now = self.inner.clock.now();
                let joined = match occupied.get() {
                    Slot::Ready(entry) if entry.is_live(now) => {
                        tracing::debug!(key = %key, "Cache hit");
                        return Ok(CacheLookup {
                            result: entry.result.clone(),
                            outcome: CacheOutcome::Hit,
                        });
                    }
                    Slot::Ready(_) => None,
                    Slot::InFlight { computation, .. } => Some(computation.clone()),
                };

                match joined {
                    Some(computation) => (computation, CacheOutcome::Coalesced),
                    None => {
                        tracing::debug!(key = %key, "Cache entry expired; recomputing");
                        let (flight, computation) = self.start_flight(key, ttl, compute);
                        occupied.insert(Slot::InFlight {
                            flight,
                            computation: computation.clone(),
                        });
                        (computation, CacheOutcome::Miss)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(key = %key, "Cache miss");
                let (flight, computation) = self.start_flight(key, ttl, compute);
                vacant.insert(Slot::InFlight {
                    flight,
                    computation: computation.clone(),
                });
                (computation, CacheOutcome::Miss)
            }
        };

        if outcome == CacheOutcome::Miss {
            // Drive the computation independently of this caller.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(computation.clone().map(|_| ()));
            }
        } else {
            tracing::debug!(key = %key, "Joined in-flight computation");
        }

        let result = computation.await?;
        Ok(CacheLookup { result, outcome })
    }

    /// Build the shared future for a new flight. Runs nothing yet.
    fn start_flight<F, Fut>(&self, key: &CacheKey, ttl: Duration, compute: F) -> (u64, Computation)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<CalculationResult, CalculationError>> + Send + 'static,
    {
        let flight = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let key = key.clone();

        let computation = async move {
            let outcome = compute().await;
            inner.settle(&key, flight, ttl, &outcome);
            outcome.map_err(|source| CacheComputationError::new(key, source))
        }
        .boxed()
        .shared();

        (flight, computation)
    }

    /// Remove every entry matching `filter`; returns the number removed.
    ///
    /// Matching in-flight computations are detached: their current waiters
    /// still get the result, but it is not stored.
    pub fn invalidate(&self, filter: &InvalidationFilter) -> usize {
        let mut removed = 0;
        let mut detached = 0;

        self.inner.slots.retain(|key, slot| {
            if !filter.matches(key) {
                return true;
            }
            match slot {
                Slot::Ready(_) => removed += 1,
                Slot::InFlight { .. } => detached += 1,
            }
            false
        });

        tracing::info!(
            employee_id = ?filter.employee_id,
            subproject_id = ?filter.subproject_id,
            removed,
            detached,
            "Invalidated cache entries"
        );
        removed
    }

    /// Remove every entry with `expires_at <= now`; returns the number removed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let mut removed = 0;

        self.inner.slots.retain(|_, slot| match slot {
            Slot::Ready(entry) if !entry.is_live(now) => {
                removed += 1;
                false
            }
            _ => true,
        });

        tracing::debug!(removed, "Removed expired cache entries");
        removed
    }

    /// The live entry for `key`, if any
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.inner.clock.now();
        self.inner.slots.get(key).and_then(|slot| match &*slot {
            Slot::Ready(entry) if entry.is_live(now) => Some(entry.clone()),
            _ => None,
        })
    }

    /// Number of stored entries, live or expired-but-not-swept
    pub fn entry_count(&self) -> usize {
        self.inner.slots.iter().filter(|slot| matches!(slot.value(), Slot::Ready(_))).count()
    }

    /// Number of computations currently running
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::InFlight { .. }))
            .count()
    }
}

impl Default for CalculationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CalculationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculationCache")
            .field("entries", &self.entry_count())
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicUsize;
    use travelcost_core::clock::ManualClock;
    use travelcost_core::fingerprint::fingerprint;
    use travelcost_core::models::Currency;

    const TTL: Duration = Duration::from_secs(60);

    fn result(amount: i64) -> CalculationResult {
        CalculationResult {
            distance_km: Decimal::new(amount * 100, 2),
            allowance_amount: Decimal::new(amount * 70, 2),
            currency: Currency::CHF,
            computed_at: Utc::now(),
        }
    }

    fn key_for(employee_id: EmployeeId, subproject_id: SubprojectId) -> CacheKey {
        fingerprint(employee_id, subproject_id, 1, 1)
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        value: CalculationResult,
    ) -> impl FnOnce() -> futures::future::Ready<Result<CalculationResult, CalculationError>>
           + Send
           + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(value))
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = CalculationCache::new();
        let key = key_for(EmployeeId::new(), SubprojectId::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_compute(&key, TTL, counted(&calls, result(1))).await.unwrap();
        assert_eq!(first.outcome, CacheOutcome::Miss);

        let second = cache.get_or_compute(&key, TTL, counted(&calls, result(2))).await.unwrap();
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(second.result, first.result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let clock = Arc::new(ManualClock::default());
        let cache = CalculationCache::with_clock(clock.clone());
        let key = key_for(EmployeeId::new(), SubprojectId::new());
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_compute(&key, TTL, counted(&calls, result(1))).await.unwrap();

        // Exactly at expires_at the entry is already dead
        clock.advance(TimeDelta::seconds(60));
        assert!(cache.peek(&key).is_none());

        let lookup = cache.get_or_compute(&key, TTL, counted(&calls, result(2))).await.unwrap();
        assert_eq!(lookup.outcome, CacheOutcome::Miss);
        assert_eq!(lookup.result.allowance_amount, result(2).allowance_amount);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = CalculationCache::new();
        let key = key_for(EmployeeId::new(), SubprojectId::new());

        let err = cache
            .get_or_compute(&key, TTL, || async {
                Err::<CalculationResult, _>(CalculationError::invalid_rate(
                    Decimal::ZERO,
                    "cost per kilometer must be positive",
                ))
            })
            .await
            .unwrap_err();
        assert_eq!(err.key, key);
        assert!(matches!(err.source, CalculationError::InvalidRate { .. }));
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.in_flight_count(), 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let retry = cache.get_or_compute(&key, TTL, counted(&calls, result(1))).await.unwrap();
        assert_eq!(retry.outcome, CacheOutcome::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_employee() {
        let cache = CalculationCache::new();
        let employee = EmployeeId::new();
        let other = EmployeeId::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for key in [
            key_for(employee, SubprojectId::new()),
            key_for(employee, SubprojectId::new()),
            key_for(other, SubprojectId::new()),
        ] {
            cache.get_or_compute(&key, TTL, counted(&calls, result(1))).await.unwrap();
        }

        assert_eq!(cache.invalidate(&InvalidationFilter::employee(employee)), 2);
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.invalidate(&InvalidationFilter::all()), 1);
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_by_employee_and_subproject() {
        let cache = CalculationCache::new();
        let employee = EmployeeId::new();
        let subproject = SubprojectId::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let target = key_for(employee, subproject);
        let sibling = key_for(employee, SubprojectId::new());
        cache.get_or_compute(&target, TTL, counted(&calls, result(1))).await.unwrap();
        cache.get_or_compute(&sibling, TTL, counted(&calls, result(1))).await.unwrap();

        let filter = InvalidationFilter {
            employee_id: Some(employee),
            subproject_id: Some(subproject),
        };
        assert_eq!(cache.invalidate(&filter), 1);
        assert!(cache.peek(&target).is_none());
        assert!(cache.peek(&sibling).is_some());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let clock = Arc::new(ManualClock::default());
        let cache = CalculationCache::with_clock(clock.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let short = key_for(EmployeeId::new(), SubprojectId::new());
        let long = key_for(EmployeeId::new(), SubprojectId::new());
        cache
            .get_or_compute(&short, Duration::from_secs(10), counted(&calls, result(1)))
            .await
            .unwrap();
        cache
            .get_or_compute(&long, Duration::from_secs(100), counted(&calls, result(1)))
            .await
            .unwrap();

        assert_eq!(cache.cleanup_expired(), 0);

        clock.advance(TimeDelta::seconds(10));
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.peek(&long).is_some());
        assert_eq!(cache.entry_count(), 1);
    }
}
