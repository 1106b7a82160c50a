use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use travelcost_core::allowance::{allowance_amount, calculate};
use travelcost_core::clock::{Clock, SystemClock};
use travelcost_core::config::CalculationSettings;
use travelcost_core::error::{Result, TravelCostError};
use travelcost_core::fingerprint::CacheKey;
use travelcost_core::geodesy::round_half_up;
use travelcost_core::models::{
    AuditRecord, CalculationInput, CalculationResult, Currency, EmployeeId, TravelRequestId,
};
use travelcost_store::{AuditStore, CalculationCache, InvalidationFilter};

use crate::dto::{AllowanceResponse, DistanceResponse, PreviewResponse};

/// A served calculation together with how it was served
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub key: CacheKey,
    pub result: CalculationResult,
    pub cache_hit: bool,
}

/// Orchestrates fingerprint, cached computation and audit append.
///
/// Holds no calculation state of its own beyond the cache handle and a
/// counter of audit writes that failed even after the retry.
pub struct CalculationService {
    cache: CalculationCache,
    audit_store: Arc<dyn AuditStore>,
    settings: CalculationSettings,
    clock: Arc<dyn Clock>,
    audit_failures: AtomicU64,
}

impl CalculationService {
    pub fn new(audit_store: Arc<dyn AuditStore>, settings: CalculationSettings) -> Self {
        Self::with_clock(audit_store, settings, Arc::new(SystemClock))
    }

    /// Build a service whose cache and audit timestamps read from `clock`
    pub fn with_clock(
        audit_store: Arc<dyn AuditStore>,
        settings: CalculationSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: CalculationCache::with_clock(Arc::clone(&clock)),
            audit_store,
            settings,
            clock,
            audit_failures: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &CalculationSettings {
        &self.settings
    }

    pub fn cache(&self) -> &CalculationCache {
        &self.cache
    }

    /// Audit writes that were lost after the retry
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    pub async fn preview_distance(
        &self,
        input: CalculationInput,
        travel_request_id: Option<TravelRequestId>,
    ) -> Result<DistanceResponse> {
        let calculation = self.calculate(input, travel_request_id).await?;
        Ok(DistanceResponse {
            distance_km: calculation.result.distance_km,
            cache_hit: calculation.cache_hit,
            computed_at: calculation.result.computed_at,
        })
    }

    pub async fn preview_allowance(
        &self,
        input: CalculationInput,
        travel_request_id: Option<TravelRequestId>,
    ) -> Result<AllowanceResponse> {
        let calculation = self.calculate(input, travel_request_id).await?;
        let result = calculation.result;
        Ok(AllowanceResponse {
            distance_km: result.distance_km,
            allowance_amount: result.allowance_amount,
            currency: result.currency,
            cache_hit: calculation.cache_hit,
            computed_at: result.computed_at,
        })
    }

    pub async fn preview_combined(
        &self,
        input: CalculationInput,
        travel_request_id: Option<TravelRequestId>,
    ) -> Result<PreviewResponse> {
        let calculation = self.calculate(input, travel_request_id).await?;
        let result = calculation.result;
        Ok(PreviewResponse {
            fingerprint: calculation.key.as_fingerprint(),
            distance_km: result.distance_km,
            allowance_amount: result.allowance_amount,
            currency: result.currency,
            cache_hit: calculation.cache_hit,
            computed_at: result.computed_at,
        })
    }

    /// Allowance for a distance the caller already knows.
    ///
    /// Neither cached nor audited: there is no fingerprint for a bare distance,
    /// and audit records describe calculations from resolved locations.
    pub fn allowance_from_distance(
        &self,
        distance_km: Decimal,
        cost_per_km: Decimal,
    ) -> Result<AllowanceResponse> {
        let amount = allowance_amount(distance_km, cost_per_km, &self.settings.rate_policy)?;
        Ok(AllowanceResponse {
            distance_km: round_half_up(distance_km),
            allowance_amount: amount,
            currency: Currency::CHF,
            cache_hit: false,
            computed_at: self.clock.now(),
        })
    }

    /// Run the pipeline and append exactly one audit record on success.
    ///
    /// Only a pre-existing live entry counts as a cache hit; callers that
    /// joined an in-flight computation are recorded with `cache_hit = false`.
    pub async fn calculate(
        &self,
        input: CalculationInput,
        travel_request_id: Option<TravelRequestId>,
    ) -> Result<Calculation> {
        // A cache hit skips `compute`, so the request itself is checked here
        self.validate(&input)?;

        let key = CacheKey::from(&input);

        let (result, cache_hit) = if self.settings.cache_enabled {
            self.lookup(&key, &input).await?
        } else {
            let result = calculate(&input, &self.settings.rate_policy, self.clock.now())?;
            (result, false)
        };

        tracing::info!(
            key = %key,
            distance_km = %result.distance_km,
            allowance = %result.allowance_amount,
            cache_hit = cache_hit,
            "Calculation served"
        );

        let calculated_at = self.clock.now();
        let record =
            AuditRecord::new(input, result.clone(), travel_request_id, cache_hit, calculated_at);
        self.record_audit(&record).await;

        Ok(Calculation {
            key,
            result,
            cache_hit,
        })
    }

    /// Reject out-of-range coordinates and rates before touching the cache
    fn validate(&self, input: &CalculationInput) -> Result<()> {
        self.settings.rate_policy.check(input.cost_per_km)?;
        input.home_location.validate()?;
        input.work_location.validate()?;
        Ok(())
    }

    async fn lookup(
        &self,
        key: &CacheKey,
        input: &CalculationInput,
    ) -> Result<(CalculationResult, bool)> {
        let owned = input.clone();
        let policy = self.settings.rate_policy;
        let clock = Arc::clone(&self.clock);
        let compute = move || async move { calculate(&owned, &policy, clock.now()) };

        let wait = self.settings.wait_timeout;
        let pending = self.cache.get_or_compute(key, self.settings.cache_ttl, compute);
        let lookup = tokio::time::timeout(wait, pending).await.map_err(|_| {
            let waited_ms = wait.as_millis() as u64;
            tracing::warn!(key = %key, waited_ms, "Gave up waiting for calculation");
            TravelCostError::WaitTimeout {
                key: key.clone(),
                waited_ms,
            }
        })??;

        Ok((lookup.result, lookup.outcome.is_hit()))
    }

    /// Append with one immediate retry. A second failure is logged and
    /// counted, never returned.
    async fn record_audit(&self, record: &AuditRecord) {
        let first = match self.audit_store.append(record).await {
            Ok(()) => return,
            Err(err) => err,
        };

        tracing::warn!(record_id = %record.id, error = %first, "Audit write failed, retrying");

        if let Err(err) = self.audit_store.append(record).await {
            let total = self.audit_failures.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::error!(
                record_id = %record.id,
                employee_id = %record.employee_id,
                error = %err,
                audit_failures = total,
                "Audit write failed after retry, record lost"
            );
        }
    }

    /// Whether the audit backend is reachable
    pub async fn audit_health(&self) -> Result<()> {
        self.audit_store.health_check().await
    }

    /// Remove cached entries matching the filter
    pub fn invalidate(&self, filter: &InvalidationFilter) -> usize {
        self.cache.invalidate(filter)
    }

    /// Evict expired entries
    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub async fn audit_trail(
        &self,
        travel_request_id: TravelRequestId,
    ) -> Result<Vec<AuditRecord>> {
        self.audit_store.query_by_travel_request(travel_request_id).await
    }

    pub async fn audit_trail_for_employee(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<AuditRecord>> {
        self.audit_store.query_by_employee(employee_id).await
    }

    /// Spawn the periodic expiry sweep
    pub fn spawn_cleanup(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.cleanup_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;
    use travelcost_core::allowance::RatePolicy;
    use travelcost_core::clock::ManualClock;
    use travelcost_core::error::{AuditWriteError, CalculationError};
    use travelcost_core::models::{GeoPoint, SubprojectId};
    use travelcost_store::MemoryAuditStore;

    /// Fails the first `failures` appends, then delegates
    #[derive(Debug, Default)]
    struct FlakyAuditStore {
        failures: AtomicUsize,
        attempts: AtomicUsize,
        offline: bool,
        inner: MemoryAuditStore,
    }

    impl FlakyAuditStore {
        fn failing(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AuditStore for FlakyAuditStore {
        async fn append(&self, record: &AuditRecord) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(AuditWriteError {
                    record_id: record.id,
                    reason: "connection reset".to_string(),
                }
                .into());
            }
            self.inner.append(record).await
        }

        async fn query_by_travel_request(&self, id: TravelRequestId) -> Result<Vec<AuditRecord>> {
            self.inner.query_by_travel_request(id).await
        }

        async fn query_by_employee(&self, id: EmployeeId) -> Result<Vec<AuditRecord>> {
            self.inner.query_by_employee(id).await
        }

        async fn health_check(&self) -> Result<()> {
            if self.offline {
                return Err(TravelCostError::Storage("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn bern_to_zurich(cost_per_km: &str) -> CalculationInput {
        CalculationInput {
            employee_id: EmployeeId::new(),
            subproject_id: SubprojectId::new(),
            home_location: GeoPoint::new(46.9480, 7.4474).unwrap(),
            work_location: GeoPoint::new(47.3769, 8.5417).unwrap(),
            cost_per_km: Decimal::from_str(cost_per_km).unwrap(),
            address_version: 1,
            rate_version: 1,
        }
    }

    fn service_with(store: Arc<dyn AuditStore>) -> CalculationService {
        CalculationService::new(store, CalculationSettings::default())
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let service = service_with(Arc::new(MemoryAuditStore::new()));
        let input = bern_to_zurich("0.70");

        let first = service.calculate(input.clone(), None).await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.result.distance_km.to_string(), "95.49");
        assert_eq!(first.result.allowance_amount.to_string(), "66.85");

        let second = service.calculate(input, None).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.result, first.result);
    }

    #[tokio::test]
    async fn test_every_call_is_audited() {
        let store = Arc::new(MemoryAuditStore::new());
        let service = service_with(store.clone());
        let input = bern_to_zurich("0.70");
        let request = TravelRequestId::new();

        service.preview_combined(input.clone(), Some(request)).await.unwrap();
        service.preview_distance(input.clone(), Some(request)).await.unwrap();
        service.preview_allowance(input, Some(request)).await.unwrap();

        let trail = service.audit_trail(request).await.unwrap();
        assert_eq!(trail.len(), 3);
        assert_eq!(
            trail.iter().map(|r| r.cache_hit).collect::<Vec<_>>(),
            vec![false, true, true]
        );
    }

    #[tokio::test]
    async fn test_validation_error_is_not_cached_or_audited() {
        let store = Arc::new(MemoryAuditStore::new());
        let service = service_with(store.clone());
        let input = bern_to_zurich("0");

        let err = service.calculate(input.clone(), None).await.unwrap_err();
        let validation = err.validation().cloned();
        assert!(matches!(validation, Some(CalculationError::InvalidRate { .. })));
        assert!(err.to_string().contains("cost per kilometer must be positive"));

        assert_eq!(service.cache().entry_count(), 0);
        assert!(store.is_empty());

        // Same key with a corrected rate computes fresh
        let mut fixed = input;
        fixed.cost_per_km = Decimal::from_str("0.70").unwrap();
        assert!(!service.calculate(fixed, None).await.unwrap().cache_hit);
    }

    #[tokio::test]
    async fn test_audit_retry_succeeds_without_duplicates() {
        let store = Arc::new(FlakyAuditStore::failing(1));
        let service = service_with(store.clone());

        service.calculate(bern_to_zurich("0.70"), None).await.unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner.len(), 1);
        assert_eq!(service.audit_failures(), 0);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_calculation() {
        let store = Arc::new(FlakyAuditStore::failing(2));
        let service = service_with(store.clone());

        let calculation = service.calculate(bern_to_zurich("0.70"), None).await.unwrap();

        assert_eq!(calculation.result.allowance_amount.to_string(), "66.85");
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert!(store.inner.is_empty());
        assert_eq!(service.audit_failures(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let clock = Arc::new(ManualClock::default());
        let settings = CalculationSettings {
            cache_ttl: Duration::from_secs(60),
            ..CalculationSettings::default()
        };
        let store = Arc::new(MemoryAuditStore::new());
        let service = CalculationService::with_clock(store, settings, clock.clone());
        let input = bern_to_zurich("0.70");

        let first = service.calculate(input.clone(), None).await.unwrap();
        clock.advance(chrono::Duration::seconds(30));
        assert!(service.calculate(input.clone(), None).await.unwrap().cache_hit);

        clock.advance(chrono::Duration::seconds(31));
        let refreshed = service.calculate(input, None).await.unwrap();
        assert!(!refreshed.cache_hit);
        assert!(refreshed.result.computed_at > first.result.computed_at);
    }

    #[tokio::test]
    async fn test_address_version_bump_misses() {
        let service = service_with(Arc::new(MemoryAuditStore::new()));
        let input = bern_to_zurich("0.70");
        service.calculate(input.clone(), None).await.unwrap();

        let mut moved = input;
        moved.address_version += 1;
        moved.home_location = GeoPoint::new(46.2044, 6.1432).unwrap();

        let calculation = service.calculate(moved, None).await.unwrap();
        assert!(!calculation.cache_hit);
        assert_eq!(service.cache().entry_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let service = service_with(Arc::new(MemoryAuditStore::new()));
        let input = bern_to_zurich("0.70");
        service.calculate(input.clone(), None).await.unwrap();

        let removed = service.invalidate(&InvalidationFilter::employee(input.employee_id));
        assert_eq!(removed, 1);
        assert!(!service.calculate(input, None).await.unwrap().cache_hit);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_computes() {
        let settings = CalculationSettings {
            cache_enabled: false,
            ..CalculationSettings::default()
        };
        let store = Arc::new(MemoryAuditStore::new());
        let service = CalculationService::new(store.clone(), settings);
        let input = bern_to_zurich("0.70");

        assert!(!service.calculate(input.clone(), None).await.unwrap().cache_hit);
        assert!(!service.calculate(input, None).await.unwrap().cache_hit);
        assert_eq!(service.cache().entry_count(), 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_coalesced_callers_are_audited_as_misses() {
        const CALLERS: usize = 16;

        let store = Arc::new(MemoryAuditStore::new());
        let service = Arc::new(service_with(store.clone()));
        let input = bern_to_zurich("0.70");
        let key = CacheKey::from(&input);
        let computations = Arc::new(AtomicUsize::new(0));

        // Hold the key in flight long enough for every caller to join it
        let leader = {
            let cache = service.cache().clone();
            let input = input.clone();
            let computations = Arc::clone(&computations);
            let ttl = service.settings().cache_ttl;
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key, ttl, move || async move {
                        computations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        calculate(&input, &RatePolicy::default(), chrono::Utc::now())
                    })
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.cache().in_flight_count(), 1);

        let request = TravelRequestId::new();
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let service = Arc::clone(&service);
                let input = input.clone();
                tokio::spawn(async move { service.calculate(input, Some(request)).await.unwrap() })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            let calculation = handle.await.unwrap();
            assert!(!calculation.cache_hit);
            results.push(calculation.result);
        }
        let leader_result = leader.await.unwrap().result;

        assert_eq!(computations.load(Ordering::SeqCst), 1, "compute must run exactly once");
        assert!(results.iter().all(|r| r == &leader_result));
        assert_eq!(service.cache().entry_count(), 1);

        let trail = service.audit_trail(request).await.unwrap();
        assert_eq!(trail.len(), CALLERS);
        assert!(trail.iter().all(|record| !record.cache_hit));

        // Once settled, the next caller is a plain hit
        assert!(service.calculate(input, Some(request)).await.unwrap().cache_hit);
        assert_eq!(store.len(), CALLERS + 1);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_even_when_cached() {
        let store = Arc::new(MemoryAuditStore::new());
        let service = service_with(store.clone());
        let input = bern_to_zurich("0.70");

        service.calculate(input.clone(), None).await.unwrap();
        assert!(service.calculate(input.clone(), None).await.unwrap().cache_hit);

        // Same ids and versions, so the fingerprint still points at the live entry
        let mut bad_rate = input.clone();
        bad_rate.cost_per_km = Decimal::from(-5);
        let err = service.calculate(bad_rate, None).await.unwrap_err();
        assert!(matches!(err.validation(), Some(CalculationError::InvalidRate { .. })));

        let mut bad_point = input;
        bad_point.home_location =
            serde_json::from_str(r#"{"latitude": 123.0, "longitude": 500.0}"#).unwrap();
        let err = service.calculate(bad_point, None).await.unwrap_err();
        assert!(matches!(err.validation(), Some(CalculationError::InvalidCoordinate { .. })));

        assert_eq!(store.len(), 2, "rejected requests are not audited");
        assert!(store.records().iter().all(|r| r.input.cost_per_km == Decimal::new(70, 2)));
    }

    #[tokio::test]
    async fn test_allowance_from_distance() {
        let store = Arc::new(MemoryAuditStore::new());
        let service = service_with(store.clone());

        let response = service
            .allowance_from_distance(Decimal::from_str("95.4937").unwrap(), Decimal::new(70, 2))
            .unwrap();
        assert_eq!(response.distance_km.to_string(), "95.49");
        assert_eq!(response.allowance_amount.to_string(), "66.85");
        assert!(!response.cache_hit);

        let err = service.allowance_from_distance(Decimal::from(10), Decimal::ZERO).unwrap_err();
        assert!(matches!(err.validation(), Some(CalculationError::InvalidRate { .. })));

        assert_eq!(service.cache().entry_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_audit_health_reports_backend_state() {
        let service = service_with(Arc::new(MemoryAuditStore::new()));
        assert!(service.audit_health().await.is_ok());

        let offline = FlakyAuditStore {
            offline: true,
            ..FlakyAuditStore::default()
        };
        let service = service_with(Arc::new(offline));
        assert!(matches!(service.audit_health().await, Err(TravelCostError::Storage(_))));
    }

    #[tokio::test]
    async fn test_cleanup_with_nothing_expired() {
        let service = service_with(Arc::new(MemoryAuditStore::new()));
        service.calculate(bern_to_zurich("0.70"), None).await.unwrap();
        assert_eq!(service.cleanup_expired(), 0);
        assert_eq!(service.cache().entry_count(), 1);
    }
}
