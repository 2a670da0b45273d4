//! Multi-tenant suggester lifecycle.
//!
//! The first query for a tenant loads its data synchronously. A background
//! updater then polls providers for newer data, rebuilds off the query path
//! and swaps the new suggester in atomically. Queries clone the current
//! `Arc<Suggester>` once and run against that snapshot, so a swap never
//! affects a query already in progress. Tenants that go unqueried for longer
//! than `max_idle` are evicted.

pub mod settings;
mod updater;

pub use settings::ManagerSettings;

use crate::error::{Result, SuggestError};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::provider::{
    CompoundConfigProvider, MergingDataProvider, SuggestConfigProvider, SuggestData,
    SuggestDataProvider, NO_MODIFICATION_TIME,
};
use crate::query::suggester::{build_suggester, Suggester};
use crate::settings::SuggestConfig;
use crate::types::{Suggestion, TagFilter, TenantId};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Consecutive failed refreshes after which failures are logged as errors.
const FAILURE_ALERT_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TenantStatus {
    Unloaded,
    Loading,
    Ready,
    /// Ready, with a background rebuild in progress.
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Providers report nothing newer than the live snapshot.
    Unchanged,
    /// A new snapshot was built and swapped in.
    Updated { records: usize, modified: i64 },
    /// Tenant not loaded, or another refresh for it is still running.
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStats {
    pub record_count: usize,
    pub sources: Vec<String>,
    /// Provider modification time of the live snapshot.
    pub last_modified: i64,
    pub last_update: Option<chrono::DateTime<chrono::Utc>>,
    pub last_rebuild_ms: u64,
    pub successful_updates: u64,
    pub failed_updates: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

struct LoadedTenant {
    suggester: Suggester,
    modified: i64,
}

struct TenantSlot {
    snapshot: RwLock<Arc<Suggester>>,
    modified: AtomicI64,
    /// Milliseconds since the manager epoch.
    last_access_ms: AtomicU64,
    stats: Mutex<TenantStats>,
}

impl TenantSlot {
    fn new(loaded: LoadedTenant, now_ms: u64, elapsed: Duration) -> Self {
        let slot = TenantSlot {
            snapshot: RwLock::new(Arc::new(loaded.suggester)),
            modified: AtomicI64::new(loaded.modified),
            last_access_ms: AtomicU64::new(now_ms),
            stats: Mutex::new(TenantStats::default()),
        };
        slot.record_success(loaded.modified, elapsed);
        slot
    }

    fn current(&self) -> Arc<Suggester> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn modified(&self) -> i64 {
        self.modified.load(Ordering::Acquire)
    }

    fn swap(&self, loaded: LoadedTenant, elapsed: Duration) {
        let modified = loaded.modified;
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(loaded.suggester);
        self.modified.store(modified, Ordering::Release);
        self.record_success(modified, elapsed);
    }

    fn touch(&self, now_ms: u64) {
        self.last_access_ms.fetch_max(now_ms, Ordering::Relaxed);
    }

    fn stats(&self) -> MutexGuard<'_, TenantStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_success(&self, modified: i64, elapsed: Duration) {
        let current = self.current();
        let mut stats = self.stats();
        stats.record_count = current.record_count();
        stats.sources = current.source_names().into_iter().map(str::to_string).collect();
        stats.last_modified = modified;
        stats.last_update = Some(chrono::Utc::now());
        stats.last_rebuild_ms = elapsed.as_millis() as u64;
        stats.successful_updates += 1;
        stats.consecutive_failures = 0;
        stats.last_error = None;
    }

    /// Returns the consecutive failure count including this one.
    fn record_failure(&self, error: &SuggestError) -> u32 {
        let mut stats = self.stats();
        stats.failed_updates += 1;
        stats.consecutive_failures += 1;
        stats.last_error = Some(error.to_string());
        stats.consecutive_failures
    }
}

/// Marks a tenant as being refreshed for as long as the guard lives.
struct InFlight<'a> {
    set: &'a DashSet<TenantId>,
    tenant: TenantId,
}

impl<'a> InFlight<'a> {
    fn try_begin(set: &'a DashSet<TenantId>, tenant: &str) -> Option<Self> {
        if set.insert(tenant.to_string()) {
            Some(InFlight {
                set,
                tenant: tenant.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.tenant);
    }
}

/// Owns one suggester snapshot per active tenant.
///
/// Build one with [`SuggestManager::builder`]; the result is an
/// `Arc<SuggestManager>` meant to be shared. Call [`SuggestManager::start`]
/// from inside a tokio runtime to preload tenants and launch the updater.
///
/// # Examples
///
/// ```rust,no_run
/// use flapjack_suggest::{InMemoryDataProvider, SuggestManager, SuggestRecord};
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// # fn main() -> flapjack_suggest::Result<()> {
/// let data = Arc::new(InMemoryDataProvider::new("products"));
/// data.put("shop", vec![SuggestRecord::new("wireless headphones", 10)]);
///
/// let manager = SuggestManager::builder().data_provider(data).build()?;
/// let hits = manager.suggest("shop", "wire", &HashMap::new(), 5)?;
/// assert_eq!(hits[0].phrase, "wireless headphones");
/// # Ok(())
/// # }
/// ```
pub struct SuggestManager {
    settings: ManagerSettings,
    data_providers: Vec<Arc<dyn SuggestDataProvider>>,
    configs: CompoundConfigProvider,
    metrics: Arc<dyn MetricsSink>,
    tenants: DashMap<TenantId, Arc<TenantSlot>>,
    loading: DashMap<TenantId, Arc<Mutex<()>>>,
    /// Negative cache of failed first loads.
    unavailable: DashMap<TenantId, (Instant, SuggestError)>,
    in_flight: DashSet<TenantId>,
    rebuild_permits: Semaphore,
    epoch: Instant,
    closed: AtomicBool,
    updater: Mutex<Option<JoinHandle<()>>>,
    weak_self: Weak<SuggestManager>,
}

pub struct SuggestManagerBuilder {
    settings: ManagerSettings,
    data_providers: Vec<Arc<dyn SuggestDataProvider>>,
    config_providers: Vec<Arc<dyn SuggestConfigProvider>>,
    default_config: SuggestConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl Default for SuggestManagerBuilder {
    fn default() -> Self {
        SuggestManagerBuilder {
            settings: ManagerSettings::default(),
            data_providers: Vec::new(),
            config_providers: Vec::new(),
            default_config: SuggestConfig::default(),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

impl SuggestManagerBuilder {
    pub fn settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn data_provider(mut self, provider: Arc<dyn SuggestDataProvider>) -> Self {
        self.data_providers.push(provider);
        self
    }

    pub fn config_provider(mut self, provider: Arc<dyn SuggestConfigProvider>) -> Self {
        self.config_providers.push(provider);
        self
    }

    /// Config used for tenants no config provider knows about.
    pub fn default_config(mut self, config: SuggestConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> Result<Arc<SuggestManager>> {
        if self.data_providers.is_empty() {
            return Err(SuggestError::Config(
                "at least one data provider is required".to_string(),
            ));
        }
        let permits = self.settings.max_concurrent_rebuilds.max(1);
        Ok(Arc::new_cyclic(|weak| SuggestManager {
            configs: CompoundConfigProvider::new(self.config_providers, self.default_config),
            data_providers: self.data_providers,
            metrics: self.metrics,
            tenants: DashMap::new(),
            loading: DashMap::new(),
            unavailable: DashMap::new(),
            in_flight: DashSet::new(),
            rebuild_permits: Semaphore::new(permits),
            epoch: Instant::now(),
            closed: AtomicBool::new(false),
            updater: Mutex::new(None),
            weak_self: weak.clone(),
            settings: self.settings,
        }))
    }
}

impl SuggestManager {
    pub fn builder() -> SuggestManagerBuilder {
        SuggestManagerBuilder::default()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Preloads the configured tenants and spawns the background updater.
    /// Must be called from within a tokio runtime. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut updater = self.updater.lock().unwrap_or_else(PoisonError::into_inner);
        if updater.is_some() || self.is_shut_down() {
            return;
        }
        self.preload();
        *updater = Some(updater::spawn_updater(
            self.weak_self.clone(),
            self.settings.update_rate,
        ));
        tracing::info!(
            "[SUGGEST] updater started (every {}s, max idle {}s)",
            self.settings.update_rate.as_secs(),
            self.settings.max_idle.as_secs()
        );
    }

    /// Loads every tenant in `preload_tenants`. Failures are logged, not returned.
    pub fn preload(&self) {
        for tenant in &self.settings.preload_tenants {
            if let Err(e) = self.suggester(tenant) {
                tracing::warn!("[PRELOAD {}] {}", tenant, e);
            }
        }
    }

    /// Stops the updater and drops all snapshots. Later queries fail with
    /// [`SuggestError::ShutDown`].
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self
            .updater
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.rebuild_permits.close();
        self.tenants.clear();
        self.unavailable.clear();
        tracing::info!("[SUGGEST] manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Suggestions for `query`. Each filter value is split on `,` into tags;
    /// records must carry at least one of them.
    pub fn suggest(
        &self,
        tenant: &str,
        query: &str,
        filters: &HashMap<String, String>,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        self.suggest_with_filter(tenant, query, &TagFilter::from_filter_map(filters), limit)
    }

    pub fn suggest_with_filter(
        &self,
        tenant: &str,
        query: &str,
        filter: &TagFilter,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        let started = std::time::Instant::now();
        let suggester = self.suggester(tenant)?;
        let results = suggester.query(query, filter, limit)?;
        self.metrics
            .record_query(tenant, started.elapsed(), results.len());
        tracing::trace!(
            "[SUGGEST {}] {:?} -> {} results",
            tenant,
            query,
            results.len()
        );
        Ok(results)
    }

    /// The live snapshot for `tenant`, loading it on first use.
    pub fn suggester(&self, tenant: &str) -> Result<Arc<Suggester>> {
        if self.is_shut_down() {
            return Err(SuggestError::ShutDown);
        }
        if let Some(slot) = self.slot(tenant) {
            slot.touch(self.now_ms());
            return Ok(slot.current());
        }
        self.check_unavailable(tenant)?;
        self.load_first(tenant).map(|slot| slot.current())
    }

    pub fn status(&self, tenant: &str) -> TenantStatus {
        if self.tenants.contains_key(tenant) {
            if self.in_flight.contains(tenant) {
                TenantStatus::Refreshing
            } else {
                TenantStatus::Ready
            }
        } else if self.loading.contains_key(tenant) {
            TenantStatus::Loading
        } else {
            TenantStatus::Unloaded
        }
    }

    pub fn stats(&self, tenant: &str) -> Option<TenantStats> {
        self.slot(tenant).map(|slot| slot.stats().clone())
    }

    pub fn loaded_tenants(&self) -> Vec<TenantId> {
        self.tenants.iter().map(|e| e.key().clone()).collect()
    }

    /// Drops the tenant's snapshot and any cached load failure.
    pub fn unload(&self, tenant: &str) -> bool {
        self.unavailable.remove(tenant);
        self.tenants.remove(tenant).is_some()
    }

    /// Evicts tenants idle for strictly longer than `max_idle` and expires
    /// stale negative-cache entries. Returns the evicted tenants.
    pub fn evict_idle(&self) -> Vec<TenantId> {
        let now = self.now_ms();
        let max_idle = u64::try_from(self.settings.max_idle.as_millis()).unwrap_or(u64::MAX);
        let mut evicted = Vec::new();
        self.tenants.retain(|tenant, slot| {
            let idle = now.saturating_sub(slot.last_access_ms.load(Ordering::Relaxed));
            if idle > max_idle {
                evicted.push(tenant.clone());
                false
            } else {
                true
            }
        });
        for tenant in &evicted {
            tracing::info!("[EVICT {}] idle for more than {}s", tenant, max_idle / 1000);
        }

        let retry = self.settings.no_data_retry;
        self.unavailable
            .retain(|_, (since, _)| since.elapsed() < retry);
        evicted
    }

    /// Checks `tenant`'s providers and rebuilds on the blocking pool if they
    /// report newer data. At most `max_concurrent_rebuilds` rebuilds run at
    /// once; a refresh for a tenant that is already refreshing is skipped.
    /// On failure the previous snapshot stays live.
    pub async fn refresh(self: &Arc<Self>, tenant: &str) -> Result<RefreshOutcome> {
        if self.is_shut_down() {
            return Err(SuggestError::ShutDown);
        }
        let Some(_flight) = InFlight::try_begin(&self.in_flight, tenant) else {
            tracing::debug!("[REFRESH {}] already in progress, skipping", tenant);
            return Ok(RefreshOutcome::Skipped);
        };
        let _permit = self
            .rebuild_permits
            .acquire()
            .await
            .map_err(|_| SuggestError::ShutDown)?;

        let manager = Arc::clone(self);
        let owned = tenant.to_string();
        tokio::task::spawn_blocking(move || manager.refresh_blocking(&owned))
            .await
            .map_err(|e| SuggestError::Internal(format!("rebuild task failed: {}", e)))?
    }

    fn refresh_blocking(&self, tenant: &str) -> Result<RefreshOutcome> {
        let Some(slot) = self.slot(tenant) else {
            return Ok(RefreshOutcome::Skipped);
        };
        let started = std::time::Instant::now();
        match self.rebuild_if_changed(tenant, &slot) {
            Ok(Some(loaded)) => {
                let elapsed = started.elapsed();
                let records = loaded.suggester.record_count();
                let modified = loaded.modified;
                slot.swap(loaded, elapsed);
                self.metrics.record_rebuild(tenant, elapsed, records, true);
                tracing::info!(
                    "[REFRESH {}] swapped in {} records (data from {}) in {}ms",
                    tenant,
                    records,
                    format_modified(modified),
                    elapsed.as_millis()
                );
                Ok(RefreshOutcome::Updated { records, modified })
            }
            Ok(None) => Ok(RefreshOutcome::Unchanged),
            Err(e) => {
                let failures = slot.record_failure(&e);
                self.metrics
                    .record_rebuild(tenant, started.elapsed(), 0, false);
                if failures > FAILURE_ALERT_THRESHOLD {
                    tracing::error!(
                        "[REFRESH {}] {} consecutive failures, serving stale data: {}",
                        tenant,
                        failures,
                        e
                    );
                } else {
                    tracing::warn!("[REFRESH {}] keeping previous snapshot: {}", tenant, e);
                }
                Err(e)
            }
        }
    }

    /// Builds a new snapshot when providers report data newer than the live
    /// one. `None` means nothing changed.
    fn rebuild_if_changed(&self, tenant: &str, slot: &TenantSlot) -> Result<Option<LoadedTenant>> {
        let providers = self.providers_with_data(tenant);
        if providers.is_empty() {
            return Err(SuggestError::build(tenant, "no provider has data any more"));
        }
        let mut latest = NO_MODIFICATION_TIME;
        for provider in &providers {
            latest = latest.max(
                provider
                    .last_modification_time(tenant)
                    .map_err(|e| e.into_build(tenant))?,
            );
        }
        if latest <= slot.modified() {
            return Ok(None);
        }
        self.load_tenant(tenant).map(Some)
    }

    fn load_first(&self, tenant: &str) -> Result<Arc<TenantSlot>> {
        let lock = Arc::clone(
            self.loading
                .entry(tenant.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // another caller may have finished loading while we waited
        if let Some(slot) = self.slot(tenant) {
            slot.touch(self.now_ms());
            return Ok(slot);
        }
        self.check_unavailable(tenant)?;

        let started = std::time::Instant::now();
        let result = self.load_tenant(tenant);
        let elapsed = started.elapsed();
        let outcome = match result {
            Ok(loaded) => {
                let records = loaded.suggester.record_count();
                let slot = Arc::new(TenantSlot::new(loaded, self.now_ms(), elapsed));
                self.tenants.insert(tenant.to_string(), Arc::clone(&slot));
                self.unavailable.remove(tenant);
                self.metrics.record_rebuild(tenant, elapsed, records, true);
                tracing::info!(
                    "[LOAD {}] {} records in {}ms",
                    tenant,
                    records,
                    elapsed.as_millis()
                );
                Ok(slot)
            }
            Err(e) => {
                tracing::warn!("[LOAD {}] {}", tenant, e);
                self.metrics.record_rebuild(tenant, elapsed, 0, false);
                self.unavailable
                    .insert(tenant.to_string(), (Instant::now(), e.clone()));
                Err(e)
            }
        };
        self.loading.remove(tenant);
        outcome
    }

    /// Loads and indexes all data for `tenant`. Either every provider's data
    /// goes through one merging source (merger enabled, or a single provider)
    /// or each provider becomes its own source.
    fn load_tenant(&self, tenant: &str) -> Result<LoadedTenant> {
        let providers = self.providers_with_data(tenant);
        if providers.is_empty() {
            return Err(SuggestError::NoData(tenant.to_string()));
        }
        let config = self.configs.resolve(tenant);

        let mut loads = Vec::with_capacity(providers.len());
        let mut modified = NO_MODIFICATION_TIME;
        if config.use_data_source_merger || providers.len() == 1 {
            let merged = MergingDataProvider::new(providers);
            let (data, polled) = load_checked(&merged, tenant)?;
            modified = polled;
            loads.push(data);
        } else {
            for provider in &providers {
                let (data, polled) = load_checked(provider.as_ref(), tenant)?;
                modified = modified.max(polled);
                loads.push(data);
            }
        }

        let suggester = build_suggester(tenant, loads, config)?;
        Ok(LoadedTenant {
            suggester,
            modified,
        })
    }

    fn providers_with_data(&self, tenant: &str) -> Vec<Arc<dyn SuggestDataProvider>> {
        self.data_providers
            .iter()
            .filter(|p| p.has_data(tenant))
            .cloned()
            .collect()
    }

    fn check_unavailable(&self, tenant: &str) -> Result<()> {
        let cached = self
            .unavailable
            .get(tenant)
            .map(|e| (e.value().0, e.value().1.clone()));
        if let Some((since, error)) = cached {
            if since.elapsed() < self.settings.no_data_retry {
                return Err(error);
            }
            self.unavailable.remove(tenant);
        }
        Ok(())
    }

    fn slot(&self, tenant: &str) -> Option<Arc<TenantSlot>> {
        self.tenants.get(tenant).map(|s| Arc::clone(s.value()))
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Drop for SuggestManager {
    fn drop(&mut self) {
        if let Some(handle) = self
            .updater
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// Polls the provider's modification time, loads, and rejects data whose
/// reported time contradicts the poll.
fn load_checked(provider: &dyn SuggestDataProvider, tenant: &str) -> Result<(SuggestData, i64)> {
    let polled = provider
        .last_modification_time(tenant)
        .map_err(|e| e.into_build(tenant))?;
    let data = provider
        .load_data(tenant)
        .map_err(|e| e.into_build(tenant))?;
    let reported = data.modification_time;
    if reported > 0 && polled > 0 && reported != polled {
        return Err(SuggestError::build(
            tenant,
            format!(
                "provider {} reported modification time {} but loaded data from {}",
                provider.name(),
                format_modified(polled),
                format_modified(reported)
            ),
        ));
    }
    Ok((data, polled.max(reported)))
}

fn format_modified(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
