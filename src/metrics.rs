//! Optional instrumentation hooks. A manager without a sink behaves exactly
//! like one with [`NoopMetrics`].

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub trait MetricsSink: Send + Sync {
    fn record_query(&self, tenant: &str, elapsed: Duration, results: usize);

    fn record_rebuild(&self, tenant: &str, elapsed: Duration, records: usize, success: bool);
}

pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_query(&self, _tenant: &str, _elapsed: Duration, _results: usize) {}

    fn record_rebuild(&self, _tenant: &str, _elapsed: Duration, _records: usize, _success: bool) {}
}

#[derive(Debug, Default)]
pub struct TenantCounters {
    pub queries: AtomicU64,
    pub query_micros: AtomicU64,
    pub empty_results: AtomicU64,
    pub rebuilds: AtomicU64,
    pub failed_rebuilds: AtomicU64,
    pub rebuild_micros: AtomicU64,
}

/// In-process counters per tenant.
#[derive(Default)]
pub struct CountingMetrics {
    tenants: DashMap<String, TenantCounters>,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queries(&self, tenant: &str) -> u64 {
        self.read(tenant, |c| &c.queries)
    }

    pub fn empty_results(&self, tenant: &str) -> u64 {
        self.read(tenant, |c| &c.empty_results)
    }

    pub fn rebuilds(&self, tenant: &str) -> u64 {
        self.read(tenant, |c| &c.rebuilds)
    }

    pub fn failed_rebuilds(&self, tenant: &str) -> u64 {
        self.read(tenant, |c| &c.failed_rebuilds)
    }

    fn read(&self, tenant: &str, field: impl Fn(&TenantCounters) -> &AtomicU64) -> u64 {
        self.tenants
            .get(tenant)
            .map(|c| field(c.value()).load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn with(&self, tenant: &str, f: impl FnOnce(&TenantCounters)) {
        if let Some(c) = self.tenants.get(tenant) {
            f(c.value());
            return;
        }
        f(self.tenants.entry(tenant.to_string()).or_default().value());
    }
}

impl MetricsSink for CountingMetrics {
    fn record_query(&self, tenant: &str, elapsed: Duration, results: usize) {
        self.with(tenant, |c| {
            c.queries.fetch_add(1, Ordering::Relaxed);
            c.query_micros
                .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
            if results == 0 {
                c.empty_results.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    fn record_rebuild(&self, tenant: &str, elapsed: Duration, _records: usize, success: bool) {
        self.with(tenant, |c| {
            c.rebuilds.fetch_add(1, Ordering::Relaxed);
            c.rebuild_micros
                .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
            if !success {
                c.failed_rebuilds.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_queries_and_rebuilds() {
        let m = CountingMetrics::new();
        m.record_query("shop", Duration::from_micros(10), 3);
        m.record_query("shop", Duration::from_micros(10), 0);
        m.record_rebuild("shop", Duration::from_millis(5), 10, false);
        assert_eq!(m.queries("shop"), 2);
        assert_eq!(m.empty_results("shop"), 1);
        assert_eq!(m.rebuilds("shop"), 1);
        assert_eq!(m.failed_rebuilds("shop"), 1);
        assert_eq!(m.queries("blog"), 0);
    }
}
