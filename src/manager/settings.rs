use crate::types::TenantId;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const MIN_UPDATE_RATE_SECS: u64 = 5;
pub const MAX_UPDATE_RATE_SECS: u64 = 3600;
const DEFAULT_UPDATE_RATE_SECS: u64 = 60;
const DEFAULT_MAX_IDLE_MINUTES: u64 = 30;
const DEFAULT_MAX_CONCURRENT_REBUILDS: usize = 2;
const DEFAULT_NO_DATA_RETRY_MINUTES: u64 = 10;

/// Lifecycle knobs of a [`crate::SuggestManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    /// Interval between freshness checks.
    pub update_rate: Duration,
    /// Tenants idle for longer than this are evicted.
    pub max_idle: Duration,
    /// Upper bound of rebuilds running at the same time.
    pub max_concurrent_rebuilds: usize,
    /// How long a tenant without data is answered from the negative cache.
    pub no_data_retry: Duration,
    /// Tenants loaded when the manager starts.
    pub preload_tenants: Vec<TenantId>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        ManagerSettings {
            update_rate: Duration::from_secs(DEFAULT_UPDATE_RATE_SECS),
            max_idle: Duration::from_secs(DEFAULT_MAX_IDLE_MINUTES * 60),
            max_concurrent_rebuilds: DEFAULT_MAX_CONCURRENT_REBUILDS,
            no_data_retry: Duration::from_secs(DEFAULT_NO_DATA_RETRY_MINUTES * 60),
            preload_tenants: Vec::new(),
        }
    }
}

/// Reads the first of `names` that is set. Values that do not parse are
/// reported and ignored.
fn env_value<T: FromStr>(names: &[&str]) -> Option<T> {
    for name in names {
        if let Ok(raw) = env::var(name) {
            match raw.trim().parse() {
                Ok(v) => return Some(v),
                Err(_) => {
                    tracing::warn!("[CONFIG] ignoring {}={:?}: not a valid value", name, raw);
                    return None;
                }
            }
        }
    }
    None
}

impl ManagerSettings {
    /// Builds settings from `FLAPJACK_SUGGEST_*` variables. Legacy names
    /// (`SUGGEST_UPDATE_RATE`, `SUGGESTER_MAX_IDLE_MINUTES`) are honored when
    /// the new ones are absent.
    pub fn from_env() -> Self {
        let defaults = ManagerSettings::default();
        let update_rate = env_value::<u64>(&["FLAPJACK_SUGGEST_UPDATE_RATE", "SUGGEST_UPDATE_RATE"])
            .unwrap_or(DEFAULT_UPDATE_RATE_SECS);
        let max_idle = env_value::<u64>(&[
            "FLAPJACK_SUGGEST_MAX_IDLE_MINUTES",
            "SUGGESTER_MAX_IDLE_MINUTES",
        ])
        .unwrap_or(DEFAULT_MAX_IDLE_MINUTES);
        let max_idle_secs = max_idle.checked_mul(60).unwrap_or_else(|| {
            tracing::warn!(
                "[CONFIG] max idle of {} minutes is out of range, using {}",
                max_idle,
                DEFAULT_MAX_IDLE_MINUTES
            );
            DEFAULT_MAX_IDLE_MINUTES * 60
        });
        let rebuilds = env_value::<usize>(&["FLAPJACK_SUGGEST_MAX_REBUILDS"])
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_concurrent_rebuilds);
        let preload = env::var("FLAPJACK_SUGGEST_PRELOAD")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        ManagerSettings {
            max_idle: Duration::from_secs(max_idle_secs),
            max_concurrent_rebuilds: rebuilds,
            preload_tenants: preload,
            ..defaults
        }
        .with_update_rate_secs(update_rate)
    }

    /// Sets the refresh interval, clamped to 5..=3600 seconds.
    pub fn with_update_rate_secs(mut self, secs: u64) -> Self {
        let clamped = secs.clamp(MIN_UPDATE_RATE_SECS, MAX_UPDATE_RATE_SECS);
        if clamped != secs {
            tracing::warn!(
                "[CONFIG] update rate {}s out of range, using {}s",
                secs,
                clamped
            );
        }
        self.update_rate = Duration::from_secs(clamped);
        self
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_preload<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TenantId>,
    {
        self.preload_tenants = tenants.into_iter().map(Into::into).collect();
        self
    }
}
