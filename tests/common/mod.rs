#![allow(dead_code)]

use flapjack_suggest::{
    InMemoryDataProvider, Result, SuggestData, SuggestDataProvider, SuggestError, SuggestRecord,
    Suggestion,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with_test_writer()
        .try_init();
}

pub fn phrases(hits: &[Suggestion]) -> Vec<&str> {
    hits.iter().map(|h| h.phrase.as_str()).collect()
}

pub fn catalog_v1() -> Vec<SuggestRecord> {
    vec![
        SuggestRecord::new("wireless headphones", 120).with_tag("audio"),
        SuggestRecord::new("wireless charger", 80).with_tag("power"),
        SuggestRecord::new("wired earbuds", 50).with_tag("audio"),
    ]
}

pub fn catalog_v2() -> Vec<SuggestRecord> {
    vec![
        SuggestRecord::new("wireless headphones", 120).with_tag("audio"),
        SuggestRecord::new("wireless speaker", 150).with_tag("audio"),
        SuggestRecord::new("wired earbuds", 50).with_tag("audio"),
        SuggestRecord::new("webcam", 40),
    ]
}

/// Blocks loads while closed so tests can hold a rebuild in flight.
#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    fn set(&self, closed: bool) {
        *self.closed.lock().unwrap() = closed;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let mut closed = self.closed.lock().unwrap();
        while *closed {
            let (guard, _) = self
                .changed
                .wait_timeout(closed, Duration::from_secs(10))
                .unwrap();
            closed = guard;
        }
    }
}

/// In-memory provider whose loads can be made to fail, stall, or report a
/// modification time that disagrees with the data.
pub struct ScriptedProvider {
    pub inner: InMemoryDataProvider,
    fail_loads: AtomicBool,
    time_skew: AtomicI64,
    loads: AtomicUsize,
    entered: AtomicUsize,
    gate: Gate,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        ScriptedProvider {
            inner: InMemoryDataProvider::new(name),
            fail_loads: AtomicBool::new(false),
            time_skew: AtomicI64::new(0),
            loads: AtomicUsize::new(0),
            entered: AtomicUsize::new(0),
            gate: Gate::default(),
        }
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn skew_reported_time(&self, skew: i64) {
        self.time_skew.store(skew, Ordering::SeqCst);
    }

    pub fn close_gate(&self) {
        self.gate.set(true);
    }

    pub fn open_gate(&self) {
        self.gate.set(false);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Loads that have started, including ones still waiting at the gate.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

impl SuggestDataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn has_data(&self, tenant: &str) -> bool {
        self.inner.has_data(tenant)
    }

    fn last_modification_time(&self, tenant: &str) -> Result<i64> {
        Ok(self.inner.last_modification_time(tenant)? + self.time_skew.load(Ordering::SeqCst))
    }

    fn load_data(&self, tenant: &str) -> Result<SuggestData> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.wait();
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SuggestError::Io("connection reset by peer".to_string()));
        }
        self.inner.load_data(tenant)
    }
}
