use super::SuggestManager;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Spawns the periodic freshness loop. The loop only holds a weak handle and
/// ends on the first tick after the manager is dropped or shut down.
pub(crate) fn spawn_updater(manager: Weak<SuggestManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(run_updates(manager, period))
}

async fn run_updates(manager_weak: Weak<SuggestManager>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let manager = match manager_weak.upgrade() {
            Some(m) => m,
            None => break,
        };
        if manager.is_shut_down() {
            break;
        }
        update_cycle(&manager);
    }
    tracing::debug!("[UPDATER] stopped");
}

/// One tick: evict idle tenants, then check every remaining tenant. Each
/// refresh runs as its own task so a slow tenant does not delay the others;
/// the rebuild semaphore bounds how many actually build at once.
pub(crate) fn update_cycle(manager: &Arc<SuggestManager>) {
    manager.evict_idle();
    for tenant in manager.loaded_tenants() {
        let m = Arc::clone(manager);
        tokio::spawn(async move {
            // outcome and failures are logged and counted by refresh itself
            let _ = m.refresh(&tenant).await;
        });
    }
}
