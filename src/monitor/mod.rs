//! Polling monitor
//!
//! Repeatedly sweeps every address worth checking (subscribed addresses
//! plus anything still tracked as active), staggering the per-address
//! checks so the provider sees a smooth request stream, then sleeps for a
//! cycle gap and goes again until stopped.

pub mod dispatcher;
pub mod lifecycle;
pub mod render;
pub mod tracker;

pub use dispatcher::Notifier;
pub use lifecycle::{LifecycleEngine, Transition};
pub use tracker::{ActiveOutage, OutageTracker};

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::models::AddressKey;
use crate::storage::OutageStore;

/// The polling loop: owns the stop flag, delegates each address to the
/// lifecycle engine
pub struct OutageMonitor {
    engine: Arc<LifecycleEngine>,
    store: Arc<dyn OutageStore>,
    tracker: Arc<OutageTracker>,
    cycle_gap: Duration,
    stagger: Duration,
    running: AtomicBool,
}

impl OutageMonitor {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        store: Arc<dyn OutageStore>,
        tracker: Arc<OutageTracker>,
        cycle_gap: Duration,
        stagger: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            tracker,
            cycle_gap,
            stagger,
            running: AtomicBool::new(false),
        }
    }

    /// Addresses for the next cycle: the union of subscribed addresses and
    /// addresses with an active outage
    ///
    /// Tracked-but-unsubscribed addresses stay in the sweep so their end
    /// transition is still observed after the last subscriber leaves.
    pub async fn addresses_to_check(&self) -> Vec<(AddressKey, Option<i64>)> {
        let mut merged: HashMap<AddressKey, Option<i64>> = HashMap::new();

        match self.store.monitored_addresses().await {
            Ok(rows) => {
                for (key, district_id) in rows {
                    merged.insert(key, district_id);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Monitored address lookup failed, sweeping active outages only");
            }
        }

        for (key, district_id) in self.tracker.active_addresses() {
            merged.entry(key).or_insert(district_id);
        }

        merged.into_iter().collect()
    }

    /// Run polling cycles until [`stop`](Self::stop) is called
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Outage monitoring started");

        while self.running.load(Ordering::SeqCst) {
            let addresses = self.addresses_to_check().await;
            tracing::debug!(count = addresses.len(), "Starting polling cycle");

            let mut checks = Vec::with_capacity(addresses.len());
            for (key, district_id) in addresses {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                let engine = Arc::clone(&self.engine);
                checks.push(tokio::spawn(async move {
                    if let Err(e) = engine.check_address(key, district_id).await {
                        tracing::warn!(address = %key, error = %e, "Address check failed");
                    }
                }));
                tokio::time::sleep(self.stagger).await;
            }

            for joined in join_all(checks).await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Address check task panicked");
                }
            }

            if self.running.load(Ordering::SeqCst) {
                tokio::time::sleep(self.cycle_gap).await;
            }
        }

        tracing::info!("Outage monitoring stopped");
    }

    /// Request a stop; in-flight checks finish, no new ones are dispatched
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Stopping outage monitoring");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
