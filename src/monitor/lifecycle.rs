//! Per-address outage lifecycle
//!
//! Each address is either Idle (no tracker entry) or Active (entry
//! present). One check runs fetch → classify → persist → notify, strictly
//! in that order; persistence is retried and must succeed before anything
//! is announced, otherwise the in-memory transition is rolled back and the
//! address is re-examined next cycle.

use chrono::{Local, Timelike};
use std::sync::Arc;

use super::dispatcher::Notifier;
use super::render;
use super::tracker::{ActiveOutage, OutageTracker};
use crate::error::Result;
use crate::models::{AddressKey, OutageRecord, OutageStatus};
use crate::provider::ProviderClient;
use crate::storage::OutageStore;
use crate::utils::retry::{with_retry, RetryConfig};

/// Decision for one address check, derived from the fetched status and the
/// tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No outage, nothing tracked
    None,
    /// First sighting: create record, start tracking, notify in full
    New,
    /// Still ongoing: persist and re-notify only on material change
    Update,
    /// Outage over: write end time, notify summary, stop tracking
    End,
}

impl Transition {
    /// Classify from (is the outage ongoing?, is the address tracked?)
    pub fn classify(ongoing: bool, tracked: bool) -> Self {
        match (ongoing, tracked) {
            (false, false) => Self::None,
            (true, false) => Self::New,
            (true, true) => Self::Update,
            (false, true) => Self::End,
        }
    }
}

/// Drives the Idle → Active → Idle state machine for every address
pub struct LifecycleEngine {
    provider: Arc<ProviderClient>,
    store: Arc<dyn OutageStore>,
    notifier: Notifier,
    tracker: Arc<OutageTracker>,
    persist_retry: RetryConfig,
}

impl LifecycleEngine {
    pub fn new(
        provider: Arc<ProviderClient>,
        store: Arc<dyn OutageStore>,
        notifier: Notifier,
        tracker: Arc<OutageTracker>,
        persist_retry: RetryConfig,
    ) -> Self {
        Self {
            provider,
            store,
            notifier,
            tracker,
            persist_retry,
        }
    }

    /// Check one address and run whatever transition applies
    ///
    /// The tracker entry is taken out of the table for the duration of the
    /// check; per-address checks never overlap within a cycle, so the
    /// temporary absence is unobservable.
    pub async fn check_address(&self, key: AddressKey, district_id: Option<i64>) -> Result<()> {
        let status = self.provider.fetch_status(key, district_id).await?;
        let entry = self.tracker.take(&key);

        let transition = Transition::classify(status.is_ongoing(), entry.is_some());
        tracing::debug!(address = %key, transition = ?transition, "Address checked");

        match (transition, entry) {
            (Transition::None, _) => Ok(()),
            (Transition::New, _) => self.start_occurrence(key, district_id, &status).await,
            (Transition::Update, Some(entry)) => self.update_occurrence(entry, &status).await,
            (Transition::End, Some(entry)) => self.end_occurrence(entry).await,
            // classify only yields Update/End for a present entry
            (Transition::Update | Transition::End, None) => Ok(()),
        }
    }

    /// Subscribers for an address; a lookup failure degrades to "nobody"
    /// rather than aborting an already-persisted transition
    async fn subscribers_for(&self, key: AddressKey) -> Vec<i64> {
        match self.store.subscriber_ids(key).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(address = %key, error = %e, "Subscriber lookup failed");
                Vec::new()
            }
        }
    }

    async fn start_occurrence(
        &self,
        key: AddressKey,
        district_id: Option<i64>,
        status: &OutageStatus,
    ) -> Result<()> {
        let mut record = OutageRecord::from_status(key, status);

        let outage_id = with_retry(&self.persist_retry, || async {
            self.store.create_outage(&record).await
        })
        .await?;
        record.id = outage_id;

        let label = self
            .store
            .address_label(key)
            .await
            .unwrap_or_else(|_| key.to_string());
        let mut entry = ActiveOutage::new(record, label, district_id);

        let subscribers = self.subscribers_for(key).await;
        let text = render::detail_text(&entry.record, &entry.address_label);
        self.notifier
            .notify_outage(&subscribers, &mut entry, text)
            .await;

        tracing::info!(address = %key, outage_id = outage_id, "New outage detected");
        self.tracker.insert(entry);
        Ok(())
    }

    async fn update_occurrence(
        &self,
        mut entry: ActiveOutage,
        status: &OutageStatus,
    ) -> Result<()> {
        if entry.record.matches(status) {
            self.tracker.insert(entry);
            return Ok(());
        }

        let mut updated = entry.record.clone();
        updated.apply(status);

        let persisted = with_retry(&self.persist_retry, || async {
            self.store.update_outage(&updated).await
        })
        .await;

        match persisted {
            Ok(()) => {
                let key = entry.key();
                entry.record = updated;

                let subscribers = self.subscribers_for(key).await;
                let text = render::detail_text(&entry.record, &entry.address_label);
                self.notifier
                    .notify_outage(&subscribers, &mut entry, text)
                    .await;

                tracing::info!(address = %key, outage_id = entry.record.id, "Outage updated");
                self.tracker.insert(entry);
                Ok(())
            }
            Err(e) => {
                // old fields kept, no notification; re-diffed next cycle
                self.tracker.insert(entry);
                Err(e.into())
            }
        }
    }

    async fn end_occurrence(&self, mut entry: ActiveOutage) -> Result<()> {
        let now = Local::now().naive_local();
        let end_time = now.with_nanosecond(0).unwrap_or(now);
        let outage_id = entry.record.id;

        let persisted = with_retry(&self.persist_retry, || async {
            self.store.set_outage_end(outage_id, end_time).await
        })
        .await;

        match persisted {
            Ok(()) => {
                let key = entry.key();
                entry.record.end_time = Some(end_time);

                let subscribers = self.subscribers_for(key).await;
                let text = render::ended_text(&entry.record, &entry.address_label);
                self.notifier.notify_ended(&subscribers, &entry, &text).await;

                tracing::info!(address = %key, outage_id = outage_id, "Outage end detected");
                // entry dropped: the address leaves the active table
                Ok(())
            }
            Err(e) => {
                // end not committed; keep tracking and retry next cycle
                self.tracker.insert(entry);
                Err(e.into())
            }
        }
    }
}
