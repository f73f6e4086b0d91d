//! Notification fan-out with live-message replacement
//!
//! At most one live message per subscriber per active occurrence: before a
//! new "outage in progress" text goes out, every previously delivered live
//! message is deleted best-effort, then the fresh text is sent and its
//! handle recorded. The ended summary is sent once and leaves earlier live
//! messages in place as the last-known status.
//!
//! The dispatcher never re-checks text equality; the lifecycle engine only
//! calls it after confirming a material change.

use futures::future::join_all;
use std::sync::Arc;

use super::tracker::ActiveOutage;
use crate::transport::Transport;

/// Fans rendered messages out to subscribers
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Replace the live message for every subscriber of an active outage
    ///
    /// Per-subscriber failures are logged and ignored: a blocked bot or
    /// deleted account must not prevent delivery to the others. Delete
    /// failures are expected (the prior message may already be gone) and
    /// only logged at debug.
    pub async fn notify_outage(
        &self,
        subscriber_ids: &[i64],
        entry: &mut ActiveOutage,
        text: String,
    ) {
        if subscriber_ids.is_empty() {
            return;
        }

        let deletes = entry.live_messages.iter().map(|(&subscriber_id, &handle)| {
            let transport = Arc::clone(&self.transport);
            async move {
                if let Err(e) = transport.delete_message(subscriber_id, handle).await {
                    tracing::debug!(
                        subscriber_id = subscriber_id,
                        error = %e,
                        "Stale live message delete failed"
                    );
                }
            }
        });
        join_all(deletes).await;
        entry.live_messages.clear();

        let sends = subscriber_ids.iter().map(|&subscriber_id| {
            let transport = Arc::clone(&self.transport);
            let text = &text;
            async move { (subscriber_id, transport.send_message(subscriber_id, text).await) }
        });

        for (subscriber_id, result) in join_all(sends).await {
            match result {
                Ok(handle) => {
                    entry.live_messages.insert(subscriber_id, handle);
                }
                Err(e) => {
                    tracing::warn!(
                        subscriber_id = subscriber_id,
                        address = %entry.key(),
                        error = %e,
                        "Outage notification failed"
                    );
                }
            }
        }

        entry.last_sent_text = text;
    }

    /// Deliver the ended summary once per subscriber
    ///
    /// No deletes, no retries, no handle bookkeeping; the previous live
    /// messages stay as the final outage status.
    pub async fn notify_ended(&self, subscriber_ids: &[i64], entry: &ActiveOutage, text: &str) {
        if subscriber_ids.is_empty() {
            return;
        }

        let sends = subscriber_ids.iter().map(|&subscriber_id| {
            let transport = Arc::clone(&self.transport);
            async move { (subscriber_id, transport.send_message(subscriber_id, text).await) }
        });

        for (subscriber_id, result) in join_all(sends).await {
            if let Err(e) = result {
                tracing::warn!(
                    subscriber_id = subscriber_id,
                    address = %entry.key(),
                    error = %e,
                    "Ended notification failed"
                );
            }
        }
    }
}
