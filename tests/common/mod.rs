//! Common test utilities

use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use gridwatch::error::{PersistenceError, TransportError};
use gridwatch::models::{AddressKey, City, OutageRecord, Street};
use gridwatch::storage::OutageStore;
use gridwatch::transport::{MessageHandle, Transport};

/// Address status body for an active unplanned incident
#[allow(dead_code)]
pub fn active_outage_body(incident_id: i64) -> String {
    format!(
        r#"{{
            "IsActiveIncident": true,
            "IsPlannedOutage": false,
            "Time_Outage": "2024-12-05T11:19:00",
            "Time_OutageSpecified": true,
            "IncidentID": {incident_id},
            "IncidentSourceCode": 2,
            "IncidentSourceDesc": "DMS",
            "IncidentStatusCode": 4,
            "IncidentStatusName": "Estimated restore 14:19 05/12/2024",
            "IncidentTroubleCode": 17,
            "IncidentTroubleDesc": "Backup mechanism",
            "CrewName": "North 3",
            "LastCrewAssignment": "2024-12-05T11:54:00",
            "LastCrewAssignmentSpecified": true
        }}"#
    )
}

/// Address status body after the crew on the same incident changed
#[allow(dead_code)]
pub fn updated_outage_body(incident_id: i64) -> String {
    active_outage_body(incident_id).replace("North 3", "North 5")
}

/// Address status body for an address with power
#[allow(dead_code)]
pub fn quiet_body() -> &'static str {
    r#"{"IsActiveIncident": false, "IsPlannedOutage": false}"#
}

/// In-memory [`OutageStore`] with write counters and failure injection
#[derive(Default)]
#[allow(dead_code)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    /// Number of upcoming outage writes that will fail
    fail_writes: AtomicU32,
    pub creates: AtomicU32,
    pub updates: AtomicU32,
    pub ends: AtomicU32,
}

#[derive(Default)]
struct MemoryInner {
    outages: HashMap<i64, OutageRecord>,
    next_id: i64,
    subscriptions: HashMap<AddressKey, Vec<i64>>,
    labels: HashMap<AddressKey, String>,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, key: AddressKey, subscriber_id: i64) -> Self {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .entry(key)
            .or_default()
            .push(subscriber_id);
        self
    }

    pub fn with_label(self, key: AddressKey, label: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .labels
            .insert(key, label.to_string());
        self
    }

    /// Make the next `n` outage writes fail with a database error
    pub fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub fn outage(&self, id: i64) -> Option<OutageRecord> {
        self.inner.lock().unwrap().outages.get(&id).cloned()
    }

    fn check_write(&self) -> Result<(), PersistenceError> {
        if self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PersistenceError::NotFound("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OutageStore for MemoryStore {
    async fn create_outage(&self, record: &OutageRecord) -> Result<i64, PersistenceError> {
        self.check_write()?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        let mut stored = record.clone();
        stored.id = id;
        inner.outages.insert(id, stored);
        Ok(id)
    }

    async fn update_outage(&self, record: &OutageRecord) -> Result<(), PersistenceError> {
        self.check_write()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        match inner.outages.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(PersistenceError::NotFound(format!(
                "outage {} not found",
                record.id
            ))),
        }
    }

    async fn set_outage_end(
        &self,
        outage_id: i64,
        end_time: NaiveDateTime,
    ) -> Result<(), PersistenceError> {
        self.check_write()?;
        self.ends.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        match inner.outages.get_mut(&outage_id) {
            Some(stored) => {
                stored.end_time = Some(end_time);
                Ok(())
            }
            None => Err(PersistenceError::NotFound(format!(
                "outage {outage_id} not found"
            ))),
        }
    }

    async fn subscriber_ids(&self, key: AddressKey) -> Result<Vec<i64>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .subscriptions
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn monitored_addresses(
        &self,
    ) -> Result<Vec<(AddressKey, Option<i64>)>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .subscriptions
            .keys()
            .map(|key| (*key, None))
            .collect())
    }

    async fn address_label(&self, key: AddressKey) -> Result<String, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .labels
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.to_string()))
    }

    async fn upsert_city(&self, _city: &City) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn upsert_street(
        &self,
        _city_id: i64,
        _street: &Street,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn add_subscription(
        &self,
        subscriber_id: i64,
        key: AddressKey,
    ) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .entry(key)
            .or_default()
            .push(subscriber_id);
        Ok(())
    }

    async fn subscription_count(&self, subscriber_id: i64) -> Result<usize, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .subscriptions
            .values()
            .filter(|subs| subs.contains(&subscriber_id))
            .count())
    }
}

/// [`Transport`] double that records every send and delete
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingTransport {
    next_handle: AtomicI64,
    pub sent: Mutex<Vec<(i64, String)>>,
    pub deleted: Mutex<Vec<(i64, MessageHandle)>>,
    failing: Mutex<Vec<i64>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to this subscriber fail
    pub fn fail_subscriber(&self, subscriber_id: i64) {
        self.failing.lock().unwrap().push(subscriber_id);
    }

    pub fn sent_texts(&self, subscriber_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == subscriber_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deleted.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        subscriber_id: i64,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        if self.failing.lock().unwrap().contains(&subscriber_id) {
            return Err(TransportError::Rejected {
                subscriber_id,
                description: "bot was blocked by the user".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscriber_id, text.to_string()));
        Ok(MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn delete_message(
        &self,
        subscriber_id: i64,
        handle: MessageHandle,
    ) -> Result<(), TransportError> {
        self.deleted.lock().unwrap().push((subscriber_id, handle));
        Ok(())
    }
}
