//! In-memory table of outages currently believed active
//!
//! One entry per address key while an outage is in progress. The table holds
//! no polling logic; it is a keyed map with critical sections sized to a
//! single lookup-and-remove or insert, so concurrent per-address checks
//! never serialize on each other's I/O.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{AddressKey, OutageRecord};
use crate::transport::MessageHandle;

/// Live state for one active outage occurrence
///
/// Carries the provider identifiers alongside the record so the address
/// keeps being polled even if its last subscriber unsubscribed mid-outage.
#[derive(Debug, Clone)]
pub struct ActiveOutage {
    /// Durable record, mutated in place on material change
    pub record: OutageRecord,

    /// Last rendered notification text delivered to subscribers
    pub last_sent_text: String,

    /// Last delivered live message per subscriber, for later replacement
    pub live_messages: HashMap<i64, MessageHandle>,

    /// Human-readable address, resolved once at entry creation
    pub address_label: String,

    /// Provider district id needed for the status query
    pub district_id: Option<i64>,
}

impl ActiveOutage {
    pub fn new(record: OutageRecord, address_label: String, district_id: Option<i64>) -> Self {
        Self {
            record,
            last_sent_text: String::new(),
            live_messages: HashMap::new(),
            address_label,
            district_id,
        }
    }

    pub fn key(&self) -> AddressKey {
        self.record.key
    }
}

/// Keyed table of active outages
///
/// Invariant: a key is present iff the engine currently believes an outage
/// is active there, independent of any remaining subscription.
#[derive(Debug, Default)]
pub struct OutageTracker {
    entries: Mutex<HashMap<AddressKey, ActiveOutage>>,
}

impl OutageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the entry for a key
    pub fn insert(&self, entry: ActiveOutage) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(entry.key(), entry);
    }

    /// Remove and return the entry for a key in one locked section
    ///
    /// The per-address check owns the entry between `take` and the
    /// follow-up `insert`; cycles do not overlap, so the temporary absence
    /// is unobservable to the scheduler.
    pub fn take(&self, key: &AddressKey) -> Option<ActiveOutage> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key)
    }

    pub fn contains(&self, key: &AddressKey) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.contains_key(key)
    }

    /// Snapshot of tracked addresses with their district ids
    pub fn active_addresses(&self) -> Vec<(AddressKey, Option<i64>)> {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .map(|e| (e.key(), e.district_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(city: i64) -> ActiveOutage {
        let record = OutageRecord {
            id: city,
            key: AddressKey::new(city, 10, 5),
            ..Default::default()
        };
        ActiveOutage::new(record, format!("Street 5, City {city}"), Some(3))
    }

    #[test]
    fn test_insert_take_roundtrip() {
        let tracker = OutageTracker::new();
        let key = AddressKey::new(1, 10, 5);

        assert!(!tracker.contains(&key));
        tracker.insert(entry(1));
        assert!(tracker.contains(&key));

        let taken = tracker.take(&key).unwrap();
        assert_eq!(taken.record.id, 1);
        assert!(!tracker.contains(&key));
        assert!(tracker.take(&key).is_none());
    }

    #[test]
    fn test_active_addresses_snapshot() {
        let tracker = OutageTracker::new();
        tracker.insert(entry(1));
        tracker.insert(entry(2));

        let mut addresses = tracker.active_addresses();
        addresses.sort_by_key(|(k, _)| k.city_id);
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0], (AddressKey::new(1, 10, 5), Some(3)));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let tracker = OutageTracker::new();
        tracker.insert(entry(1));

        let mut updated = entry(1);
        updated.last_sent_text = "updated".into();
        tracker.insert(updated);

        assert_eq!(tracker.len(), 1);
        let taken = tracker.take(&AddressKey::new(1, 10, 5)).unwrap();
        assert_eq!(taken.last_sent_text, "updated");
    }
}
