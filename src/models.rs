// Core data structures for the gridwatch monitor

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a monitored address in the provider's namespace
///
/// Derived deterministically from provider identifiers, never from
/// user-supplied text. Used as the key for active-outage tracking and for
/// grouping subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressKey {
    pub city_id: i64,
    pub street_id: i64,
    pub house_num: i64,
}

impl AddressKey {
    pub fn new(city_id: i64, street_id: i64, house_num: i64) -> Self {
        Self {
            city_id,
            street_id,
            house_num,
        }
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.city_id, self.street_id, self.house_num)
    }
}

/// Outage status snapshot fetched from the provider on each poll
///
/// Only the two flags are always present; every descriptive field may be
/// absent in the provider response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutageStatus {
    pub active_incident: bool,
    pub planned_outage: bool,
    pub outage_start: Option<NaiveDateTime>,
    pub incident_id: Option<i64>,
    pub source_code: Option<i64>,
    pub source_desc: Option<String>,
    pub status_code: Option<i64>,
    pub status_name: Option<String>,
    pub trouble_code: Option<i64>,
    pub trouble_desc: Option<String>,
    pub delay_cause_code: Option<i64>,
    pub delay_cause_desc: Option<String>,
    pub crew_name: Option<String>,
    pub crew_assigned_time: Option<NaiveDateTime>,
    pub restore_estimate: Option<NaiveDateTime>,
}

impl OutageStatus {
    /// Whether the provider reports a power interruption at the address
    pub fn is_ongoing(&self) -> bool {
        self.active_incident || self.planned_outage
    }
}

/// Durable record of one outage occurrence at an address
///
/// Created when an address transitions from no-outage to outage, mutated in
/// place while active, end time set exactly once at the ended transition.
#[derive(Debug, Clone, Default)]
pub struct OutageRecord {
    pub id: i64,
    pub key: AddressKey,
    pub is_planned: bool,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub incident_id: Option<i64>,
    pub source_code: Option<i64>,
    pub source_desc: Option<String>,
    pub status_code: Option<i64>,
    pub trouble_code: Option<i64>,
    pub trouble_desc: Option<String>,
    pub delay_cause_code: Option<i64>,
    pub delay_cause_desc: Option<String>,
    pub crew_name: Option<String>,
    pub crew_assigned_time: Option<NaiveDateTime>,
    pub restore_estimate: Option<NaiveDateTime>,
}

impl OutageRecord {
    /// Build a fresh record from a fetched status (id assigned on persist)
    pub fn from_status(key: AddressKey, status: &OutageStatus) -> Self {
        let mut record = Self {
            id: 0,
            key,
            ..Default::default()
        };
        record.apply(status);
        record
    }

    /// Strict field-by-field comparison against a fetched status
    ///
    /// Returns true when every tracked descriptive field is pairwise equal.
    /// Deliberately strict: cosmetic provider jitter on any one field counts
    /// as a material change. The status *name* is excluded; the status code
    /// is not.
    pub fn matches(&self, status: &OutageStatus) -> bool {
        self.is_planned == status.planned_outage
            && self.start_time == status.outage_start
            && self.incident_id == status.incident_id
            && self.source_code == status.source_code
            && self.source_desc == status.source_desc
            && self.status_code == status.status_code
            && self.trouble_code == status.trouble_code
            && self.trouble_desc == status.trouble_desc
            && self.delay_cause_code == status.delay_cause_code
            && self.delay_cause_desc == status.delay_cause_desc
            && self.crew_name == status.crew_name
            && self.crew_assigned_time == status.crew_assigned_time
            && self.restore_estimate == status.restore_estimate
    }

    /// Overwrite the tracked descriptive fields from a fetched status
    pub fn apply(&mut self, status: &OutageStatus) {
        self.is_planned = status.planned_outage;
        self.start_time = status.outage_start;
        self.incident_id = status.incident_id;
        self.source_code = status.source_code;
        self.source_desc = status.source_desc.clone();
        self.status_code = status.status_code;
        self.trouble_code = status.trouble_code;
        self.trouble_desc = status.trouble_desc.clone();
        self.delay_cause_code = status.delay_cause_code;
        self.delay_cause_desc = status.delay_cause_desc.clone();
        self.crew_name = status.crew_name.clone();
        self.crew_assigned_time = status.crew_assigned_time;
        self.restore_estimate = status.restore_estimate;
    }
}

/// City entry from the provider directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub region_id: Option<i64>,
    pub region_name: Option<String>,
    pub district_id: Option<i64>,
    pub district_name: Option<String>,
}

/// Street entry from the provider directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Street {
    pub id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_status() -> OutageStatus {
        OutageStatus {
            active_incident: true,
            planned_outage: false,
            outage_start: NaiveDate::from_ymd_opt(2024, 12, 5)
                .unwrap()
                .and_hms_opt(11, 19, 0),
            incident_id: Some(881234),
            source_code: Some(2),
            source_desc: Some("DMS".into()),
            status_code: Some(4),
            status_name: Some("Crew dispatched".into()),
            trouble_code: Some(17),
            trouble_desc: Some("Backup mechanism".into()),
            delay_cause_code: None,
            delay_cause_desc: None,
            crew_name: Some("North 3".into()),
            crew_assigned_time: NaiveDate::from_ymd_opt(2024, 12, 5)
                .unwrap()
                .and_hms_opt(11, 54, 0),
            restore_estimate: NaiveDate::from_ymd_opt(2024, 12, 5)
                .unwrap()
                .and_hms_opt(14, 19, 0),
        }
    }

    #[test]
    fn test_address_key_display() {
        let key = AddressKey::new(5000, 312, 7);
        assert_eq!(key.to_string(), "5000-312-7");
    }

    #[test]
    fn test_default_record_has_zero_key() {
        let record = OutageRecord::default();
        assert_eq!(record.key, AddressKey::new(0, 0, 0));
        assert_eq!(record.id, 0);
        assert!(record.start_time.is_none());
    }

    #[test]
    fn test_matches_is_reflexive() {
        let status = sample_status();
        let record = OutageRecord::from_status(AddressKey::new(1, 2, 3), &status);
        assert!(record.matches(&status));
    }

    #[test]
    fn test_single_field_jitter_is_material() {
        let status = sample_status();
        let record = OutageRecord::from_status(AddressKey::new(1, 2, 3), &status);

        let mut changed = status.clone();
        changed.crew_name = Some("North 4".into());
        assert!(!record.matches(&changed));

        let mut changed = status;
        changed.status_code = Some(5);
        assert!(!record.matches(&changed));
    }

    #[test]
    fn test_status_name_not_compared() {
        let status = sample_status();
        let record = OutageRecord::from_status(AddressKey::new(1, 2, 3), &status);

        let mut renamed = status;
        renamed.status_name = Some("Crew on site".into());
        assert!(record.matches(&renamed));
    }

    #[test]
    fn test_apply_overwrites_tracked_fields() {
        let status = sample_status();
        let mut record = OutageRecord::from_status(AddressKey::new(1, 2, 3), &status);

        let mut updated = status;
        updated.delay_cause_code = Some(9);
        updated.delay_cause_desc = Some("Unusual fault load".into());
        record.apply(&updated);

        assert!(record.matches(&updated));
        assert_eq!(record.delay_cause_code, Some(9));
    }

    #[test]
    fn test_is_ongoing() {
        let mut status = OutageStatus::default();
        assert!(!status.is_ongoing());

        status.planned_outage = true;
        assert!(status.is_ongoing());

        status.planned_outage = false;
        status.active_incident = true;
        assert!(status.is_ongoing());
    }
}
