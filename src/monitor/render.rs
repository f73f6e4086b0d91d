//! Notification text rendering
//!
//! Messages are rendered deterministically from the outage record, so two
//! renders of the same record are byte-identical. The dispatcher relies on
//! that: a re-render only happens after a confirmed material change.

use chrono::NaiveDateTime;

use crate::models::OutageRecord;

/// Provider's generic fault description, not worth showing to subscribers
/// (Hebrew "other", verbatim wire value)
const GENERIC_TROUBLE: &str = "אחר";

fn short_time(time: NaiveDateTime) -> String {
    time.format("%d/%m %H:%M").to_string()
}

fn full_time(time: NaiveDateTime) -> String {
    time.format("%H:%M %d/%m/%y").to_string()
}

/// Human-readable duration between outage start and end
pub fn duration_text(start: NaiveDateTime, end: NaiveDateTime) -> String {
    let minutes = (end - start).num_minutes().max(1);
    if minutes < 60 {
        return format!("{minutes} min");
    }

    let hours = minutes / 60;
    let rest = minutes % 60;
    if rest == 0 {
        format!("{hours} h")
    } else {
        format!("{hours} h {rest} min")
    }
}

/// Full detail text for a new or updated outage
pub fn detail_text(record: &OutageRecord, address_label: &str) -> String {
    let mut text = if record.is_planned {
        format!("Planned power outage at {address_label}\n\n")
    } else {
        format!("Power outage at {address_label}\n\n")
    };

    if let Some(start) = record.start_time {
        text.push_str(&format!("<b>Started:</b> {}\n", short_time(start)));
    }

    if let Some(estimate) = record.restore_estimate {
        text.push_str(&format!(
            "<b>Estimated restore:</b> {}\n",
            short_time(estimate)
        ));
    }

    if let Some(source) = &record.source_desc {
        text.push_str(&format!("<b>Reported by:</b> {source}\n"));
    }

    if let Some(trouble) = &record.trouble_desc {
        if trouble != GENERIC_TROUBLE {
            text.push_str(&format!("<b>Fault:</b> {trouble}\n"));
        }
    }

    if let Some(crew) = &record.crew_name {
        let assigned = record
            .crew_assigned_time
            .map(|t| format!(" ({})", short_time(t)))
            .unwrap_or_default();
        text.push_str(&format!("<b>Crew:</b> {crew}{assigned}\n"));
    }

    if let Some(delay) = &record.delay_cause_desc {
        text.push_str(&format!("<b>Delay cause:</b> {delay}"));
    }

    text.trim_end().to_string()
}

/// Summary text for an ended outage (duration, start, end)
pub fn ended_text(record: &OutageRecord, address_label: &str) -> String {
    let mut text = format!("Power restored at {address_label}\n\n");

    if let (Some(start), Some(end)) = (record.start_time, record.end_time) {
        text.push_str(&format!("<b>Duration:</b> {}\n", duration_text(start, end)));
        text.push_str(&format!("<b>Started:</b> {}\n", full_time(start)));
        text.push_str(&format!("<b>Ended:</b> {}", full_time(end)));
    }

    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AddressKey, OutageStatus};
    use chrono::NaiveDate;

    fn time(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record() -> OutageRecord {
        let status = OutageStatus {
            active_incident: true,
            outage_start: Some(time(11, 19)),
            source_desc: Some("DMS".into()),
            trouble_desc: Some("Backup mechanism".into()),
            crew_name: Some("North 3".into()),
            crew_assigned_time: Some(time(11, 54)),
            restore_estimate: Some(time(14, 19)),
            ..Default::default()
        };
        OutageRecord::from_status(AddressKey::new(5000, 312, 7), &status)
    }

    #[test]
    fn test_detail_text_full() {
        let text = detail_text(&record(), "Herzl 7, Tel Aviv");
        assert!(text.starts_with("Power outage at Herzl 7, Tel Aviv"));
        assert!(text.contains("<b>Started:</b> 05/12 11:19"));
        assert!(text.contains("<b>Estimated restore:</b> 05/12 14:19"));
        assert!(text.contains("<b>Reported by:</b> DMS"));
        assert!(text.contains("<b>Fault:</b> Backup mechanism"));
        assert!(text.contains("<b>Crew:</b> North 3 (05/12 11:54)"));
        assert!(!text.contains("Delay cause"));
    }

    #[test]
    fn test_detail_text_planned_prefix() {
        let mut planned = record();
        planned.is_planned = true;
        let text = detail_text(&planned, "Herzl 7, Tel Aviv");
        assert!(text.starts_with("Planned power outage at"));
    }

    #[test]
    fn test_detail_text_generic_trouble_hidden() {
        let mut generic = record();
        generic.trouble_desc = Some(GENERIC_TROUBLE.into());
        let text = detail_text(&generic, "Herzl 7, Tel Aviv");
        assert!(!text.contains("<b>Fault:</b>"));
    }

    #[test]
    fn test_detail_text_is_deterministic() {
        let record = record();
        assert_eq!(
            detail_text(&record, "Herzl 7, Tel Aviv"),
            detail_text(&record, "Herzl 7, Tel Aviv")
        );
    }

    #[test]
    fn test_ended_text() {
        let mut ended = record();
        ended.end_time = Some(time(14, 41));
        let text = ended_text(&ended, "Herzl 7, Tel Aviv");
        assert!(text.starts_with("Power restored at Herzl 7, Tel Aviv"));
        assert!(text.contains("<b>Duration:</b> 3 h 22 min"));
        assert!(text.contains("<b>Started:</b> 11:19 05/12/24"));
        assert!(text.contains("<b>Ended:</b> 14:41 05/12/24"));
    }

    #[test]
    fn test_duration_text() {
        assert_eq!(duration_text(time(11, 0), time(11, 0)), "1 min");
        assert_eq!(duration_text(time(11, 0), time(11, 45)), "45 min");
        assert_eq!(duration_text(time(11, 0), time(13, 0)), "2 h");
        assert_eq!(duration_text(time(11, 0), time(14, 22)), "3 h 22 min");
    }
}
