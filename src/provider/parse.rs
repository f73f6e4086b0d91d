//! Defensive decoding of provider responses
//!
//! Provider payloads are semi-structured: numeric fields sometimes arrive as
//! strings, most fields may be absent, and the restoration estimate is
//! embedded as free text inside the incident status field. Each field is
//! decoded on its own; a missing or unparseable optional field becomes
//! `None`, never an error.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::OnceLock;

use crate::error::ProviderError;
use crate::models::{City, OutageStatus, Street};

/// Placeholder id the provider uses for unknown directory rows
const UNKNOWN_ID: i64 = 999;

/// Placeholder name the provider uses for unknown directory rows
/// (Hebrew "unknown", verbatim wire value)
const UNKNOWN_NAME: &str = "לא ידוע";

/// Timestamp format used by structured provider fields
const WIRE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn restore_estimate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{2}:\d{2})[ X](\d{2}/\d{2}/\d{4})").unwrap())
}

fn credential_seed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"window\.rbzns=\{(.*?)\};"#).unwrap())
}

fn seed_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']?seed["']?\s*:\s*["']([^"']+)["']"#).unwrap())
}

/// Deserialize a number that may arrive as an integer, float, or string
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(v)) => Some(v),
        Some(Raw::Float(v)) => Some(v as i64),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// Raw address status payload (`CheckInterruptByAddress`)
#[derive(Debug, Deserialize)]
pub(crate) struct RawOutage {
    #[serde(rename = "IsActiveIncident", default)]
    is_active_incident: Option<bool>,
    #[serde(rename = "IsPlannedOutage", default)]
    is_planned_outage: Option<bool>,
    #[serde(rename = "Time_Outage", default)]
    time_outage: Option<String>,
    #[serde(rename = "Time_OutageSpecified", default)]
    time_outage_specified: Option<bool>,
    #[serde(rename = "IncidentID", default, deserialize_with = "lenient_i64")]
    incident_id: Option<i64>,
    #[serde(
        rename = "IncidentSourceCode",
        default,
        deserialize_with = "lenient_i64"
    )]
    incident_source_code: Option<i64>,
    #[serde(rename = "IncidentSourceDesc", default)]
    incident_source_desc: Option<String>,
    #[serde(
        rename = "IncidentStatusCode",
        default,
        deserialize_with = "lenient_i64"
    )]
    incident_status_code: Option<i64>,
    #[serde(rename = "IncidentStatusName", default)]
    incident_status_name: Option<String>,
    #[serde(
        rename = "IncidentTroubleCode",
        default,
        deserialize_with = "lenient_i64"
    )]
    incident_trouble_code: Option<i64>,
    #[serde(rename = "IncidentTroubleDesc", default)]
    incident_trouble_desc: Option<String>,
    #[serde(rename = "DelayCauseCode", default, deserialize_with = "lenient_i64")]
    delay_cause_code: Option<i64>,
    #[serde(rename = "DelayCauseDesc", default)]
    delay_cause_desc: Option<String>,
    #[serde(rename = "CrewName", default)]
    crew_name: Option<String>,
    #[serde(rename = "LastCrewAssignment", default)]
    last_crew_assignment: Option<String>,
    #[serde(rename = "LastCrewAssignmentSpecified", default)]
    last_crew_assignment_specified: Option<bool>,
}

/// Raw city row (`RetrieveCitiesEx`)
#[derive(Debug, Deserialize)]
pub(crate) struct RawCity {
    #[serde(rename = "K_YESHUV", default, deserialize_with = "lenient_i64")]
    id: Option<i64>,
    #[serde(rename = "YESHUV", default)]
    name: Option<String>,
    #[serde(rename = "K_MAHOZ", default, deserialize_with = "lenient_i64")]
    region_id: Option<i64>,
    #[serde(rename = "MAHOZ", default)]
    region_name: Option<String>,
    #[serde(rename = "K_EZOR", default, deserialize_with = "lenient_i64")]
    district_id: Option<i64>,
    #[serde(rename = "EZOR", default)]
    district_name: Option<String>,
}

/// Raw street row (`FindStreets`)
#[derive(Debug, Deserialize)]
pub(crate) struct RawStreet {
    #[serde(rename = "K_REHOV", default, deserialize_with = "lenient_i64")]
    id: Option<i64>,
    #[serde(rename = "REHOV", default)]
    name: Option<String>,
}

/// Whether a directory row is the provider's "unknown" placeholder
fn is_unknown(id: i64, name: &str) -> bool {
    id == UNKNOWN_ID || name == UNKNOWN_NAME
}

/// Extract the restoration estimate embedded in a free-text status field
///
/// The provider writes it as `HH:MM DD/MM/YYYY` (occasionally with an `X`
/// separator) surrounded by arbitrary text. No match means no estimate.
pub fn extract_restore_estimate(status_name: &str) -> Option<NaiveDateTime> {
    let caps = restore_estimate_re().captures(status_name)?;
    let joined = format!("{} {}", &caps[1], &caps[2]);
    NaiveDateTime::parse_from_str(&joined, "%H:%M %d/%m/%Y").ok()
}

/// Extract the session credential seed from the handshake page body
pub(crate) fn extract_credential_seed(body: &str) -> Result<String, ProviderError> {
    let blob = credential_seed_re()
        .captures(body)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ProviderError::Credential("rbzns blob not found in page".into()))?;

    seed_field_re()
        .captures(&blob)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ProviderError::Credential("seed field not found in rbzns blob".into()))
}

fn parse_wire_time(value: Option<&str>, specified: Option<bool>) -> Option<NaiveDateTime> {
    if specified == Some(false) {
        return None;
    }
    NaiveDateTime::parse_from_str(value?, WIRE_TIME_FORMAT).ok()
}

/// Zero-valued codes mean "not set" on the wire
fn nonzero(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v != 0)
}

fn nonempty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Decode an address status response body
pub(crate) fn decode_outage(body: &str) -> Result<OutageStatus, ProviderError> {
    let raw: RawOutage = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    let restore_estimate = raw
        .incident_status_name
        .as_deref()
        .and_then(extract_restore_estimate);

    Ok(OutageStatus {
        active_incident: raw.is_active_incident.unwrap_or(false),
        planned_outage: raw.is_planned_outage.unwrap_or(false),
        outage_start: parse_wire_time(raw.time_outage.as_deref(), raw.time_outage_specified),
        incident_id: nonzero(raw.incident_id),
        source_code: nonzero(raw.incident_source_code),
        source_desc: nonempty(raw.incident_source_desc),
        status_code: nonzero(raw.incident_status_code),
        status_name: nonempty(raw.incident_status_name),
        trouble_code: nonzero(raw.incident_trouble_code),
        trouble_desc: nonempty(raw.incident_trouble_desc),
        delay_cause_code: nonzero(raw.delay_cause_code),
        delay_cause_desc: nonempty(raw.delay_cause_desc),
        crew_name: nonempty(raw.crew_name),
        crew_assigned_time: parse_wire_time(
            raw.last_crew_assignment.as_deref(),
            raw.last_crew_assignment_specified,
        ),
        restore_estimate,
    })
}

/// Decode a city search response body, dropping placeholder rows
pub(crate) fn decode_cities(body: &str) -> Result<Vec<City>, ProviderError> {
    let raw: Vec<RawCity> = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    Ok(raw
        .into_iter()
        .filter_map(|c| {
            let id = c.id?;
            let name = c.name?;
            if is_unknown(id, &name) {
                return None;
            }
            Some(City {
                id,
                name,
                region_id: c.region_id,
                region_name: c.region_name,
                district_id: c.district_id,
                district_name: c.district_name,
            })
        })
        .collect())
}

/// Decode a street search response body, dropping placeholder rows
pub(crate) fn decode_streets(body: &str) -> Result<Vec<Street>, ProviderError> {
    let raw: Vec<RawStreet> = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    Ok(raw
        .into_iter()
        .filter_map(|s| {
            let id = s.id?;
            let name = s.name?;
            if is_unknown(id, &name) {
                return None;
            }
            Some(Street { id, name })
        })
        .collect())
}
