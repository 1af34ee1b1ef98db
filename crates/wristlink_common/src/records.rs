//! Records carried inside message payloads.
//!
//! The core routes these by type without interpreting them: a sample is a
//! number with optional unit and time range, an event is a lifecycle marker,
//! an error is a code with optional context.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MalformedMessage;
use crate::fields::{FieldMap, FieldValue};
use crate::messages::WorkoutState;

/// One measurement of a tracked quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantitySample {
    /// The measured value, in `unit` if given
    pub value: f64,
    /// Unit string as reported by the sensor source (e.g. "count/min")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

const SAMPLE: &str = "sample";

impl QuantitySample {
    /// A sample carrying only a value.
    pub fn new(value: f64) -> Self {
        Self {
            value,
            unit: None,
            start_date: None,
            end_date: None,
        }
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the time range the sample covers.
    pub fn with_dates(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Bare values are written as plain numbers, anything richer as a map.
    pub fn to_field_value(&self) -> FieldValue {
        if self.unit.is_none() && self.start_date.is_none() && self.end_date.is_none() {
            return FieldValue::Float(self.value);
        }
        let mut map = FieldMap::new();
        map.insert("value", self.value);
        map.insert_opt("unit", self.unit.clone());
        map.insert_opt("startDate", self.start_date.as_ref().map(FieldValue::timestamp));
        map.insert_opt("endDate", self.end_date.as_ref().map(FieldValue::timestamp));
        FieldValue::Map(map)
    }

    /// Decode a sample from either a bare number or a map.
    pub fn from_field_value(value: &FieldValue) -> Result<Self, MalformedMessage> {
        match value {
            FieldValue::Map(map) => {
                let value = map
                    .optional_f64(SAMPLE, "value")?
                    .ok_or(MalformedMessage::MissingField { kind: SAMPLE, field: "value" })?;
                Ok(Self {
                    value,
                    unit: map.optional_str(SAMPLE, "unit")?.map(str::to_string),
                    start_date: map.optional_timestamp(SAMPLE, "startDate")?,
                    end_date: map.optional_timestamp(SAMPLE, "endDate")?,
                })
            }
            other => other.as_f64().map(Self::new).ok_or_else(|| MalformedMessage::InvalidField {
                kind: SAMPLE,
                field: "value",
                reason: format!("expected number or map, found {}", other.kind_name()),
            }),
        }
    }
}

/// The kind of lifecycle event the wrist session generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WorkoutEventType {
    Pause,
    Resume,
    Lap,
    Marker,
    MotionPaused,
    MotionResumed,
    /// An event type this version does not know; kept verbatim.
    Other(String),
}

impl WorkoutEventType {
    /// Wire identifier for the event type.
    pub fn as_str(&self) -> &str {
        match self {
            WorkoutEventType::Pause => "pause",
            WorkoutEventType::Resume => "resume",
            WorkoutEventType::Lap => "lap",
            WorkoutEventType::Marker => "marker",
            WorkoutEventType::MotionPaused => "motionPaused",
            WorkoutEventType::MotionResumed => "motionResumed",
            WorkoutEventType::Other(other) => other,
        }
    }
}

impl FromStr for WorkoutEventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pause" => WorkoutEventType::Pause,
            "resume" => WorkoutEventType::Resume,
            "lap" => WorkoutEventType::Lap,
            "marker" => WorkoutEventType::Marker,
            "motionPaused" => WorkoutEventType::MotionPaused,
            "motionResumed" => WorkoutEventType::MotionResumed,
            other => WorkoutEventType::Other(other.to_string()),
        })
    }
}

impl TryFrom<String> for WorkoutEventType {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkoutEventType> for String {
    fn from(value: WorkoutEventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for WorkoutEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workout lifecycle event reported by the wrist device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<WorkoutEventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// Session state the event reports, if the event carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkoutState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FieldMap>,
}

const EVENT: &str = "event record";

impl WorkoutEvent {
    /// An event of the given type happening at `date`.
    pub fn new(event_type: WorkoutEventType, date: DateTime<Utc>) -> Self {
        Self {
            event_type: Some(event_type),
            date: Some(date),
            ..Default::default()
        }
    }

    /// An event that only reports a session state.
    pub fn state_report(state: WorkoutState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    /// Attach the session state the event reports.
    pub fn with_state(mut self, state: WorkoutState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn to_fields(&self) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert_opt("type", self.event_type.as_ref().map(WorkoutEventType::as_str));
        map.insert_opt("date", self.date.as_ref().map(FieldValue::timestamp));
        map.insert_opt("state", self.state.map(|s| s.as_str()));
        map.insert_opt("metadata", self.metadata.clone());
        map
    }

    pub fn from_fields(map: &FieldMap) -> Result<Self, MalformedMessage> {
        Ok(Self {
            event_type: map.optional_parsed(EVENT, "type")?,
            date: map.optional_timestamp(EVENT, "date")?,
            state: map.optional_parsed(EVENT, "state")?,
            metadata: map.optional_map(EVENT, "metadata")?.cloned(),
        })
    }
}

/// An error raised by the wrist session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Human-readable description, if the source supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

const ERROR: &str = "error record";

impl ErrorReport {
    pub fn new(code: i64) -> Self {
        Self {
            code,
            domain: None,
            description: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn to_fields(&self) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("code", self.code);
        map.insert_opt("domain", self.domain.clone());
        map.insert_opt("description", self.description.clone());
        map
    }

    pub fn from_fields(map: &FieldMap) -> Result<Self, MalformedMessage> {
        Ok(Self {
            code: map
                .optional_i64(ERROR, "code")?
                .ok_or(MalformedMessage::MissingField { kind: ERROR, field: "code" })?,
            domain: map.optional_str(ERROR, "domain")?.map(str::to_string),
            description: map.optional_str(ERROR, "description")?.map(str::to_string),
        })
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.domain, &self.description) {
            (Some(domain), Some(description)) => write!(f, "{domain} ({}): {description}", self.code),
            (Some(domain), None) => write!(f, "{domain} ({})", self.code),
            (None, Some(description)) => write!(f, "error {}: {description}", self.code),
            (None, None) => write!(f, "error {}", self.code),
        }
    }
}

/// Identity of the peer device a session ran on.
///
/// Built once when the peer is identified. There are no setters: the builder
/// methods consume the value, so a captured descriptor cannot change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hardware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    software_version: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(
        name: Option<String>,
        manufacturer: Option<String>,
        model: Option<String>,
        hardware_version: Option<String>,
        software_version: Option<String>,
    ) -> Self {
        Self {
            name,
            manufacturer,
            model,
            hardware_version,
            software_version,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_hardware_version(mut self, version: impl Into<String>) -> Self {
        self.hardware_version = Some(version.into());
        self
    }

    pub fn with_software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = Some(version.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn hardware_version(&self) -> Option<&str> {
        self.hardware_version.as_deref()
    }

    pub fn software_version(&self) -> Option<&str> {
        self.software_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_sample_is_a_plain_number() {
        let sample = QuantitySample::new(72.0);
        assert_eq!(sample.to_field_value(), FieldValue::Float(72.0));
        assert_eq!(
            QuantitySample::from_field_value(&FieldValue::Int(75)).unwrap(),
            QuantitySample::new(75.0)
        );
    }

    #[test]
    fn test_rich_sample_keeps_unit_and_dates() {
        let start = DateTime::from_timestamp(1_760_000_000, 0).unwrap();
        let end = DateTime::from_timestamp(1_760_000_005, 250_000_000).unwrap();
        let sample = QuantitySample::new(1.5).with_unit("m").with_dates(start, end);

        let decoded = QuantitySample::from_field_value(&sample.to_field_value()).unwrap();
        assert_eq!(decoded, sample);
    }

    #[test]
    fn test_sample_rejects_text() {
        let err = QuantitySample::from_field_value(&FieldValue::Text("72".into())).unwrap_err();
        assert!(matches!(err, MalformedMessage::InvalidField { kind: "sample", .. }));
    }

    #[test]
    fn test_unknown_event_type_is_preserved() {
        let mut map = FieldMap::new();
        map.insert("type", "segment");
        map.insert("futureField", 1i64);

        let event = WorkoutEvent::from_fields(&map).unwrap();
        assert_eq!(event.event_type, Some(WorkoutEventType::Other("segment".into())));
        // Unknown keys are dropped, known ones survive
        assert_eq!(event.to_fields().get("type"), Some(&FieldValue::Text("segment".into())));
        assert!(!event.to_fields().contains_key("futureField"));
    }

    #[test]
    fn test_event_state_must_be_a_known_state() {
        let mut map = FieldMap::new();
        map.insert("state", "Sprinting");
        assert!(WorkoutEvent::from_fields(&map).is_err());
    }

    #[test]
    fn test_error_report_requires_code() {
        let mut map = FieldMap::new();
        map.insert("domain", "HKErrorDomain");
        assert_eq!(
            ErrorReport::from_fields(&map),
            Err(MalformedMessage::MissingField { kind: "error record", field: "code" })
        );
    }

    #[test]
    fn test_error_report_display() {
        let report = ErrorReport::new(5).with_domain("HKErrorDomain").with_description("not authorized");
        assert_eq!(report.to_string(), "HKErrorDomain (5): not authorized");
        assert_eq!(ErrorReport::new(1).to_string(), "error 1");
    }

    #[test]
    fn test_device_descriptor_json_uses_camel_case() {
        let device = DeviceDescriptor::default()
            .with_name("Watch")
            .with_hardware_version("Watch6,1");
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "Watch", "hardwareVersion": "Watch6,1" }));
        assert_eq!(device.manufacturer(), None);
    }
}
