//! What a finished session leaves behind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use wristlink_common::{DeviceDescriptor, ErrorReport, QuantitySample, WorkoutEvent, WorkoutState};

use crate::activity::compute_active_duration;

/// How a finalized session came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The wrist reported that the workout ended.
    Completed,
    /// The session was finalized before the wrist reported an end.
    Abandoned,
}

/// Immutable outcome of one workout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Last state reported by the wrist before finalization
    pub final_state: WorkoutState,
    /// First error the wrist reported
    pub terminal_error: Option<ErrorReport>,
    /// Peer device, when one was attached
    pub device: Option<DeviceDescriptor>,
    /// Samples by quantity type, in arrival order
    pub samples: BTreeMap<String, Vec<QuantitySample>>,
    /// Lifecycle events, in arrival order
    pub events: Vec<WorkoutEvent>,
    /// When `start` sent the initial instruction
    pub started_at: Option<DateTime<Utc>>,
    /// When `finalize` built the record
    pub finalized_at: DateTime<Utc>,
    /// Whether the handheld asked the wrist to stop
    pub user_ended: bool,
    /// Whether the wrist reported the end itself
    pub end_reason: EndReason,
    /// Seconds between start and finalization, minus paused spans
    pub active_duration: f64,
}

impl SessionRecord {
    /// Samples of one quantity type; empty when none arrived.
    pub fn samples_of(&self, quantity_type: &str) -> &[QuantitySample] {
        self.samples
            .get(quantity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total samples across all quantity types.
    pub fn sample_count(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }
}

/// Mutable accumulator behind a [`SessionRecord`].
#[derive(Debug, Default)]
pub(crate) struct RecordDraft {
    terminal_error: Option<ErrorReport>,
    device: Option<DeviceDescriptor>,
    samples: BTreeMap<String, Vec<QuantitySample>>,
    events: Vec<WorkoutEvent>,
    user_ended: bool,
}

impl RecordDraft {
    pub(crate) fn add_samples(&mut self, quantity_type: &str, samples: &[QuantitySample]) {
        self.samples
            .entry(quantity_type.to_string())
            .or_default()
            .extend_from_slice(samples);
    }

    pub(crate) fn add_event(&mut self, event: &WorkoutEvent) {
        self.events.push(event.clone());
    }

    /// Keep the first error only. Returns whether `error` became terminal.
    pub(crate) fn record_error(&mut self, error: &ErrorReport) -> bool {
        if self.terminal_error.is_some() {
            debug!("Session already has a terminal error; not replacing it with {error}");
            return false;
        }
        self.terminal_error = Some(error.clone());
        true
    }

    /// Capture the device once. Returns whether `device` was captured.
    pub(crate) fn attach_device(&mut self, device: DeviceDescriptor) -> bool {
        if self.device.is_some() {
            return false;
        }
        self.device = Some(device);
        true
    }

    pub(crate) fn mark_user_ended(&mut self) {
        self.user_ended = true;
    }

    pub(crate) fn finish(
        self,
        final_state: WorkoutState,
        started_at: Option<DateTime<Utc>>,
        finalized_at: DateTime<Utc>,
    ) -> SessionRecord {
        let active_duration = compute_active_duration(&self.events, started_at, finalized_at);
        let end_reason = if final_state == WorkoutState::Ended {
            EndReason::Completed
        } else {
            EndReason::Abandoned
        };
        SessionRecord {
            final_state,
            terminal_error: self.terminal_error,
            device: self.device,
            samples: self.samples,
            events: self.events,
            started_at,
            finalized_at,
            user_ended: self.user_ended,
            end_reason,
            active_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_is_terminal() {
        let mut draft = RecordDraft::default();
        assert!(draft.record_error(&ErrorReport::new(1)));
        assert!(!draft.record_error(&ErrorReport::new(2)));
        let record = draft.finish(WorkoutState::Running, None, Utc::now());
        assert_eq!(record.terminal_error, Some(ErrorReport::new(1)));
        assert_eq!(record.end_reason, EndReason::Abandoned);
    }

    #[test]
    fn test_device_is_captured_once() {
        let mut draft = RecordDraft::default();
        assert!(draft.attach_device(DeviceDescriptor::default().with_name("Left")));
        assert!(!draft.attach_device(DeviceDescriptor::default().with_name("Right")));
        let record = draft.finish(WorkoutState::Ended, None, Utc::now());
        assert_eq!(record.device.as_ref().and_then(|d| d.name()), Some("Left"));
        assert_eq!(record.end_reason, EndReason::Completed);
    }

    #[test]
    fn test_samples_are_grouped_by_type() {
        let mut draft = RecordDraft::default();
        draft.add_samples("heartRate", &[QuantitySample::new(72.0)]);
        draft.add_samples("activeEnergyBurned", &[QuantitySample::new(1.5)]);
        draft.add_samples("heartRate", &[QuantitySample::new(75.0)]);
        let record = draft.finish(WorkoutState::Running, None, Utc::now());

        let rates: Vec<f64> = record.samples_of("heartRate").iter().map(|s| s.value).collect();
        assert_eq!(rates, vec![72.0, 75.0]);
        assert_eq!(record.sample_count(), 3);
        assert!(record.samples_of("distanceCycling").is_empty());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = RecordDraft::default().finish(WorkoutState::Starting, None, Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["finalState"], "Starting");
        assert_eq!(json["endReason"], "abandoned");
        assert_eq!(json["userEnded"], false);
        assert_eq!(json["activeDuration"], 0.0);
    }
}
