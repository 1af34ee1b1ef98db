//! Configuration for the session endpoints.

use serde::{Deserialize, Serialize};

use crate::activity::{self, ActivityType, LocationType};

/// Behaviour knobs shared by the handheld orchestrator and the wrist peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// How many recent message identifiers are remembered for duplicate
    /// detection. The oldest identifier is forgotten first.
    pub duplicate_capacity: usize,
    /// Drop inbound messages whose timestamp is earlier than the local
    /// session start.
    pub reject_stale: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duplicate_capacity: 256,
            reject_stale: false,
        }
    }
}

impl SessionConfig {
    /// Remember up to `capacity` identifiers for duplicate detection.
    pub fn with_duplicate_capacity(mut self, capacity: usize) -> Self {
        self.duplicate_capacity = capacity;
        self
    }

    /// Turn stale-message rejection on or off.
    pub fn with_stale_rejection(mut self, reject: bool) -> Self {
        self.reject_stale = reject;
        self
    }
}

/// What the handheld asks the wrist to run.
///
/// The instruction text and step duration travel in the initial instruction
/// sent by [`Orchestrator::start`](crate::session::Orchestrator::start).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkoutConfiguration {
    /// Kind of activity being recorded
    pub activity_type: ActivityType,
    /// Indoor or outdoor
    pub location_type: LocationType,
    /// Text shown on the wrist when the workout starts
    pub instruction: Option<String>,
    /// Planned length of the step in seconds
    pub step_duration: Option<f64>,
    /// Quantity types to collect. `None` uses the defaults for the activity.
    pub quantity_types: Option<Vec<String>>,
}

impl WorkoutConfiguration {
    /// A configuration for `activity_type` with everything else defaulted.
    pub fn new(activity_type: ActivityType) -> Self {
        Self {
            activity_type,
            ..Default::default()
        }
    }

    /// Set the location type.
    pub fn with_location_type(mut self, location_type: LocationType) -> Self {
        self.location_type = location_type;
        self
    }

    /// Set the text shown when the workout starts.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Set the planned step length. The wrist stops the workout once it has
    /// been running this long.
    pub fn with_step_duration(mut self, seconds: f64) -> Self {
        self.step_duration = Some(seconds);
        self
    }

    /// Collect exactly these quantity types instead of the activity defaults.
    pub fn with_quantity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quantity_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Quantity types the wrist should collect for this workout.
    pub fn quantity_types(&self) -> Vec<String> {
        match &self.quantity_types {
            Some(types) => types.clone(),
            None => activity::query_identifiers(self.activity_type)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.duplicate_capacity, 256);
        assert!(!config.reject_stale);

        let config = config.with_duplicate_capacity(4).with_stale_rejection(true);
        assert_eq!(config.duplicate_capacity, 4);
        assert!(config.reject_stale);
    }

    #[test]
    fn test_session_config_from_partial_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"rejectStale":true}"#).unwrap();
        assert_eq!(config.duplicate_capacity, 256);
        assert!(config.reject_stale);
    }

    #[test]
    fn test_quantity_types_default_to_activity() {
        let walking = WorkoutConfiguration::new(ActivityType::Walking);
        assert_eq!(
            walking.quantity_types(),
            vec!["activeEnergyBurned", "heartRate", "distanceWalkingRunning"]
        );

        let custom = walking.with_quantity_types(["heartRate"]);
        assert_eq!(custom.quantity_types(), vec!["heartRate"]);
    }

    #[test]
    fn test_workout_configuration_json() {
        let config = WorkoutConfiguration::new(ActivityType::Cycling)
            .with_location_type(LocationType::Outdoor)
            .with_instruction("Ride")
            .with_step_duration(600.0);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["activityType"], "cycling");
        assert_eq!(json["locationType"], "outdoor");
        assert_eq!(json["stepDuration"], 600.0);

        let back: WorkoutConfiguration = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
