//! Workout vocabulary: activity and location identifiers, the quantity types
//! collected for each activity, and active-duration bookkeeping.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wristlink_common::{WorkoutEvent, WorkoutEventType};

/// Quantity type identifiers used in `samples` messages.
pub mod quantity {
    /// Active energy in kilocalories
    pub const ACTIVE_ENERGY_BURNED: &str = "activeEnergyBurned";
    /// Heart rate in beats per minute
    pub const HEART_RATE: &str = "heartRate";
    /// Distance on foot
    pub const DISTANCE_WALKING_RUNNING: &str = "distanceWalkingRunning";
    /// Distance on a bicycle
    pub const DISTANCE_CYCLING: &str = "distanceCycling";
    /// Distance in the water
    pub const DISTANCE_SWIMMING: &str = "distanceSwimming";
    /// Distance pushed in a wheelchair
    pub const DISTANCE_WHEELCHAIR: &str = "distanceWheelchair";
}

/// Distance quantity types a workout can track.
pub const SUPPORTED_DISTANCE_TYPES: [&str; 4] = [
    quantity::DISTANCE_WALKING_RUNNING,
    quantity::DISTANCE_CYCLING,
    quantity::DISTANCE_SWIMMING,
    quantity::DISTANCE_WHEELCHAIR,
];

macro_rules! activity_types {
    ($($variant:ident => $id:literal),+ $(,)?) => {
        /// Kind of physical activity a workout records.
        ///
        /// Identifiers outside the known set map to [`ActivityType::Other`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(from = "String", into = "&'static str")]
        pub enum ActivityType {
            $(
                #[doc = concat!("The `", $id, "` activity")]
                $variant,
            )+
            /// Anything not covered by a more specific activity
            #[default]
            Other,
        }

        impl ActivityType {
            /// Every activity, in identifier table order.
            pub const ALL: &'static [ActivityType] = &[$(ActivityType::$variant,)+ ActivityType::Other];

            /// The wire identifier.
            pub fn identifier(self) -> &'static str {
                match self {
                    $(ActivityType::$variant => $id,)+
                    ActivityType::Other => "other",
                }
            }

            /// Parse a wire identifier, falling back to [`ActivityType::Other`].
            pub fn from_identifier(identifier: &str) -> Self {
                match identifier {
                    $($id => ActivityType::$variant,)+
                    _ => ActivityType::Other,
                }
            }
        }
    };
}

activity_types! {
    AmericanFootball => "americanFootball",
    Archery => "archery",
    AustralianFootball => "australianFootball",
    Badminton => "badminton",
    Baseball => "baseball",
    Basketball => "basketball",
    Bowling => "bowling",
    Boxing => "boxing",
    Climbing => "climbing",
    Cricket => "cricket",
    CrossTraining => "crossTraining",
    Curling => "curling",
    Cycling => "cycling",
    Dance => "dance",
    DanceInspiredTraining => "danceInspiredTraining",
    Elliptical => "elliptical",
    EquestrianSports => "equestrianSports",
    Fencing => "fencing",
    Fishing => "fishing",
    FunctionalStrengthTraining => "functionalStrengthTraining",
    Golf => "golf",
    Gymnastics => "gymnastics",
    Handball => "handball",
    Hiking => "hiking",
    Hockey => "hockey",
    Hunting => "hunting",
    Lacrosse => "lacrosse",
    MartialArts => "martialArts",
    MindAndBody => "mindAndBody",
    MixedMetabolicCardioTraining => "mixedMetabolicCardioTraining",
    PaddleSports => "paddleSports",
    Play => "play",
    PreparationAndRecovery => "preparationAndRecovery",
    Racquetball => "racquetball",
    Rowing => "rowing",
    Rugby => "rugby",
    Running => "running",
    Sailing => "sailing",
    SkatingSports => "skatingSports",
    SnowSports => "snowSports",
    Soccer => "soccer",
    Softball => "softball",
    Squash => "squash",
    StairClimbing => "stairClimbing",
    SurfingSports => "surfingSports",
    Swimming => "swimming",
    TableTennis => "tableTennis",
    Tennis => "tennis",
    TrackAndField => "trackAndField",
    TraditionalStrengthTraining => "traditionalStrengthTraining",
    Volleyball => "volleyball",
    Walking => "walking",
    WaterFitness => "waterFitness",
    WaterPolo => "waterPolo",
    WaterSports => "waterSports",
    Wrestling => "wrestling",
    Yoga => "yoga",
    Barre => "barre",
    CoreTraining => "coreTraining",
    CrossCountrySkiing => "crossCountrySkiing",
    DownhillSkiing => "downhillSkiing",
    Flexibility => "flexibility",
    HighIntensityIntervalTraining => "highIntensityIntervalTraining",
    JumpRope => "jumpRope",
    Kickboxing => "kickboxing",
    Pilates => "pilates",
    Snowboarding => "snowboarding",
    Stairs => "stairs",
    StepTraining => "stepTraining",
    WheelchairWalkPace => "wheelchairWalkPace",
    WheelchairRunPace => "wheelchairRunPace",
}

impl From<String> for ActivityType {
    fn from(value: String) -> Self {
        ActivityType::from_identifier(&value)
    }
}

impl From<ActivityType> for &'static str {
    fn from(value: ActivityType) -> Self {
        value.identifier()
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Where a workout takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum LocationType {
    /// Not specified
    #[default]
    Unknown,
    /// Inside, where distance comes from the wrist's motion sensors
    Indoor,
    /// Outside
    Outdoor,
}

impl LocationType {
    /// The wire identifier.
    pub fn identifier(self) -> &'static str {
        match self {
            LocationType::Unknown => "unknown",
            LocationType::Indoor => "indoor",
            LocationType::Outdoor => "outdoor",
        }
    }

    /// Unrecognized identifiers map to [`LocationType::Unknown`].
    pub fn from_identifier(identifier: &str) -> Self {
        match identifier {
            "indoor" => LocationType::Indoor,
            "outdoor" => LocationType::Outdoor,
            _ => LocationType::Unknown,
        }
    }
}

impl From<String> for LocationType {
    fn from(value: String) -> Self {
        LocationType::from_identifier(&value)
    }
}

impl From<LocationType> for &'static str {
    fn from(value: LocationType) -> Self {
        value.identifier()
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Distance quantity type recorded for an activity, if it covers ground.
pub fn distance_type(activity: ActivityType) -> Option<&'static str> {
    use ActivityType::*;
    match activity {
        CrossTraining | CrossCountrySkiing | Golf | Hiking | Running | Walking => {
            Some(quantity::DISTANCE_WALKING_RUNNING)
        }
        Cycling => Some(quantity::DISTANCE_CYCLING),
        Swimming => Some(quantity::DISTANCE_SWIMMING),
        WheelchairWalkPace | WheelchairRunPace => Some(quantity::DISTANCE_WHEELCHAIR),
        _ => None,
    }
}

/// Quantity types collected by default for an activity.
///
/// Every workout collects active energy and heart rate; activities that cover
/// ground add their distance type.
pub fn query_identifiers(activity: ActivityType) -> Vec<&'static str> {
    let mut ids = vec![quantity::ACTIVE_ENERGY_BURNED, quantity::HEART_RATE];
    ids.extend(distance_type(activity));
    ids
}

/// Seconds of activity between `start` and `end`, excluding paused spans.
///
/// Pause and resume events delimit the paused spans; other event types and
/// events without a date are skipped. A session that never started has no
/// active time. A session still paused at `end` stops counting at its last
/// pause.
pub fn compute_active_duration(
    events: &[WorkoutEvent],
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
) -> f64 {
    let Some(mut last) = start else {
        return 0.0;
    };

    let mut duration = 0.0;
    let mut paused = false;

    for event in events {
        let Some(date) = event.date else { continue };
        match event.event_type {
            Some(WorkoutEventType::Pause) if !paused => {
                duration += seconds_between(last, date);
                paused = true;
            }
            Some(WorkoutEventType::Resume) if paused => {
                last = date;
                paused = false;
            }
            _ => {}
        }
    }

    if !paused {
        duration += seconds_between(last, end);
    }

    duration.max(0.0)
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_activity_identifiers() {
        assert_eq!(ActivityType::Walking.identifier(), "walking");
        assert_eq!(ActivityType::from_identifier("wheelchairRunPace"), ActivityType::WheelchairRunPace);
        assert_eq!(ActivityType::from_identifier("quidditch"), ActivityType::Other);
        assert_eq!(ActivityType::Other.identifier(), "other");
        for activity in ActivityType::ALL {
            assert_eq!(ActivityType::from_identifier(activity.identifier()), *activity);
        }
    }

    #[test]
    fn test_location_identifiers() {
        assert_eq!(LocationType::from_identifier("outdoor"), LocationType::Outdoor);
        assert_eq!(LocationType::from_identifier("moon"), LocationType::Unknown);
        assert_eq!(LocationType::Indoor.to_string(), "indoor");
    }

    #[test]
    fn test_query_identifiers() {
        assert_eq!(
            query_identifiers(ActivityType::Cycling),
            vec!["activeEnergyBurned", "heartRate", "distanceCycling"]
        );
        assert_eq!(
            query_identifiers(ActivityType::WheelchairWalkPace),
            vec!["activeEnergyBurned", "heartRate", "distanceWheelchair"]
        );
        assert_eq!(query_identifiers(ActivityType::Yoga), vec!["activeEnergyBurned", "heartRate"]);
        for activity in ActivityType::ALL {
            if let Some(distance) = distance_type(*activity) {
                assert!(SUPPORTED_DISTANCE_TYPES.contains(&distance));
            }
        }
    }

    #[test]
    fn test_duration_without_pauses() {
        assert_eq!(compute_active_duration(&[], Some(at(0)), at(90)), 90.0);
        assert_eq!(compute_active_duration(&[], None, at(90)), 0.0);
    }

    #[test]
    fn test_duration_excludes_paused_span() {
        let events = vec![
            WorkoutEvent::new(WorkoutEventType::Pause, at(30)),
            WorkoutEvent::new(WorkoutEventType::Lap, at(35)),
            WorkoutEvent::new(WorkoutEventType::Resume, at(50)),
        ];
        assert_eq!(compute_active_duration(&events, Some(at(0)), at(100)), 80.0);
    }

    #[test]
    fn test_duration_while_still_paused() {
        let events = vec![WorkoutEvent::new(WorkoutEventType::Pause, at(40))];
        assert_eq!(compute_active_duration(&events, Some(at(0)), at(100)), 40.0);
    }

    #[test]
    fn test_repeated_pause_is_counted_once() {
        let events = vec![
            WorkoutEvent::new(WorkoutEventType::Pause, at(10)),
            WorkoutEvent::new(WorkoutEventType::Pause, at(20)),
            WorkoutEvent::new(WorkoutEventType::Resume, at(30)),
        ];
        let end = at(0) + TimeDelta::seconds(60);
        assert_eq!(compute_active_duration(&events, Some(at(0)), end), 40.0);
    }

    #[test]
    fn test_activity_serde_uses_identifiers() {
        let json = serde_json::to_string(&ActivityType::HighIntensityIntervalTraining).unwrap();
        assert_eq!(json, "\"highIntensityIntervalTraining\"");
        let parsed: ActivityType = serde_json::from_str("\"unheardOf\"").unwrap();
        assert_eq!(parsed, ActivityType::Other);
    }
}
