use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MalformedMessage, UnknownValue};
use crate::fields::{FieldMap, FieldValue};
use crate::records::{ErrorReport, QuantitySample, WorkoutEvent};

/// Lifecycle state of the workout session running on the wrist device.
///
/// Exactly one state is current at a time. Wire form is the capitalized name,
/// parsing is case-insensitive so `"starting"` and `"Starting"` both decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum WorkoutState {
    /// No workout has been started yet
    NotStarted,
    /// The wrist is preparing its sensors
    Starting,
    /// Collecting data
    Running,
    /// Winding down after a stop
    Stopping,
    /// Finished. Terminal
    Ended,
    /// Collection suspended until resumed
    Paused,
}

impl WorkoutState {
    /// All states, in lifecycle order.
    pub const ALL: [WorkoutState; 6] = [
        WorkoutState::NotStarted,
        WorkoutState::Starting,
        WorkoutState::Running,
        WorkoutState::Stopping,
        WorkoutState::Ended,
        WorkoutState::Paused,
    ];

    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkoutState::NotStarted => "NotStarted",
            WorkoutState::Starting => "Starting",
            WorkoutState::Running => "Running",
            WorkoutState::Stopping => "Stopping",
            WorkoutState::Ended => "Ended",
            WorkoutState::Paused => "Paused",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        self == WorkoutState::Ended
    }
}

impl FromStr for WorkoutState {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkoutState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownValue {
                kind: "workout state",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for WorkoutState {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkoutState> for &'static str {
    fn from(value: WorkoutState) -> Self {
        value.as_str()
    }
}

impl fmt::Display for WorkoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directive the handheld sends to steer the wrist session.
///
/// A command is a request. Its effect is only confirmed once a later reported
/// state matches [`WorkoutCommand::expected_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum WorkoutCommand {
    /// End the workout
    Stop,
    /// Suspend collection
    Pause,
    /// Continue after a pause
    Resume,
    /// The participant starts moving; distance tracking on
    StartMoving,
    /// The participant stands still; distance tracking off
    StopMoving,
    /// Ask for a state report
    Ping,
}

impl WorkoutCommand {
    pub const ALL: [WorkoutCommand; 6] = [
        WorkoutCommand::Stop,
        WorkoutCommand::Pause,
        WorkoutCommand::Resume,
        WorkoutCommand::StartMoving,
        WorkoutCommand::StopMoving,
        WorkoutCommand::Ping,
    ];

    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkoutCommand::Stop => "Stop",
            WorkoutCommand::Pause => "Pause",
            WorkoutCommand::Resume => "Resume",
            WorkoutCommand::StartMoving => "StartMoving",
            WorkoutCommand::StopMoving => "StopMoving",
            WorkoutCommand::Ping => "Ping",
        }
    }

    /// The reported state that confirms this command, if it expects one.
    pub fn expected_state(self) -> Option<WorkoutState> {
        match self {
            WorkoutCommand::Stop => Some(WorkoutState::Ended),
            WorkoutCommand::Pause => Some(WorkoutState::Paused),
            WorkoutCommand::Resume => Some(WorkoutState::Running),
            WorkoutCommand::StartMoving | WorkoutCommand::StopMoving | WorkoutCommand::Ping => None,
        }
    }

    /// New value of the distance-tracking flag, for the movement commands.
    pub fn moving_flag(self) -> Option<bool> {
        match self {
            WorkoutCommand::StartMoving => Some(true),
            WorkoutCommand::StopMoving => Some(false),
            _ => None,
        }
    }
}

impl FromStr for WorkoutCommand {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkoutCommand::ALL
            .into_iter()
            .find(|command| command.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownValue {
                kind: "workout command",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for WorkoutCommand {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WorkoutCommand> for &'static str {
    fn from(value: WorkoutCommand) -> Self {
        value.as_str()
    }
}

impl fmt::Display for WorkoutCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the link a message travels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Instructions and commands
    HandheldToWrist,
    /// Samples, events and errors
    WristToHandheld,
}

/// A message payload kind with a fixed wire discriminator.
///
/// Each implementor owns its own field contract: [`encode_fields`] writes the
/// variant-specific keys, [`decode_fields`] reads them back and rejects
/// missing or mistyped required fields. The envelope keys (`type`,
/// `identifier`, `timestamp`, `workoutState`) are handled by
/// [`Envelope`](crate::envelope::Envelope) and never touched here.
///
/// ## Example
///
/// ```rust
/// use wristlink_common::{FieldMap, WorkoutPayload, SamplesMessage, QuantitySample};
///
/// let samples = SamplesMessage::new("heartRate", vec![QuantitySample::new(72.0)]);
/// let mut fields = FieldMap::new();
/// samples.encode_fields(&mut fields);
///
/// assert_eq!(SamplesMessage::TYPE_TAG, "samples");
/// assert_eq!(SamplesMessage::decode_fields(&fields).unwrap(), samples);
/// ```
///
/// [`encode_fields`]: WorkoutPayload::encode_fields
/// [`decode_fields`]: WorkoutPayload::decode_fields
pub trait WorkoutPayload: Sized + Into<Payload> + 'static {
    /// Value of the `type` key that selects this payload kind.
    const TYPE_TAG: &'static str;

    /// The side allowed to send this payload kind.
    const DIRECTION: Direction;

    /// Write the variant-specific fields.
    fn encode_fields(&self, fields: &mut FieldMap);

    /// Read the variant-specific fields back.
    fn decode_fields(fields: &FieldMap) -> Result<Self, MalformedMessage>;
}

/// Text, timing and an optional command sent from the handheld to the wrist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionMessage {
    /// Localized instruction to display on the wrist
    pub instruction: Option<String>,
    /// Duration of the step in seconds
    pub step_duration: Option<f64>,
    /// `None` makes this a purely informational instruction
    pub command: Option<WorkoutCommand>,
}

impl InstructionMessage {
    /// An instruction that only carries a command.
    pub fn command(command: WorkoutCommand) -> Self {
        Self {
            command: Some(command),
            ..Default::default()
        }
    }

    /// An informational instruction.
    pub fn text(instruction: impl Into<String>, step_duration: Option<f64>) -> Self {
        Self {
            instruction: Some(instruction.into()),
            step_duration,
            command: None,
        }
    }
}

impl WorkoutPayload for InstructionMessage {
    const TYPE_TAG: &'static str = "instruction";
    const DIRECTION: Direction = Direction::HandheldToWrist;

    fn encode_fields(&self, fields: &mut FieldMap) {
        fields.insert_opt("instruction", self.instruction.clone());
        fields.insert_opt("stepDuration", self.step_duration);
        fields.insert_opt("command", self.command.map(WorkoutCommand::as_str));
    }

    fn decode_fields(fields: &FieldMap) -> Result<Self, MalformedMessage> {
        let kind = Self::TYPE_TAG;
        Ok(Self {
            instruction: fields.optional_str(kind, "instruction")?.map(str::to_string),
            step_duration: fields.optional_f64(kind, "stepDuration")?,
            command: fields.optional_parsed(kind, "command")?,
        })
    }
}

/// A batch of samples of one quantity type, sent as the wrist collects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplesMessage {
    /// Quantity type shared by every sample in the batch (e.g. "heartRate")
    pub quantity_type_identifier: String,
    pub samples: Vec<QuantitySample>,
}

impl SamplesMessage {
    pub fn new(quantity_type_identifier: impl Into<String>, samples: Vec<QuantitySample>) -> Self {
        Self {
            quantity_type_identifier: quantity_type_identifier.into(),
            samples,
        }
    }
}

impl WorkoutPayload for SamplesMessage {
    const TYPE_TAG: &'static str = "samples";
    const DIRECTION: Direction = Direction::WristToHandheld;

    fn encode_fields(&self, fields: &mut FieldMap) {
        fields.insert("quantityTypeIdentifier", self.quantity_type_identifier.clone());
        fields.insert(
            "samples",
            self.samples
                .iter()
                .map(QuantitySample::to_field_value)
                .collect::<Vec<_>>(),
        );
    }

    fn decode_fields(fields: &FieldMap) -> Result<Self, MalformedMessage> {
        let kind = Self::TYPE_TAG;
        let quantity_type_identifier = fields.required_str(kind, "quantityTypeIdentifier")?.to_string();
        let samples = fields
            .required_list(kind, "samples")?
            .iter()
            .map(QuantitySample::from_field_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| nested(kind, "samples", e))?;
        Ok(Self {
            quantity_type_identifier,
            samples,
        })
    }
}

/// A workout lifecycle event, forwarded when the wrist session generates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: WorkoutEvent,
}

impl EventMessage {
    pub fn new(event: WorkoutEvent) -> Self {
        Self { event }
    }
}

impl WorkoutPayload for EventMessage {
    const TYPE_TAG: &'static str = "event";
    const DIRECTION: Direction = Direction::WristToHandheld;

    fn encode_fields(&self, fields: &mut FieldMap) {
        fields.insert("event", self.event.to_fields());
    }

    fn decode_fields(fields: &FieldMap) -> Result<Self, MalformedMessage> {
        let kind = Self::TYPE_TAG;
        let event = WorkoutEvent::from_fields(fields.required_map(kind, "event")?)
            .map_err(|e| nested(kind, "event", e))?;
        Ok(Self { event })
    }
}

/// An error raised by the wrist session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: ErrorReport,
}

impl ErrorMessage {
    pub fn new(error: ErrorReport) -> Self {
        Self { error }
    }
}

impl WorkoutPayload for ErrorMessage {
    const TYPE_TAG: &'static str = "error";
    const DIRECTION: Direction = Direction::WristToHandheld;

    fn encode_fields(&self, fields: &mut FieldMap) {
        fields.insert("error", self.error.to_fields());
    }

    fn decode_fields(fields: &FieldMap) -> Result<Self, MalformedMessage> {
        let kind = Self::TYPE_TAG;
        let error = ErrorReport::from_fields(fields.required_map(kind, "error")?)
            .map_err(|e| nested(kind, "error", e))?;
        Ok(Self { error })
    }
}

/// The closed set of payloads an envelope can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Instruction(InstructionMessage),
    Samples(SamplesMessage),
    Event(EventMessage),
    Error(ErrorMessage),
}

impl Payload {
    /// Wire discriminator of the payload.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Payload::Instruction(_) => InstructionMessage::TYPE_TAG,
            Payload::Samples(_) => SamplesMessage::TYPE_TAG,
            Payload::Event(_) => EventMessage::TYPE_TAG,
            Payload::Error(_) => ErrorMessage::TYPE_TAG,
        }
    }

    /// The side allowed to send the payload.
    pub fn direction(&self) -> Direction {
        match self {
            Payload::Instruction(_) => InstructionMessage::DIRECTION,
            Payload::Samples(_) => SamplesMessage::DIRECTION,
            Payload::Event(_) => EventMessage::DIRECTION,
            Payload::Error(_) => ErrorMessage::DIRECTION,
        }
    }

    /// Write the variant-specific fields.
    pub fn encode_fields(&self, fields: &mut FieldMap) {
        match self {
            Payload::Instruction(m) => m.encode_fields(fields),
            Payload::Samples(m) => m.encode_fields(fields),
            Payload::Event(m) => m.encode_fields(fields),
            Payload::Error(m) => m.encode_fields(fields),
        }
    }
}

impl From<InstructionMessage> for Payload {
    fn from(value: InstructionMessage) -> Self {
        Payload::Instruction(value)
    }
}

impl From<SamplesMessage> for Payload {
    fn from(value: SamplesMessage) -> Self {
        Payload::Samples(value)
    }
}

impl From<EventMessage> for Payload {
    fn from(value: EventMessage) -> Self {
        Payload::Event(value)
    }
}

impl From<ErrorMessage> for Payload {
    fn from(value: ErrorMessage) -> Self {
        Payload::Error(value)
    }
}

fn nested(kind: &'static str, field: &'static str, inner: MalformedMessage) -> MalformedMessage {
    MalformedMessage::InvalidField {
        kind,
        field,
        reason: inner.to_string(),
    }
}

impl From<WorkoutState> for FieldValue {
    fn from(value: WorkoutState) -> Self {
        FieldValue::Text(value.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing_is_case_insensitive() {
        assert_eq!("Starting".parse::<WorkoutState>().unwrap(), WorkoutState::Starting);
        assert_eq!("notstarted".parse::<WorkoutState>().unwrap(), WorkoutState::NotStarted);
        assert_eq!(
            "Sprinting".parse::<WorkoutState>(),
            Err(UnknownValue { kind: "workout state", value: "Sprinting".into() })
        );
    }

    #[test]
    fn test_state_serde_uses_wire_names() {
        let json = serde_json::to_string(&WorkoutState::Paused).unwrap();
        assert_eq!(json, "\"Paused\"");
        let state: WorkoutState = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(state, WorkoutState::Running);
        assert!(WorkoutState::Ended.is_terminal());
        assert!(!WorkoutState::Stopping.is_terminal());
    }

    #[test]
    fn test_command_expectations() {
        assert_eq!(WorkoutCommand::Stop.expected_state(), Some(WorkoutState::Ended));
        assert_eq!(WorkoutCommand::Pause.expected_state(), Some(WorkoutState::Paused));
        assert_eq!(WorkoutCommand::Resume.expected_state(), Some(WorkoutState::Running));
        assert_eq!(WorkoutCommand::Ping.expected_state(), None);
        assert_eq!(WorkoutCommand::StartMoving.expected_state(), None);
        assert_eq!(WorkoutCommand::StartMoving.moving_flag(), Some(true));
        assert_eq!(WorkoutCommand::StopMoving.moving_flag(), Some(false));
        assert_eq!(WorkoutCommand::Stop.moving_flag(), None);
    }

    #[test]
    fn test_command_parsing_accepts_camel_case() {
        assert_eq!("startMoving".parse::<WorkoutCommand>().unwrap(), WorkoutCommand::StartMoving);
        assert_eq!("PING".parse::<WorkoutCommand>().unwrap(), WorkoutCommand::Ping);
        assert!("Jump".parse::<WorkoutCommand>().is_err());
    }

    #[test]
    fn test_instruction_without_command_omits_the_key() {
        let message = InstructionMessage::text("Walk briskly", Some(360.0));
        let mut fields = FieldMap::new();
        message.encode_fields(&mut fields);

        assert!(!fields.contains_key("command"));
        assert_eq!(fields.get("stepDuration"), Some(&FieldValue::Float(360.0)));
        assert_eq!(InstructionMessage::decode_fields(&fields).unwrap(), message);
    }

    #[test]
    fn test_instruction_rejects_unknown_command() {
        let mut fields = FieldMap::new();
        fields.insert("command", "Jump");
        let err = InstructionMessage::decode_fields(&fields).unwrap_err();
        assert!(matches!(
            err,
            MalformedMessage::InvalidField { kind: "instruction", field: "command", .. }
        ));
    }

    #[test]
    fn test_samples_require_quantity_type() {
        let mut fields = FieldMap::new();
        fields.insert("samples", vec![FieldValue::Int(72)]);
        assert_eq!(
            SamplesMessage::decode_fields(&fields),
            Err(MalformedMessage::MissingField { kind: "samples", field: "quantityTypeIdentifier" })
        );
    }

    #[test]
    fn test_nested_record_errors_name_the_outer_field() {
        let mut error = FieldMap::new();
        error.insert("domain", "HKErrorDomain");
        let mut fields = FieldMap::new();
        fields.insert("error", error);

        let err = ErrorMessage::decode_fields(&fields).unwrap_err();
        assert!(matches!(err, MalformedMessage::InvalidField { kind: "error", field: "error", .. }));
    }

    #[test]
    fn test_payload_directions() {
        let instruction: Payload = InstructionMessage::command(WorkoutCommand::Ping).into();
        let samples: Payload = SamplesMessage::new("heartRate", vec![]).into();
        assert_eq!(instruction.direction(), Direction::HandheldToWrist);
        assert_eq!(samples.direction(), Direction::WristToHandheld);
        assert_eq!(instruction.type_tag(), "instruction");
    }
}
