use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{ArchiveCodec, JsonCodec};
use crate::error::{CodecError, DecodeError, MalformedMessage};
use crate::fields::{FieldMap, FieldValue};
use crate::messages::{Direction, Payload, WorkoutState};
use crate::registry::MessageRegistry;
use codee::{Decoder, Encoder};

/// Wire key of the variant discriminator.
pub const TYPE_KEY: &str = "type";
/// Wire key of the message identifier.
pub const IDENTIFIER_KEY: &str = "identifier";
/// Wire key of the creation timestamp.
pub const TIMESTAMP_KEY: &str = "timestamp";
/// Wire key of the reported session state.
pub const WORKOUT_STATE_KEY: &str = "workoutState";

/// Opaque unique token identifying one logical message.
///
/// Two envelopes with the same identifier are the same message; receivers use
/// it as the duplicate-detection key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of communication between the handheld and the wrist device.
///
/// An envelope carries identity, creation time, the sender's session state
/// (wrist-originated messages only) and exactly one [`Payload`]. Envelopes are
/// plain values: they can be queued, logged or replayed freely.
///
/// ## Example
///
/// ```rust
/// use wristlink_common::{Envelope, EventMessage, WorkoutEvent, WorkoutState};
///
/// let envelope = Envelope::new(EventMessage::new(WorkoutEvent::state_report(WorkoutState::Running)))
///     .with_reported_state(WorkoutState::Running);
///
/// let fields = envelope.to_fields();
/// let decoded = Envelope::from_fields(&fields).unwrap();
/// assert_eq!(decoded, envelope);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    identifier: MessageId,
    timestamp: DateTime<Utc>,
    reported_state: Option<WorkoutState>,
    payload: Payload,
}

impl Envelope {
    /// Wrap a payload with a fresh identifier and the current time.
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self::with_identity(MessageId::generate(), Utc::now(), payload)
    }

    /// Wrap a payload with an explicit identity.
    pub fn with_identity(
        identifier: MessageId,
        timestamp: DateTime<Utc>,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            identifier,
            timestamp,
            reported_state: None,
            payload: payload.into(),
        }
    }

    /// Stamp the sender's current session state onto the envelope.
    pub fn with_reported_state(mut self, state: WorkoutState) -> Self {
        self.reported_state = Some(state);
        self
    }

    pub fn identifier(&self) -> &MessageId {
        &self.identifier
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn reported_state(&self) -> Option<WorkoutState> {
        self.reported_state
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }

    pub fn direction(&self) -> Direction {
        self.payload.direction()
    }

    /// Serialize into the canonical field map.
    ///
    /// Always writes `type`, `identifier` and `timestamp`; writes
    /// `workoutState` only when a state is reported.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        self.payload.encode_fields(&mut fields);
        fields.insert(TYPE_KEY, self.type_tag());
        fields.insert(IDENTIFIER_KEY, self.identifier.as_str());
        fields.insert(TIMESTAMP_KEY, FieldValue::timestamp(&self.timestamp));
        fields.insert_opt(WORKOUT_STATE_KEY, self.reported_state);
        fields
    }

    /// Deserialize using the standard registry.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, MalformedMessage> {
        MessageRegistry::standard().decode(fields)
    }

    /// Rebuild an envelope from its header fields and an already decoded payload.
    ///
    /// A missing identifier is replaced by a fresh one and a missing timestamp
    /// by the current time; present values are never overwritten.
    pub(crate) fn from_header(fields: &FieldMap, payload: Payload) -> Result<Self, MalformedMessage> {
        let kind = payload.type_tag();
        let identifier = match fields.optional_str(kind, IDENTIFIER_KEY)? {
            Some(id) => MessageId::from(id),
            None => MessageId::generate(),
        };
        let timestamp = fields
            .optional_timestamp(kind, TIMESTAMP_KEY)?
            .unwrap_or_else(Utc::now);
        let reported_state = fields.optional_parsed(kind, WORKOUT_STATE_KEY)?;
        Ok(Self {
            identifier,
            timestamp,
            reported_state,
            payload,
        })
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String, CodecError> {
        JsonCodec::encode(&self.to_fields())
    }

    /// Decode from JSON text using the standard registry.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let fields: FieldMap = JsonCodec::decode(text)?;
        Ok(Self::from_fields(&fields)?)
    }

    /// Encode as a binary archive frame.
    pub fn to_archive(&self) -> Result<Vec<u8>, CodecError> {
        ArchiveCodec::encode(&self.to_fields())
    }

    /// Decode from a binary archive frame using the standard registry.
    pub fn from_archive(bytes: &[u8]) -> Result<Self, DecodeError> {
        let fields: FieldMap = ArchiveCodec::decode(bytes)?;
        Ok(Self::from_fields(&fields)?)
    }
}
