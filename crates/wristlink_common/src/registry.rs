use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::envelope::{Envelope, TYPE_KEY};
use crate::error::MalformedMessage;
use crate::fields::{FieldMap, FieldValue};
use crate::messages::{
    Direction, ErrorMessage, EventMessage, InstructionMessage, Payload, SamplesMessage,
    WorkoutPayload,
};

/// Function type for turning a field map into one payload variant.
type DecodeFn = fn(&FieldMap) -> Result<Payload, MalformedMessage>;

#[derive(Clone, Copy)]
struct Registration {
    decode: DecodeFn,
    direction: Direction,
}

/// Maps `type` tags to payload decoders.
///
/// Deserialization is the only place a tag is looked up: the registry reads
/// the tag, hands the map to the matching decoder and wraps the result in an
/// [`Envelope`]. Cloning is cheap; clones share the same table.
///
/// # Example
///
/// ```rust
/// use wristlink_common::{InstructionMessage, MessageRegistry};
///
/// let registry = MessageRegistry::builder()
///     .register::<InstructionMessage>()
///     .build();
///
/// assert!(registry.is_registered("instruction"));
/// assert!(!registry.is_registered("samples"));
/// ```
#[derive(Clone)]
pub struct MessageRegistry {
    decoders: Arc<HashMap<&'static str, Registration>>,
}

static STANDARD: OnceLock<MessageRegistry> = OnceLock::new();

impl MessageRegistry {
    /// Create a new builder for constructing a registry.
    pub fn builder() -> MessageRegistryBuilder {
        MessageRegistryBuilder::new()
    }

    /// The registry of every variant the protocol defines.
    pub fn standard() -> &'static MessageRegistry {
        STANDARD.get_or_init(|| {
            MessageRegistry::builder()
                .register::<InstructionMessage>()
                .register::<SamplesMessage>()
                .register::<EventMessage>()
                .register::<ErrorMessage>()
                .build()
        })
    }

    /// Deserialize a field map into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedMessage::MissingType`] or [`MalformedMessage::InvalidType`]
    /// when the tag is absent or not a string, [`MalformedMessage::UnknownType`]
    /// when no decoder is registered for it, and the decoder's own error when the
    /// variant's field contract is violated.
    pub fn decode(&self, fields: &FieldMap) -> Result<Envelope, MalformedMessage> {
        let tag = match fields.get(TYPE_KEY) {
            None | Some(FieldValue::Null) => return Err(MalformedMessage::MissingType),
            Some(FieldValue::Text(tag)) => tag.as_str(),
            Some(_) => return Err(MalformedMessage::InvalidType),
        };

        let registration = self
            .decoders
            .get(tag)
            .ok_or_else(|| MalformedMessage::UnknownType(tag.to_string()))?;

        let payload = (registration.decode)(fields)?;
        Envelope::from_header(fields, payload)
    }

    /// Check if a type tag is registered.
    pub fn is_registered(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Direction a registered type tag may travel in.
    pub fn direction_of(&self, tag: &str) -> Option<Direction> {
        self.decoders.get(tag).map(|r| r.direction)
    }

    /// All registered type tags, sorted.
    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.decoders.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

/// Builder for constructing a [`MessageRegistry`].
pub struct MessageRegistryBuilder {
    decoders: HashMap<&'static str, Registration>,
}

impl MessageRegistryBuilder {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register a payload type under its `TYPE_TAG`.
    ///
    /// Registering a second type under the same tag replaces the first.
    pub fn register<T: WorkoutPayload>(mut self) -> Self {
        let registration = Registration {
            decode: |fields| T::decode_fields(fields).map(Into::into),
            direction: T::DIRECTION,
        };

        if self.decoders.insert(T::TYPE_TAG, registration).is_some() {
            warn!("Message type `{}` registered twice; keeping the latest decoder", T::TYPE_TAG);
        } else {
            debug!("Registered message type `{}` ({:?})", T::TYPE_TAG, T::DIRECTION);
        }

        self
    }

    pub fn build(self) -> MessageRegistry {
        MessageRegistry {
            decoders: Arc::new(self.decoders),
        }
    }
}

impl Default for MessageRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_registry_knows_every_variant() {
        assert_eq!(
            MessageRegistry::standard().registered_types(),
            vec!["error", "event", "instruction", "samples"]
        );
        assert_eq!(
            MessageRegistry::standard().direction_of("instruction"),
            Some(Direction::HandheldToWrist)
        );
        assert_eq!(
            MessageRegistry::standard().direction_of("samples"),
            Some(Direction::WristToHandheld)
        );
        assert_eq!(MessageRegistry::standard().direction_of("heartbeat"), None);
    }

    #[test]
    fn test_partial_registry_rejects_unregistered_tags() {
        let registry = MessageRegistry::builder()
            .register::<InstructionMessage>()
            .build();
        let fields = FieldMap::from_json_value(json!({
            "type": "error",
            "error": { "code": 2 }
        }))
        .unwrap();

        assert_eq!(
            registry.decode(&fields),
            Err(MalformedMessage::UnknownType("error".into()))
        );
        assert!(MessageRegistry::standard().decode(&fields).is_ok());
    }

    #[test]
    fn test_null_tag_counts_as_missing() {
        let fields = FieldMap::from_json_value(json!({ "type": null })).unwrap();
        assert_eq!(
            MessageRegistry::standard().decode(&fields),
            Err(MalformedMessage::MissingType)
        );
    }

    #[test]
    fn test_decoded_envelope_has_registered_variant() {
        let fields = FieldMap::from_json_value(json!({
            "type": "instruction",
            "command": "Stop"
        }))
        .unwrap();
        let envelope = MessageRegistry::standard().decode(&fields).unwrap();
        assert!(matches!(envelope.payload(), Payload::Instruction(_)));
        assert_eq!(envelope.direction(), Direction::HandheldToWrist);
    }
}
