use thiserror::Error;

/// A field map that does not satisfy the field contract of its message type.
///
/// Receivers treat every variant of this error the same way: the message is
/// discarded and the session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    /// The `type` discriminator is absent.
    #[error("message carries no `type` tag")]
    MissingType,

    /// The `type` discriminator is present but is not a string.
    #[error("message `type` tag is not a string")]
    InvalidType,

    /// No decoder is registered for the `type` discriminator.
    #[error("unrecognized message type `{0}`")]
    UnknownType(String),

    /// A field the message type requires is absent.
    #[error("`{kind}` message is missing required field `{field}`")]
    MissingField {
        /// Type tag of the message being decoded
        kind: &'static str,
        /// Wire key of the missing field
        field: &'static str,
    },

    /// A field is present but holds a value of the wrong semantic type.
    #[error("`{kind}` message has an invalid `{field}` field: {reason}")]
    InvalidField {
        /// Type tag of the message being decoded
        kind: &'static str,
        /// Wire key of the offending field
        field: &'static str,
        /// What was wrong with the value
        reason: String,
    },
}

/// Failures of the JSON and archive adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The archive frame is shorter than its length prefix.
    #[error("archive frame truncated: need at least {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the frame should contain
        expected: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// The length prefix disagrees with the body that follows it.
    #[error("archive length prefix says {declared} bytes but body is {actual} bytes")]
    LengthMismatch {
        /// Length announced by the prefix
        declared: u64,
        /// Length of the body actually received
        actual: usize,
    },

    /// bincode refused to encode the field map.
    #[error("failed to encode archive: {0}")]
    Encode(String),

    /// bincode refused to decode the archive body.
    #[error("failed to decode archive: {0}")]
    Decode(String),

    /// The text is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// The top-level JSON value is not an object.
    #[error("top-level message value must be a map, found {0}")]
    NotAMap(&'static str),
}

/// Anything that can go wrong turning encoded bytes or text into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Malformed(#[from] MalformedMessage),
}

/// A string that names no member of a closed wire enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownValue {
    /// Which enumeration was being parsed
    pub kind: &'static str,
    /// The text that failed to parse
    pub value: String,
}
