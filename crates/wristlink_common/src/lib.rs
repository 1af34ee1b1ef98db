//! Shared message model for the handheld/wrist workout link.
//!
//! Everything both peers agree on lives here: the canonical [`FieldMap`], the
//! four payload variants, the [`Envelope`] that carries them, the tag
//! [`MessageRegistry`] and the JSON and archive codecs.

#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod fields;
pub use fields::{FieldMap, FieldValue, MAX_NESTING_DEPTH};

pub mod records;
pub use records::{DeviceDescriptor, ErrorReport, QuantitySample, WorkoutEvent, WorkoutEventType};

pub mod messages;
pub use messages::*;

pub mod envelope;
pub use envelope::{Envelope, MessageId};

pub mod registry;
pub use registry::{MessageRegistry, MessageRegistryBuilder};

pub mod codec;

pub mod error;
pub use error::{CodecError, DecodeError, MalformedMessage, UnknownValue};
