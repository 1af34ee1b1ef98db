//! Encoding adapters between [`FieldMap`](crate::FieldMap) and bytes on the wire.
//!
//! Both codecs implement the `codee` [`Encoder`](codee::Encoder) and
//! [`Decoder`](codee::Decoder) traits so any transport built on `codee` can
//! plug them in directly. Only the map-level form goes through a codec;
//! turning a map into an [`Envelope`](crate::Envelope) is the registry's job.

mod binary;
mod json;

pub use binary::{ARCHIVE_PREFIX_LEN, ArchiveCodec, MAX_ARCHIVE_BODY};
pub use json::JsonCodec;
