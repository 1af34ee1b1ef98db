use codee::{Decoder, Encoder};

use crate::error::CodecError;
use crate::fields::FieldMap;

/// Size of the little-endian length prefix in front of every archive frame.
pub const ARCHIVE_PREFIX_LEN: usize = 8;

/// Largest archive body either side will produce or accept.
pub const MAX_ARCHIVE_BODY: usize = 1 << 20;

/// Binary archive codec for field maps.
///
/// A frame is:
/// - 8-byte little-endian length of the body
/// - bincode-serialized [`FieldMap`] (standard config)
///
/// The prefix is validated on decode; a frame whose prefix disagrees with the
/// body length is rejected rather than partially read.
///
/// ## Usage
///
/// ```rust
/// use codee::{Decoder, Encoder};
/// use wristlink_common::FieldMap;
/// use wristlink_common::codec::ArchiveCodec;
///
/// let mut map = FieldMap::new();
/// map.insert("type", "instruction");
/// map.insert("command", "Stop");
///
/// let frame = ArchiveCodec::encode(&map).unwrap();
/// let decoded: FieldMap = ArchiveCodec::decode(&frame).unwrap();
/// assert_eq!(decoded, map);
/// ```
pub struct ArchiveCodec;

impl Encoder<FieldMap> for ArchiveCodec {
    type Error = CodecError;
    type Encoded = Vec<u8>;

    fn encode(val: &FieldMap) -> Result<Self::Encoded, Self::Error> {
        let body = bincode::serde::encode_to_vec(val, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        if body.len() > MAX_ARCHIVE_BODY {
            return Err(CodecError::Encode(format!(
                "body of {} bytes exceeds the {MAX_ARCHIVE_BODY} byte limit",
                body.len()
            )));
        }

        let len = body.len() as u64;
        let mut buffer = Vec::with_capacity(ARCHIVE_PREFIX_LEN + body.len());
        buffer.extend_from_slice(&len.to_le_bytes());
        buffer.extend_from_slice(&body);

        Ok(buffer)
    }
}

impl Decoder<FieldMap> for ArchiveCodec {
    type Error = CodecError;
    type Encoded = [u8];

    fn decode(val: &Self::Encoded) -> Result<FieldMap, Self::Error> {
        if val.len() < ARCHIVE_PREFIX_LEN {
            return Err(CodecError::Truncated {
                expected: ARCHIVE_PREFIX_LEN,
                actual: val.len(),
            });
        }

        let (prefix, body) = val.split_at(ARCHIVE_PREFIX_LEN);
        let length_bytes: [u8; ARCHIVE_PREFIX_LEN] =
            prefix.try_into().map_err(|_| CodecError::Truncated {
                expected: ARCHIVE_PREFIX_LEN,
                actual: prefix.len(),
            })?;
        let declared = u64::from_le_bytes(length_bytes);

        if declared != body.len() as u64 {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        let config = bincode::config::standard().with_limit::<MAX_ARCHIVE_BODY>();
        let (map, consumed): (FieldMap, usize) = bincode::serde::decode_from_slice(body, config)
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        if consumed != body.len() {
            return Err(CodecError::Decode(format!(
                "{} trailing bytes after the field map",
                body.len() - consumed
            )));
        }

        Ok(map)
    }
}
