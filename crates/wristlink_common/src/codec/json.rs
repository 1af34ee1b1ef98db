use codee::{Decoder, Encoder};

use crate::error::CodecError;
use crate::fields::FieldMap;

/// JSON text codec for field maps.
///
/// Integers stay integers, fractional numbers become floats and timestamps
/// travel as RFC 3339 strings. A top-level value that is not an object is
/// rejected, and so is a NaN or infinite float on encode.
pub struct JsonCodec;

impl Encoder<FieldMap> for JsonCodec {
    type Error = CodecError;
    type Encoded = String;

    fn encode(val: &FieldMap) -> Result<Self::Encoded, Self::Error> {
        serde_json::to_string(val).map_err(|e| CodecError::Json(e.to_string()))
    }
}

impl Decoder<FieldMap> for JsonCodec {
    type Error = CodecError;
    type Encoded = str;

    fn decode(val: &Self::Encoded) -> Result<FieldMap, Self::Error> {
        let value: serde_json::Value =
            serde_json::from_str(val).map_err(|e| CodecError::Json(e.to_string()))?;
        FieldMap::from_json_value(value)
    }
}
