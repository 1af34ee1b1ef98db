//! The canonical keyed-field map every message encoding is built on.
//!
//! A [`FieldMap`] holds string keys and [`FieldValue`]s (scalars, lists and
//! nested maps). The JSON adapter and the binary archive adapter both encode
//! exactly this structure, so the field contract of a message type only has to
//! be written once.
//!
//! `FieldValue` serializes differently depending on the target format: for
//! human-readable formats (JSON) it is written as the plain value, for compact
//! binary formats (bincode) it is written as a tagged enum, because those
//! formats cannot describe their own structure on decode.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{
    self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, Unexpected, VariantAccess, Visitor,
};
use serde::ser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CodecError, MalformedMessage};

/// Deepest nesting of lists and maps either adapter will decode.
pub const MAX_NESTING_DEPTH: usize = 64;

/// A single value inside a [`FieldMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit absence. Optional fields holding `Null` are treated as unset.
    Null,
    /// A boolean flag
    Bool(bool),
    /// An integer
    Int(i64),
    /// A floating point number
    Float(f64),
    /// A string
    Text(String),
    /// An ordered list of values
    List(Vec<FieldValue>),
    /// A nested keyed map
    Map(FieldMap),
}

impl FieldValue {
    /// Name of the value's shape, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Map(_) => "map",
        }
    }

    /// Returns the numeric value, accepting both integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Encodes a timestamp the way every message field carries it.
    pub fn timestamp(value: &DateTime<Utc>) -> Self {
        FieldValue::Text(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(value: FieldMap) -> Self {
        FieldValue::Map(value)
    }
}

/// A flat keyed-field map: the serialized form of one message or record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, FieldValue>);

impl FieldMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a field map from a JSON value, which must be an object.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, CodecError> {
        let kind = match &value {
            serde_json::Value::Object(_) => None,
            serde_json::Value::Null => Some("null"),
            serde_json::Value::Bool(_) => Some("bool"),
            serde_json::Value::Number(_) => Some("number"),
            serde_json::Value::String(_) => Some("string"),
            serde_json::Value::Array(_) => Some("list"),
        };
        if let Some(kind) = kind {
            return Err(CodecError::NotAMap(kind));
        }
        serde_json::from_value(value).map_err(|e| CodecError::Json(e.to_string()))
    }

    /// Convert into a JSON object.
    ///
    /// Fails when a float is NaN or infinite, since JSON cannot carry it.
    pub fn to_json_value(&self) -> Result<serde_json::Value, CodecError> {
        serde_json::to_value(self).map_err(|e| CodecError::Json(e.to_string()))
    }

    /// Insert a value, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert a value only when it is present.
    pub fn insert_opt<V: Into<FieldValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    /// Raw access to a value.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Whether a key is present (even if it holds `Null`).
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    fn present(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field).filter(|value| !value.is_null())
    }

    /// Look up an optional string field.
    pub fn optional_str(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<Option<&str>, MalformedMessage> {
        match self.present(field) {
            None => Ok(None),
            Some(FieldValue::Text(s)) => Ok(Some(s)),
            Some(other) => Err(wrong_shape(kind, field, "string", other)),
        }
    }

    /// Look up a required string field.
    pub fn required_str(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<&str, MalformedMessage> {
        self.optional_str(kind, field)?
            .ok_or(MalformedMessage::MissingField { kind, field })
    }

    /// Look up an optional numeric field, accepting integers and floats.
    pub fn optional_f64(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<Option<f64>, MalformedMessage> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| wrong_shape(kind, field, "number", value)),
        }
    }

    /// Look up an optional integer field.
    pub fn optional_i64(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<Option<i64>, MalformedMessage> {
        match self.present(field) {
            None => Ok(None),
            Some(FieldValue::Int(i)) => Ok(Some(*i)),
            Some(FieldValue::Float(f)) if f.fract() == 0.0 && f.is_finite() => Ok(Some(*f as i64)),
            Some(other) => Err(wrong_shape(kind, field, "integer", other)),
        }
    }

    /// Look up an optional boolean field.
    pub fn optional_bool(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<Option<bool>, MalformedMessage> {
        match self.present(field) {
            None => Ok(None),
            Some(FieldValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(wrong_shape(kind, field, "bool", other)),
        }
    }

    /// Look up an optional nested map.
    pub fn optional_map(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<Option<&FieldMap>, MalformedMessage> {
        match self.present(field) {
            None => Ok(None),
            Some(FieldValue::Map(map)) => Ok(Some(map)),
            Some(other) => Err(wrong_shape(kind, field, "map", other)),
        }
    }

    /// Look up a required nested map.
    pub fn required_map(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<&FieldMap, MalformedMessage> {
        self.optional_map(kind, field)?
            .ok_or(MalformedMessage::MissingField { kind, field })
    }

    /// Look up a required list.
    pub fn required_list(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<&[FieldValue], MalformedMessage> {
        match self.present(field) {
            None => Err(MalformedMessage::MissingField { kind, field }),
            Some(FieldValue::List(items)) => Ok(items),
            Some(other) => Err(wrong_shape(kind, field, "list", other)),
        }
    }

    /// Look up an optional timestamp.
    ///
    /// Accepts RFC 3339 strings and numeric seconds since the Unix epoch.
    pub fn optional_timestamp(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<Option<DateTime<Utc>>, MalformedMessage> {
        match self.present(field) {
            None => Ok(None),
            Some(FieldValue::Text(text)) => DateTime::parse_from_rfc3339(text)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(|e| MalformedMessage::InvalidField {
                    kind,
                    field,
                    reason: e.to_string(),
                }),
            Some(value @ (FieldValue::Int(_) | FieldValue::Float(_))) => {
                let seconds = value.as_f64().unwrap_or_default();
                timestamp_from_epoch_seconds(seconds)
                    .map(Some)
                    .ok_or_else(|| MalformedMessage::InvalidField {
                        kind,
                        field,
                        reason: format!("{seconds} is out of range for a timestamp"),
                    })
            }
            Some(other) => Err(wrong_shape(kind, field, "timestamp", other)),
        }
    }

    /// Look up an optional field holding a string enumeration.
    pub fn optional_parsed<T>(
        &self,
        kind: &'static str,
        field: &'static str,
    ) -> Result<Option<T>, MalformedMessage>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.optional_str(kind, field)? {
            None => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|e: T::Err| {
                MalformedMessage::InvalidField {
                    kind,
                    field,
                    reason: e.to_string(),
                }
            }),
        }
    }
}

impl FromIterator<(String, FieldValue)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn wrong_shape(
    kind: &'static str,
    field: &'static str,
    expected: &str,
    found: &FieldValue,
) -> MalformedMessage {
    MalformedMessage::InvalidField {
        kind,
        field,
        reason: format!("expected {expected}, found {}", found.kind_name()),
    }
}

fn timestamp_from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos)
}

// Compact-format mirror of FieldValue. Variant order is part of the archive
// format and must match `TAGGED_VARIANTS` and `TaggedVisitor`.
#[derive(Serialize)]
enum TaggedRef<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(&'a str),
    List(&'a [FieldValue]),
    Map(&'a FieldMap),
}

const TAGGED_VARIANTS: &[&str] = &["Null", "Bool", "Int", "Float", "Text", "List", "Map"];

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            match self {
                FieldValue::Null => serializer.serialize_unit(),
                FieldValue::Bool(b) => serializer.serialize_bool(*b),
                FieldValue::Int(i) => serializer.serialize_i64(*i),
                // JSON has no spelling for these and would write `null`
                FieldValue::Float(f) if !f.is_finite() => Err(ser::Error::custom(format_args!(
                    "{f} has no JSON representation"
                ))),
                FieldValue::Float(f) => serializer.serialize_f64(*f),
                FieldValue::Text(s) => serializer.serialize_str(s),
                FieldValue::List(items) => items.serialize(serializer),
                FieldValue::Map(map) => map.serialize(serializer),
            }
        } else {
            let tagged = match self {
                FieldValue::Null => TaggedRef::Null,
                FieldValue::Bool(b) => TaggedRef::Bool(*b),
                FieldValue::Int(i) => TaggedRef::Int(*i),
                FieldValue::Float(f) => TaggedRef::Float(*f),
                FieldValue::Text(s) => TaggedRef::Text(s),
                FieldValue::List(items) => TaggedRef::List(items),
                FieldValue::Map(map) => TaggedRef::Map(map),
            };
            tagged.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ValueSeed { depth: 0 }.deserialize(deserializer)
    }
}

/// Decodes one value at a known nesting depth.
#[derive(Clone, Copy)]
struct ValueSeed {
    depth: usize,
}

impl ValueSeed {
    fn nested<E: de::Error>(self) -> Result<Self, E> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(E::custom(format_args!(
                "field values nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        Ok(Self {
            depth: self.depth + 1,
        })
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = FieldValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldValue, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(FieldValueVisitor(self))
        } else {
            deserializer.deserialize_enum("FieldValue", TAGGED_VARIANTS, TaggedVisitor(self))
        }
    }
}

struct FieldValueVisitor(ValueSeed);

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar, list or map field value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
        Ok(FieldValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldValue, D::Error> {
        self.0.deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<FieldValue, E> {
        Ok(FieldValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<FieldValue, E> {
        Ok(FieldValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<FieldValue, E> {
        Ok(i64::try_from(v)
            .map(FieldValue::Int)
            .unwrap_or(FieldValue::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<FieldValue, E> {
        Ok(FieldValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<FieldValue, E> {
        Ok(FieldValue::Text(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FieldValue, A::Error> {
        let item = self.0.nested::<A::Error>()?;
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(64));
        while let Some(value) = seq.next_element_seed(item)? {
            items.push(value);
        }
        Ok(FieldValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldValue, A::Error> {
        let item = self.0.nested::<A::Error>()?;
        let mut map = FieldMap::new();
        while let Some(key) = access.next_key::<String>()? {
            let value = access.next_value_seed(item)?;
            map.insert(key, value);
        }
        Ok(FieldValue::Map(map))
    }
}

/// Containers inside the tagged form reuse the plain visitor for their body.
struct ListSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = FieldValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldValue, D::Error> {
        deserializer.deserialize_seq(FieldValueVisitor(self.0))
    }
}

struct MapSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
    type Value = FieldValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<FieldValue, D::Error> {
        deserializer.deserialize_map(FieldValueVisitor(self.0))
    }
}

struct TaggedVisitor(ValueSeed);

impl<'de> Visitor<'de> for TaggedVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a tagged field value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<FieldValue, A::Error> {
        let (tag, variant): (u32, _) = data.variant()?;
        match tag {
            0 => variant.unit_variant().map(|()| FieldValue::Null),
            1 => variant.newtype_variant().map(FieldValue::Bool),
            2 => variant.newtype_variant().map(FieldValue::Int),
            3 => variant.newtype_variant().map(FieldValue::Float),
            4 => variant.newtype_variant().map(FieldValue::Text),
            5 => variant.newtype_variant_seed(ListSeed(self.0)),
            6 => variant.newtype_variant_seed(MapSeed(self.0)),
            other => Err(de::Error::invalid_value(
                Unexpected::Unsigned(other.into()),
                &"a field value tag from 0 to 6",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_values_map_onto_field_values() {
        let map = FieldMap::from_json_value(json!({
            "n": null,
            "flag": true,
            "count": 3,
            "ratio": 0.5,
            "name": "walk",
            "list": [1, "two"],
            "nested": { "inner": 72 }
        }))
        .unwrap();

        assert_eq!(map.get("n"), Some(&FieldValue::Null));
        assert_eq!(map.get("flag"), Some(&FieldValue::Bool(true)));
        assert_eq!(map.get("count"), Some(&FieldValue::Int(3)));
        assert_eq!(map.get("ratio"), Some(&FieldValue::Float(0.5)));
        assert_eq!(map.get("name"), Some(&FieldValue::Text("walk".into())));
        assert_eq!(
            map.get("list"),
            Some(&FieldValue::List(vec![FieldValue::Int(1), FieldValue::Text("two".into())]))
        );
        let nested = map.optional_map("test", "nested").unwrap().unwrap();
        assert_eq!(nested.get("inner"), Some(&FieldValue::Int(72)));
    }

    #[test]
    fn test_top_level_must_be_a_map() {
        assert_eq!(
            FieldMap::from_json_value(json!([1, 2])),
            Err(CodecError::NotAMap("list"))
        );
        assert_eq!(
            FieldMap::from_json_value(json!("event")),
            Err(CodecError::NotAMap("string"))
        );
    }

    #[test]
    fn test_null_optional_fields_are_unset() {
        let map = FieldMap::from_json_value(json!({ "instruction": null })).unwrap();
        assert_eq!(map.optional_str("instruction", "instruction").unwrap(), None);
        assert_eq!(
            map.required_str("instruction", "instruction"),
            Err(MalformedMessage::MissingField { kind: "instruction", field: "instruction" })
        );
    }

    #[test]
    fn test_wrong_shape_is_reported() {
        let map = FieldMap::from_json_value(json!({ "samples": "72" })).unwrap();
        let err = map.required_list("samples", "samples").unwrap_err();
        assert!(matches!(
            err,
            MalformedMessage::InvalidField { kind: "samples", field: "samples", .. }
        ));
    }

    #[test]
    fn test_timestamps_accept_text_and_epoch_seconds() {
        let ts = DateTime::parse_from_rfc3339("2026-10-14T09:30:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut map = FieldMap::new();
        map.insert("text", FieldValue::timestamp(&ts));
        map.insert("epoch", 1_700_000_000.5);
        map.insert("bad", "yesterday");

        assert_eq!(map.optional_timestamp("t", "text").unwrap(), Some(ts));
        let epoch = map.optional_timestamp("t", "epoch").unwrap().unwrap();
        assert_eq!(epoch.timestamp(), 1_700_000_000);
        assert_eq!(epoch.timestamp_subsec_millis(), 500);
        assert!(map.optional_timestamp("t", "bad").is_err());
    }

    #[test]
    fn test_integral_floats_count_as_integers() {
        let mut map = FieldMap::new();
        map.insert("code", 4.0);
        map.insert("fraction", 4.5);
        assert_eq!(map.optional_i64("error", "code").unwrap(), Some(4));
        assert!(map.optional_i64("error", "fraction").is_err());
    }

    #[test]
    fn test_compact_format_preserves_value_shapes() {
        let mut nested = FieldMap::new();
        nested.insert("bpm", 72.0);
        let mut map = FieldMap::new();
        map.insert("int", 7i64);
        map.insert("float", 7.0);
        map.insert("list", vec![FieldValue::Null, FieldValue::Bool(false)]);
        map.insert("nested", nested);

        let bytes = bincode::serde::encode_to_vec(&map, bincode::config::standard()).unwrap();
        let (decoded, _): (FieldMap, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();

        assert_eq!(decoded, map);
        assert_eq!(decoded.get("int"), Some(&FieldValue::Int(7)));
        assert_eq!(decoded.get("float"), Some(&FieldValue::Float(7.0)));
    }

    fn nested_lists(levels: usize) -> serde_json::Value {
        let mut value = serde_json::Value::Null;
        for _ in 0..levels {
            value = serde_json::Value::Array(vec![value]);
        }
        json!({ "a": value })
    }

    #[test]
    fn test_nesting_is_bounded() {
        assert!(FieldMap::from_json_value(nested_lists(MAX_NESTING_DEPTH)).is_ok());
        assert!(matches!(
            FieldMap::from_json_value(nested_lists(MAX_NESTING_DEPTH + 1)),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_non_finite_floats_have_no_json_form() {
        let mut map = FieldMap::new();
        map.insert("ok", 1.5);
        assert_eq!(map.to_json_value().unwrap(), json!({ "ok": 1.5 }));

        map.insert("bad", vec![FieldValue::Float(f64::NAN)]);
        assert!(matches!(map.to_json_value(), Err(CodecError::Json(_))));
    }
}
