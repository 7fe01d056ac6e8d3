//! Typed item metadata with lossless extension preservation.
//!
//! # Responsibility
//! - Decode the persisted metadata JSON object into one well-known field
//!   plus an open extension map.
//! - Encode it back with deterministic (sorted) key order.
//!
//! # Invariants
//! - `decode(encode(m)) == m` for every metadata value with finite doubles.
//! - Decoding never fails; malformed input yields empty metadata.
//! - Value decoding is ordered: null, bool, int, double, string, array,
//!   object. JSON numbers written with a fraction stay doubles.
//! - Nesting depth is unbounded on both sides; decoding grows the stack on
//!   demand instead of enforcing serde_json's recursion limit.
//!
//! # Wire format
//! A single JSON object. `attachment_file_path` is reserved (string or
//! absent); every other key is preserved verbatim at any depth.

use log::debug;
use serde::de::{Error as _, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt::Formatter;

/// Reserved key holding the attachment file path.
pub const ATTACHMENT_FILE_PATH_KEY: &str = "attachment_file_path";

/// Dynamically-shaped metadata value.
///
/// Variant order is the decode attempt order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<MetadataValue>),
    Object(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Converts a loosely-typed JSON value, classifying numbers by value.
    ///
    /// A finite number with no fractional part inside `i64` range becomes
    /// `Int` even when it was written as `42.0`; anything else numeric
    /// becomes `Double`. Booleans are matched before numbers.
    pub fn from_loose(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => classify_number(number),
            Value::String(text) => Self::String(text.clone()),
            Value::Array(values) => Self::Array(values.iter().map(Self::from_loose).collect()),
            Value::Object(fields) => Self::Object(
                fields
                    .iter()
                    .map(|(key, field)| (key.clone(), Self::from_loose(field)))
                    .collect(),
            ),
        }
    }

    /// Returns the plain JSON representation.
    ///
    /// Non-finite doubles have no JSON form and map to `null`.
    pub fn to_json_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Int(number) => Value::from(*number),
            Self::Double(number) => Number::from_f64(*number).map_or(Value::Null, Value::Number),
            Self::String(text) => Value::String(text.clone()),
            Self::Array(values) => Value::Array(values.iter().map(Self::to_json_value).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, field)| (key.clone(), field.to_json_value()))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for MetadataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MetadataValueVisitor)
    }
}

/// Visits one JSON value directly, without buffering nested levels.
struct MetadataValueVisitor;

impl<'de> Visitor<'de> for MetadataValueVisitor {
    type Value = MetadataValue;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(MetadataValue::Null)
    }

    fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(MetadataValue::Null)
    }

    fn visit_bool<E: serde::de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(MetadataValue::Bool(value))
    }

    fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(MetadataValue::Int(value))
    }

    fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(i64::try_from(value).map_or(MetadataValue::Double(value as f64), MetadataValue::Int))
    }

    fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(MetadataValue::Double(value))
    }

    fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(MetadataValue::String(value.to_string()))
    }

    fn visit_string<E: serde::de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(MetadataValue::String(value))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(value) = seq.next_element()? {
            values.push(value);
        }
        Ok(MetadataValue::Array(values))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut fields = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, MetadataValue>()? {
            fields.insert(key, value);
        }
        Ok(MetadataValue::Object(fields))
    }
}

fn classify_number(number: &Number) -> MetadataValue {
    if let Some(integer) = number.as_i64() {
        return MetadataValue::Int(integer);
    }

    let Some(float) = number.as_f64() else {
        return MetadataValue::Null;
    };
    // Upper bound is exclusive: `i64::MAX as f64` rounds up to 2^63.
    if float.is_finite()
        && float.fract() == 0.0
        && float >= i64::MIN as f64
        && float < i64::MAX as f64
    {
        MetadataValue::Int(float as i64)
    } else {
        MetadataValue::Double(float)
    }
}

/// Typed metadata attached to an item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMetadata {
    /// Absolute path returned by the attachment store, if any.
    pub attachment_file_path: Option<String>,
    /// Every key outside the known schema, preserved opaquely.
    ///
    /// An entry under [`ATTACHMENT_FILE_PATH_KEY`] is never emitted; the
    /// typed field owns that key.
    pub extensions: BTreeMap<String, MetadataValue>,
}

impl ItemMetadata {
    pub fn new(
        attachment_file_path: Option<String>,
        extensions: BTreeMap<String, MetadataValue>,
    ) -> Self {
        Self {
            attachment_file_path,
            extensions,
        }
    }

    /// Decodes persisted metadata JSON, falling back to empty metadata.
    pub fn decode(json: &str) -> Self {
        match decode_unbounded(json) {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(
                    "event=metadata_decode module=model status=fallback error_line={} error_column={}",
                    err.line(),
                    err.column()
                );
                Self::default()
            }
        }
    }

    /// Encodes metadata as compact JSON with sorted keys.
    ///
    /// Returns `{}` if serialization fails.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Builds metadata from a loosely-typed dictionary payload.
    ///
    /// A non-string `attachment_file_path` is ignored rather than rejected.
    pub fn from_loose_map(map: &Map<String, Value>) -> Self {
        let attachment_file_path = map
            .get(ATTACHMENT_FILE_PATH_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        let extensions = map
            .iter()
            .filter(|(key, _)| key.as_str() != ATTACHMENT_FILE_PATH_KEY)
            .map(|(key, value)| (key.clone(), MetadataValue::from_loose(value)))
            .collect();

        Self {
            attachment_file_path,
            extensions,
        }
    }

    /// Returns the dictionary representation as a JSON object.
    pub fn to_json_value(&self) -> Value {
        let mut object: Map<String, Value> = self
            .extensions
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json_value()))
            .collect();
        if let Some(path) = self.attachment_file_path.as_ref() {
            object.insert(ATTACHMENT_FILE_PATH_KEY.to_string(), Value::String(path.clone()));
        }
        Value::Object(object)
    }

    pub fn is_empty(&self) -> bool {
        self.attachment_file_path.is_none() && self.extensions.is_empty()
    }

    pub fn extension(&self, key: &str) -> Option<&MetadataValue> {
        self.extensions.get(key)
    }

    fn emitted_extensions(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.extensions
            .iter()
            .filter(|(key, _)| key.as_str() != ATTACHMENT_FILE_PATH_KEY)
    }
}

/// Parses without serde_json's recursion limit; `serde_stacker` grows the
/// stack on deep input instead.
fn decode_unbounded(json: &str) -> serde_json::Result<ItemMetadata> {
    let mut json_deserializer = serde_json::Deserializer::from_str(json);
    json_deserializer.disable_recursion_limit();
    let metadata =
        ItemMetadata::deserialize(serde_stacker::Deserializer::new(&mut json_deserializer))?;
    json_deserializer.end()?;
    Ok(metadata)
}

impl Serialize for ItemMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.emitted_extensions().count() + usize::from(self.attachment_file_path.is_some());
        let mut map = serializer.serialize_map(Some(len))?;

        // Extensions are already sorted; slot the reserved key in order.
        let mut pending_path = self.attachment_file_path.as_deref();
        for (key, value) in self.emitted_extensions() {
            if let Some(path) = pending_path {
                if ATTACHMENT_FILE_PATH_KEY < key.as_str() {
                    map.serialize_entry(ATTACHMENT_FILE_PATH_KEY, path)?;
                    pending_path = None;
                }
            }
            map.serialize_entry(key, value)?;
        }
        if let Some(path) = pending_path {
            map.serialize_entry(ATTACHMENT_FILE_PATH_KEY, path)?;
        }

        map.end()
    }
}

impl<'de> Deserialize<'de> for ItemMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut extensions = BTreeMap::<String, MetadataValue>::deserialize(deserializer)?;
        let attachment_file_path = match extensions.remove(ATTACHMENT_FILE_PATH_KEY) {
            None | Some(MetadataValue::Null) => None,
            Some(MetadataValue::String(path)) => Some(path),
            Some(_) => {
                return Err(D::Error::custom(format!(
                    "`{ATTACHMENT_FILE_PATH_KEY}` must be a string"
                )));
            }
        };

        Ok(Self {
            attachment_file_path,
            extensions,
        })
    }
}
