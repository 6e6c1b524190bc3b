//! Dynamic document values.
//!
//! Documents hold heterogeneous values; [`Value`] is the tagged union over
//! every kind a field can hold. Operator evaluation, index keys, sorting,
//! and the snapshot codec all dispatch on this one enum, so the generic
//! map type never leaks through the public interface.
//!
//! # Orderings
//!
//! Two orderings are defined and deliberately kept apart:
//!
//! - the *query ordering* ([`Value::partial_cmp_query`]) used by comparison
//!   operators: defined within a kind (plus the integer/double pair);
//!   cross-kind comparisons are undefined and make range operators not
//!   match.
//! - the *total ordering* ([`Value::cmp_total`]) used by index keys and
//!   cursor sorts: the query ordering extended with a kind precedence
//!   (null < bool < numbers < string < timestamp < id < binary < array <
//!   object) so any two values can be placed in a B-tree.

use crate::binary::Blob;
use crate::document::Document;
use crate::oid::ObjectId;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A single field value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// IEEE 754 double precision float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// UTC timestamp
    DateTime(DateTime<Utc>),
    /// Document identifier
    Id(ObjectId),
    /// Binary payload
    Binary(Blob),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Nested document
    Object(Document),
}

impl Value {
    /// Builds an array value from anything iterable into values.
    pub fn array<I, T>(items: I) -> Value
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Builds a binary value from raw bytes.
    pub fn binary(bytes: Vec<u8>) -> Value {
        Value::Binary(Blob::new(bytes))
    }

    /// Kind tag as used by the `$type` operator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::DateTime(_) => "date",
            Value::Id(_) => "objectId",
            Value::Binary(_) => "binData",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Checks a `$type` tag; `"number"` matches both numeric kinds.
    pub fn matches_type_tag(&self, tag: &str) -> bool {
        if tag == "number" {
            return matches!(self, Value::Int(_) | Value::Double(_));
        }
        tag == self.type_name()
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for either numeric kind.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// Integer payload, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric payload widened to `f64`, for either numeric kind.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Array payload.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Nested document payload.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Object(d) => Some(d),
            _ => None,
        }
    }

    /// Identifier payload.
    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Binary payload.
    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Timestamp payload.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Kind precedence used by the total ordering.
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::DateTime(_) => 4,
            Value::Id(_) => 5,
            Value::Binary(_) => 6,
            Value::Array(_) => 7,
            Value::Object(_) => 8,
        }
    }

    /// Total ordering across all kinds: per-kind ordering extended with the
    /// kind precedence. Used for index keys and cursor sorts.
    pub fn cmp_total(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Double(b)) => (*a as f64).total_cmp(b),
            (Double(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Double(a), Double(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Id(a), Id(b)) => a.cmp(b),
            (Binary(a), Binary(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Array(a), Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp_total(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Object(a), Object(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    match ka.cmp(kb) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                    match va.cmp_total(vb) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    /// Query ordering: defined only within a kind (the integer/double pair
    /// counts as one kind). Cross-kind comparisons return `None`, which
    /// makes range operators not match.
    pub fn partial_cmp_query(&self, other: &Value) -> Option<Ordering> {
        if self.kind_rank() != other.kind_rank() {
            return None;
        }
        Some(self.cmp_total(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            // NaN equals itself so equality stays reflexive for map keys
            (Double(a), Double(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Int(a), Double(b)) | (Double(b), Int(a)) => *a as f64 == *b,
            (String(a), String(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Id(a), Id(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

// Hashing must agree with the numeric cross-kind equality above: an
// integral double hashes as the integer it equals, everything else by bit
// pattern (the bit trick keeps NaN consistent).
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(2);
                i.hash(state);
            }
            Value::Double(d) => {
                if d.is_finite()
                    && d.fract() == 0.0
                    && *d >= i64::MIN as f64
                    && *d <= i64::MAX as f64
                {
                    state.write_u8(2);
                    (*d as i64).hash(state);
                } else {
                    state.write_u8(3);
                    d.to_bits().hash(state);
                }
            }
            Value::String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::DateTime(dt) => {
                state.write_u8(5);
                dt.timestamp().hash(state);
                dt.timestamp_subsec_nanos().hash(state);
            }
            Value::Id(id) => {
                state.write_u8(6);
                id.hash(state);
            }
            Value::Binary(b) => {
                state.write_u8(7);
                b.hash(state);
            }
            Value::Array(a) => {
                state.write_u8(8);
                a.len().hash(state);
                for item in a {
                    item.hash(state);
                }
            }
            Value::Object(d) => {
                state.write_u8(9);
                // Sorted keys: document equality ignores field order, so
                // hashing must too
                let mut keys: Vec<&str> = d.keys().collect();
                keys.sort_unstable();
                keys.len().hash(state);
                for key in keys {
                    key.hash(state);
                    d.get(key).hash(state);
                }
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::Id(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Blob> for Value {
    fn from(v: Blob) -> Self {
        Value::Binary(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

// Serialization into the self-describing snapshot form. Identifiers and
// timestamps travel as single-entry tagged maps ({"$oid": hex} and
// {"$date": rfc3339}); everything else maps onto the serde data model
// directly, so MessagePack keeps primitives, byte strings, lists, and
// mappings in their native encodings.
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(dt) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$date", &dt.to_rfc3339())?;
                map.end()
            }
            Value::Id(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$oid", &id.to_string())?;
                map.end()
            }
            Value::Binary(b) => serializer.serialize_bytes(b.as_bytes()),
            Value::Array(a) => serializer.collect_seq(a),
            Value::Object(d) => d.serialize(serializer),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> serde::de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a document value")
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                serde::Deserialize::deserialize(deserializer)
            }

            fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Int(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
                if v <= i64::MAX as u64 {
                    Ok(Value::Int(v as i64))
                } else {
                    Ok(Value::Double(v as f64))
                }
            }

            fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Double(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Value, E> {
                Ok(Value::String(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> Result<Value, E> {
                Ok(Value::String(v))
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Value, E> {
                Ok(Value::Binary(Blob::new(v.to_vec())))
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Value, E> {
                Ok(Value::Binary(Blob::new(v)))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut array = Vec::new();
                while let Some(value) = seq.next_element()? {
                    array.push(value);
                }
                Ok(Value::Array(array))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut doc = Document::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    doc.insert(key, value);
                }
                Ok(untag_document(doc))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Restores the typed kinds hidden behind single-entry tagged maps.
fn untag_document(doc: Document) -> Value {
    if doc.len() == 1 {
        match doc.get("$oid") {
            Some(Value::String(hex)) => {
                if let Ok(id) = ObjectId::parse_str(hex) {
                    return Value::Id(id);
                }
            }
            _ => {}
        }
        match doc.get("$date") {
            Some(Value::String(text)) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    return Value::DateTime(dt.with_timezone(&Utc));
                }
            }
            Some(Value::Int(millis)) => {
                if let Some(dt) = DateTime::from_timestamp_millis(*millis) {
                    return Value::DateTime(dt);
                }
            }
            _ => {}
        }
        if let Some(Value::String(b64)) = doc.get("$binary") {
            use base64::Engine as _;
            if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(b64) {
                return Value::Binary(Blob::new(bytes));
            }
        }
    }
    Value::Object(doc)
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Double(f)
                } else {
                    // u64 beyond i64 range
                    Value::Double(n.as_u64().map(|u| u as f64).unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let mut doc = Document::new();
                for (key, value) in map {
                    doc.insert(key, Value::from(value));
                }
                untag_document(doc)
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        use base64::Engine as _;
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Double(d) => serde_json::Number::from_f64(d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::DateTime(dt) => serde_json::json!({ "$date": dt.to_rfc3339() }),
            Value::Id(id) => serde_json::json!({ "$oid": id.to_string() }),
            Value::Binary(b) => serde_json::json!({
                "$binary": base64::engine::general_purpose::STANDARD.encode(b.as_bytes())
            }),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(doc) => {
                let mut map = serde_json::Map::new();
                for (key, value) in doc {
                    map.insert(key, value.into());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}
