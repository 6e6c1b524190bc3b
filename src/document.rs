//! Documents: ordered field-name → value mappings.
//!
//! Field order carries no query semantics but is preserved through
//! round-trips, so documents come back out looking the way they went in.
//! The [`doc!`] macro is the usual way to build one:
//!
//! ```
//! use mainydb::{doc, Value};
//!
//! let d = doc! {
//!     "name" => "alpha",
//!     "age" => 30,
//!     "tags" => vec!["new", "shiny"],
//! };
//! assert_eq!(d.get("age"), Some(&Value::Int(30)));
//! ```

use crate::value::Value;
use indexmap::IndexMap;

/// An insertion-ordered mapping from field names to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: IndexMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Document {
            fields: IndexMap::new(),
        }
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sets a field, returning the previous value if the field existed.
    /// Existing fields keep their position; new fields append.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Looks up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Mutable lookup of a top-level field.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Removes a field, preserving the order of the remaining fields.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// True when the field is present (even holding `Null`).
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Iterates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Iterates field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Iterates values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    /// Mutable iteration over values in insertion order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.fields.values_mut()
    }

    /// String payload of a field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Integer payload of a field.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Numeric payload of a field widened to `f64`.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Array payload of a field.
    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    /// Nested document payload of a field.
    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    /// The document's `_id` field, if present.
    pub fn id(&self) -> Option<&Value> {
        self.get("_id")
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

impl serde::Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> serde::Deserialize<'de> for Document {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DocumentVisitor;

        impl<'de> serde::de::Visitor<'de> for DocumentVisitor {
            type Value = Document;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a document (map of field names to values)")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Document, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut doc = Document::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    doc.insert(key, value);
                }
                Ok(doc)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Builds a [`Document`] from `"field" => value` pairs.
///
/// Values go through [`Value::from`], so primitives, strings, identifiers,
/// timestamps, blobs, vectors, nested `doc!` invocations, and existing
/// [`Value`]s all work on the right-hand side.
///
/// ```
/// use mainydb::doc;
///
/// let user = doc! {
///     "name" => "John Doe",
///     "age" => 30,
///     "address" => doc! { "city" => "Boston" },
/// };
/// assert_eq!(user.get_document("address").unwrap().get_str("city"), Some("Boston"));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ( $( $key:expr => $value:expr ),+ $(,)? ) => {{
        let mut document = $crate::Document::new();
        $( document.insert($key, $crate::Value::from($value)); )+
        document
    }};
}
