//! Dotted field paths.
//!
//! Field names in queries, updates, projections, and aggregation
//! expressions may contain `.` to reach into nested documents and arrays.
//! This module parses a path once into segments and provides the traversal
//! primitives every engine shares:
//!
//! - [`resolve_all`]: read-side traversal with array broadcasting (a
//!   non-numeric segment against an array descends into every element)
//! - [`get_path`] / [`set_path`] / [`remove_path`]: write-side traversal
//!   with intermediate-document creation and numeric array indexing
//!
//! The positional placeholder `$` is parsed here but resolved by the update
//! engine against the match context captured by the query.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::Value;

/// One parsed path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSegment {
    /// Field name; interpreted as an array index when it is all digits and
    /// the value at that point is an array
    Named(String),
    /// The positional placeholder `$`
    Positional,
}

/// A parsed dotted path.
#[derive(Debug, Clone)]
pub(crate) struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Splits a dotted path into segments.
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('.')
            .map(|seg| {
                if seg == "$" {
                    PathSegment::Positional
                } else {
                    PathSegment::Named(seg.to_string())
                }
            })
            .collect();
        FieldPath {
            raw: path.to_string(),
            segments,
        }
    }

    /// Parsed segments in order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// True when any segment is the positional placeholder.
    pub fn has_positional(&self) -> bool {
        self.segments.contains(&PathSegment::Positional)
    }

    /// Resolves positional placeholders against a capture table mapping an
    /// array path (dotted prefix) to the matched element index, yielding
    /// plain string segments for the write-side traversal.
    pub fn resolve_positional(
        &self,
        positions: &std::collections::HashMap<String, usize>,
    ) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(self.segments.len());
        let mut prefix = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Named(name) => {
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(name);
                    out.push(name.clone());
                }
                PathSegment::Positional => {
                    let index = positions.get(&prefix).ok_or_else(|| {
                        Error::MissingField(format!(
                            "positional operator in '{}' has no matched array element",
                            self.raw
                        ))
                    })?;
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(&index.to_string());
                    out.push(index.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Read-side traversal with array broadcasting.
///
/// Returns every value the path reaches. A numeric segment against an array
/// selects that element; a non-numeric segment against an array descends
/// into each element. An empty result means the path is absent.
pub(crate) fn resolve_all<'a>(doc: &'a Document, segments: &[PathSegment]) -> Vec<&'a Value> {
    let mut out = Vec::new();
    if let Some(PathSegment::Named(first)) = segments.first() {
        if let Some(value) = doc.get(first) {
            walk(value, &segments[1..], &mut out);
        }
    }
    out
}

/// First value the path resolves to, if any.
pub(crate) fn resolve_first<'a>(doc: &'a Document, segments: &[PathSegment]) -> Option<&'a Value> {
    resolve_all(doc, segments).into_iter().next()
}

fn walk<'a>(value: &'a Value, segments: &[PathSegment], out: &mut Vec<&'a Value>) {
    let Some(segment) = segments.first() else {
        out.push(value);
        return;
    };
    let PathSegment::Named(name) = segment else {
        // Positional placeholders never appear on the read side
        return;
    };
    match value {
        Value::Object(doc) => {
            if let Some(next) = doc.get(name) {
                walk(next, &segments[1..], out);
            }
        }
        Value::Array(items) => {
            if let Some(index) = parse_index(name) {
                if let Some(next) = items.get(index) {
                    walk(next, &segments[1..], out);
                }
            } else {
                for item in items {
                    walk(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

/// Non-broadcasting lookup: numeric segments index arrays, names address
/// documents. Used where exactly one slot is meant.
pub(crate) fn get_path<'a>(doc: &'a Document, segments: &[String]) -> Option<&'a Value> {
    let mut current = doc.get(segments.first()?)?;
    for segment in &segments[1..] {
        current = match current {
            Value::Object(d) => d.get(segment)?,
            Value::Array(items) => items.get(parse_index(segment)?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets the value at a path, creating intermediate documents as needed.
///
/// An index one past the end of an array appends; further out is
/// `BadQuery`. Descending through a scalar is `TypeMismatch`.
pub(crate) fn set_path(doc: &mut Document, segments: &[String], value: Value) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        return Err(Error::BadQuery("empty update path".to_string()));
    };
    if rest.is_empty() {
        doc.insert(first.clone(), value);
        return Ok(());
    }
    if !doc.contains_key(first) {
        doc.insert(first.clone(), Value::Object(Document::new()));
    }
    set_in_value(doc.get_mut(first).expect("just inserted"), rest, value)
}

fn set_in_value(current: &mut Value, segments: &[String], value: Value) -> Result<()> {
    let (segment, rest) = segments.split_first().expect("caller checks non-empty");
    match current {
        Value::Object(d) => {
            if rest.is_empty() {
                d.insert(segment.clone(), value);
                return Ok(());
            }
            if !d.contains_key(segment) {
                d.insert(segment.clone(), Value::Object(Document::new()));
            }
            set_in_value(d.get_mut(segment).expect("just inserted"), rest, value)
        }
        Value::Array(items) => {
            let index = parse_index(segment).ok_or_else(|| {
                Error::TypeMismatch(format!(
                    "cannot use field name '{}' to address an array element",
                    segment
                ))
            })?;
            if rest.is_empty() {
                if index < items.len() {
                    items[index] = value;
                } else if index == items.len() {
                    items.push(value);
                } else {
                    return Err(Error::BadQuery(format!(
                        "array index {} out of range (length {})",
                        index,
                        items.len()
                    )));
                }
                return Ok(());
            }
            if index == items.len() {
                items.push(Value::Object(Document::new()));
            }
            let items_len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| {
                Error::BadQuery(format!(
                    "array index {} out of range (length {})",
                    index,
                    items_len
                ))
            })?;
            set_in_value(slot, rest, value)
        }
        other => Err(Error::TypeMismatch(format!(
            "cannot descend into {} value at '{}'",
            other.type_name(),
            segment
        ))),
    }
}

/// Removes the value at a path. Unsetting an array element nulls it out so
/// sibling indexes stay stable. Returns the removed value if anything
/// changed.
pub(crate) fn remove_path(doc: &mut Document, segments: &[String]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    if rest.is_empty() {
        return doc.remove(first);
    }
    remove_in_value(doc.get_mut(first)?, rest)
}

fn remove_in_value(current: &mut Value, segments: &[String]) -> Option<Value> {
    let (segment, rest) = segments.split_first()?;
    match current {
        Value::Object(d) => {
            if rest.is_empty() {
                d.remove(segment)
            } else {
                remove_in_value(d.get_mut(segment)?, rest)
            }
        }
        Value::Array(items) => {
            let index = parse_index(segment)?;
            if rest.is_empty() {
                let slot = items.get_mut(index)?;
                Some(std::mem::replace(slot, Value::Null))
            } else {
                remove_in_value(items.get_mut(index)?, rest)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn segs(path: &str) -> Vec<String> {
        path.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_parse_segments() {
        let path = FieldPath::parse("comments.$.likes");
        assert_eq!(path.segments().len(), 3);
        assert!(path.has_positional());
        assert!(!FieldPath::parse("a.b").has_positional());
    }

    #[test]
    fn test_resolve_nested_and_indexed() {
        let d = doc! {
            "specs" => doc! { "ram" => 16 },
            "tags" => vec!["a", "b"],
        };
        let ram = resolve_first(&d, FieldPath::parse("specs.ram").segments());
        assert_eq!(ram, Some(&Value::Int(16)));
        let second = resolve_first(&d, FieldPath::parse("tags.1").segments());
        assert_eq!(second, Some(&Value::String("b".to_string())));
        assert!(resolve_first(&d, FieldPath::parse("specs.cpu").segments()).is_none());
    }

    #[test]
    fn test_resolve_broadcasts_into_arrays() {
        let d = doc! {
            "comments" => vec![
                Value::Object(doc! { "user" => "u1", "likes" => 5 }),
                Value::Object(doc! { "user" => "u2", "likes" => 3 }),
            ],
        };
        let likes = resolve_all(&d, FieldPath::parse("comments.likes").segments());
        assert_eq!(likes, vec![&Value::Int(5), &Value::Int(3)]);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut d = doc! {};
        set_path(&mut d, &segs("a.b.c"), Value::Int(1)).unwrap();
        assert_eq!(get_path(&d, &segs("a.b.c")), Some(&Value::Int(1)));
    }

    #[test]
    fn test_set_array_element_and_append() {
        let mut d = doc! { "tags" => vec!["a", "b"] };
        set_path(&mut d, &segs("tags.1"), Value::from("z")).unwrap();
        set_path(&mut d, &segs("tags.2"), Value::from("c")).unwrap();
        assert_eq!(
            d.get("tags"),
            Some(&Value::array(["a", "z", "c"]))
        );
        let err = set_path(&mut d, &segs("tags.9"), Value::from("x")).unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut d = doc! { "a" => 5 };
        let err = set_path(&mut d, &segs("a.b"), Value::Int(1)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn test_remove_nested_field_and_array_slot() {
        let mut d = doc! {
            "a" => doc! { "b" => 1, "c" => 2 },
            "arr" => vec![1, 2, 3],
        };
        assert_eq!(remove_path(&mut d, &segs("a.b")), Some(Value::Int(1)));
        assert!(get_path(&d, &segs("a.b")).is_none());
        // Array slots null out instead of shifting
        assert_eq!(remove_path(&mut d, &segs("arr.1")), Some(Value::Int(2)));
        assert_eq!(
            d.get("arr"),
            Some(&Value::Array(vec![Value::Int(1), Value::Null, Value::Int(3)]))
        );
    }

    #[test]
    fn test_resolve_positional() {
        let path = FieldPath::parse("comments.$.likes");
        let mut positions = std::collections::HashMap::new();
        positions.insert("comments".to_string(), 1usize);
        assert_eq!(
            path.resolve_positional(&positions).unwrap(),
            segs("comments.1.likes")
        );

        let missing = FieldPath::parse("other.$.x")
            .resolve_positional(&positions)
            .unwrap_err();
        assert!(matches!(missing, Error::MissingField(_)));
    }
}
