//! Update evaluation.
//!
//! An update document either carries `$`-operators (field, arithmetic, and
//! array modifier families) or is a full replacement preserving `_id`.
//! Application never mutates the stored document in place: it produces a
//! new document, which the collection then swaps in and re-indexes.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::matcher::{value_matches, MatchContext};
use crate::path::{get_path, remove_path, set_path, FieldPath};
use crate::value::Value;

/// True when the update document is in operator form.
pub(crate) fn is_operator_update(update: &Document) -> bool {
    update.keys().any(|k| k.starts_with('$'))
}

/// Applies an update to a document, producing the new document.
///
/// `ctx` carries the positional capture from the query match; an update
/// without positional paths can pass a default context.
pub(crate) fn apply(
    original: &Document,
    update: &Document,
    ctx: &MatchContext,
) -> Result<Document> {
    if !is_operator_update(update) {
        return replace(original, update);
    }

    let mut doc = original.clone();
    for (op, arg) in update.iter() {
        let assignments = arg.as_document().ok_or_else(|| {
            Error::BadQuery(format!("{} takes a document of field assignments", op))
        })?;
        match op.as_str() {
            "$set" => {
                for (field, value) in assignments.iter() {
                    let segments = resolve_segments(field, ctx)?;
                    set_path(&mut doc, &segments, value.clone())?;
                }
            }
            "$unset" => {
                for (field, _) in assignments.iter() {
                    let segments = resolve_segments(field, ctx)?;
                    remove_path(&mut doc, &segments);
                }
            }
            "$rename" => {
                for (field, new_name) in assignments.iter() {
                    let new_name = new_name.as_str().ok_or_else(|| {
                        Error::BadQuery("$rename takes new field names as strings".to_string())
                    })?;
                    let old_segments = resolve_segments(field, ctx)?;
                    if let Some(value) = remove_path(&mut doc, &old_segments) {
                        let new_segments = resolve_segments(new_name, ctx)?;
                        set_path(&mut doc, &new_segments, value)?;
                    }
                }
            }
            "$inc" => apply_numeric(&mut doc, assignments, ctx, "$inc", |a, b| a + b, |a, b| {
                a.wrapping_add(b)
            })?,
            "$mul" => apply_numeric(&mut doc, assignments, ctx, "$mul", |a, b| a * b, |a, b| {
                a.wrapping_mul(b)
            })?,
            "$min" => apply_min_max(&mut doc, assignments, ctx, "$min", std::cmp::Ordering::Less)?,
            "$max" => {
                apply_min_max(&mut doc, assignments, ctx, "$max", std::cmp::Ordering::Greater)?
            }
            "$push" => {
                for (field, value) in assignments.iter() {
                    let segments = resolve_segments(field, ctx)?;
                    let mut items = take_array(&doc, &segments, "$push")?;
                    items.push(value.clone());
                    set_path(&mut doc, &segments, Value::Array(items))?;
                }
            }
            "$addToSet" => {
                for (field, value) in assignments.iter() {
                    let segments = resolve_segments(field, ctx)?;
                    let mut items = take_array(&doc, &segments, "$addToSet")?;
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                    set_path(&mut doc, &segments, Value::Array(items))?;
                }
            }
            "$pop" => {
                for (field, direction) in assignments.iter() {
                    let from_tail = match direction.as_i64() {
                        Some(1) => true,
                        Some(-1) => false,
                        _ => {
                            return Err(Error::BadQuery(
                                "$pop takes 1 (tail) or -1 (head)".to_string(),
                            ))
                        }
                    };
                    let segments = resolve_segments(field, ctx)?;
                    let mut items = take_array(&doc, &segments, "$pop")?;
                    if !items.is_empty() {
                        if from_tail {
                            items.pop();
                        } else {
                            items.remove(0);
                        }
                        set_path(&mut doc, &segments, Value::Array(items))?;
                    }
                }
            }
            "$pull" => {
                for (field, condition) in assignments.iter() {
                    let segments = resolve_segments(field, ctx)?;
                    let items = take_array(&doc, &segments, "$pull")?;
                    let mut kept = Vec::with_capacity(items.len());
                    for item in items {
                        if !value_matches(condition, &item)? {
                            kept.push(item);
                        }
                    }
                    set_path(&mut doc, &segments, Value::Array(kept))?;
                }
            }
            "$pullAll" => {
                for (field, condition) in assignments.iter() {
                    let unwanted = condition.as_array().ok_or_else(|| {
                        Error::BadQuery("$pullAll takes an array of values".to_string())
                    })?;
                    let segments = resolve_segments(field, ctx)?;
                    let items = take_array(&doc, &segments, "$pullAll")?;
                    let kept: Vec<Value> = items
                        .into_iter()
                        .filter(|item| !unwanted.contains(item))
                        .collect();
                    set_path(&mut doc, &segments, Value::Array(kept))?;
                }
            }
            other if other.starts_with('$') => {
                return Err(Error::BadQuery(format!(
                    "unknown update operator '{}'",
                    other
                )));
            }
            other => {
                return Err(Error::BadQuery(format!(
                    "cannot mix operators and plain fields in an update ('{}')",
                    other
                )));
            }
        }
    }
    Ok(doc)
}

/// Full-document replacement: the update has no operator keys; `_id` is
/// carried over from the original (a conflicting `_id` is rejected).
fn replace(original: &Document, replacement: &Document) -> Result<Document> {
    if let (Some(old_id), Some(new_id)) = (original.get("_id"), replacement.get("_id")) {
        if old_id != new_id {
            return Err(Error::BadQuery(
                "replacement document must not change _id".to_string(),
            ));
        }
    }
    let mut doc = Document::new();
    if let Some(id) = original.get("_id") {
        doc.insert("_id", id.clone());
    }
    for (key, value) in replacement.iter() {
        if key != "_id" {
            doc.insert(key.clone(), value.clone());
        }
    }
    Ok(doc)
}

/// Synthesizes the document an upsert inserts when nothing matched: the
/// query's equality clauses seed the document, then the update applies.
pub(crate) fn synthesize_upsert(query: &Document, update: &Document) -> Result<Document> {
    let mut seed = Document::new();
    for (field, condition) in query.iter() {
        if field.starts_with('$') {
            continue;
        }
        let path = FieldPath::parse(field);
        if path.has_positional() {
            continue;
        }
        let value = match condition {
            Value::Object(d) if d.keys().any(|k| k.starts_with('$')) => d.get("$eq").cloned(),
            other => Some(other.clone()),
        };
        if let Some(value) = value {
            let segments: Vec<String> = field.split('.').map(str::to_string).collect();
            set_path(&mut seed, &segments, value)?;
        }
    }
    apply(&seed, update, &MatchContext::default())
}

fn resolve_segments(field: &str, ctx: &MatchContext) -> Result<Vec<String>> {
    FieldPath::parse(field).resolve_positional(&ctx.positions)
}

fn apply_numeric(
    doc: &mut Document,
    assignments: &Document,
    ctx: &MatchContext,
    op: &str,
    float_op: impl Fn(f64, f64) -> f64,
    int_op: impl Fn(i64, i64) -> i64,
) -> Result<()> {
    for (field, operand) in assignments.iter() {
        if !operand.is_number() {
            return Err(Error::TypeMismatch(format!(
                "{} operand for '{}' must be numeric, got {}",
                op,
                field,
                operand.type_name()
            )));
        }
        let segments = resolve_segments(field, ctx)?;
        let current = match get_path(doc, &segments) {
            None | Some(Value::Null) => Value::Int(0),
            Some(value) if value.is_number() => value.clone(),
            Some(other) => {
                return Err(Error::TypeMismatch(format!(
                    "{} target '{}' holds {} value",
                    op,
                    field,
                    other.type_name()
                )));
            }
        };
        let result = match (&current, operand) {
            (Value::Int(a), Value::Int(b)) => Value::Int(int_op(*a, *b)),
            _ => Value::Double(float_op(
                current.as_f64().expect("checked numeric"),
                operand.as_f64().expect("checked numeric"),
            )),
        };
        set_path(doc, &segments, result)?;
    }
    Ok(())
}

fn apply_min_max(
    doc: &mut Document,
    assignments: &Document,
    ctx: &MatchContext,
    op: &str,
    keep_when: std::cmp::Ordering,
) -> Result<()> {
    for (field, operand) in assignments.iter() {
        if !matches!(
            operand,
            Value::Int(_) | Value::Double(_) | Value::String(_) | Value::DateTime(_)
        ) {
            return Err(Error::TypeMismatch(format!(
                "{} operand for '{}' must be a number, string, or timestamp",
                op, field
            )));
        }
        let segments = resolve_segments(field, ctx)?;
        match get_path(doc, &segments) {
            None | Some(Value::Null) => {
                set_path(doc, &segments, operand.clone())?;
            }
            Some(current) => {
                let ordering = operand.partial_cmp_query(current).ok_or_else(|| {
                    Error::TypeMismatch(format!(
                        "{} cannot compare {} with {} at '{}'",
                        op,
                        operand.type_name(),
                        current.type_name(),
                        field
                    ))
                })?;
                if ordering == keep_when {
                    set_path(doc, &segments, operand.clone())?;
                }
            }
        }
    }
    Ok(())
}

/// Reads the array at a path for an array modifier; a missing field is an
/// empty array, anything else is a type mismatch.
fn take_array(doc: &Document, segments: &[String], op: &str) -> Result<Vec<Value>> {
    match get_path(doc, segments) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(Error::TypeMismatch(format!(
            "{} target holds {} value",
            op,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::matcher;

    fn apply_simple(doc: &Document, update: &Document) -> Document {
        apply(doc, update, &MatchContext::default()).unwrap()
    }

    #[test]
    fn test_set_and_unset() {
        let d = doc! { "name" => "alpha", "age" => 30 };
        let out = apply_simple(&d, &doc! { "$set" => doc! { "age" => 31, "city" => "Rome" } });
        assert_eq!(out.get_i64("age"), Some(31));
        assert_eq!(out.get_str("city"), Some("Rome"));

        let out = apply_simple(&out, &doc! { "$unset" => doc! { "city" => 1 } });
        assert!(!out.contains_key("city"));
    }

    #[test]
    fn test_set_dotted_creates_intermediates() {
        let d = doc! {};
        let out = apply_simple(&d, &doc! { "$set" => doc! { "specs.ram" => 16 } });
        assert_eq!(
            out.get_document("specs").unwrap().get_i64("ram"),
            Some(16)
        );
    }

    #[test]
    fn test_rename() {
        let d = doc! { "old" => 5 };
        let out = apply_simple(&d, &doc! { "$rename" => doc! { "old" => "new" } });
        assert!(!out.contains_key("old"));
        assert_eq!(out.get_i64("new"), Some(5));
        // Renaming a missing field is a no-op
        let out = apply_simple(&d, &doc! { "$rename" => doc! { "ghost" => "x" } });
        assert_eq!(out, d);
    }

    #[test]
    fn test_inc_and_mul() {
        let d = doc! { "count" => 10, "factor" => 2.0 };
        let out = apply_simple(&d, &doc! { "$inc" => doc! { "count" => 5 } });
        assert_eq!(out.get("count"), Some(&Value::Int(15)));

        // Missing field starts from zero
        let out = apply_simple(&d, &doc! { "$inc" => doc! { "fresh" => 3 } });
        assert_eq!(out.get_i64("fresh"), Some(3));

        // Int stays Int; a double operand promotes
        let out = apply_simple(&d, &doc! { "$inc" => doc! { "count" => 0.5 } });
        assert_eq!(out.get("count"), Some(&Value::Double(10.5)));

        let out = apply_simple(&d, &doc! { "$mul" => doc! { "factor" => 3 } });
        assert_eq!(out.get("factor"), Some(&Value::Double(6.0)));
    }

    #[test]
    fn test_inc_type_mismatch() {
        let d = doc! { "name" => "alpha" };
        let err = apply(&d, &doc! { "$inc" => doc! { "name" => 1 } }, &MatchContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn test_min_max() {
        let d = doc! { "low" => 10, "high" => 10, "name" => "m" };
        let out = apply_simple(&d, &doc! { "$min" => doc! { "low" => 5 } });
        assert_eq!(out.get_i64("low"), Some(5));
        let out = apply_simple(&d, &doc! { "$min" => doc! { "low" => 50 } });
        assert_eq!(out.get_i64("low"), Some(10));
        let out = apply_simple(&d, &doc! { "$max" => doc! { "high" => 50 } });
        assert_eq!(out.get_i64("high"), Some(50));
        // Strings compare lexicographically
        let out = apply_simple(&d, &doc! { "$max" => doc! { "name" => "z" } });
        assert_eq!(out.get_str("name"), Some("z"));

        let err = apply(&d, &doc! { "$min" => doc! { "low" => "a" } }, &MatchContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn test_push_add_to_set_pop() {
        let d = doc! { "tags" => vec!["a"] };
        let out = apply_simple(&d, &doc! { "$push" => doc! { "tags" => "b" } });
        assert_eq!(out.get("tags"), Some(&Value::array(["a", "b"])));

        let out = apply_simple(&out, &doc! { "$addToSet" => doc! { "tags" => "a" } });
        assert_eq!(out.get("tags"), Some(&Value::array(["a", "b"])));
        let out = apply_simple(&out, &doc! { "$addToSet" => doc! { "tags" => "c" } });
        assert_eq!(out.get("tags"), Some(&Value::array(["a", "b", "c"])));

        let out = apply_simple(&out, &doc! { "$pop" => doc! { "tags" => 1 } });
        assert_eq!(out.get("tags"), Some(&Value::array(["a", "b"])));
        let out = apply_simple(&out, &doc! { "$pop" => doc! { "tags" => -1 } });
        assert_eq!(out.get("tags"), Some(&Value::array(["b"])));

        // Push onto a missing field creates the array
        let out = apply_simple(&d, &doc! { "$push" => doc! { "fresh" => 1 } });
        assert_eq!(out.get("fresh"), Some(&Value::array([1])));
    }

    #[test]
    fn test_pull_variants() {
        let d = doc! { "nums" => vec![1, 2, 3, 4, 5] };
        let out = apply_simple(&d, &doc! { "$pull" => doc! { "nums" => 3 } });
        assert_eq!(out.get("nums"), Some(&Value::array([1, 2, 4, 5])));

        let out = apply_simple(
            &d,
            &doc! { "$pull" => doc! { "nums" => doc! { "$gt" => 3 } } },
        );
        assert_eq!(out.get("nums"), Some(&Value::array([1, 2, 3])));

        let out = apply_simple(&d, &doc! { "$pullAll" => doc! { "nums" => vec![1, 5, 9] } });
        assert_eq!(out.get("nums"), Some(&Value::array([2, 3, 4])));

        // Sub-query form against document elements
        let docs = doc! {
            "items" => vec![
                Value::Object(doc! { "k" => "keep" }),
                Value::Object(doc! { "k" => "drop" }),
            ],
        };
        let out = apply_simple(
            &docs,
            &doc! { "$pull" => doc! { "items" => doc! { "k" => "drop" } } },
        );
        assert_eq!(out.get_array("items").unwrap().len(), 1);
    }

    #[test]
    fn test_positional_update() {
        let d = doc! {
            "comments" => vec![
                Value::Object(doc! { "user" => "u1", "likes" => 5 }),
                Value::Object(doc! { "user" => "u2", "likes" => 3 }),
            ],
        };
        let ctx = matcher::matches(&doc! { "comments.user" => "u2" }, &d)
            .unwrap()
            .expect("query should match");
        let out = apply(&d, &doc! { "$inc" => doc! { "comments.$.likes" => 1 } }, &ctx).unwrap();
        let comments = out.get_array("comments").unwrap();
        assert_eq!(comments[1].as_document().unwrap().get_i64("likes"), Some(4));
        assert_eq!(comments[0].as_document().unwrap().get_i64("likes"), Some(5));
    }

    #[test]
    fn test_positional_without_capture_fails() {
        let d = doc! { "comments" => vec![Value::Object(doc! { "likes" => 1 })] };
        let err = apply(
            &d,
            &doc! { "$inc" => doc! { "comments.$.likes" => 1 } },
            &MatchContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
    }

    #[test]
    fn test_replacement_preserves_id() {
        let d = doc! { "_id" => 7, "name" => "alpha", "age" => 30 };
        let out = apply_simple(&d, &doc! { "name" => "beta" });
        assert_eq!(out.get("_id"), Some(&Value::Int(7)));
        assert_eq!(out.get_str("name"), Some("beta"));
        assert!(!out.contains_key("age"));

        let err = apply(&d, &doc! { "_id" => 8, "name" => "x" }, &MatchContext::default())
            .unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));
    }

    #[test]
    fn test_mixed_update_rejected() {
        let d = doc! { "a" => 1 };
        let err = apply(
            &d,
            &doc! { "$set" => doc! { "a" => 2 }, "b" => 3 },
            &MatchContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));

        let err = apply(
            &d,
            &doc! { "$teleport" => doc! { "a" => 2 } },
            &MatchContext::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));
    }

    #[test]
    fn test_upsert_synthesis() {
        let query = doc! {
            "name" => "alpha",
            "age" => doc! { "$gte" => 30 },
            "group" => doc! { "$eq" => "g1" },
        };
        let update = doc! { "$set" => doc! { "visits" => 1 } };
        let seeded = synthesize_upsert(&query, &update).unwrap();
        assert_eq!(seeded.get_str("name"), Some("alpha"));
        assert_eq!(seeded.get_str("group"), Some("g1"));
        assert!(!seeded.contains_key("age"));
        assert_eq!(seeded.get_i64("visits"), Some(1));

        // Replacement-style upsert takes the replacement document
        let replacement = doc! { "name" => "fresh", "n" => 1 };
        let seeded = synthesize_upsert(&doc! { "name" => "alpha" }, &replacement).unwrap();
        assert_eq!(seeded.get_str("name"), Some("fresh"));
    }
}
