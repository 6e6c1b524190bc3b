//! Query evaluation.
//!
//! A query document is a conjunction of field clauses; each clause is
//! either a literal equality or an operator document. Evaluation walks the
//! clause's dotted path with array broadcasting and applies each operator
//! to the resolved values: positive operators match when *any* resolved
//! value satisfies them, the negating operators (`$ne`, `$nin`, `$not`)
//! only when *every* resolved value does.
//!
//! While matching, the engine captures the index of the first array element
//! that satisfied an array sub-predicate; the update engine consumes that
//! capture to resolve positional `$` paths.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::path::{FieldPath, PathSegment};
use crate::value::Value;
use std::collections::HashMap;

/// Per-match state captured while evaluating a query against a document.
#[derive(Debug, Default, Clone)]
pub(crate) struct MatchContext {
    /// Array path → index of the first element that matched the
    /// corresponding sub-predicate
    pub positions: HashMap<String, usize>,
}

/// Evaluates a query against a document.
///
/// Returns `Ok(Some(context))` on a match, `Ok(None)` on a clean
/// non-match, and an error for malformed queries.
pub(crate) fn matches(query: &Document, doc: &Document) -> Result<Option<MatchContext>> {
    let mut ctx = MatchContext::default();
    if eval_query(query, doc, &mut ctx)? {
        Ok(Some(ctx))
    } else {
        Ok(None)
    }
}

fn eval_query(query: &Document, doc: &Document, ctx: &mut MatchContext) -> Result<bool> {
    for (key, condition) in query.iter() {
        let clause_matched = match key.as_str() {
            "$and" => {
                let branches = expect_query_list("$and", condition)?;
                let mut all = true;
                for branch in branches {
                    if !eval_query(branch, doc, ctx)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let branches = expect_query_list("$or", condition)?;
                let mut any = false;
                for branch in branches {
                    if eval_query(branch, doc, ctx)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let branches = expect_query_list("$nor", condition)?;
                let mut any = false;
                for branch in branches {
                    if eval_query(branch, doc, ctx)? {
                        any = true;
                        break;
                    }
                }
                !any
            }
            "$not" => {
                let sub = condition.as_document().ok_or_else(|| {
                    Error::BadQuery("$not takes a query document".to_string())
                })?;
                !eval_query(sub, doc, ctx)?
            }
            key if key.starts_with('$') => {
                return Err(Error::BadQuery(format!(
                    "unknown top-level operator '{}'",
                    key
                )));
            }
            field => eval_field_clause(field, condition, doc, ctx)?,
        };
        if !clause_matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn expect_query_list<'q>(op: &str, condition: &'q Value) -> Result<Vec<&'q Document>> {
    let items = condition
        .as_array()
        .ok_or_else(|| Error::BadQuery(format!("{} takes an array of query documents", op)))?;
    if items.is_empty() {
        return Err(Error::BadQuery(format!("{} requires a non-empty array", op)));
    }
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| Error::BadQuery(format!("{} elements must be documents", op)))
        })
        .collect()
}

fn eval_field_clause(
    field: &str,
    condition: &Value,
    doc: &Document,
    ctx: &mut MatchContext,
) -> Result<bool> {
    let path = FieldPath::parse(field);
    let predicate = parse_predicate(condition)?;
    let resolved = resolve_with_capture(doc, path.segments());
    apply_predicate(&predicate, &resolved, ctx, field)
}

/// A value the clause path reached, plus where array broadcasting happened
/// (outermost array path and element index) for positional capture.
struct Resolved<'a> {
    value: &'a Value,
    broadcast: Option<(String, usize)>,
}

fn resolve_with_capture<'a>(doc: &'a Document, segments: &[PathSegment]) -> Vec<Resolved<'a>> {
    let mut out = Vec::new();
    if let Some(PathSegment::Named(first)) = segments.first() {
        if let Some(value) = doc.get(first) {
            collect(value, &segments[1..], first.clone(), None, &mut out);
        }
    }
    out
}

fn collect<'a>(
    value: &'a Value,
    segments: &[PathSegment],
    prefix: String,
    broadcast: Option<(String, usize)>,
    out: &mut Vec<Resolved<'a>>,
) {
    let Some(segment) = segments.first() else {
        out.push(Resolved { value, broadcast });
        return;
    };
    let PathSegment::Named(name) = segment else {
        // Positional placeholders are an update-path construct
        return;
    };
    match value {
        Value::Object(doc) => {
            if let Some(next) = doc.get(name) {
                collect(
                    next,
                    &segments[1..],
                    format!("{}.{}", prefix, name),
                    broadcast,
                    out,
                );
            }
        }
        Value::Array(items) => {
            if let Some(index) = parse_index(name) {
                if let Some(next) = items.get(index) {
                    collect(
                        next,
                        &segments[1..],
                        format!("{}.{}", prefix, name),
                        broadcast,
                        out,
                    );
                }
            } else {
                for (index, item) in items.iter().enumerate() {
                    // Outermost broadcast wins for positional capture
                    let candidate = broadcast
                        .clone()
                        .or_else(|| Some((prefix.clone(), index)));
                    collect(item, segments, prefix.clone(), candidate, out);
                }
            }
        }
        _ => {}
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// A field clause parsed into its operator form.
enum Predicate<'q> {
    Literal(&'q Value),
    Ops(Vec<Op<'q>>),
}

enum Op<'q> {
    Eq(&'q Value),
    Ne(&'q Value),
    Gt(&'q Value),
    Gte(&'q Value),
    Lt(&'q Value),
    Lte(&'q Value),
    In(&'q [Value]),
    Nin(&'q [Value]),
    Exists(bool),
    Type(&'q str),
    All(&'q [Value]),
    Size(Box<Predicate<'q>>),
    ElemMatch(&'q Document),
    Regex(regex::Regex),
    Not(Box<Predicate<'q>>),
}

fn parse_predicate(condition: &Value) -> Result<Predicate<'_>> {
    if let Value::Object(doc) = condition {
        if doc.keys().any(|k| k.starts_with('$')) {
            return Ok(Predicate::Ops(parse_ops(doc)?));
        }
    }
    Ok(Predicate::Literal(condition))
}

fn parse_ops(doc: &Document) -> Result<Vec<Op<'_>>> {
    let mut ops = Vec::with_capacity(doc.len());
    let mut regex_pattern: Option<&str> = None;
    let mut regex_options: Option<&str> = None;

    for (key, arg) in doc.iter() {
        match key.as_str() {
            "$eq" => ops.push(Op::Eq(arg)),
            "$ne" => ops.push(Op::Ne(arg)),
            "$gt" => ops.push(Op::Gt(arg)),
            "$gte" => ops.push(Op::Gte(arg)),
            "$lt" => ops.push(Op::Lt(arg)),
            "$lte" => ops.push(Op::Lte(arg)),
            "$in" => ops.push(Op::In(expect_array("$in", arg)?)),
            "$nin" => ops.push(Op::Nin(expect_array("$nin", arg)?)),
            "$exists" => ops.push(Op::Exists(truthy_flag("$exists", arg)?)),
            "$type" => {
                let tag = arg
                    .as_str()
                    .ok_or_else(|| Error::BadQuery("$type takes a kind tag string".to_string()))?;
                ops.push(Op::Type(tag));
            }
            "$all" => ops.push(Op::All(expect_array("$all", arg)?)),
            "$size" => {
                match arg {
                    Value::Int(_) => {}
                    Value::Object(inner) if inner.keys().any(|k| k.starts_with('$')) => {}
                    _ => {
                        return Err(Error::BadQuery(
                            "$size takes an integer or a comparison document".to_string(),
                        ))
                    }
                }
                ops.push(Op::Size(Box::new(parse_predicate(arg)?)));
            }
            "$elemMatch" => {
                let sub = arg.as_document().ok_or_else(|| {
                    Error::BadQuery("$elemMatch takes a query document".to_string())
                })?;
                ops.push(Op::ElemMatch(sub));
            }
            "$regex" => {
                regex_pattern = Some(arg.as_str().ok_or_else(|| {
                    Error::BadQuery("$regex takes a pattern string".to_string())
                })?);
            }
            "$options" => {
                regex_options = Some(arg.as_str().ok_or_else(|| {
                    Error::BadQuery("$options takes a flag string".to_string())
                })?);
            }
            "$not" => {
                let inner = arg.as_document().ok_or_else(|| {
                    Error::BadQuery("$not takes an operator document".to_string())
                })?;
                ops.push(Op::Not(Box::new(Predicate::Ops(parse_ops(inner)?))));
            }
            other if other.starts_with('$') => {
                return Err(Error::BadQuery(format!("unknown operator '{}'", other)));
            }
            other => {
                return Err(Error::BadQuery(format!(
                    "cannot mix operator and literal keys in a clause ('{}')",
                    other
                )));
            }
        }
    }

    if let Some(pattern) = regex_pattern {
        ops.push(Op::Regex(compile_regex(pattern, regex_options.unwrap_or(""))?));
    } else if regex_options.is_some() {
        return Err(Error::BadQuery("$options requires $regex".to_string()));
    }

    Ok(ops)
}

fn expect_array<'q>(op: &str, arg: &'q Value) -> Result<&'q [Value]> {
    arg.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| Error::BadQuery(format!("{} takes an array", op)))
}

fn truthy_flag(op: &str, arg: &Value) -> Result<bool> {
    match arg {
        Value::Bool(b) => Ok(*b),
        Value::Int(i) => Ok(*i != 0),
        _ => Err(Error::BadQuery(format!("{} takes a boolean", op))),
    }
}

pub(crate) fn compile_regex(pattern: &str, options: &str) -> Result<regex::Regex> {
    for flag in options.chars() {
        if !matches!(flag, 'i' | 'm' | 's' | 'x') {
            return Err(Error::BadQuery(format!("unsupported regex option '{}'", flag)));
        }
    }
    let full = if options.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", options, pattern)
    };
    regex::Regex::new(&full).map_err(|e| Error::BadRegex(e.to_string()))
}

fn apply_predicate(
    predicate: &Predicate,
    resolved: &[Resolved],
    ctx: &mut MatchContext,
    raw_path: &str,
) -> Result<bool> {
    match predicate {
        Predicate::Literal(value) => apply_op(&Op::Eq(*value), resolved, ctx, raw_path),
        Predicate::Ops(ops) => {
            for op in ops {
                if !apply_op(op, resolved, ctx, raw_path)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

fn apply_op(op: &Op, resolved: &[Resolved], ctx: &mut MatchContext, raw_path: &str) -> Result<bool> {
    match op {
        Op::Exists(want) => Ok(!resolved.is_empty() == *want),
        // Negating operators hold only when every resolved value passes
        Op::Ne(_) | Op::Nin(_) | Op::Not(_) => {
            if resolved.is_empty() {
                return op_on_value(op, None, ctx, raw_path);
            }
            for item in resolved {
                if !op_on_value(op, Some(item.value), ctx, raw_path)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => {
            for item in resolved {
                if op_on_value(op, Some(item.value), ctx, raw_path)? {
                    if let Some((array_path, index)) = &item.broadcast {
                        ctx.positions.entry(array_path.clone()).or_insert(*index);
                    }
                    return Ok(true);
                }
            }
            if resolved.is_empty() {
                return op_on_value(op, None, ctx, raw_path);
            }
            Ok(false)
        }
    }
}

fn op_on_value(
    op: &Op,
    target: Option<&Value>,
    ctx: &mut MatchContext,
    raw_path: &str,
) -> Result<bool> {
    match op {
        Op::Eq(expected) => Ok(eq_match(target, expected)),
        Op::Ne(expected) => Ok(!eq_match(target, expected)),
        Op::Gt(bound) => Ok(cmp_match(target, bound, |o| o == std::cmp::Ordering::Greater)),
        Op::Gte(bound) => Ok(cmp_match(target, bound, |o| o != std::cmp::Ordering::Less)),
        Op::Lt(bound) => Ok(cmp_match(target, bound, |o| o == std::cmp::Ordering::Less)),
        Op::Lte(bound) => Ok(cmp_match(target, bound, |o| o != std::cmp::Ordering::Greater)),
        Op::In(choices) => Ok(choices.iter().any(|choice| eq_match(target, choice))),
        Op::Nin(choices) => Ok(!choices.iter().any(|choice| eq_match(target, choice))),
        Op::Exists(want) => Ok(target.is_some() == *want),
        Op::Type(tag) => Ok(target.is_some_and(|t| t.matches_type_tag(tag))),
        Op::All(required) => {
            if required.is_empty() {
                return Ok(false);
            }
            let Some(target) = target else {
                return Ok(false);
            };
            Ok(required.iter().all(|item| eq_match(Some(target), item)))
        }
        Op::Size(length_pred) => {
            let Some(Value::Array(items)) = target else {
                return Ok(false);
            };
            let length = Value::Int(items.len() as i64);
            let resolved = [Resolved {
                value: &length,
                broadcast: None,
            }];
            let mut scratch = MatchContext::default();
            apply_predicate(length_pred, &resolved, &mut scratch, raw_path)
        }
        Op::ElemMatch(sub) => {
            let Some(Value::Array(items)) = target else {
                return Ok(false);
            };
            for (index, element) in items.iter().enumerate() {
                let hit = match element {
                    Value::Object(element_doc) => matches(sub, element_doc)?.is_some(),
                    scalar if sub.keys().all(|k| k.starts_with('$')) => {
                        // {$elemMatch: {$gt: 5}} form applied to scalar elements
                        let resolved = [Resolved {
                            value: scalar,
                            broadcast: None,
                        }];
                        let mut scratch = MatchContext::default();
                        apply_predicate(&Predicate::Ops(parse_ops(sub)?), &resolved, &mut scratch, raw_path)?
                    }
                    _ => false,
                };
                if hit {
                    ctx.positions.entry(raw_path.to_string()).or_insert(index);
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Op::Regex(re) => Ok(match target {
            Some(Value::String(s)) => re.is_match(s),
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| item.as_str().is_some_and(|s| re.is_match(s))),
            _ => false,
        }),
        Op::Not(inner) => {
            let resolved_one;
            let resolved: &[Resolved] = match target {
                Some(value) => {
                    resolved_one = [Resolved {
                        value,
                        broadcast: None,
                    }];
                    &resolved_one
                }
                None => &[],
            };
            let mut scratch = MatchContext::default();
            Ok(!apply_predicate(inner, resolved, &mut scratch, raw_path)?)
        }
    }
}

/// Evaluates a `$pull`-style condition against one standalone value: an
/// operator document applies its operators to the value, a plain document
/// is a sub-query against document elements, anything else is equality.
pub(crate) fn value_matches(condition: &Value, element: &Value) -> Result<bool> {
    if let Value::Object(cond_doc) = condition {
        if cond_doc.keys().any(|k| k.starts_with('$')) {
            let ops = parse_ops(cond_doc)?;
            let resolved = [Resolved {
                value: element,
                broadcast: None,
            }];
            let mut scratch = MatchContext::default();
            return apply_predicate(&Predicate::Ops(ops), &resolved, &mut scratch, "");
        }
        if let Value::Object(element_doc) = element {
            return Ok(matches(cond_doc, element_doc)?.is_some());
        }
        return Ok(false);
    }
    Ok(element == condition)
}

fn eq_match(target: Option<&Value>, expected: &Value) -> bool {
    match target {
        None => expected.is_null(),
        Some(target) => {
            if target == expected {
                return true;
            }
            // An array field also matches a literal it contains
            if let Value::Array(items) = target {
                if !matches!(expected, Value::Array(_)) {
                    return items.iter().any(|item| item == expected);
                }
            }
            false
        }
    }
}

fn cmp_match(
    target: Option<&Value>,
    bound: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool + Copy,
) -> bool {
    let Some(target) = target else {
        return false;
    };
    if let Value::Array(items) = target {
        if !matches!(bound, Value::Array(_)) {
            return items
                .iter()
                .any(|item| item.partial_cmp_query(bound).is_some_and(accept));
        }
    }
    target.partial_cmp_query(bound).is_some_and(accept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn hit(query: &Document, doc: &Document) -> bool {
        matches(query, doc).unwrap().is_some()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(hit(&doc! {}, &doc! { "a" => 1 }));
        assert!(hit(&doc! {}, &doc! {}));
    }

    #[test]
    fn test_literal_equality() {
        let d = doc! { "name" => "alpha", "age" => 30 };
        assert!(hit(&doc! { "name" => "alpha" }, &d));
        assert!(hit(&doc! { "name" => "alpha", "age" => 30 }, &d));
        assert!(!hit(&doc! { "name" => "beta" }, &d));
        assert!(!hit(&doc! { "missing" => 1 }, &d));
    }

    #[test]
    fn test_comparison_operators() {
        let d = doc! { "age" => 30 };
        assert!(hit(&doc! { "age" => doc! { "$gt" => 25 } }, &d));
        assert!(hit(&doc! { "age" => doc! { "$gte" => 30 } }, &d));
        assert!(hit(&doc! { "age" => doc! { "$lt" => 31 } }, &d));
        assert!(hit(&doc! { "age" => doc! { "$lte" => 30 } }, &d));
        assert!(!hit(&doc! { "age" => doc! { "$gt" => 30 } }, &d));
        assert!(hit(&doc! { "age" => doc! { "$gte" => 25, "$lte" => 32 } }, &d));
        // Int/double cross-kind comparison is allowed
        assert!(hit(&doc! { "age" => doc! { "$gt" => 29.5 } }, &d));
    }

    #[test]
    fn test_cross_kind_comparison_never_matches() {
        let d = doc! { "age" => 30 };
        assert!(!hit(&doc! { "age" => doc! { "$gt" => "a" } }, &d));
        assert!(!hit(&doc! { "age" => doc! { "$lt" => "a" } }, &d));
        // Except $ne, which matches when kinds differ
        assert!(hit(&doc! { "age" => doc! { "$ne" => "a" } }, &d));
    }

    #[test]
    fn test_in_nin() {
        let d = doc! { "name" => "jane" };
        assert!(hit(
            &doc! { "name" => doc! { "$in" => vec!["jane", "bob"] } },
            &d
        ));
        assert!(!hit(
            &doc! { "name" => doc! { "$in" => vec!["x", "y"] } },
            &d
        ));
        assert!(hit(
            &doc! { "name" => doc! { "$nin" => vec!["x", "y"] } },
            &d
        ));

        // List intersection when the field is an array
        let tagged = doc! { "tags" => vec!["a", "b"] };
        assert!(hit(
            &doc! { "tags" => doc! { "$in" => vec!["b", "z"] } },
            &tagged
        ));
    }

    #[test]
    fn test_logical_operators() {
        let d = doc! { "category" => "Electronics", "price" => 700 };
        let q = doc! {
            "$or" => vec![
                Value::Object(doc! { "category" => "Electronics" }),
                Value::Object(doc! { "price" => doc! { "$gt" => 1000 } }),
            ],
        };
        assert!(hit(&q, &d));

        let q = doc! {
            "$and" => vec![
                Value::Object(doc! { "category" => "Electronics" }),
                Value::Object(doc! { "price" => doc! { "$lt" => 500 } }),
            ],
        };
        assert!(!hit(&q, &d));

        let q = doc! {
            "$nor" => vec![
                Value::Object(doc! { "category" => "Audio" }),
                Value::Object(doc! { "price" => doc! { "$gt" => 1000 } }),
            ],
        };
        assert!(hit(&q, &d));

        let q = doc! { "$not" => doc! { "category" => "Audio" } };
        assert!(hit(&q, &d));
    }

    #[test]
    fn test_exists_and_type() {
        let d = doc! { "a" => Value::Null, "b" => 2 };
        assert!(hit(&doc! { "a" => doc! { "$exists" => true } }, &d));
        assert!(hit(&doc! { "c" => doc! { "$exists" => false } }, &d));
        assert!(!hit(&doc! { "b" => doc! { "$exists" => false } }, &d));
        assert!(hit(&doc! { "b" => doc! { "$type" => "int" } }, &d));
        assert!(hit(&doc! { "b" => doc! { "$type" => "number" } }, &d));
        assert!(!hit(&doc! { "b" => doc! { "$type" => "string" } }, &d));
    }

    #[test]
    fn test_array_operators() {
        let d = doc! { "tags" => vec!["portable", "work", "computer"] };
        assert!(hit(
            &doc! { "tags" => doc! { "$all" => vec!["portable", "work"] } },
            &d
        ));
        assert!(!hit(
            &doc! { "tags" => doc! { "$all" => vec!["portable", "audio"] } },
            &d
        ));
        assert!(hit(&doc! { "tags" => doc! { "$size" => 3 } }, &d));
        assert!(hit(
            &doc! { "tags" => doc! { "$size" => doc! { "$gte" => 1 } } },
            &d
        ));
        assert!(!hit(&doc! { "tags" => doc! { "$size" => 2 } }, &d));
        // $size and $elemMatch on a non-array never match
        let scalar = doc! { "tags" => "portable" };
        assert!(!hit(&doc! { "tags" => doc! { "$size" => 1 } }, &scalar));
        assert!(!hit(
            &doc! { "tags" => doc! { "$elemMatch" => doc! { "$eq" => "portable" } } },
            &scalar
        ));
    }

    #[test]
    fn test_elem_match_and_capture() {
        let d = doc! {
            "reviews" => vec![
                Value::Object(doc! { "user" => "u1", "rating" => 3.0 }),
                Value::Object(doc! { "user" => "u2", "rating" => 4.8 }),
            ],
        };
        let q = doc! {
            "reviews" => doc! {
                "$elemMatch" => doc! { "user" => "u2", "rating" => doc! { "$gte" => 4.5 } },
            },
        };
        let ctx = matches(&q, &d).unwrap().expect("should match");
        assert_eq!(ctx.positions.get("reviews"), Some(&1));
    }

    #[test]
    fn test_dotted_path_broadcast_capture() {
        let d = doc! {
            "comments" => vec![
                Value::Object(doc! { "user" => "u1", "likes" => 5 }),
                Value::Object(doc! { "user" => "u2", "likes" => 3 }),
            ],
        };
        let ctx = matches(&doc! { "comments.user" => "u2" }, &d)
            .unwrap()
            .expect("should match");
        assert_eq!(ctx.positions.get("comments"), Some(&1));
        assert!(hit(&doc! { "comments.likes" => doc! { "$gt" => 4 } }, &d));
        assert!(!hit(&doc! { "comments.likes" => doc! { "$gt" => 9 } }, &d));
    }

    #[test]
    fn test_array_equality_contains() {
        let d = doc! { "tags" => vec!["mongodb", "database"] };
        assert!(hit(&doc! { "tags" => "database" }, &d));
        assert!(!hit(&doc! { "tags" => "missing" }, &d));
        // Whole-array equality still works
        assert!(hit(&doc! { "tags" => vec!["mongodb", "database"] }, &d));
    }

    #[test]
    fn test_null_matches_missing() {
        let d = doc! { "a" => 1 };
        assert!(hit(&doc! { "b" => Value::Null }, &d));
        assert!(!hit(&doc! { "a" => Value::Null }, &d));
    }

    #[test]
    fn test_regex() {
        let d = doc! { "email" => "John@Example.com" };
        assert!(hit(
            &doc! { "email" => doc! { "$regex" => "^john@", "$options" => "i" } },
            &d
        ));
        assert!(!hit(&doc! { "email" => doc! { "$regex" => "^john@" } }, &d));
        let err = matches(&doc! { "email" => doc! { "$regex" => "(" } }, &d).unwrap_err();
        assert!(matches!(err, Error::BadRegex(_)));
        let err = matches(
            &doc! { "email" => doc! { "$regex" => "x", "$options" => "q" } },
            &d,
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));
    }

    #[test]
    fn test_field_level_not() {
        let d = doc! { "age" => 30 };
        assert!(hit(&doc! { "age" => doc! { "$not" => doc! { "$gt" => 40 } } }, &d));
        assert!(!hit(&doc! { "age" => doc! { "$not" => doc! { "$gt" => 20 } } }, &d));
    }

    #[test]
    fn test_malformed_queries_error() {
        let d = doc! { "a" => 1 };
        assert!(matches!(
            matches(&doc! { "a" => doc! { "$frobnicate" => 1 } }, &d),
            Err(Error::BadQuery(_))
        ));
        assert!(matches!(
            matches(&doc! { "$or" => "not an array" }, &d),
            Err(Error::BadQuery(_))
        ));
        assert!(matches!(
            matches(&doc! { "a" => doc! { "$in" => 5 } }, &d),
            Err(Error::BadQuery(_))
        ));
        assert!(matches!(
            matches(&doc! { "a" => doc! { "$gt" => 1, "plain" => 2 } }, &d),
            Err(Error::BadQuery(_))
        ));
    }
}
