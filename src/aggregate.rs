//! Aggregation pipelines.
//!
//! A pipeline is a list of single-key stage documents consumed in order,
//! each transforming a stream of documents. The expression evaluator
//! resolves `"$field"` references through dotted paths, passes literals
//! through, and applies arithmetic, comparison, logical, string, and array
//! operator documents.
//!
//! `$lookup` reaches into sibling collections through a caller-supplied
//! resolver, keeping this module free of locking concerns: by the time a
//! stage runs, its input is already a plain snapshot.

use crate::cursor::{compare_documents, parse_sort_spec};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::matcher;
use crate::path::{resolve_first, set_path, FieldPath};
use crate::value::Value;
use indexmap::IndexMap;

/// Resolves a `$lookup` source collection into its (decrypted) documents.
/// `None` means no such collection; the join then matches nothing.
pub(crate) type LookupSource<'a> = &'a dyn Fn(&str) -> Option<Vec<Document>>;

/// Runs every stage over the input stream.
pub(crate) fn run_pipeline(
    input: Vec<Document>,
    stages: &[Document],
    lookup: LookupSource,
) -> Result<Vec<Document>> {
    let mut stream = input;
    for stage in stages {
        if stage.len() != 1 {
            return Err(Error::BadQuery(
                "each pipeline stage must have exactly one key".to_string(),
            ));
        }
        let (name, spec) = stage.iter().next().expect("checked length");
        stream = match name.as_str() {
            "$match" => {
                let query = expect_document(name, spec)?;
                let mut kept = Vec::new();
                for doc in stream {
                    if matcher::matches(query, &doc)?.is_some() {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$project" => {
                let projection = ProjectStage::parse(expect_document(name, spec)?)?;
                stream
                    .into_iter()
                    .map(|doc| projection.apply(&doc))
                    .collect::<Result<Vec<_>>>()?
            }
            "$unwind" => run_unwind(stream, spec)?,
            "$group" => run_group(stream, expect_document(name, spec)?)?,
            "$sort" => {
                let spec = expect_document(name, spec)?;
                let mut keys = Vec::new();
                for (field, direction) in spec.iter() {
                    keys.push((field.clone(), direction.as_i64().unwrap_or(0) as i32));
                }
                let keys = parse_sort_spec(&keys)?;
                let mut sorted = stream;
                sorted.sort_by(|a, b| compare_documents(a, b, &keys));
                sorted
            }
            "$skip" => {
                let n = expect_count(name, spec)?;
                stream.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = expect_count(name, spec)?;
                stream.into_iter().take(n).collect()
            }
            "$lookup" => run_lookup(stream, expect_document(name, spec)?, lookup)?,
            "$count" => {
                let field = spec.as_str().ok_or_else(|| {
                    Error::BadQuery("$count takes an output field name".to_string())
                })?;
                if field.is_empty() {
                    return Err(Error::BadQuery("$count field name is empty".to_string()));
                }
                let mut out = Document::new();
                out.insert(field, Value::Int(stream.len() as i64));
                vec![out]
            }
            other => {
                return Err(Error::BadQuery(format!(
                    "unknown pipeline stage '{}'",
                    other
                )));
            }
        };
    }
    Ok(stream)
}

fn expect_document<'a>(stage: &str, spec: &'a Value) -> Result<&'a Document> {
    spec.as_document()
        .ok_or_else(|| Error::BadQuery(format!("{} takes a document", stage)))
}

fn expect_count(stage: &str, spec: &Value) -> Result<usize> {
    match spec.as_i64() {
        Some(n) if n >= 0 => Ok(n as usize),
        Some(n) => Err(Error::BadQuery(format!("{} must be non-negative, got {}", stage, n))),
        None => Err(Error::BadQuery(format!("{} takes an integer", stage))),
    }
}

// --- $project -------------------------------------------------------------

enum ProjectField {
    Include,
    Exclude,
    Computed(Value),
}

struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
    include_id: bool,
    exclusion_mode: bool,
}

impl ProjectStage {
    fn parse(spec: &Document) -> Result<Self> {
        let mut fields = Vec::new();
        let mut id_flag: Option<bool> = None;
        let mut includes = 0usize;
        let mut excludes = 0usize;

        for (name, value) in spec.iter() {
            let field = match value {
                Value::Int(0) => ProjectField::Exclude,
                Value::Int(_) => ProjectField::Include,
                Value::Bool(true) => ProjectField::Include,
                Value::Bool(false) => ProjectField::Exclude,
                expr => ProjectField::Computed(expr.clone()),
            };
            if name == "_id" {
                if let ProjectField::Computed(_) = field {
                    fields.push((name.clone(), field));
                    includes += 1;
                } else {
                    id_flag = Some(matches!(field, ProjectField::Include));
                }
                continue;
            }
            match field {
                ProjectField::Exclude => excludes += 1,
                _ => includes += 1,
            }
            fields.push((name.clone(), field));
        }

        if includes > 0 && excludes > 0 {
            return Err(Error::BadQuery(
                "cannot mix inclusion and exclusion in $project".to_string(),
            ));
        }

        Ok(ProjectStage {
            fields,
            include_id: id_flag.unwrap_or(true),
            exclusion_mode: excludes > 0,
        })
    }

    fn apply(&self, doc: &Document) -> Result<Document> {
        if self.exclusion_mode {
            let mut out = doc.clone();
            if !self.include_id {
                out.remove("_id");
            }
            for (name, _) in &self.fields {
                let segments: Vec<String> = name.split('.').map(str::to_string).collect();
                crate::path::remove_path(&mut out, &segments);
            }
            return Ok(out);
        }

        let mut out = Document::new();
        if self.include_id {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (name, field) in &self.fields {
            let segments: Vec<String> = name.split('.').map(str::to_string).collect();
            match field {
                ProjectField::Include => {
                    let path = FieldPath::parse(name);
                    if let Some(value) = resolve_first(doc, path.segments()) {
                        set_path(&mut out, &segments, value.clone())?;
                    }
                }
                ProjectField::Computed(expr) => {
                    let value = eval_expr(expr, doc)?;
                    set_path(&mut out, &segments, value)?;
                }
                ProjectField::Exclude => {}
            }
        }
        Ok(out)
    }
}

// --- $unwind --------------------------------------------------------------

fn run_unwind(stream: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let (path_ref, preserve_empty) = match spec {
        Value::String(s) => (s.as_str(), false),
        Value::Object(options) => {
            let path = options
                .get_str("path")
                .ok_or_else(|| Error::BadQuery("$unwind needs a 'path'".to_string()))?;
            let preserve = options
                .get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (path, preserve)
        }
        _ => {
            return Err(Error::BadQuery(
                "$unwind takes a field reference or an options document".to_string(),
            ));
        }
    };
    let field = path_ref
        .strip_prefix('$')
        .ok_or_else(|| Error::BadQuery("$unwind path must start with '$'".to_string()))?;
    let segments: Vec<String> = field.split('.').map(str::to_string).collect();

    let mut out = Vec::new();
    for doc in stream {
        let elements = match crate::path::get_path(&doc, &segments) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items.clone()),
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if !preserve_empty {
                    continue;
                }
                None
            }
            // A non-array value unwinds to itself
            Some(_) => None,
        };
        match elements {
            Some(items) => {
                for item in items {
                    let mut unwound = doc.clone();
                    set_path(&mut unwound, &segments, item)?;
                    out.push(unwound);
                }
            }
            None => out.push(doc),
        }
    }
    Ok(out)
}

// --- $group ---------------------------------------------------------------

enum Accumulator {
    Sum(Value),
    Avg(Value),
    Min(Value),
    Max(Value),
    First(Value),
    Last(Value),
    Push(Value),
    AddToSet(Value),
    Count,
}

impl Accumulator {
    fn parse(spec: &Value) -> Result<Self> {
        let doc = spec.as_document().ok_or_else(|| {
            Error::BadQuery("group accumulators are single-operator documents".to_string())
        })?;
        if doc.len() != 1 {
            return Err(Error::BadQuery(
                "group accumulators take exactly one operator".to_string(),
            ));
        }
        let (op, expr) = doc.iter().next().expect("checked length");
        Ok(match op.as_str() {
            "$sum" => Accumulator::Sum(expr.clone()),
            "$avg" => Accumulator::Avg(expr.clone()),
            "$min" => Accumulator::Min(expr.clone()),
            "$max" => Accumulator::Max(expr.clone()),
            "$first" => Accumulator::First(expr.clone()),
            "$last" => Accumulator::Last(expr.clone()),
            "$push" => Accumulator::Push(expr.clone()),
            "$addToSet" => Accumulator::AddToSet(expr.clone()),
            "$count" => Accumulator::Count,
            other => {
                return Err(Error::BadQuery(format!(
                    "unknown accumulator '{}'",
                    other
                )));
            }
        })
    }
}

#[derive(Default)]
struct AccState {
    sum: Option<Value>,
    avg_sum: f64,
    count: i64,
    best: Option<Value>,
    first: Option<Value>,
    last: Option<Value>,
    items: Vec<Value>,
}

fn run_group(stream: Vec<Document>, spec: &Document) -> Result<Vec<Document>> {
    let key_expr = spec
        .get("_id")
        .ok_or_else(|| Error::BadQuery("$group requires an _id expression".to_string()))?;
    let mut accumulators = Vec::new();
    for (name, acc_spec) in spec.iter() {
        if name == "_id" {
            continue;
        }
        accumulators.push((name.clone(), Accumulator::parse(acc_spec)?));
    }

    // Group keys ordered by first appearance
    let mut groups: IndexMap<Value, Vec<AccState>> = IndexMap::new();
    for doc in &stream {
        let key = eval_expr(key_expr, doc)?;
        let states = groups
            .entry(key)
            .or_insert_with(|| accumulators.iter().map(|_| AccState::default()).collect());
        for ((_, accumulator), state) in accumulators.iter().zip(states.iter_mut()) {
            accumulate(accumulator, state, doc)?;
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, states) in groups {
        let mut result = Document::new();
        result.insert("_id", key);
        for ((name, accumulator), state) in accumulators.iter().zip(states) {
            result.insert(name.clone(), finish(accumulator, state));
        }
        out.push(result);
    }
    Ok(out)
}

fn accumulate(accumulator: &Accumulator, state: &mut AccState, doc: &Document) -> Result<()> {
    match accumulator {
        Accumulator::Sum(expr) => {
            let value = eval_expr(expr, doc)?;
            if value.is_number() {
                state.sum = Some(match state.sum.take() {
                    None => value,
                    Some(total) => numeric_add(&total, &value),
                });
            }
        }
        Accumulator::Avg(expr) => {
            let value = eval_expr(expr, doc)?;
            if let Some(number) = value.as_f64() {
                state.avg_sum += number;
                state.count += 1;
            }
        }
        Accumulator::Min(expr) => {
            let value = eval_expr(expr, doc)?;
            if !value.is_null() {
                state.best = Some(match state.best.take() {
                    None => value,
                    Some(best) => {
                        if value.cmp_total(&best) == std::cmp::Ordering::Less {
                            value
                        } else {
                            best
                        }
                    }
                });
            }
        }
        Accumulator::Max(expr) => {
            let value = eval_expr(expr, doc)?;
            if !value.is_null() {
                state.best = Some(match state.best.take() {
                    None => value,
                    Some(best) => {
                        if value.cmp_total(&best) == std::cmp::Ordering::Greater {
                            value
                        } else {
                            best
                        }
                    }
                });
            }
        }
        Accumulator::First(expr) => {
            let value = eval_expr(expr, doc)?;
            if state.first.is_none() {
                state.first = Some(value);
            }
        }
        Accumulator::Last(expr) => {
            state.last = Some(eval_expr(expr, doc)?);
        }
        Accumulator::Push(expr) => {
            state.items.push(eval_expr(expr, doc)?);
        }
        Accumulator::AddToSet(expr) => {
            let value = eval_expr(expr, doc)?;
            if !state.items.contains(&value) {
                state.items.push(value);
            }
        }
        Accumulator::Count => {
            state.count += 1;
        }
    }
    Ok(())
}

fn finish(accumulator: &Accumulator, state: AccState) -> Value {
    match accumulator {
        Accumulator::Sum(_) => state.sum.unwrap_or(Value::Int(0)),
        Accumulator::Avg(_) => {
            if state.count == 0 {
                Value::Null
            } else {
                Value::Double(state.avg_sum / state.count as f64)
            }
        }
        Accumulator::Min(_) | Accumulator::Max(_) => state.best.unwrap_or(Value::Null),
        Accumulator::First(_) => state.first.unwrap_or(Value::Null),
        Accumulator::Last(_) => state.last.unwrap_or(Value::Null),
        Accumulator::Push(_) | Accumulator::AddToSet(_) => Value::Array(state.items),
        Accumulator::Count => Value::Int(state.count),
    }
}

// --- $lookup --------------------------------------------------------------

fn run_lookup(
    stream: Vec<Document>,
    spec: &Document,
    lookup: LookupSource,
) -> Result<Vec<Document>> {
    let from = spec
        .get_str("from")
        .ok_or_else(|| Error::BadQuery("$lookup needs 'from'".to_string()))?;
    let local_field = spec
        .get_str("localField")
        .ok_or_else(|| Error::BadQuery("$lookup needs 'localField'".to_string()))?;
    let foreign_field = spec
        .get_str("foreignField")
        .ok_or_else(|| Error::BadQuery("$lookup needs 'foreignField'".to_string()))?;
    let as_field = spec
        .get_str("as")
        .ok_or_else(|| Error::BadQuery("$lookup needs 'as'".to_string()))?;

    let foreign_docs = lookup(from).unwrap_or_default();
    let local_path = FieldPath::parse(local_field);
    let foreign_path = FieldPath::parse(foreign_field);
    let as_segments: Vec<String> = as_field.split('.').map(str::to_string).collect();

    let mut out = Vec::with_capacity(stream.len());
    for doc in stream {
        let local = resolve_first(&doc, local_path.segments())
            .cloned()
            .unwrap_or(Value::Null);
        let matched: Vec<Value> = foreign_docs
            .iter()
            .filter(|foreign| {
                let foreign_value = resolve_first(foreign, foreign_path.segments())
                    .cloned()
                    .unwrap_or(Value::Null);
                join_eq(&local, &foreign_value)
            })
            .cloned()
            .map(Value::Object)
            .collect();
        let mut joined = doc;
        set_path(&mut joined, &as_segments, Value::Array(matched))?;
        out.push(joined);
    }
    Ok(out)
}

/// Join equality: plain equality, or containment when either side is an
/// array of scalars.
fn join_eq(local: &Value, foreign: &Value) -> bool {
    if local == foreign {
        return true;
    }
    if let Value::Array(items) = local {
        if items.iter().any(|item| item == foreign) {
            return true;
        }
    }
    if let Value::Array(items) = foreign {
        if items.iter().any(|item| item == local) {
            return true;
        }
    }
    false
}

// --- expressions ----------------------------------------------------------

/// Evaluates an aggregation expression against a document.
pub(crate) fn eval_expr(expr: &Value, doc: &Document) -> Result<Value> {
    match expr {
        Value::String(s) if s.starts_with('$') => {
            let path = FieldPath::parse(&s[1..]);
            Ok(resolve_first(doc, path.segments())
                .cloned()
                .unwrap_or(Value::Null))
        }
        Value::Object(map) => {
            let operator_form =
                map.len() == 1 && map.keys().next().is_some_and(|k| k.starts_with('$'));
            if operator_form {
                let (op, args) = map.iter().next().expect("checked length");
                eval_operator(op, args, doc)
            } else if map.keys().any(|k| k.starts_with('$')) {
                Err(Error::BadQuery(
                    "expression documents mix operators and fields".to_string(),
                ))
            } else {
                let mut computed = Document::new();
                for (key, value) in map.iter() {
                    computed.insert(key.clone(), eval_expr(value, doc)?);
                }
                Ok(Value::Object(computed))
            }
        }
        Value::Array(items) => {
            let evaluated = items
                .iter()
                .map(|item| eval_expr(item, doc))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(evaluated))
        }
        literal => Ok(literal.clone()),
    }
}

fn eval_operator(op: &str, args: &Value, doc: &Document) -> Result<Value> {
    match op {
        "$literal" => Ok(args.clone()),
        "$add" => fold_numeric(op, args, doc, numeric_add),
        "$multiply" => fold_numeric(op, args, doc, numeric_mul),
        "$subtract" => {
            let (a, b) = eval_pair(op, args, doc)?;
            let (a, b) = both_numeric(op, &a, &b)?;
            Ok(numeric_sub(&a, &b))
        }
        "$divide" => {
            let (a, b) = eval_pair(op, args, doc)?;
            let (a, b) = both_numeric(op, &a, &b)?;
            let divisor = b.as_f64().expect("checked numeric");
            if divisor == 0.0 {
                return Err(Error::TypeMismatch("$divide by zero".to_string()));
            }
            Ok(Value::Double(a.as_f64().expect("checked numeric") / divisor))
        }
        "$mod" => {
            let (a, b) = eval_pair(op, args, doc)?;
            let (a, b) = both_numeric(op, &a, &b)?;
            match (&a, &b) {
                (Value::Int(x), Value::Int(y)) => {
                    if *y == 0 {
                        Err(Error::TypeMismatch("$mod by zero".to_string()))
                    } else {
                        Ok(Value::Int(x % y))
                    }
                }
                _ => {
                    let divisor = b.as_f64().expect("checked numeric");
                    if divisor == 0.0 {
                        Err(Error::TypeMismatch("$mod by zero".to_string()))
                    } else {
                        Ok(Value::Double(a.as_f64().expect("checked numeric") % divisor))
                    }
                }
            }
        }
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let (a, b) = eval_pair(op, args, doc)?;
            let result = match op {
                "$eq" => a == b,
                "$ne" => a != b,
                "$gt" => a.cmp_total(&b) == std::cmp::Ordering::Greater,
                "$gte" => a.cmp_total(&b) != std::cmp::Ordering::Less,
                "$lt" => a.cmp_total(&b) == std::cmp::Ordering::Less,
                _ => a.cmp_total(&b) != std::cmp::Ordering::Greater,
            };
            Ok(Value::Bool(result))
        }
        "$and" => {
            let items = expect_args(op, args)?;
            for item in items {
                if !is_truthy(&eval_expr(item, doc)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "$or" => {
            let items = expect_args(op, args)?;
            for item in items {
                if is_truthy(&eval_expr(item, doc)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "$not" => {
            let inner = match args {
                Value::Array(items) if items.len() == 1 => eval_expr(&items[0], doc)?,
                other => eval_expr(other, doc)?,
            };
            Ok(Value::Bool(!is_truthy(&inner)))
        }
        "$concat" => {
            let items = expect_args(op, args)?;
            let mut out = String::new();
            for item in items {
                match eval_expr(item, doc)? {
                    Value::String(s) => out.push_str(&s),
                    Value::Null => return Ok(Value::Null),
                    other => {
                        return Err(Error::TypeMismatch(format!(
                            "$concat takes strings, got {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::String(out))
        }
        "$substr" => {
            let items = expect_args(op, args)?;
            if items.len() != 3 {
                return Err(Error::BadQuery(
                    "$substr takes [string, start, length]".to_string(),
                ));
            }
            let text = match eval_expr(&items[0], doc)? {
                Value::String(s) => s,
                Value::Null => return Ok(Value::String(String::new())),
                other => {
                    return Err(Error::TypeMismatch(format!(
                        "$substr takes a string, got {}",
                        other.type_name()
                    )));
                }
            };
            let start = eval_expr(&items[1], doc)?
                .as_i64()
                .ok_or_else(|| Error::BadQuery("$substr start must be an integer".to_string()))?;
            let length = eval_expr(&items[2], doc)?
                .as_i64()
                .ok_or_else(|| Error::BadQuery("$substr length must be an integer".to_string()))?;
            let chars: Vec<char> = text.chars().collect();
            let start = start.max(0) as usize;
            if start >= chars.len() {
                return Ok(Value::String(String::new()));
            }
            let slice = if length < 0 {
                &chars[start..]
            } else {
                let end = (start + length as usize).min(chars.len());
                &chars[start..end]
            };
            Ok(Value::String(slice.iter().collect()))
        }
        "$toLower" | "$toUpper" => {
            let arg = match args {
                Value::Array(items) if items.len() == 1 => &items[0],
                other => other,
            };
            let text = match eval_expr(arg, doc)? {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => {
                    return Err(Error::TypeMismatch(format!(
                        "{} takes a string, got {}",
                        op,
                        other.type_name()
                    )));
                }
            };
            Ok(Value::String(if op == "$toLower" {
                text.to_lowercase()
            } else {
                text.to_uppercase()
            }))
        }
        "$size" => {
            let value = eval_expr(args, doc)?;
            match value {
                Value::Array(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(Error::TypeMismatch(format!(
                    "$size takes an array, got {}",
                    other.type_name()
                ))),
            }
        }
        "$arrayElemAt" => {
            let items = expect_args(op, args)?;
            if items.len() != 2 {
                return Err(Error::BadQuery("$arrayElemAt takes [array, index]".to_string()));
            }
            let array = match eval_expr(&items[0], doc)? {
                Value::Array(items) => items,
                Value::Null => return Ok(Value::Null),
                other => {
                    return Err(Error::TypeMismatch(format!(
                        "$arrayElemAt takes an array, got {}",
                        other.type_name()
                    )));
                }
            };
            let index = eval_expr(&items[1], doc)?.as_i64().ok_or_else(|| {
                Error::BadQuery("$arrayElemAt index must be an integer".to_string())
            })?;
            let resolved = if index < 0 {
                array.len().checked_sub(index.unsigned_abs() as usize)
            } else {
                Some(index as usize)
            };
            Ok(resolved
                .and_then(|i| array.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        }
        other => Err(Error::BadQuery(format!(
            "unknown expression operator '{}'",
            other
        ))),
    }
}

fn expect_args<'a>(op: &str, args: &'a Value) -> Result<&'a Vec<Value>> {
    args.as_array()
        .ok_or_else(|| Error::BadQuery(format!("{} takes an argument array", op)))
}

fn eval_pair(op: &str, args: &Value, doc: &Document) -> Result<(Value, Value)> {
    let items = expect_args(op, args)?;
    if items.len() != 2 {
        return Err(Error::BadQuery(format!("{} takes exactly two arguments", op)));
    }
    Ok((eval_expr(&items[0], doc)?, eval_expr(&items[1], doc)?))
}

fn both_numeric(op: &str, a: &Value, b: &Value) -> Result<(Value, Value)> {
    if !a.is_number() || !b.is_number() {
        return Err(Error::TypeMismatch(format!(
            "{} takes numbers, got {} and {}",
            op,
            a.type_name(),
            b.type_name()
        )));
    }
    Ok((a.clone(), b.clone()))
}

fn fold_numeric(
    op: &str,
    args: &Value,
    doc: &Document,
    combine: impl Fn(&Value, &Value) -> Value,
) -> Result<Value> {
    let items = expect_args(op, args)?;
    let mut total: Option<Value> = None;
    for item in items {
        let value = eval_expr(item, doc)?;
        if !value.is_number() {
            return Err(Error::TypeMismatch(format!(
                "{} takes numbers, got {}",
                op,
                value.type_name()
            )));
        }
        total = Some(match total.take() {
            None => value,
            Some(current) => combine(&current, &value),
        });
    }
    Ok(total.unwrap_or(Value::Int(0)))
}

fn numeric_add(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_add(*y)),
        _ => Value::Double(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
    }
}

fn numeric_sub(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_sub(*y)),
        _ => Value::Double(a.as_f64().unwrap_or(0.0) - b.as_f64().unwrap_or(0.0)),
    }
}

fn numeric_mul(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_mul(*y)),
        _ => Value::Double(a.as_f64().unwrap_or(0.0) * b.as_f64().unwrap_or(0.0)),
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(
        value,
        Value::Null | Value::Bool(false) | Value::Int(0)
    ) && value.as_f64() != Some(0.0)
}
