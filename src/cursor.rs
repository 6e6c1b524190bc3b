//! Lazy result streams.
//!
//! A [`Cursor`] captures the filtered document ids under the collection
//! lock and materializes later, outside it: stable sort, then skip, then
//! limit, then projection, then decryption. Because the id snapshot and
//! the document list can drift apart while the lock is released, a
//! document that vanished in between is simply skipped.
//!
//! Sorting, skipping, limiting, and projection are chainable, builder
//! style; iteration yields `Result<Document>` so malformed sort or
//! projection specs surface on first use.

use crate::collection::Collection;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::path::{resolve_first, FieldPath};
use crate::value::Value;
use std::cmp::Ordering;

enum Source {
    /// Ids filtered out of a live collection
    Snapshot { collection: Collection, ids: Vec<Value> },
    /// Pre-computed documents (aggregation output)
    Materialized(Vec<Document>),
}

/// Lazy stream over query results.
pub struct Cursor {
    source: Source,
    sort: Vec<(String, i32)>,
    skip: Option<i64>,
    limit: Option<i64>,
    projection: Option<Document>,
    materialized: Option<std::vec::IntoIter<Document>>,
    failed: bool,
}

impl Cursor {
    pub(crate) fn from_ids(collection: Collection, ids: Vec<Value>) -> Self {
        Cursor::new(Source::Snapshot { collection, ids })
    }

    pub(crate) fn from_documents(documents: Vec<Document>) -> Self {
        Cursor::new(Source::Materialized(documents))
    }

    fn new(source: Source) -> Self {
        Cursor {
            source,
            sort: Vec::new(),
            skip: None,
            limit: None,
            projection: None,
            materialized: None,
            failed: false,
        }
    }

    /// Appends a sort key. Multiple calls build a compound sort, compared
    /// left to right.
    pub fn sort(mut self, field: &str, direction: i32) -> Self {
        self.sort.push((field.to_string(), direction));
        self
    }

    /// Appends every `(field, direction)` pair of a sort document.
    pub fn sort_document(mut self, spec: &Document) -> Self {
        for (field, direction) in spec.iter() {
            self.sort
                .push((field.clone(), direction.as_i64().unwrap_or(0) as i32));
        }
        self
    }

    /// Skips the first `n` results. Negative values fail at
    /// materialization with `BadQuery`.
    pub fn skip(mut self, n: i64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Caps the number of results. A limit of zero yields nothing;
    /// negative values fail at materialization with `BadQuery`.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Applies a projection: `{field: 1, …}` keeps only the listed fields
    /// (plus `_id` unless `_id: 0`), `{field: 0, …}` drops them. Mixing
    /// fails with `BadQuery`.
    pub fn projection(mut self, spec: Document) -> Self {
        self.projection = Some(spec);
        self
    }

    /// Materializes the remaining pipeline into a list.
    pub fn to_vec(&self) -> Result<Vec<Document>> {
        let mut documents = match &self.source {
            Source::Snapshot { collection, ids } => collection.fetch_snapshot(ids),
            Source::Materialized(documents) => documents.clone(),
        };

        if !self.sort.is_empty() {
            let keys = parse_sort_spec(&self.sort)?;
            documents.sort_by(|a, b| compare_documents(a, b, &keys));
        }

        let skip = match self.skip {
            Some(n) if n < 0 => {
                return Err(Error::BadQuery(format!("negative skip: {}", n)));
            }
            Some(n) => n as usize,
            None => 0,
        };
        let limit = match self.limit {
            Some(n) if n < 0 => {
                return Err(Error::BadQuery(format!("negative limit: {}", n)));
            }
            Some(n) => Some(n as usize),
            None => None,
        };

        let mut documents: Vec<Document> = match limit {
            Some(limit) => documents.into_iter().skip(skip).take(limit).collect(),
            None => documents.into_iter().skip(skip).collect(),
        };

        if let Some(spec) = &self.projection {
            let projection = Projection::parse(spec)?;
            documents = documents
                .into_iter()
                .map(|doc| projection.apply(&doc))
                .collect();
        }

        if let Source::Snapshot { collection, .. } = &self.source {
            documents = documents
                .into_iter()
                .map(|doc| collection.decrypt_outgoing(&doc))
                .collect();
        }

        Ok(documents)
    }

    /// Number of documents iteration would yield.
    pub fn count(&self) -> Result<usize> {
        Ok(self.to_vec()?.len())
    }
}

impl Iterator for Cursor {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.materialized.is_none() {
            if self.failed {
                return None;
            }
            match self.to_vec() {
                Ok(documents) => self.materialized = Some(documents.into_iter()),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        self.materialized.as_mut()?.next().map(Ok)
    }
}

pub(crate) struct SortKey {
    path: FieldPath,
    descending: bool,
}

pub(crate) fn parse_sort_spec(spec: &[(String, i32)]) -> Result<Vec<SortKey>> {
    spec.iter()
        .map(|(field, direction)| {
            let descending = match direction {
                1 => false,
                -1 => true,
                other => {
                    return Err(Error::BadQuery(format!(
                        "sort direction for '{}' must be 1 or -1, got {}",
                        field, other
                    )));
                }
            };
            Ok(SortKey {
                path: FieldPath::parse(field),
                descending,
            })
        })
        .collect()
}

pub(crate) fn compare_documents(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = resolve_first(a, key.path.segments());
        let right = resolve_first(b, key.path.segments());
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            // Documents missing the sort field come first either way
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => {
                let ordering = left.cmp_total(right);
                if key.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[derive(Debug)]
enum ProjectionMode {
    Include,
    Exclude,
}

/// Parsed projection spec.
#[derive(Debug)]
pub(crate) struct Projection {
    mode: ProjectionMode,
    paths: Vec<Vec<String>>,
    include_id: bool,
}

impl Projection {
    pub(crate) fn parse(spec: &Document) -> Result<Self> {
        let mut include: Vec<Vec<String>> = Vec::new();
        let mut exclude: Vec<Vec<String>> = Vec::new();
        let mut id_flag: Option<bool> = None;

        for (field, flag) in spec.iter() {
            let keep = match flag {
                Value::Int(i) => *i != 0,
                Value::Bool(b) => *b,
                Value::Double(d) => *d != 0.0,
                _ => {
                    return Err(Error::BadQuery(format!(
                        "projection value for '{}' must be 0 or 1",
                        field
                    )));
                }
            };
            if field == "_id" {
                id_flag = Some(keep);
                continue;
            }
            let segments = field.split('.').map(str::to_string).collect();
            if keep {
                include.push(segments);
            } else {
                exclude.push(segments);
            }
        }

        if !include.is_empty() && !exclude.is_empty() {
            return Err(Error::BadQuery(
                "cannot mix inclusion and exclusion in a projection".to_string(),
            ));
        }

        // `_id: 0` is the one exclusion allowed inside an inclusion spec
        if !include.is_empty() || id_flag == Some(true) {
            Ok(Projection {
                mode: ProjectionMode::Include,
                paths: include,
                include_id: id_flag.unwrap_or(true),
            })
        } else {
            if id_flag == Some(false) {
                exclude.push(vec!["_id".to_string()]);
            }
            Ok(Projection {
                mode: ProjectionMode::Exclude,
                paths: exclude,
                include_id: true,
            })
        }
    }

    pub(crate) fn apply(&self, doc: &Document) -> Document {
        match self.mode {
            ProjectionMode::Include => {
                let mut out = Document::new();
                if self.include_id {
                    if let Some(id) = doc.get("_id") {
                        out.insert("_id", id.clone());
                    }
                }
                for path in &self.paths {
                    if let Some(extracted) = extract_document(doc, path) {
                        merge_projected(&mut out, extracted);
                    }
                }
                out
            }
            ProjectionMode::Exclude => {
                let mut out = doc.clone();
                for path in &self.paths {
                    exclude_from_document(&mut out, path);
                }
                out
            }
        }
    }
}

fn extract_document(doc: &Document, segments: &[String]) -> Option<Document> {
    let (first, rest) = segments.split_first()?;
    let child = doc.get(first)?;
    let mut out = Document::new();
    if rest.is_empty() {
        out.insert(first.clone(), child.clone());
        return Some(out);
    }
    let inner = extract_value(child, rest)?;
    out.insert(first.clone(), inner);
    Some(out)
}

fn extract_value(value: &Value, segments: &[String]) -> Option<Value> {
    match value {
        Value::Object(doc) => extract_document(doc, segments).map(Value::Object),
        Value::Array(items) => {
            // Project inside each document element; scalar elements drop
            let projected: Vec<Value> = items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(element) => Some(Value::Object(
                        extract_document(element, segments).unwrap_or_default(),
                    )),
                    _ => None,
                })
                .collect();
            Some(Value::Array(projected))
        }
        _ => None,
    }
}

fn merge_projected(out: &mut Document, addition: Document) {
    for (key, value) in addition {
        match out.get_mut(&key) {
            None => {
                out.insert(key, value);
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(add) = value {
                    merge_projected(existing, add);
                }
            }
            Some(Value::Array(existing)) => {
                if let Value::Array(add) = value {
                    for (slot, item) in existing.iter_mut().zip(add) {
                        if let (Value::Object(slot_doc), Value::Object(item_doc)) = (slot, item) {
                            merge_projected(slot_doc, item_doc);
                        }
                    }
                }
            }
            Some(_) => {}
        }
    }
}

fn exclude_from_document(doc: &mut Document, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        doc.remove(first);
        return;
    }
    if let Some(child) = doc.get_mut(first) {
        exclude_from_value(child, rest);
    }
}

fn exclude_from_value(value: &mut Value, segments: &[String]) {
    match value {
        Value::Object(doc) => exclude_from_document(doc, segments),
        Value::Array(items) => {
            for item in items {
                exclude_from_value(item, segments);
            }
        }
        _ => {}
    }
}
