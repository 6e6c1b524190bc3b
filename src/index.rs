//! Secondary indexes and query planning.
//!
//! An index is an ordered map from direction-aware key tuples to posting
//! sets of document ids. Keys compare with the total value ordering,
//! per-component direction reversing the comparison, so a single B-tree
//! serves both ascending and descending components.
//!
//! The planner scores each index by *prefix coverage*: the longest prefix
//! of the descriptor whose fields the query constrains with a literal
//! equality or a bounded range. Best coverage wins, ties broken by more
//! equality segments, fewer total fields, then creation order. Candidates
//! still get re-checked by the match engine, so the planner only ever has
//! to be fast, not clever.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::path::{resolve_first, FieldPath};
use crate::value::Value;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Persisted shape of an index: its name and `(field, direction)` pairs.
/// Index contents are rebuilt from the documents on load.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IndexDescriptor {
    /// Index name, `field_dir` segments joined with `_` (e.g. `city_1_age_-1`)
    pub name: String,
    /// Ordered `(field, direction)` pairs; direction is 1 or -1
    pub fields: Vec<(String, i32)>,
}

/// Accepted inputs for `create_index`: plain field lists (direction 1) or
/// explicit `(field, direction)` lists.
#[derive(Debug, Clone)]
pub struct IndexKeys(pub(crate) Vec<(String, i32)>);

impl From<Vec<(String, i32)>> for IndexKeys {
    fn from(fields: Vec<(String, i32)>) -> Self {
        IndexKeys(fields)
    }
}

impl From<Vec<(&str, i32)>> for IndexKeys {
    fn from(fields: Vec<(&str, i32)>) -> Self {
        IndexKeys(fields.into_iter().map(|(f, d)| (f.to_string(), d)).collect())
    }
}

impl From<&[(&str, i32)]> for IndexKeys {
    fn from(fields: &[(&str, i32)]) -> Self {
        IndexKeys(fields.iter().map(|(f, d)| (f.to_string(), *d)).collect())
    }
}

impl From<Vec<&str>> for IndexKeys {
    fn from(fields: Vec<&str>) -> Self {
        IndexKeys(fields.into_iter().map(|f| (f.to_string(), 1)).collect())
    }
}

impl From<&[&str]> for IndexKeys {
    fn from(fields: &[&str]) -> Self {
        IndexKeys(fields.iter().map(|f| (f.to_string(), 1)).collect())
    }
}

impl From<(&str, i32)> for IndexKeys {
    fn from((field, dir): (&str, i32)) -> Self {
        IndexKeys(vec![(field.to_string(), dir)])
    }
}

impl From<&str> for IndexKeys {
    fn from(field: &str) -> Self {
        IndexKeys(vec![(field.to_string(), 1)])
    }
}

/// One stored key tuple: per-component value plus the component direction.
#[derive(Debug, Clone)]
struct IndexKey(Vec<(Value, i32)>);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for ((a, dir), (b, _)) in self.0.iter().zip(other.0.iter()) {
            let ordering = a.cmp_total(b);
            let ordering = if *dir == -1 { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// A single index: descriptor plus the ordered entry map.
#[derive(Debug, Clone)]
pub(crate) struct Index {
    descriptor: IndexDescriptor,
    paths: Vec<FieldPath>,
    entries: BTreeMap<IndexKey, FxHashSet<Value>>,
}

impl Index {
    fn new(descriptor: IndexDescriptor) -> Self {
        let paths = descriptor
            .fields
            .iter()
            .map(|(field, _)| FieldPath::parse(field))
            .collect();
        Index {
            descriptor,
            paths,
            entries: BTreeMap::new(),
        }
    }

    fn key_for(&self, doc: &Document) -> IndexKey {
        let components = self
            .paths
            .iter()
            .zip(self.descriptor.fields.iter())
            .map(|(path, (_, dir))| {
                let value = resolve_first(doc, path.segments())
                    .cloned()
                    .unwrap_or(Value::Null);
                (value, *dir)
            })
            .collect();
        IndexKey(components)
    }

    fn insert(&mut self, doc: &Document, id: &Value) {
        self.entries
            .entry(self.key_for(doc))
            .or_default()
            .insert(id.clone());
    }

    fn remove(&mut self, doc: &Document, id: &Value) {
        let key = self.key_for(doc);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Walks the entry map in key order, yielding ids whose covered prefix
    /// satisfies the query constraints.
    fn candidates(&self, shape: &QueryShape, prefix_len: usize) -> Vec<Value> {
        let mut out = Vec::new();
        'entries: for (key, ids) in &self.entries {
            for (component, (field, _)) in key.0.iter().zip(&self.descriptor.fields).take(prefix_len)
            {
                let constraint = shape
                    .constraints
                    .get(field)
                    .expect("planner covered this field");
                if !constraint.admits(&component.0) {
                    continue 'entries;
                }
            }
            out.extend(ids.iter().cloned());
        }
        out
    }

    /// Total ids referenced by this index (test/consistency helper).
    #[cfg(test)]
    fn id_count(&self) -> usize {
        self.entries.values().map(FxHashSet::len).sum()
    }
}

/// Per-field constraint extracted from a query for planning.
#[derive(Debug, Clone)]
enum Constraint {
    Eq(Value),
    Range {
        lower: Option<(Value, bool)>,
        upper: Option<(Value, bool)>,
    },
}

impl Constraint {
    fn admits(&self, value: &Value) -> bool {
        match self {
            Constraint::Eq(expected) => value == expected,
            Constraint::Range { lower, upper } => {
                if let Some((bound, inclusive)) = lower {
                    match value.partial_cmp_query(bound) {
                        Some(Ordering::Greater) => {}
                        Some(Ordering::Equal) if *inclusive => {}
                        _ => return false,
                    }
                }
                if let Some((bound, inclusive)) = upper {
                    match value.partial_cmp_query(bound) {
                        Some(Ordering::Less) => {}
                        Some(Ordering::Equal) if *inclusive => {}
                        _ => return false,
                    }
                }
                true
            }
        }
    }

    fn is_eq(&self) -> bool {
        matches!(self, Constraint::Eq(_))
    }
}

/// The planner's view of a query: top-level fields with an equality or a
/// bounded range. Logical operators and the remaining operator families
/// contribute nothing (their clauses are re-checked after candidate
/// selection anyway).
#[derive(Debug, Default)]
pub(crate) struct QueryShape {
    constraints: HashMap<String, Constraint>,
}

impl QueryShape {
    pub(crate) fn analyze(query: &Document) -> Self {
        let mut constraints = HashMap::new();
        for (field, condition) in query.iter() {
            if field.starts_with('$') {
                continue;
            }
            match condition {
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    if let Some(value) = ops.get("$eq") {
                        constraints.insert(field.clone(), Constraint::Eq(value.clone()));
                        continue;
                    }
                    let mut lower = None;
                    let mut upper = None;
                    for (op, arg) in ops.iter() {
                        match op.as_str() {
                            "$gt" => lower = Some((arg.clone(), false)),
                            "$gte" => lower = Some((arg.clone(), true)),
                            "$lt" => upper = Some((arg.clone(), false)),
                            "$lte" => upper = Some((arg.clone(), true)),
                            _ => {}
                        }
                    }
                    if lower.is_some() || upper.is_some() {
                        constraints.insert(field.clone(), Constraint::Range { lower, upper });
                    }
                }
                literal => {
                    constraints.insert(field.clone(), Constraint::Eq(literal.clone()));
                }
            }
        }
        QueryShape { constraints }
    }
}

/// All indexes of one collection, in creation order.
#[derive(Debug, Default, Clone)]
pub(crate) struct IndexSet {
    indexes: Vec<Index>,
}

impl IndexSet {
    /// Creates an index and populates it from the given documents.
    /// Re-creating an existing index is a no-op returning its name.
    pub fn create<'a>(
        &mut self,
        keys: IndexKeys,
        docs: impl Iterator<Item = (&'a Value, &'a Document)>,
    ) -> Result<String> {
        let fields = keys.0;
        if fields.is_empty() {
            return Err(Error::BadQuery("index needs at least one field".to_string()));
        }
        let mut seen = FxHashSet::default();
        for (field, dir) in &fields {
            if *dir != 1 && *dir != -1 {
                return Err(Error::BadQuery(format!(
                    "index direction for '{}' must be 1 or -1, got {}",
                    field, dir
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(Error::BadQuery(format!(
                    "duplicate field '{}' in index spec",
                    field
                )));
            }
        }

        let name = fields
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, dir))
            .collect::<Vec<_>>()
            .join("_");
        if self.indexes.iter().any(|index| index.descriptor.name == name) {
            return Ok(name);
        }

        let mut index = Index::new(IndexDescriptor {
            name: name.clone(),
            fields,
        });
        for (id, doc) in docs {
            index.insert(doc, id);
        }
        self.indexes.push(index);
        Ok(name)
    }

    /// Drops an index by name.
    pub fn drop(&mut self, name: &str) -> Result<()> {
        let position = self
            .indexes
            .iter()
            .position(|index| index.descriptor.name == name)
            .ok_or_else(|| Error::BadQuery(format!("no index named '{}'", name)))?;
        self.indexes.remove(position);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|index| index.descriptor.name.clone())
            .collect()
    }

    pub fn descriptors(&self) -> Vec<IndexDescriptor> {
        self.indexes
            .iter()
            .map(|index| index.descriptor.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn insert_doc(&mut self, doc: &Document, id: &Value) {
        for index in &mut self.indexes {
            index.insert(doc, id);
        }
    }

    pub fn remove_doc(&mut self, doc: &Document, id: &Value) {
        for index in &mut self.indexes {
            index.remove(doc, id);
        }
    }

    pub fn update_doc(&mut self, old: &Document, new: &Document, id: &Value) {
        for index in &mut self.indexes {
            index.remove(old, id);
            index.insert(new, id);
        }
    }

    pub fn clear(&mut self) {
        self.indexes.clear();
    }

    /// Rebuilds index contents from persisted descriptors and the loaded
    /// documents.
    pub fn rebuild<'a>(
        &mut self,
        descriptors: Vec<IndexDescriptor>,
        docs: impl Iterator<Item = (&'a Value, &'a Document)> + Clone,
    ) {
        self.indexes.clear();
        for descriptor in descriptors {
            let mut index = Index::new(descriptor);
            for (id, doc) in docs.clone() {
                index.insert(doc, id);
            }
            self.indexes.push(index);
        }
    }

    /// Picks candidate ids for a query through the best covering index.
    /// `None` means full scan (coverage zero or no indexes).
    pub fn candidates(&self, query: &Document) -> Option<Vec<Value>> {
        let shape = QueryShape::analyze(query);
        if shape.constraints.is_empty() {
            return None;
        }

        let mut best: Option<(usize, usize, usize, usize)> = None; // (coverage, equalities, total fields, position)
        for (position, index) in self.indexes.iter().enumerate() {
            let mut coverage = 0;
            let mut equalities = 0;
            for (field, _) in &index.descriptor.fields {
                match shape.constraints.get(field) {
                    Some(constraint) => {
                        coverage += 1;
                        if constraint.is_eq() {
                            equalities += 1;
                        }
                    }
                    None => break,
                }
            }
            if coverage == 0 {
                continue;
            }
            let total_fields = index.descriptor.fields.len();
            let candidate = (coverage, equalities, total_fields, position);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    // Higher coverage, then more equalities, then fewer
                    // fields, then earliest creation
                    let (c, e, t, p) = current;
                    let better = coverage > c
                        || (coverage == c && equalities > e)
                        || (coverage == c && equalities == e && total_fields < t)
                        || (coverage == c && equalities == e && total_fields == t && position < p);
                    if better {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }

        let (coverage, _, _, position) = best?;
        Some(self.indexes[position].candidates(&shape, coverage))
    }
}
