use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::naming::Naming;
use crate::row::ColumnSet;
use crate::schema::{FieldKind, Schema};

/// Deepest struct nesting the resolver follows.
pub const MAX_SCHEMA_DEPTH: usize = 32;

/// Route from a struct's root to the leaf field one column is written to.
///
/// Each entry is a field index into the schema of its level. Empty means
/// no field matched and the column is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<usize>);

impl FieldPath {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for FieldPath {
    fn from(path: Vec<usize>) -> Self {
        Self(path)
    }
}

/// Resolve every column of `columns` against `schema`.
///
/// The result is aligned with `columns`.
pub fn resolve(schema: &Schema, columns: &ColumnSet, naming: &Naming) -> Vec<FieldPath> {
    columns
        .iter()
        .map(|column| {
            let segments: Vec<&str> = column.split('.').collect();
            let mut path = Vec::new();
            let mut seen = HashSet::new();
            if locate(schema, &segments, naming, &mut path, &mut seen, 0) {
                FieldPath(path)
            } else {
                tracing::debug!(
                    %column,
                    target_type = schema.type_name,
                    "column has no matching field, skipping"
                );
                FieldPath::default()
            }
        })
        .collect()
}

/// Search `schema` for `segments`, appending field indexes to `path`.
///
/// `seen` holds the (schema, remaining segments) pairs already searched for
/// this column; none is searched twice.
fn locate(
    schema: &Schema,
    segments: &[&str],
    naming: &Naming,
    path: &mut Vec<usize>,
    seen: &mut HashSet<(usize, usize)>,
    depth: usize,
) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return false;
    };
    if !seen.insert((std::ptr::from_ref(schema) as usize, segments.len())) {
        return false;
    }
    if depth >= MAX_SCHEMA_DEPTH {
        tracing::warn!(
            target_type = schema.type_name,
            depth,
            "schema nesting too deep, column left unresolved"
        );
        return false;
    }

    // Direct match at this level.
    for (index, field) in schema.fields.iter().enumerate() {
        if naming.column_name(field) != *head {
            continue;
        }
        match field.kind.child() {
            None if rest.is_empty() => {
                path.push(index);
                return true;
            }
            Some(child) if !rest.is_empty() => {
                path.push(index);
                if locate(child, rest, naming, path, seen, depth + 1) {
                    return true;
                }
                path.pop();
            }
            _ => {}
        }
    }

    // Promoted fields of embedded structs.
    for (index, field) in schema.fields.iter().enumerate() {
        if let FieldKind::Flatten(child) = field.kind {
            path.push(index);
            if locate(child(), segments, naming, path, seen, depth + 1) {
                return true;
            }
            path.pop();
        }
    }

    false
}

/// Per-call memo of resolved paths, one entry per struct type.
#[derive(Debug)]
pub struct Resolver<'a> {
    naming: &'a Naming,
    resolved: HashMap<usize, Arc<[FieldPath]>>,
}

impl<'a> Resolver<'a> {
    pub fn new(naming: &'a Naming) -> Self {
        Self { naming, resolved: HashMap::new() }
    }

    /// Paths for `schema`, resolved on first use.
    ///
    /// A resolver serves a single column set; use a fresh one per call.
    pub fn paths(&mut self, schema: &'static Schema, columns: &ColumnSet) -> Arc<[FieldPath]> {
        // Schemas are statics, so the address identifies the type.
        let key = std::ptr::from_ref(schema) as usize;
        let naming = self.naming;
        self.resolved
            .entry(key)
            .or_insert_with(|| {
                let paths: Arc<[FieldPath]> = resolve(schema, columns, naming).into();
                tracing::debug!(
                    target_type = schema.type_name,
                    columns = columns.len(),
                    matched = paths.iter().filter(|p| !p.is_empty()).count(),
                    "resolved column paths"
                );
                paths
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FromRow;
    use crate::schema::Record;

    #[derive(Debug, Default, FromRow)]
    struct Audit {
        created_by: String,
        #[row(rename = "ts")]
        created_at: i64,
    }

    #[derive(Debug, Default, FromRow)]
    struct Address {
        city: String,
        zip: String,
    }

    #[derive(Debug, Default, FromRow)]
    struct Customer {
        id: i64,
        name: String,
        #[row(nested)]
        address: Address,
        #[row(flatten)]
        audit: Audit,
        #[row(skip)]
        #[allow(dead_code)]
        cached: Vec<u8>,
    }

    fn columns(names: &[&str]) -> ColumnSet {
        ColumnSet::new(names.iter().map(|s| s.to_string()).collect())
    }

    fn expect(rows: &[&[usize]]) -> Vec<Vec<usize>> {
        rows.iter().map(|r| r.to_vec()).collect()
    }

    fn paths(names: &[&str]) -> Vec<Vec<usize>> {
        resolve(Customer::schema(), &columns(names), &Naming::default())
            .into_iter()
            .map(|p| p.as_slice().to_vec())
            .collect()
    }

    #[test]
    fn top_level_and_renamed_columns() {
        assert_eq!(paths(&["id", "name"]), expect(&[&[0], &[1]]));
    }

    #[test]
    fn nested_columns_use_dotted_prefix() {
        assert_eq!(paths(&["address.city", "address.zip"]), expect(&[&[2, 0], &[2, 1]]));
        // A nested struct is never a leaf itself.
        assert_eq!(paths(&["address", "city"]), expect(&[&[], &[]]));
    }

    #[test]
    fn flattened_fields_are_promoted() {
        assert_eq!(paths(&["created_by", "ts"]), expect(&[&[3, 0], &[3, 1]]));
        assert_eq!(paths(&["audit.created_by"]), expect(&[&[3, 0]]));
        assert_eq!(paths(&["created_at"]), expect(&[&[]]));
    }

    #[test]
    fn unmatched_and_skipped_columns_resolve_empty() {
        assert_eq!(paths(&["id", "bogus", "cached"]), expect(&[&[0], &[], &[]]));
    }

    #[test]
    fn resolver_memoizes_per_type() {
        let naming = Naming::default();
        let cols = columns(&["id"]);
        let mut resolver = Resolver::new(&naming);
        let first = resolver.paths(Customer::schema(), &cols);
        let second = resolver.paths(Customer::schema(), &cols);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[derive(Debug, Default, FromRow)]
    struct Node {
        value: i64,
        #[row(flatten)]
        next: Option<Box<Node>>,
    }

    #[test]
    fn recursive_schema_is_bounded() {
        let found = resolve(Node::schema(), &columns(&["value", "missing"]), &Naming::default());
        assert_eq!(found[0].as_slice(), &[0usize][..]);
        assert!(found[1].is_empty());
    }

    #[derive(Debug, Default, FromRow)]
    struct Tree {
        value: i64,
        #[row(flatten)]
        left: Option<Box<Tree>>,
        #[row(flatten)]
        right: Option<Box<Tree>>,
    }

    #[test]
    fn branching_recursive_schema_resolves_quickly() {
        let names = ["value", "extra", "left.value", "right.left.value", "left.extra"];
        let found = resolve(Tree::schema(), &columns(&names), &Naming::default());
        let found: Vec<Vec<usize>> = found.into_iter().map(|p| p.as_slice().to_vec()).collect();
        assert_eq!(found, expect(&[&[0], &[], &[1, 0], &[2, 1, 0], &[]]));
    }
}
