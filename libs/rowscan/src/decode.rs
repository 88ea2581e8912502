use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::sync::Arc;

use crate::error::RowError;
use crate::resolve::{FieldPath, Resolver};
use crate::row::{ColumnSet, RawRow};
use crate::schema::{Record, Schema};

/// Static shape of a row value, known from its type alone.
#[derive(Debug, Clone, Copy)]
pub enum RowShape {
    Struct(&'static Schema),
    /// Column name → text.
    StringMap,
    /// Column name → bytes.
    BytesMap,
    /// Column values as text, in column order.
    Strings,
    /// The row itself, uninterpreted.
    Raw,
}

/// Decode strategy for every row of one call, chosen once from a [`RowShape`].
#[derive(Debug, Clone)]
pub enum RowPlan {
    /// One path per column, aligned with the column set.
    Struct(Arc<[FieldPath]>),
    StringMap,
    BytesMap,
    Strings,
    Raw,
}

impl RowPlan {
    pub fn new(shape: RowShape, columns: &ColumnSet, resolver: &mut Resolver<'_>) -> Self {
        match shape {
            RowShape::Struct(schema) => RowPlan::Struct(resolver.paths(schema, columns)),
            RowShape::StringMap => RowPlan::StringMap,
            RowShape::BytesMap => RowPlan::BytesMap,
            RowShape::Strings => RowPlan::Strings,
            RowShape::Raw => RowPlan::Raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RowPlan::Struct(_) => "struct",
            RowPlan::StringMap => "string map",
            RowPlan::BytesMap => "bytes map",
            RowPlan::Strings => "string row",
            RowPlan::Raw => "raw row",
        }
    }

    /// Whether this plan decodes rows of shape `want`.
    fn check(&self, want: RowShape, target: &'static str) -> Result<(), RowError> {
        let ok = matches!(
            (self, want),
            (RowPlan::StringMap, RowShape::StringMap)
                | (RowPlan::BytesMap, RowShape::BytesMap)
                | (RowPlan::Strings, RowShape::Strings)
                | (RowPlan::Raw, RowShape::Raw)
        );
        if ok {
            Ok(())
        } else {
            Err(RowError::Plan { plan: self.name(), target })
        }
    }
}

/// A value built from exactly one row.
///
/// Structs get it from `#[derive(FromRow)]`; maps, string rows and raw rows
/// are built in. `Box` and `Option` wrap any row value.
pub trait FromRow: Sized + Send {
    /// `Box`/`Option` layers around the innermost row value.
    const INDIRECTION: usize = 0;

    fn shape() -> RowShape;

    /// Build a value from a borrowed row.
    fn from_row_ref(plan: &RowPlan, columns: &ColumnSet, row: &RawRow) -> Result<Self, RowError>;

    /// Build a value from an owned row. Override when buffers can be moved
    /// into the value instead of copied.
    fn from_row(plan: &RowPlan, columns: &ColumnSet, row: RawRow) -> Result<Self, RowError> {
        Self::from_row_ref(plan, columns, &row)
    }
}

/// Write one row into an existing record along the struct plan.
///
/// Columns with an empty path are skipped. The first failing column
/// aborts the row; fields assigned before it keep their new values.
pub fn assign_record<T: Record>(
    value: &mut T,
    plan: &RowPlan,
    columns: &ColumnSet,
    row: &RawRow,
) -> Result<(), RowError> {
    let RowPlan::Struct(paths) = plan else {
        return Err(RowError::Plan { plan: plan.name(), target: T::schema().type_name });
    };
    for (index, path) in paths.iter().enumerate() {
        if path.is_empty() {
            continue;
        }
        let raw = row.get(index).map(Vec::as_slice).unwrap_or_default();
        value
            .assign(path.as_slice(), raw)
            .map_err(|source| RowError::Conversion { column: columns[index].clone(), source })?;
    }
    Ok(())
}

/// Fresh record from one row. Used by derived `FromRow` impls.
pub fn record_from_row<T: Record>(
    plan: &RowPlan,
    columns: &ColumnSet,
    row: &RawRow,
) -> Result<T, RowError> {
    let mut value = T::default();
    assign_record(&mut value, plan, columns, row)?;
    Ok(value)
}

/// Column text; invalid UTF-8 is replaced, never rejected.
fn text(raw: Vec<u8>) -> String {
    String::from_utf8(raw).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

impl<T: FromRow> FromRow for Box<T> {
    const INDIRECTION: usize = T::INDIRECTION + 1;

    fn shape() -> RowShape {
        T::shape()
    }

    fn from_row_ref(plan: &RowPlan, columns: &ColumnSet, row: &RawRow) -> Result<Self, RowError> {
        T::from_row_ref(plan, columns, row).map(Box::new)
    }

    fn from_row(plan: &RowPlan, columns: &ColumnSet, row: RawRow) -> Result<Self, RowError> {
        T::from_row(plan, columns, row).map(Box::new)
    }
}

impl<T: FromRow> FromRow for Option<T> {
    const INDIRECTION: usize = T::INDIRECTION + 1;

    fn shape() -> RowShape {
        T::shape()
    }

    fn from_row_ref(plan: &RowPlan, columns: &ColumnSet, row: &RawRow) -> Result<Self, RowError> {
        T::from_row_ref(plan, columns, row).map(Some)
    }

    fn from_row(plan: &RowPlan, columns: &ColumnSet, row: RawRow) -> Result<Self, RowError> {
        T::from_row(plan, columns, row).map(Some)
    }
}

macro_rules! string_map_from_row {
    ($map:ty, $($bounds:tt)*) => {
        impl<$($bounds)*> FromRow for $map {
            fn shape() -> RowShape {
                RowShape::StringMap
            }

            fn from_row_ref(plan: &RowPlan, columns: &ColumnSet, row: &RawRow) -> Result<Self, RowError> {
                plan.check(RowShape::StringMap, "string map")?;
                Ok(columns.iter().cloned().zip(row.iter().map(|raw| text(raw.clone()))).collect())
            }

            fn from_row(plan: &RowPlan, columns: &ColumnSet, row: RawRow) -> Result<Self, RowError> {
                plan.check(RowShape::StringMap, "string map")?;
                Ok(columns.iter().cloned().zip(row.into_iter().map(text)).collect())
            }
        }
    };
}

macro_rules! bytes_map_from_row {
    ($map:ty, $($bounds:tt)*) => {
        impl<$($bounds)*> FromRow for $map {
            fn shape() -> RowShape {
                RowShape::BytesMap
            }

            fn from_row_ref(plan: &RowPlan, columns: &ColumnSet, row: &RawRow) -> Result<Self, RowError> {
                plan.check(RowShape::BytesMap, "bytes map")?;
                Ok(columns.iter().cloned().zip(row.iter().cloned()).collect())
            }

            fn from_row(plan: &RowPlan, columns: &ColumnSet, row: RawRow) -> Result<Self, RowError> {
                plan.check(RowShape::BytesMap, "bytes map")?;
                // Each value owns its buffer, NULL included.
                Ok(columns.iter().cloned().zip(row).collect())
            }
        }
    };
}

string_map_from_row!(HashMap<String, String, S>, S: BuildHasher + Default + Send);
string_map_from_row!(BTreeMap<String, String>,);
bytes_map_from_row!(HashMap<String, Vec<u8>, S>, S: BuildHasher + Default + Send);
bytes_map_from_row!(BTreeMap<String, Vec<u8>>,);

impl FromRow for Vec<String> {
    fn shape() -> RowShape {
        RowShape::Strings
    }

    fn from_row_ref(plan: &RowPlan, _columns: &ColumnSet, row: &RawRow) -> Result<Self, RowError> {
        plan.check(RowShape::Strings, "string row")?;
        Ok(row.iter().map(|raw| text(raw.clone())).collect())
    }

    fn from_row(plan: &RowPlan, _columns: &ColumnSet, row: RawRow) -> Result<Self, RowError> {
        plan.check(RowShape::Strings, "string row")?;
        Ok(row.into_iter().map(text).collect())
    }
}

impl FromRow for Vec<Vec<u8>> {
    fn shape() -> RowShape {
        RowShape::Raw
    }

    fn from_row_ref(plan: &RowPlan, _columns: &ColumnSet, row: &RawRow) -> Result<Self, RowError> {
        plan.check(RowShape::Raw, "raw row")?;
        Ok(row.clone())
    }

    fn from_row(plan: &RowPlan, _columns: &ColumnSet, row: RawRow) -> Result<Self, RowError> {
        plan.check(RowShape::Raw, "raw row")?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FromRow;
    use crate::naming::Naming;

    #[derive(Debug, Default, PartialEq, FromRow)]
    struct Item {
        id: i64,
        name: String,
        note: Option<String>,
    }

    fn columns() -> ColumnSet {
        ColumnSet::new(vec!["id".into(), "name".into(), "note".into(), "extra".into()])
    }

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.as_bytes().to_vec()).collect()
    }

    fn plan<T: super::FromRow>(columns: &ColumnSet) -> RowPlan {
        let naming = Naming::default();
        let mut resolver = Resolver::new(&naming);
        RowPlan::new(T::shape(), columns, &mut resolver)
    }

    #[test]
    fn struct_row_skips_unmatched_columns() {
        let cols = columns();
        let item: Item =
            super::FromRow::from_row(&plan::<Item>(&cols), &cols, row(&["7", "x", "", "ignored"]))
                .unwrap();
        assert_eq!(item, Item { id: 7, name: "x".into(), note: None });
    }

    #[test]
    fn struct_conversion_failure_names_column() {
        let cols = columns();
        let err = <Item as super::FromRow>::from_row(&plan::<Item>(&cols), &cols, row(&["x", "", "", ""]))
            .unwrap_err();
        assert!(matches!(err, RowError::Conversion { ref column, .. } if column == "id"));
    }

    #[test]
    fn maps_store_empty_values() {
        let cols = ColumnSet::new(vec!["a".into(), "b".into()]);
        let strings: HashMap<String, String> =
            super::FromRow::from_row(&RowPlan::StringMap, &cols, row(&["1", ""])).unwrap();
        assert_eq!(strings["a"], "1");
        assert_eq!(strings["b"], "");

        let bytes: BTreeMap<String, Vec<u8>> =
            super::FromRow::from_row(&RowPlan::BytesMap, &cols, row(&["1", ""])).unwrap();
        assert_eq!(bytes["a"], b"1");
        assert!(bytes["b"].is_empty());
    }

    #[test]
    fn string_row_is_lossy() {
        let cols = ColumnSet::new(vec!["a".into(), "b".into()]);
        let values: Vec<String> =
            super::FromRow::from_row(&RowPlan::Strings, &cols, vec![b"ok".to_vec(), vec![0xff]])
                .unwrap();
        assert_eq!(values, ["ok", "\u{fffd}"]);
    }

    #[test]
    fn wrappers_add_indirection() {
        assert_eq!(<Box<Item> as super::FromRow>::INDIRECTION, 1);
        assert_eq!(<Option<Box<Item>> as super::FromRow>::INDIRECTION, 2);
        assert!(matches!(<Option<Box<Item>> as super::FromRow>::shape(), RowShape::Struct(_)));
    }

    #[test]
    fn borrowed_rows_decode_like_owned_rows() {
        let cols = columns();
        let raw = row(&["3", "y", "n", "z"]);
        let borrowed = <Item as super::FromRow>::from_row_ref(&plan::<Item>(&cols), &cols, &raw).unwrap();
        assert_eq!(borrowed, Item { id: 3, name: "y".into(), note: Some("n".into()) });

        let text: BTreeMap<String, String> =
            super::FromRow::from_row_ref(&RowPlan::StringMap, &cols, &raw).unwrap();
        let owned: BTreeMap<String, String> =
            super::FromRow::from_row(&RowPlan::StringMap, &cols, raw.clone()).unwrap();
        assert_eq!(text, owned);
        assert_eq!(raw.len(), 4);
    }

    #[test]
    fn mismatched_plan_is_rejected() {
        let cols = ColumnSet::new(vec!["a".into()]);
        let err = <Vec<String> as super::FromRow>::from_row(&RowPlan::Raw, &cols, row(&["1"]))
            .unwrap_err();
        assert!(matches!(err, RowError::Plan { plan: "raw row", .. }));
    }
}
