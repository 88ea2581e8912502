use crate::error::ConversionError;

/// Static description of a struct's decodable fields.
///
/// Emitted once per type by `#[derive(FromRow)]` as a `static`; the column
/// resolver walks it instead of inspecting values at runtime.
#[derive(Debug)]
pub struct Schema {
    pub type_name: &'static str,
    /// Decodable fields in declaration order. A field's position here is
    /// its index in a [`FieldPath`](crate::resolve::FieldPath).
    pub fields: &'static [FieldDescriptor],
}

/// One field of a [`Schema`].
#[derive(Debug)]
pub struct FieldDescriptor {
    /// Rust field name.
    pub name: &'static str,
    /// Column name from `#[row(rename = "...")]`.
    pub rename: Option<&'static str>,
    /// Field type as written in the struct, for diagnostics.
    pub type_name: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Scalar field, assigned from one column through `FromColumn`.
    Leaf,
    /// Struct field addressed with a dotted prefix (`address.city`).
    Nested(fn() -> &'static Schema),
    /// Embedded struct: its fields are promoted to the parent level.
    Flatten(fn() -> &'static Schema),
}

impl FieldKind {
    pub fn child(self) -> Option<&'static Schema> {
        match self {
            FieldKind::Leaf => None,
            FieldKind::Nested(schema) | FieldKind::Flatten(schema) => Some(schema()),
        }
    }
}

/// A struct that can be filled column by column.
///
/// Implemented by `#[derive(FromRow)]`; `Box` and `Option` wrappers delegate
/// to the inner record, allocating it on first assignment.
pub trait Record: Default + Send + 'static {
    fn schema() -> &'static Schema;

    /// Assign one column buffer to the field at `path` (indexes into
    /// `schema().fields`, one per nesting level).
    fn assign(&mut self, path: &[usize], raw: &[u8]) -> Result<(), ConversionError>;
}

impl<T: Record> Record for Box<T> {
    fn schema() -> &'static Schema {
        T::schema()
    }

    fn assign(&mut self, path: &[usize], raw: &[u8]) -> Result<(), ConversionError> {
        (**self).assign(path, raw)
    }
}

impl<T: Record> Record for Option<T> {
    fn schema() -> &'static Schema {
        T::schema()
    }

    fn assign(&mut self, path: &[usize], raw: &[u8]) -> Result<(), ConversionError> {
        self.get_or_insert_with(T::default).assign(path, raw)
    }
}

/// Error for a path the record does not have. Used by derived `assign`.
pub fn unknown_path(type_name: &'static str, path: &[usize]) -> ConversionError {
    ConversionError::new(format!("{type_name} has no field at path {path:?}"))
}
