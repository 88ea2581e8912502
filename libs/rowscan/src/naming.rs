use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::schema::FieldDescriptor;

type NamingFn = dyn Fn(&FieldDescriptor) -> Cow<'static, str> + Send + Sync;

/// Field naming convention: maps a field descriptor to the column name it
/// reads from. The only translation the resolver uses.
#[derive(Clone)]
pub struct Naming(Arc<NamingFn>);

impl Naming {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&FieldDescriptor) -> Cow<'static, str> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn column_name(&self, field: &FieldDescriptor) -> Cow<'static, str> {
        (self.0)(field)
    }

    /// Rust field names as-is; `rename` is ignored.
    pub fn field_name() -> Self {
        Self::new(field_name)
    }

    /// `rename` if present, the Rust field name otherwise.
    pub fn renamed() -> Self {
        Self::new(renamed)
    }

    pub fn lower_camel() -> Self {
        Self::new(lower_camel)
    }

    pub fn screaming() -> Self {
        Self::new(screaming)
    }
}

impl Default for Naming {
    fn default() -> Self {
        Self::renamed()
    }
}

impl fmt::Debug for Naming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Naming(..)")
    }
}

pub fn field_name(field: &FieldDescriptor) -> Cow<'static, str> {
    Cow::Borrowed(field.name)
}

pub fn renamed(field: &FieldDescriptor) -> Cow<'static, str> {
    Cow::Borrowed(field.rename.unwrap_or(field.name))
}

/// `user_id` → `userId`.
pub fn lower_camel(field: &FieldDescriptor) -> Cow<'static, str> {
    if let Some(rename) = field.rename {
        return Cow::Borrowed(rename);
    }
    let mut out = String::with_capacity(field.name.len());
    let mut upper = false;
    for c in field.name.trim_start_matches("r#").chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// `user_id` → `USER_ID`.
pub fn screaming(field: &FieldDescriptor) -> Cow<'static, str> {
    match field.rename {
        Some(rename) => Cow::Borrowed(rename),
        None => Cow::Owned(field.name.trim_start_matches("r#").to_uppercase()),
    }
}
