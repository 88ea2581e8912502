//! Decode rows of a query cursor into Rust values.
//!
//! A [`Cursor`] yields rows as byte buffers; a [`Scanner`] streams them off
//! the cursor and writes them into a [`Destination`]: a `#[derive(FromRow)]`
//! struct, a map, a `Vec` or array of rows, or a [`Table`].
//!
//! ```ignore
//! #[derive(Debug, Default, FromRow)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! let mut users: Vec<User> = Vec::new();
//! Scanner::default().scan(&mut cursor, &mut users)?;
//! ```

// Derived impls name this crate by absolute path.
extern crate self as rowscan;

pub mod config;
pub mod convert;
pub mod cursor;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod naming;
mod pool;
pub mod resolve;
pub mod row;
pub mod scanner;
pub mod schema;
pub mod table;

pub use rowscan_derive::FromRow;

pub use config::{RowErrorPolicy, ScanConfig};
pub use convert::{FromColumn, Json};
pub use cursor::{Cursor, RowStream};
pub use decode::FromRow;
pub use dispatch::{DecodeContext, Destination, ScanOutcome, MAX_INDIRECTION};
pub use error::{ConversionError, RowError, RowFailure, ScanError};
pub use memory::MemoryCursor;
pub use naming::Naming;
pub use row::{ColumnSet, Limit, RawRow};
pub use scanner::{scan_blocking, Scanner, Target};
pub use schema::Record;
pub use table::Table;
