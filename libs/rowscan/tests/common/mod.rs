#![allow(dead_code)]

use rowscan::{FromRow, MemoryCursor};

#[derive(Debug, Default, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Default, Clone, PartialEq, FromRow)]
pub struct Address {
    pub city: String,
    pub zip: Option<u32>,
}

#[derive(Debug, Default, Clone, PartialEq, FromRow)]
pub struct Audit {
    #[row(rename = "created")]
    pub created_at: i64,
    pub active: bool,
}

#[derive(Debug, Default, Clone, PartialEq, FromRow)]
pub struct Customer {
    pub id: i64,
    #[row(nested)]
    pub address: Address,
    #[row(flatten)]
    pub audit: Audit,
    #[row(skip)]
    pub note: String,
}

pub fn users(n: usize) -> MemoryCursor {
    let rows: Vec<Vec<String>> = (1..=n).map(|i| vec![i.to_string(), format!("user{i}")]).collect();
    MemoryCursor::from_text(&["id", "name"], &rows)
}

pub fn user(id: i64) -> User {
    User { id, name: format!("user{id}") }
}

/// Users where the ids at `bad` are not numbers.
pub fn users_with_bad(n: usize, bad: &[usize]) -> MemoryCursor {
    let rows: Vec<Vec<String>> = (1..=n)
        .map(|i| {
            let id = if bad.contains(&i) { format!("bad{i}") } else { i.to_string() };
            vec![id, format!("user{i}")]
        })
        .collect();
    MemoryCursor::from_text(&["id", "name"], &rows)
}
