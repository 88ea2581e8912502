use serde::Serialize;

use crate::cursor::RowStream;
use crate::dispatch::{DecodeContext, Destination, ScanOutcome};
use crate::error::ScanError;
use crate::row::Limit;

/// Whole result as text: the column header plus one `Vec<String>` per row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &str> + '_> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(move |row| row.get(index).map_or("", String::as_str)))
    }

    /// Header row followed by the data rows.
    pub fn into_grid(self) -> Vec<Vec<String>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.columns);
        grid.extend(self.rows);
        grid
    }
}

impl Destination for Table {
    fn capacity(&mut self) -> Limit {
        Limit::Unbounded
    }

    fn fill(
        &mut self,
        stream: &mut RowStream,
        ctx: &DecodeContext<'_>,
    ) -> Result<ScanOutcome, ScanError> {
        self.columns = stream.columns().names().to_vec();
        Destination::fill(&mut self.rows, stream, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec!["1".into(), "a".into()], vec!["2".into(), "b".into()]],
        }
    }

    #[test]
    fn grid_starts_with_header() {
        let grid = table().into_grid();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], ["id", "name"]);
        assert_eq!(grid[2], ["2", "b"]);
    }

    #[test]
    fn column_lookup() {
        let t = table();
        let names: Vec<&str> = t.column("name").unwrap().collect();
        assert_eq!(names, ["a", "b"]);
        assert!(t.column("missing").is_none());
    }
}
