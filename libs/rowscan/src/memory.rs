use crate::cursor::Cursor;
use crate::error::BoxError;

/// Cursor over rows held in memory.
///
/// Stands in for a driver in tests and tools. Counts how often it was
/// advanced and materialized, and can inject failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryCursor {
    columns: Vec<String>,
    /// `None` cells are NULL.
    rows: Vec<Vec<Option<Vec<u8>>>>,
    /// Index of the current row; `None` before the first advance.
    position: Option<usize>,
    fail_at: Option<usize>,
    columns_error: Option<String>,
    advanced: usize,
    materialized: usize,
}

impl MemoryCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        Self { columns, rows, ..Self::default() }
    }

    /// Cursor where every cell is non-NULL text.
    pub fn from_text<R, S>(columns: &[&str], rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| Some(cell.as_ref().as_bytes().to_vec())).collect())
            .collect();
        Self::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    /// Fail materialization of row `row` (0-based).
    pub fn fail_at(mut self, row: usize) -> Self {
        self.fail_at = Some(row);
        self
    }

    /// Fail every `columns()` call.
    pub fn fail_columns(mut self, msg: impl Into<String>) -> Self {
        self.columns_error = Some(msg.into());
        self
    }

    /// Number of `next_row` calls so far.
    pub fn advanced(&self) -> usize {
        self.advanced
    }

    /// Number of rows copied out so far.
    pub fn materialized(&self) -> usize {
        self.materialized
    }
}

impl Cursor for MemoryCursor {
    fn next_row(&mut self) -> bool {
        self.advanced += 1;
        let next = self.position.map_or(0, |p| p + 1).min(self.rows.len());
        self.position = Some(next);
        next < self.rows.len()
    }

    fn columns(&self) -> Result<Vec<String>, BoxError> {
        match &self.columns_error {
            Some(msg) => Err(msg.clone().into()),
            None => Ok(self.columns.clone()),
        }
    }

    fn scan_into(&mut self, dest: &mut [Vec<u8>]) -> Result<(), BoxError> {
        let Some(index) = self.position.filter(|p| *p < self.rows.len()) else {
            return Err("no current row".into());
        };
        if self.fail_at == Some(index) {
            return Err(format!("injected failure at row {index}").into());
        }
        let row = &self.rows[index];
        if row.len() != dest.len() {
            return Err(format!("row {index} has {} values, expected {}", row.len(), dest.len()).into());
        }
        for (buf, cell) in dest.iter_mut().zip(row) {
            buf.clear();
            if let Some(bytes) = cell {
                buf.extend_from_slice(bytes);
            }
        }
        self.materialized += 1;
        Ok(())
    }
}
