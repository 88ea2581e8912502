use std::collections::VecDeque;
use std::thread::{self, Scope};

use tokio::sync::mpsc;

use crate::error::{BoxError, ScanError};
use crate::row::{ColumnSet, Limit, RawRow};

/// In-progress query result, advanced row by row.
///
/// The driver-facing seam of the crate: anything that can step through rows
/// and copy the current row into byte buffers can be scanned.
pub trait Cursor: Send {
    /// Move to the next row. `false` once exhausted or when the driver failed
    /// (see [`Cursor::last_error`]).
    fn next_row(&mut self) -> bool;

    /// Column names of the result, in row order.
    fn columns(&self) -> Result<Vec<String>, BoxError>;

    /// Copy the current row into `dest`, one buffer per column.
    /// NULL is written as an empty buffer.
    fn scan_into(&mut self, dest: &mut [Vec<u8>]) -> Result<(), BoxError>;

    /// Error that stopped [`Cursor::next_row`], if any.
    fn last_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        None
    }
}

impl<C: Cursor + ?Sized> Cursor for &mut C {
    fn next_row(&mut self) -> bool {
        (**self).next_row()
    }

    fn columns(&self) -> Result<Vec<String>, BoxError> {
        (**self).columns()
    }

    fn scan_into(&mut self, dest: &mut [Vec<u8>]) -> Result<(), BoxError> {
        (**self).scan_into(dest)
    }

    fn last_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        (**self).last_error()
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn next_row(&mut self) -> bool {
        (**self).next_row()
    }

    fn columns(&self) -> Result<Vec<String>, BoxError> {
        (**self).columns()
    }

    fn scan_into(&mut self, dest: &mut [Vec<u8>]) -> Result<(), BoxError> {
        (**self).scan_into(dest)
    }

    fn last_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        (**self).last_error()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Row stream: consumer side of the row channel
// ═══════════════════════════════════════════════════════════════

/// Rows of one decode call, in cursor order.
///
/// Owned by the consumer: a decode call takes as many rows as its destination
/// holds and leaves the rest for the next call. Dropping the stream stops the
/// producer.
#[derive(Debug)]
pub struct RowStream {
    columns: ColumnSet,
    /// Rows handed back by a decode call; read before the channel.
    unread: VecDeque<RawRow>,
    rx: Option<mpsc::Receiver<RawRow>>,
}

impl RowStream {
    fn new(columns: ColumnSet, rx: mpsc::Receiver<RawRow>) -> Self {
        Self { columns, unread: VecDeque::new(), rx: Some(rx) }
    }

    /// Stream with no columns and no rows.
    pub fn empty() -> Self {
        Self { columns: ColumnSet::default(), unread: VecDeque::new(), rx: None }
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// Next row, blocking until the producer delivers it.
    /// `None` once the channel is closed.
    ///
    /// Must not be called from inside an async task.
    pub fn recv(&mut self) -> Option<RawRow> {
        if let Some(row) = self.unread.pop_front() {
            return Some(row);
        }
        self.rx.as_mut()?.blocking_recv()
    }

    /// Put rows taken but not used back at the front of the stream, in order.
    pub(crate) fn unread(&mut self, rows: Vec<RawRow>) {
        for row in rows.into_iter().rev() {
            self.unread.push_front(row);
        }
    }
}

impl Iterator for RowStream {
    type Item = RawRow;

    fn next(&mut self) -> Option<RawRow> {
        self.recv()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Producer: cursor to row channel
// ═══════════════════════════════════════════════════════════════

/// Start streaming `cursor` on a producer thread of `scope`.
///
/// Peeks the first row to fix the column set. `Limit::Rows(0)`, an empty
/// cursor and a column-less result all give an empty stream without error.
pub fn begin<'scope, 'env, C>(
    scope: &'scope Scope<'scope, 'env>,
    cursor: &'scope mut C,
    limit: Limit,
    buffer: usize,
) -> Result<RowStream, ScanError>
where
    C: Cursor + ?Sized,
{
    let Some(columns) = open(cursor, limit)? else {
        return Ok(RowStream::empty());
    };

    let (tx, rx) = mpsc::channel(buffer.max(1));
    let width = columns.len();
    thread::Builder::new()
        .name("rowscan-cursor".into())
        .spawn_scoped(scope, move || produce(cursor, width, limit, tx))
        .map_err(|source| ScanError::Spawn { what: "cursor producer", source })?;

    tracing::debug!(columns = width, ?limit, buffer, "row stream started");
    Ok(RowStream::new(columns, rx))
}

/// Stream `cursor` on the calling thread, for calls that need few rows.
///
/// The channel is sized to the limit, so the producer never blocks; an
/// unbounded limit is rejected.
pub fn begin_inline<C>(cursor: &mut C, limit: Limit) -> Result<RowStream, ScanError>
where
    C: Cursor + ?Sized,
{
    let Some(rows) = limit.rows() else {
        return Err(ScanError::Config {
            context: "inline stream",
            detail: "an inline stream needs a bounded limit".into(),
        });
    };
    let Some(columns) = open(cursor, limit)? else {
        return Ok(RowStream::empty());
    };

    let (tx, rx) = mpsc::channel(rows.max(1));
    produce(cursor, columns.len(), limit, tx);
    Ok(RowStream::new(columns, rx))
}

/// Advance to the first row and read the column set.
fn open<C>(cursor: &mut C, limit: Limit) -> Result<Option<ColumnSet>, ScanError>
where
    C: Cursor + ?Sized,
{
    if limit.is_zero() {
        return Ok(None);
    }
    if !cursor.next_row() {
        if let Some(e) = cursor.last_error() {
            tracing::warn!(error = %e, "cursor failed before the first row");
        }
        return Ok(None);
    }
    let names = cursor.columns().map_err(ScanError::Columns)?;
    if names.is_empty() {
        return Ok(None);
    }
    Ok(Some(ColumnSet::new(names)))
}

/// Copy rows off the cursor until exhaustion, limit, a materialization
/// failure or a gone consumer. The cursor is positioned on a row when called.
///
/// The channel closes when `tx` drops at return, on every path.
fn produce<C>(cursor: &mut C, width: usize, limit: Limit, tx: mpsc::Sender<RawRow>) -> usize
where
    C: Cursor + ?Sized,
{
    let mut sent = 0;
    while limit.allows(sent) {
        let mut row: RawRow = vec![Vec::new(); width];
        if let Err(e) = cursor.scan_into(&mut row) {
            tracing::warn!(row = sent, error = %e, "row materialization failed, truncating stream");
            break;
        }
        if tx.blocking_send(row).is_err() {
            tracing::debug!(rows = sent, "row consumer gone");
            break;
        }
        sent += 1;

        // Advance only between rows: never past the last row taken.
        if !limit.allows(sent) {
            break;
        }
        if !cursor.next_row() {
            if let Some(e) = cursor.last_error() {
                tracing::warn!(rows = sent, error = %e, "cursor failed, truncating stream");
            }
            break;
        }
    }
    tracing::debug!(rows = sent, "row stream closed");
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCursor;

    fn cursor(rows: usize) -> MemoryCursor {
        let data: Vec<Vec<String>> = (0..rows).map(|i| vec![i.to_string()]).collect();
        MemoryCursor::from_text(&["n"], &data)
    }

    fn collect(stream: RowStream) -> Vec<String> {
        stream.map(|row| String::from_utf8_lossy(&row[0]).into_owned()).collect()
    }

    #[test]
    fn zero_limit_leaves_cursor_untouched() {
        let mut c = cursor(3);
        let stream = begin_inline(&mut c, Limit::Rows(0)).unwrap();
        assert!(stream.columns().is_empty());
        assert_eq!(c.advanced(), 0);
        assert_eq!(collect(stream), Vec::<String>::new());
    }

    #[test]
    fn empty_cursor_gives_empty_stream() {
        let mut c = cursor(0);
        thread::scope(|s| {
            let stream = begin(s, &mut c, Limit::Unbounded, 4).unwrap();
            assert!(stream.columns().is_empty());
            assert!(collect(stream).is_empty());
        });
    }

    #[test]
    fn streams_all_rows_through_small_buffer() {
        let mut c = cursor(50);
        let rows = thread::scope(|s| {
            let stream = begin(s, &mut c, Limit::Unbounded, 2).unwrap();
            assert_eq!(stream.columns().names(), ["n".to_string()]);
            collect(stream)
        });
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn limit_stops_without_advancing_past_last_row() {
        let mut c = cursor(5);
        let rows = thread::scope(|s| collect(begin(s, &mut c, Limit::Rows(2), 8).unwrap()));
        assert_eq!(rows, ["0", "1"]);
        assert_eq!(c.materialized(), 2);
        assert_eq!(c.advanced(), 2);
    }

    #[test]
    fn materialization_failure_truncates_stream() {
        let mut c = cursor(5).fail_at(3);
        let rows = thread::scope(|s| collect(begin(s, &mut c, Limit::Unbounded, 8).unwrap()));
        assert_eq!(rows, ["0", "1", "2"]);
    }

    #[test]
    fn dropped_stream_stops_producer() {
        let mut c = cursor(100);
        thread::scope(|s| {
            let mut stream = begin(s, &mut c, Limit::Unbounded, 1).unwrap();
            assert!(stream.recv().is_some());
        });
        assert!(c.materialized() < 100);
    }

    #[test]
    fn unread_rows_come_back_first_in_order() {
        let mut c = cursor(5);
        let rows = thread::scope(|s| {
            let mut stream = begin(s, &mut c, Limit::Unbounded, 2).unwrap();
            let first = stream.recv().unwrap();
            let second = stream.recv().unwrap();
            stream.unread(vec![first, second]);
            collect(stream)
        });
        assert_eq!(rows, ["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn column_error_is_reported() {
        let mut c = cursor(1).fail_columns("no metadata");
        let err = begin_inline(&mut c, Limit::Rows(1)).unwrap_err();
        assert!(matches!(err, ScanError::Columns(_)));
    }

    #[test]
    fn inline_stream_needs_bounded_limit() {
        let mut c = cursor(1);
        assert!(matches!(
            begin_inline(&mut c, Limit::Unbounded),
            Err(ScanError::Config { .. })
        ));
        assert_eq!(c.advanced(), 0);
    }
}
