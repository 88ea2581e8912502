use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::config::RowErrorPolicy;
use crate::cursor::RowStream;
use crate::decode::{FromRow, RowPlan};
use crate::dispatch::{DecodeContext, ScanOutcome, Slots};
use crate::error::{RowError, ScanError};
use crate::row::{ColumnSet, RawRow};

/// No failure seen yet.
const NO_FAILURE: usize = usize::MAX;

/// One row to decode, tagged with its arrival index.
struct Task {
    slot: usize,
    row: RawRow,
}

/// What a worker made of one row.
enum Verdict<E> {
    Decoded(E),
    Failed(RowError),
    /// Not decoded: an earlier row already failed.
    Passed,
}

/// One finished task. Under [`RowErrorPolicy::Abort`] the row comes back
/// with its verdict until it is known to precede the failure.
struct Done<E> {
    slot: usize,
    verdict: Verdict<E>,
    row: Option<RawRow>,
}

enum Report<E> {
    Done(Done<E>),
    Panicked,
}

/// Tells the feeder a worker is unwinding.
struct PanicNotice<'a, E>(&'a Sender<Report<E>>);

impl<E> Drop for PanicNotice<'_, E> {
    fn drop(&mut self) {
        if thread::panicking() {
            let _ = self.0.send(Report::Panicked);
        }
    }
}

/// Commits finished rows to the destination in slot order.
struct Merge<'s, E, S> {
    slots: &'s mut S,
    waiting: BTreeMap<usize, Done<E>>,
    /// First slot not committed yet.
    next: usize,
    outcome: ScanOutcome,
    failure: Option<ScanError>,
    /// Rows taken after the failed row, in slot order.
    returned: Vec<RawRow>,
}

impl<E, S: Slots<E>> Merge<'_, E, S> {
    fn accept(&mut self, done: Done<E>, ctx: &DecodeContext<'_>) {
        self.waiting.insert(done.slot, done);
        while let Some(done) = self.waiting.remove(&self.next) {
            self.next += 1;
            if self.failure.is_some() {
                self.returned.extend(done.row);
                continue;
            }
            match done.verdict {
                Verdict::Decoded(value) => {
                    self.slots.put(value);
                    self.outcome.rows += 1;
                }
                Verdict::Failed(source) => {
                    if let Err(e) = ctx.reject(done.slot, source, &mut self.outcome) {
                        self.failure = Some(e);
                    }
                }
                Verdict::Passed => self.returned.extend(done.row),
            }
        }
    }
}

/// Decode rows of `stream` on `ctx.fanout` scoped workers.
///
/// The calling thread tags rows with their arrival index, feeds a bounded
/// queue and commits results in index order, so the destination and the
/// stream end up exactly as a sequential decode would leave them:
/// - a fixed-size destination takes rows only while the rows in flight could
///   still fit, and takes more as failed rows are skipped;
/// - under [`RowErrorPolicy::Abort`] rows before the first failure are kept,
///   rows taken after it go back to the stream and the failure is returned.
pub(crate) fn decode<E, S>(
    slots: &mut S,
    stream: &mut RowStream,
    plan: &RowPlan,
    columns: &ColumnSet,
    ctx: &DecodeContext<'_>,
) -> Result<ScanOutcome, ScanError>
where
    E: FromRow,
    S: Slots<E>,
{
    let fanout = ctx.fanout;
    let policy = ctx.policy;
    let room = slots.room();
    let window = ctx.work_queue + fanout;
    let first_failure = AtomicUsize::new(NO_FAILURE);
    let mut merge = Merge {
        slots,
        waiting: BTreeMap::new(),
        next: 0,
        outcome: ScanOutcome::default(),
        failure: None,
        returned: Vec::new(),
    };

    thread::scope(|scope| -> Result<(), ScanError> {
        let (tasks, queue) = crossbeam_channel::bounded::<Task>(ctx.work_queue);
        let (reports, finished) = crossbeam_channel::unbounded::<Report<E>>();

        let mut workers = Vec::with_capacity(fanout);
        for id in 0..fanout {
            let queue = queue.clone();
            let reports = reports.clone();
            let first_failure = &first_failure;
            let handle = thread::Builder::new()
                .name(format!("rowscan-decode-{id}"))
                .spawn_scoped(scope, move || {
                    work(queue, reports, plan, columns, first_failure, policy)
                })
                .map_err(|source| ScanError::Spawn { what: "decode worker", source })?;
            workers.push(handle);
        }
        drop(queue);
        drop(reports);

        let mut sent = 0;
        let mut exhausted = false;
        let mut panicked = false;
        loop {
            for report in finished.try_iter() {
                match report {
                    Report::Done(done) => merge.accept(done, ctx),
                    Report::Panicked => panicked = true,
                }
            }
            if panicked || first_failure.load(Ordering::Acquire) != NO_FAILURE {
                break;
            }

            let in_flight = sent - merge.next;
            let wanted = room.is_none_or(|n| merge.outcome.rows + in_flight < n);
            if wanted && !exhausted && in_flight < window {
                match stream.recv() {
                    Some(row) => {
                        if tasks.send(Task { slot: sent, row }).is_err() {
                            break;
                        }
                        sent += 1;
                    }
                    None => exhausted = true,
                }
                continue;
            }
            if in_flight == 0 {
                break;
            }
            match finished.recv() {
                Ok(Report::Done(done)) => merge.accept(done, ctx),
                Ok(Report::Panicked) | Err(_) => panicked = true,
            }
        }
        drop(tasks);
        tracing::debug!(rows = sent, workers = fanout, "decode queue closed");

        // Ends once every worker has exited.
        for report in &finished {
            if let Report::Done(done) = report {
                merge.accept(done, ctx);
            }
        }
        let joined: Vec<bool> = workers.into_iter().map(|worker| worker.join().is_ok()).collect();
        if joined.contains(&false) {
            return Err(ScanError::Panicked("decode worker"));
        }
        Ok(())
    })?;

    let Merge { outcome, failure, returned, .. } = merge;
    if !returned.is_empty() {
        tracing::debug!(rows = returned.len(), "rows after the failed row returned to the stream");
        stream.unread(returned);
    }
    if let Some(error) = failure {
        return Err(error);
    }
    tracing::debug!(rows = outcome.rows, skipped = outcome.skipped.len(), "rows decoded");
    Ok(outcome)
}

fn work<E: FromRow>(
    queue: Receiver<Task>,
    reports: Sender<Report<E>>,
    plan: &RowPlan,
    columns: &ColumnSet,
    first_failure: &AtomicUsize,
    policy: RowErrorPolicy,
) {
    let _notice = PanicNotice(&reports);
    for Task { slot, row } in queue {
        let done = if slot > first_failure.load(Ordering::Acquire) {
            Done { slot, verdict: Verdict::Passed, row: Some(row) }
        } else if policy == RowErrorPolicy::Abort {
            let verdict = match E::from_row_ref(plan, columns, &row) {
                Ok(value) => Verdict::Decoded(value),
                Err(source) => {
                    first_failure.fetch_min(slot, Ordering::AcqRel);
                    Verdict::Failed(source)
                }
            };
            Done { slot, verdict, row: Some(row) }
        } else {
            let verdict = match E::from_row(plan, columns, row) {
                Ok(value) => Verdict::Decoded(value),
                Err(source) => Verdict::Failed(source),
            };
            Done { slot, verdict, row: None }
        };
        if reports.send(Report::Done(done)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::cursor;
    use crate::dispatch::{SliceSlots, VecSlots};
    use crate::memory::MemoryCursor;
    use crate::naming::Naming;
    use crate::row::Limit;
    use crate::FromRow;

    #[derive(Debug, Default, Clone, PartialEq, FromRow)]
    struct Num {
        n: u32,
    }

    fn numbers(n: usize) -> MemoryCursor {
        let rows: Vec<Vec<String>> = (0..n).map(|i| vec![i.to_string()]).collect();
        MemoryCursor::from_text(&["n"], &rows)
    }

    /// Numbers where the values at `bad` are not numbers.
    fn numbers_with_bad(n: usize, bad: &[usize]) -> MemoryCursor {
        let rows: Vec<Vec<String>> = (0..n)
            .map(|i| vec![if bad.contains(&i) { format!("x{i}") } else { i.to_string() }])
            .collect();
        MemoryCursor::from_text(&["n"], &rows)
    }

    fn run<S: Slots<Vec<String>>>(
        slots: &mut S,
        cursor: &mut MemoryCursor,
        config: &ScanConfig,
    ) -> Result<ScanOutcome, ScanError> {
        let naming = Naming::default();
        let ctx = DecodeContext::new(config, &naming, Limit::Unbounded);
        thread::scope(|s| {
            let mut stream = cursor::begin(s, cursor, Limit::Unbounded, 4)?;
            let columns = stream.columns().clone();
            let plan = RowPlan::Strings;
            decode::<Vec<String>, S>(slots, &mut stream, &plan, &columns, &ctx)
        })
    }

    /// Fill a three-slot array from a shared stream, then read what is left.
    fn fill_three(
        cursor: &mut MemoryCursor,
        config: &ScanConfig,
    ) -> (Result<ScanOutcome, ScanError>, [Num; 3], Vec<String>) {
        let naming = Naming::default();
        let ctx = DecodeContext::new(config, &naming, Limit::Unbounded);
        thread::scope(|s| {
            let mut stream = cursor::begin(s, cursor, Limit::Unbounded, 4).unwrap();
            let columns = stream.columns().clone();
            let plan = ctx.plan(<Num as crate::decode::FromRow>::shape(), &columns);
            let mut out: [Num; 3] = Default::default();
            let result = decode::<Num, _>(&mut SliceSlots::new(&mut out), &mut stream, &plan, &columns, &ctx);
            let rest = stream.take(3).map(|row| String::from_utf8_lossy(&row[0]).into_owned()).collect();
            (result, out, rest)
        })
    }

    fn values(out: &[Num]) -> Vec<u32> {
        out.iter().map(|num| num.n).collect()
    }

    #[test]
    fn keeps_arrival_order() {
        let config = ScanConfig::default().with_fanout(4);
        let mut out = Vec::new();
        let outcome = run(&mut VecSlots::new(&mut out, 8, Limit::Unbounded), &mut numbers(500), &config)
            .unwrap();
        assert_eq!(outcome.rows, 500);
        let got: Vec<String> = out.into_iter().map(|mut r| r.remove(0)).collect();
        let want: Vec<String> = (0..500).map(|i| i.to_string()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn fixed_room_bounds_rows_taken() {
        let config = ScanConfig::default().with_fanout(3);
        let mut out: [Vec<String>; 4] = Default::default();
        let outcome = run(&mut SliceSlots::new(&mut out), &mut numbers(10), &config).unwrap();
        assert_eq!(outcome.rows, 4);
        assert_eq!(out[3], ["3"]);
    }

    #[test]
    fn skipped_rows_make_room_for_later_ones() {
        let config = ScanConfig::default().with_fanout(4).with_policy(RowErrorPolicy::Skip);
        let (result, out, rest) = fill_three(&mut numbers_with_bad(20, &[1]), &config);
        let outcome = result.unwrap();
        assert_eq!(outcome.rows, 3);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(values(&out), [0, 2, 3]);
        assert_eq!(rest, ["4", "5", "6"]);
    }

    #[test]
    fn abort_returns_later_rows_to_the_stream() {
        let config = ScanConfig::default().with_fanout(4);
        let (result, out, rest) = fill_three(&mut numbers_with_bad(20, &[2]), &config);
        assert_eq!(result.unwrap_err().row(), Some(2));
        assert_eq!(values(&out), [0, 1, 0]);
        assert_eq!(rest, ["3", "4", "5"]);
    }
}
