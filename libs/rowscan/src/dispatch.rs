use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use crate::config::{RowErrorPolicy, ScanConfig};
use crate::cursor::RowStream;
use crate::decode::{self, FromRow, RowPlan, RowShape};
use crate::error::{RowError, RowFailure, ScanError};
use crate::naming::Naming;
use crate::pool;
use crate::resolve::Resolver;
use crate::row::{ColumnSet, Limit};
use crate::schema::Record;

/// Deepest `Box`/`Option` nesting a destination may have.
pub const MAX_INDIRECTION: usize = 16;

/// Result of one decode call.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Rows written to the destination.
    pub rows: usize,
    /// Rows left out under [`RowErrorPolicy::Skip`], in arrival order.
    pub skipped: Vec<RowFailure>,
}

impl ScanOutcome {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Settings and per-call state handed to [`Destination::fill`].
pub struct DecodeContext<'a> {
    resolver: RefCell<Resolver<'a>>,
    pub(crate) fanout: usize,
    pub(crate) work_queue: usize,
    pub(crate) growth_chunk: usize,
    pub(crate) policy: RowErrorPolicy,
    /// Rows the call may take; a sizing hint for growable destinations.
    pub(crate) limit: Limit,
}

impl<'a> DecodeContext<'a> {
    pub(crate) fn new(config: &ScanConfig, naming: &'a Naming, limit: Limit) -> Self {
        Self {
            resolver: RefCell::new(Resolver::new(naming)),
            fanout: config.effective_fanout(),
            work_queue: config.work_queue,
            growth_chunk: config.growth_chunk,
            policy: config.on_row_error,
            limit,
        }
    }

    pub fn policy(&self) -> RowErrorPolicy {
        self.policy
    }

    /// Decode plan for `shape` over `columns`. Struct paths are resolved
    /// once per type and call.
    pub fn plan(&self, shape: RowShape, columns: &ColumnSet) -> RowPlan {
        RowPlan::new(shape, columns, &mut self.resolver.borrow_mut())
    }

    /// Apply the row error policy to a failed row.
    pub(crate) fn reject(
        &self,
        row: usize,
        source: RowError,
        outcome: &mut ScanOutcome,
    ) -> Result<(), ScanError> {
        match self.policy {
            RowErrorPolicy::Abort => Err(ScanError::Row { row, source }),
            RowErrorPolicy::Skip => {
                tracing::warn!(row, error = %source, "row failed to decode, skipping");
                outcome.skipped.push(RowFailure::new(row, source));
                Ok(())
            }
        }
    }
}

/// Anything a decode call can write rows into.
///
/// A destination decides how many rows it holds and how they are stored;
/// the stream is positioned at the first row not yet taken.
pub trait Destination {
    /// `Box`/`Option` layers around the innermost row value.
    const INDIRECTION: usize = 0;

    /// Most rows this destination can take.
    fn capacity(&mut self) -> Limit;

    fn fill(&mut self, stream: &mut RowStream, ctx: &DecodeContext<'_>)
    -> Result<ScanOutcome, ScanError>;
}

/// Reject destinations nested deeper than [`MAX_INDIRECTION`].
pub(crate) fn check_indirection<D: Destination>() -> Result<(), ScanError> {
    if D::INDIRECTION > MAX_INDIRECTION {
        return Err(ScanError::InvalidType(format!(
            "{} has {} levels of indirection, at most {MAX_INDIRECTION} are supported",
            std::any::type_name::<D>(),
            D::INDIRECTION
        )));
    }
    Ok(())
}

/// Decode the next row in place into a struct destination.
///
/// Fields with no matching column keep their values; nothing is written when
/// the stream is empty.
pub fn fill_record<T: Record>(
    dest: &mut T,
    stream: &mut RowStream,
    ctx: &DecodeContext<'_>,
) -> Result<ScanOutcome, ScanError> {
    let columns = stream.columns().clone();
    let plan = ctx.plan(RowShape::Struct(T::schema()), &columns);
    let mut outcome = ScanOutcome::default();
    let Some(row) = stream.recv() else {
        return Ok(outcome);
    };
    match decode::assign_record(dest, &plan, &columns, &row) {
        Ok(()) => outcome.rows = 1,
        Err(source) => ctx.reject(0, source, &mut outcome)?,
    }
    Ok(outcome)
}

/// Replace `dest` with a value built from the next row.
pub fn fill_single<T: FromRow>(
    dest: &mut T,
    stream: &mut RowStream,
    ctx: &DecodeContext<'_>,
) -> Result<ScanOutcome, ScanError> {
    let columns = stream.columns().clone();
    let plan = ctx.plan(T::shape(), &columns);
    let mut outcome = ScanOutcome::default();
    let Some(row) = stream.recv() else {
        return Ok(outcome);
    };
    match T::from_row(&plan, &columns, row) {
        Ok(value) => {
            *dest = value;
            outcome.rows = 1;
        }
        Err(source) => ctx.reject(0, source, &mut outcome)?,
    }
    Ok(outcome)
}

// ═══════════════════════════════════════════════════════════════
//  Slots: where decoded elements of a collection land
// ═══════════════════════════════════════════════════════════════

/// Ordered write positions of a collection destination.
pub(crate) trait Slots<E> {
    /// Positions left; `None` when the collection grows.
    fn room(&self) -> Option<usize>;

    /// Write the next element.
    fn put(&mut self, value: E);

    /// Settle the collection after the last write.
    fn finish(&mut self);
}

/// A `Vec` written from index 0, overwriting existing elements and growing
/// by a fixed chunk when full.
pub(crate) struct VecSlots<'a, E> {
    vec: &'a mut Vec<E>,
    next: usize,
    chunk: usize,
}

impl<'a, E> VecSlots<'a, E> {
    pub(crate) fn new(vec: &'a mut Vec<E>, chunk: usize, limit: Limit) -> Self {
        if vec.is_empty() {
            let initial = limit.rows().map_or(chunk, |rows| rows.min(chunk));
            vec.reserve_exact(initial);
        }
        Self { vec, next: 0, chunk: chunk.max(1) }
    }
}

impl<E> Slots<E> for VecSlots<'_, E> {
    fn room(&self) -> Option<usize> {
        None
    }

    fn put(&mut self, value: E) {
        if let Some(slot) = self.vec.get_mut(self.next) {
            *slot = value;
        } else {
            if self.vec.len() == self.vec.capacity() {
                self.vec.reserve_exact(self.chunk);
            }
            self.vec.push(value);
        }
        self.next += 1;
    }

    fn finish(&mut self) {
        self.vec.truncate(self.next);
    }
}

/// A fixed-size slice written from index 0; elements past the last row keep
/// their values.
pub(crate) struct SliceSlots<'a, E> {
    slice: &'a mut [E],
    next: usize,
}

impl<'a, E> SliceSlots<'a, E> {
    pub(crate) fn new(slice: &'a mut [E]) -> Self {
        Self { slice, next: 0 }
    }
}

impl<E> Slots<E> for SliceSlots<'_, E> {
    fn room(&self) -> Option<usize> {
        Some(self.slice.len() - self.next)
    }

    fn put(&mut self, value: E) {
        if let Some(slot) = self.slice.get_mut(self.next) {
            *slot = value;
            self.next += 1;
        }
    }

    fn finish(&mut self) {}
}

/// Decode rows into a collection, in parallel when the context asks for
/// more than one worker.
pub(crate) fn fill_slots<E, S>(
    slots: &mut S,
    stream: &mut RowStream,
    ctx: &DecodeContext<'_>,
) -> Result<ScanOutcome, ScanError>
where
    E: FromRow,
    S: Slots<E>,
{
    let columns = stream.columns().clone();
    let plan = ctx.plan(E::shape(), &columns);

    // Raw rows need no decoding worth spreading out.
    let parallel = ctx.fanout > 1 && !matches!(plan, RowPlan::Raw);
    let result = if parallel {
        pool::decode::<E, S>(slots, stream, &plan, &columns, ctx)
    } else {
        decode_sequential::<E, S>(slots, stream, &plan, &columns, ctx)
    };
    slots.finish();
    result
}

fn decode_sequential<E, S>(
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
    let mut outcome = ScanOutcome::default();
    let mut received = 0;
    while slots.room() != Some(0) {
        let Some(row) = stream.recv() else {
            break;
        };
        let index = received;
        received += 1;
        match E::from_row(plan, columns, row) {
            Ok(value) => {
                slots.put(value);
                outcome.rows += 1;
            }
            Err(source) => ctx.reject(index, source, &mut outcome)?,
        }
    }
    tracing::debug!(rows = outcome.rows, skipped = outcome.skipped.len(), "rows decoded");
    Ok(outcome)
}

// ═══════════════════════════════════════════════════════════════
//  Built-in destinations
// ═══════════════════════════════════════════════════════════════

impl<E: FromRow> Destination for Vec<E> {
    const INDIRECTION: usize = E::INDIRECTION;

    fn capacity(&mut self) -> Limit {
        Limit::Unbounded
    }

    fn fill(
        &mut self,
        stream: &mut RowStream,
        ctx: &DecodeContext<'_>,
    ) -> Result<ScanOutcome, ScanError> {
        fill_slots::<E, _>(&mut VecSlots::new(self, ctx.growth_chunk, ctx.limit), stream, ctx)
    }
}

impl<E: FromRow, const N: usize> Destination for [E; N] {
    const INDIRECTION: usize = E::INDIRECTION;

    fn capacity(&mut self) -> Limit {
        Limit::Rows(N)
    }

    fn fill(
        &mut self,
        stream: &mut RowStream,
        ctx: &DecodeContext<'_>,
    ) -> Result<ScanOutcome, ScanError> {
        fill_slots::<E, _>(&mut SliceSlots::new(self), stream, ctx)
    }
}

macro_rules! single_row_destination {
    ($ty:ty $(, $($bounds:tt)*)?) => {
        impl$(<$($bounds)*>)? Destination for $ty {
            fn capacity(&mut self) -> Limit {
                Limit::Rows(1)
            }

            fn fill(
                &mut self,
                stream: &mut RowStream,
                ctx: &DecodeContext<'_>,
            ) -> Result<ScanOutcome, ScanError> {
                fill_single(self, stream, ctx)
            }
        }
    };
}

// A flat sequence at the top level is one row, one element per column.
single_row_destination!(Vec<String>);
single_row_destination!(Vec<Vec<u8>>);
single_row_destination!(BTreeMap<String, String>);
single_row_destination!(BTreeMap<String, Vec<u8>>);
single_row_destination!(HashMap<String, String, S>, S: BuildHasher + Default + Send);
single_row_destination!(HashMap<String, Vec<u8>, S>, S: BuildHasher + Default + Send);

impl<T: Destination> Destination for Box<T> {
    const INDIRECTION: usize = T::INDIRECTION + 1;

    fn capacity(&mut self) -> Limit {
        (**self).capacity()
    }

    fn fill(
        &mut self,
        stream: &mut RowStream,
        ctx: &DecodeContext<'_>,
    ) -> Result<ScanOutcome, ScanError> {
        (**self).fill(stream, ctx)
    }
}

/// Allocated on first use; a call that takes no rows still leaves `Some`.
impl<T: Destination + Default> Destination for Option<T> {
    const INDIRECTION: usize = T::INDIRECTION + 1;

    fn capacity(&mut self) -> Limit {
        self.get_or_insert_with(T::default).capacity()
    }

    fn fill(
        &mut self,
        stream: &mut RowStream,
        ctx: &DecodeContext<'_>,
    ) -> Result<ScanOutcome, ScanError> {
        self.get_or_insert_with(T::default).fill(stream, ctx)
    }
}
