use std::thread;

use crate::config::ScanConfig;
use crate::cursor::{self, Cursor, RowStream};
use crate::dispatch::{check_indirection, DecodeContext, Destination, ScanOutcome};
use crate::error::ScanError;
use crate::naming::Naming;
use crate::row::Limit;

/// How a destination is handed to [`Scanner::scan_into`].
///
/// Only a mutable reference can be written to. Passing a value is accepted
/// by the type system and rejected at run time, before the cursor is touched.
#[derive(Debug)]
pub enum Target<'a, D> {
    Ref(&'a mut D),
    Value(D),
}

impl<'a, D> From<&'a mut D> for Target<'a, D> {
    fn from(dest: &'a mut D) -> Self {
        Target::Ref(dest)
    }
}

/// Decodes cursor rows into destinations.
///
/// Holds only settings; every call resolves columns afresh, so one scanner
/// serves any number of cursors and threads.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScanConfig,
    naming: Naming,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self { config, naming: Naming::default() })
    }

    pub fn with_naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Decode rows of `cursor` into `dest` under the configured limit.
    pub fn scan<C, D>(&self, cursor: &mut C, dest: &mut D) -> Result<ScanOutcome, ScanError>
    where
        C: Cursor + ?Sized,
        D: Destination,
    {
        self.scan_limited(cursor, dest, self.config.limit)
    }

    /// [`Scanner::scan`] for a destination that may have been passed by value.
    pub fn scan_into<C, D>(&self, cursor: &mut C, target: Target<'_, D>) -> Result<ScanOutcome, ScanError>
    where
        C: Cursor + ?Sized,
        D: Destination,
    {
        match target {
            Target::Ref(dest) => self.scan(cursor, dest),
            Target::Value(_) => Err(ScanError::NotAPointer),
        }
    }

    /// Decode at most `limit` rows of `cursor` into `dest`.
    ///
    /// The destination's own capacity tightens the limit, so a single struct
    /// never pulls more than one row off the cursor. Single-row calls run
    /// inline; others stream the cursor from a scoped producer thread that is
    /// joined before returning.
    pub fn scan_limited<C, D>(
        &self,
        cursor: &mut C,
        dest: &mut D,
        limit: Limit,
    ) -> Result<ScanOutcome, ScanError>
    where
        C: Cursor + ?Sized,
        D: Destination,
    {
        check_indirection::<D>()?;
        let limit = dest.capacity().min(limit);
        let ctx = DecodeContext::new(&self.config, &self.naming, limit);

        if limit.rows().is_some_and(|rows| rows <= 1) {
            let mut stream = cursor::begin_inline(cursor, limit)?;
            return dest.fill(&mut stream, &ctx);
        }

        thread::scope(|scope| {
            let mut stream = cursor::begin(scope, cursor, limit, self.config.row_buffer)?;
            let outcome = dest.fill(&mut stream, &ctx);
            // Unblocks the producer if the destination stopped early.
            drop(stream);
            outcome
        })
    }

    /// Decode from a stream the caller owns.
    ///
    /// Takes as many rows as `dest` holds and leaves the rest in the stream
    /// for the next call.
    pub fn decode<D: Destination>(
        &self,
        stream: &mut RowStream,
        dest: &mut D,
    ) -> Result<ScanOutcome, ScanError> {
        check_indirection::<D>()?;
        let limit = dest.capacity().min(self.config.limit);
        dest.fill(stream, &DecodeContext::new(&self.config, &self.naming, limit))
    }
}

/// Run [`Scanner::scan`] on tokio's blocking pool.
///
/// Cursor and destination move into the task and come back with the outcome.
/// Needs a tokio runtime.
pub async fn scan_blocking<C, D>(
    scanner: Scanner,
    mut cursor: C,
    mut dest: D,
) -> Result<(C, D, ScanOutcome), ScanError>
where
    C: Cursor + 'static,
    D: Destination + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let outcome = scanner.scan(&mut cursor, &mut dest)?;
        Ok::<_, ScanError>((cursor, dest, outcome))
    })
    .await?
}
