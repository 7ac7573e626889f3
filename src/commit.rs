// 📦 Batch Committer - Chunked, paced, retried upserts
//
//   rows ─┬─ chunk 1 ─ upsert ─ pause ─ chunk 2 ─ upsert ─ pause ─ chunk 3 ─ upsert
//         │                      ▲
//         └─ throttled? pause and resend the same payload (up to max_retries)
//
// A chunk that is rejected (or stays throttled) becomes a failed row range;
// the next chunk is still processed.

use crate::db::{Destination, DestinationError, Row, Table};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 400;
pub const DEFAULT_PACING_MS: u64 = 1000;
pub const DEFAULT_PACING: Duration = Duration::from_millis(DEFAULT_PACING_MS);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSettings {
    /// Maximum rows per upsert call
    pub chunk_size: usize,

    /// Pause between chunks and before each retry
    pub pacing: Duration,

    /// Extra attempts for a throttled chunk
    pub max_retries: u32,
}

impl Default for CommitSettings {
    fn default() -> Self {
        CommitSettings {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing: DEFAULT_PACING,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

// ============================================================================
// CANCELLATION & PACING
// ============================================================================

/// Shared stop request, checked before every chunk
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Blocks the current thread
pub struct ThreadSleep;

impl Pacer for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFailure {
    /// Row indices of the failed chunk
    pub range: Range<usize>,
    pub error: DestinationError,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub table: Table,
    pub total_rows: usize,
    pub succeeded: Vec<Range<usize>>,
    pub failed: Vec<ChunkFailure>,

    /// Rows never sent because the run was cancelled
    pub not_attempted: Option<Range<usize>>,

    pub cancelled: bool,

    /// Sizes of the chunks that were sent, in order
    pub chunk_sizes: Vec<usize>,
}

impl CommitOutcome {
    fn new(table: Table, total_rows: usize) -> Self {
        CommitOutcome {
            table,
            total_rows,
            succeeded: Vec::new(),
            failed: Vec::new(),
            not_attempted: None,
            cancelled: false,
            chunk_sizes: Vec::new(),
        }
    }

    pub fn rows_committed(&self) -> usize {
        self.succeeded.iter().map(|range| range.len()).sum()
    }

    pub fn rows_failed(&self) -> usize {
        self.failed.iter().map(|failure| failure.range.len()).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Indices of rows that were committed
    pub fn committed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.succeeded.iter().flat_map(|range| range.clone())
    }
}

// ============================================================================
// COMMITTER
// ============================================================================

pub struct BatchCommitter<'d, D: Destination + ?Sized, P: Pacer = ThreadSleep> {
    destination: &'d mut D,
    settings: CommitSettings,
    pacer: P,
    cancel: CancelFlag,
}

impl<'d, D: Destination + ?Sized> BatchCommitter<'d, D, ThreadSleep> {
    pub fn new(destination: &'d mut D, settings: CommitSettings) -> Self {
        Self::with_pacer(destination, settings, ThreadSleep)
    }
}

impl<'d, D: Destination + ?Sized, P: Pacer> BatchCommitter<'d, D, P> {
    pub fn with_pacer(destination: &'d mut D, settings: CommitSettings, pacer: P) -> Self {
        BatchCommitter {
            destination,
            settings,
            pacer,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn commit(&mut self, table: Table, rows: &[Row], key_fields: &[&str]) -> CommitOutcome {
        let mut outcome = CommitOutcome::new(table, rows.len());
        let chunk_size = self.settings.chunk_size.max(1);

        let mut start = 0;
        while start < rows.len() {
            if self.cancel.is_cancelled() {
                log::warn!("{}: cancelled with rows {}..{} not attempted", table, start, rows.len());
                outcome.cancelled = true;
                outcome.not_attempted = Some(start..rows.len());
                break;
            }
            if start > 0 {
                self.pacer.pause(self.settings.pacing);
            }

            let end = (start + chunk_size).min(rows.len());
            outcome.chunk_sizes.push(end - start);
            self.commit_chunk(table, &rows[start..end], key_fields, start..end, &mut outcome);
            start = end;
        }

        outcome
    }

    fn commit_chunk(
        &mut self,
        table: Table,
        chunk: &[Row],
        key_fields: &[&str],
        range: Range<usize>,
        outcome: &mut CommitOutcome,
    ) {
        let mut attempts = 1;
        loop {
            match self.destination.upsert(table, key_fields, chunk) {
                Ok(()) => {
                    log::debug!("{}: committed rows {}..{}", table, range.start, range.end);
                    outcome.succeeded.push(range);
                    return;
                }
                Err(error) if error.is_throttled() && attempts <= self.settings.max_retries => {
                    log::warn!(
                        "{}: rows {}..{} throttled (attempt {}), retrying",
                        table,
                        range.start,
                        range.end,
                        attempts
                    );
                    self.pacer.pause(self.settings.pacing);
                    attempts += 1;
                }
                Err(error) => {
                    log::error!(
                        "{}: rows {}..{} failed after {} attempt(s): {}",
                        table,
                        range.start,
                        range.end,
                        attempts,
                        error
                    );
                    outcome.failed.push(ChunkFailure {
                        range,
                        error,
                        attempts,
                    });
                    return;
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
