//! Batch Filler
//!
//! Tops a store up to a target record count.
//!
//! ## State Machine
//! ```text
//!   Idle ──► Counting ──► Filling ──► Done
//!               │            │
//!               └────────────┴──► Failed
//! ```
//!
//! The deficit is always computed against the live count, so running a fill
//! again (or after a restart) tops up instead of duplicating work.
//!
//! Batches are pipelined: up to `max_in_flight` are submitted before the
//! oldest is awaited. `Done` is reached only after every batch has been
//! acknowledged, so an insert failure can never surface after completion.
//!
//! Two fills racing on the same store may both see the same count and
//! over-fill past the target. Nothing here locks across count-then-fill.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::BatchPolicy;
use crate::config::Config;
use crate::error::{Result, StringDbError};
use crate::source::{EntropySource, OsEntropy, RandomStringSource};
use crate::store::{BatchTicket, RecordStore};

/// The store operations a fill needs
pub trait BatchStore {
    /// Current record count
    fn count(&self) -> Result<u64>;

    /// Submit one batch; the ticket resolves when it commits
    fn insert_batch(&self, values: Vec<String>) -> Result<BatchTicket>;
}

impl BatchStore for RecordStore {
    fn count(&self) -> Result<u64> {
        RecordStore::count(self)
    }

    fn insert_batch(&self, values: Vec<String>) -> Result<BatchTicket> {
        RecordStore::insert_batch(self, values)
    }
}

/// Lifecycle of a filler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillState {
    Idle,
    Counting,
    Filling,
    Done,
    Failed,
}

/// Emitted once per acknowledged batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FillProgress {
    pub target: u64,
    /// Records inserted by this fill so far
    pub inserted: u64,
    /// Records this fill set out to insert
    pub deficit: u64,
    pub batches_done: u64,
    pub batches_total: u64,
}

/// Summary of a finished fill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillReport {
    pub target: u64,
    pub initial_count: u64,
    pub inserted: u64,
    pub batches: u64,
    pub final_count: u64,
    pub elapsed: Duration,
}

/// Cooperative cancellation, checked between batch submissions
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the token can guard another fill
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Fill settings, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct FillOptions {
    pub string_length: usize,
    pub batch_policy: BatchPolicy,
    pub max_in_flight: usize,
    pub ack_timeout: Option<Duration>,
}

impl FillOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            string_length: config.string_length,
            batch_policy: config.batch_policy,
            max_in_flight: config.max_in_flight,
            ack_timeout: config.ack_timeout(),
        }
    }
}

impl Default for FillOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Drives a [`RandomStringSource`] and a [`BatchStore`] to reach a target
pub struct BatchFiller<E: EntropySource = OsEntropy> {
    source: RandomStringSource<E>,
    options: FillOptions,
    state: FillState,
    cancel: CancellationToken,
}

impl BatchFiller<OsEntropy> {
    /// Filler using operating system entropy
    pub fn os(options: FillOptions) -> Self {
        Self::new(RandomStringSource::os(), options)
    }
}

impl<E: EntropySource> BatchFiller<E> {
    pub fn new(source: RandomStringSource<E>, options: FillOptions) -> Self {
        Self {
            source,
            options,
            state: FillState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> FillState {
        self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fill without progress reporting
    pub fn fill<S: BatchStore + ?Sized>(&mut self, store: &S, target: u64) -> Result<FillReport> {
        self.start(store, target, |_| {})
    }

    /// Top `store` up to `target` records
    ///
    /// `on_progress` is called once per acknowledged batch.
    pub fn start<S, F>(&mut self, store: &S, target: u64, on_progress: F) -> Result<FillReport>
    where
        S: BatchStore + ?Sized,
        F: FnMut(&FillProgress),
    {
        let result = self.run(store, target, on_progress);
        self.state = match &result {
            Ok(_) => FillState::Done,
            Err(e) => {
                warn!(target, error = %e, "fill failed");
                FillState::Failed
            }
        };
        result
    }

    fn run<S, F>(&mut self, store: &S, target: u64, mut on_progress: F) -> Result<FillReport>
    where
        S: BatchStore + ?Sized,
        F: FnMut(&FillProgress),
    {
        let started = Instant::now();

        self.state = FillState::Counting;
        let initial_count = store.count()?;
        let deficit = target.saturating_sub(initial_count);

        if deficit == 0 {
            debug!(target, count = initial_count, "store already at target");
            return Ok(FillReport {
                target,
                initial_count,
                inserted: 0,
                batches: 0,
                final_count: initial_count,
                elapsed: started.elapsed(),
            });
        }

        self.state = FillState::Filling;
        let plan = self.options.batch_policy.partition(deficit);
        let mut progress = FillProgress {
            target,
            inserted: 0,
            deficit,
            batches_done: 0,
            batches_total: plan.batch_count(),
        };
        info!(
            target,
            count = initial_count,
            deficit,
            batches = progress.batches_total,
            "filling store"
        );

        let max_in_flight = self.options.max_in_flight.max(1);
        let timeout = self.options.ack_timeout;
        let mut pending: VecDeque<BatchTicket> = VecDeque::with_capacity(max_in_flight);
        let mut failure: Option<StringDbError> = None;

        'submit: for size in plan {
            if self.cancel.is_cancelled() {
                failure = Some(StringDbError::Cancelled);
                break;
            }

            let values = match self.source.generate_batch(size, self.options.string_length) {
                Ok(values) => values,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            match store.insert_batch(values) {
                Ok(ticket) => pending.push_back(ticket),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }

            while pending.len() >= max_in_flight {
                if let Some(ticket) = pending.pop_front() {
                    if let Err(e) = acknowledge(ticket, timeout, &mut progress, &mut on_progress) {
                        failure = Some(e);
                        break 'submit;
                    }
                }
            }
        }

        // Whatever was submitted still has to be accounted for
        for ticket in pending {
            if let Err(e) = acknowledge(ticket, timeout, &mut progress, &mut on_progress) {
                failure.get_or_insert(e);
            }
        }

        if let Some(e) = failure {
            info!(inserted = progress.inserted, "fill stopped early");
            return Err(e);
        }

        let final_count = store.count()?;
        let report = FillReport {
            target,
            initial_count,
            inserted: progress.inserted,
            batches: progress.batches_done,
            final_count,
            elapsed: started.elapsed(),
        };
        info!(
            inserted = report.inserted,
            count = report.final_count,
            elapsed = ?report.elapsed,
            "fill complete"
        );

        Ok(report)
    }
}

fn acknowledge<F: FnMut(&FillProgress)>(
    ticket: BatchTicket,
    timeout: Option<Duration>,
    progress: &mut FillProgress,
    on_progress: &mut F,
) -> Result<()> {
    let range = ticket.wait(timeout)?;
    progress.inserted += range.len;
    progress.batches_done += 1;
    on_progress(progress);
    Ok(())
}
