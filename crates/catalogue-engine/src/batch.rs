//! Incremental bulk insertion.
//!
//! Creating thousands of entities in one go would stall whoever is consuming
//! the store's notifications. Instead each request becomes a [`BatchInsertion`]:
//! a cursor over the new entities that appends one chunk per host tick. The
//! final order is exactly the order a single synchronous append would produce.
//!
//! # Scheduling Model
//!
//! - [`BatchInsertionScheduler::schedule`] commits the first chunk right away
//!   (the creating call counts as the first tick) and queues the rest.
//! - [`BatchInsertionScheduler::tick`] advances every queued insertion by one
//!   chunk. Hosts call it once per frame, or let [`BatchInsertionScheduler::drive`]
//!   do so from a [`Ticker`].
//! - Cancelling a [`BatchHandle`] stops at the next tick boundary; chunks
//!   already committed stay. [`BatchInsertionScheduler::cancel_all`] does the
//!   same for every insertion, including one that is mid-tick.
//! - If the target disappears (its folder was deleted) the remaining chunks
//!   are dropped, never redirected.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Identifies one scheduled insertion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

/// Where chunks are appended.
pub trait BatchTarget<T>: Send {
    /// Append `chunk` at the end of the target, in order.
    ///
    /// Returns `false` if the target no longer exists; the chunk is discarded.
    fn append_chunk(&mut self, chunk: Vec<T>) -> bool;
}

/// A shared vector is a target that never goes away.
impl<T: Send> BatchTarget<T> for Arc<Mutex<Vec<T>>> {
    fn append_chunk(&mut self, chunk: Vec<T>) -> bool {
        self.lock().extend(chunk);
        true
    }
}

/// Result of advancing an insertion by one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStep {
    /// A chunk was appended; more may remain.
    Committed { committed: usize, total: usize },
    /// Everything has been appended.
    Finished,
    /// The handle was cancelled before this chunk.
    Cancelled,
    /// The target vanished; remaining entities were discarded.
    TargetGone,
}

/// Lifecycle of a scheduled insertion, as seen through its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Running,
    Finished,
    Cancelled,
    /// Target disappeared mid-way.
    Dropped,
}

#[derive(Debug)]
struct BatchStatus {
    committed: usize,
    total: usize,
    state: BatchState,
}

/// Caller-facing view of a scheduled insertion.
#[derive(Clone, Debug)]
pub struct BatchHandle {
    id: BatchId,
    token: CancellationToken,
    status: Arc<Mutex<BatchStatus>>,
}

impl BatchHandle {
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Stop before the next chunk. Already appended entities remain.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Entities appended so far.
    pub fn committed(&self) -> usize {
        self.status.lock().committed
    }

    pub fn total(&self) -> usize {
        self.status.lock().total
    }

    pub fn state(&self) -> BatchState {
        self.status.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() == BatchState::Finished
    }
}

/// Resumable chunk cursor over a sequence of new entities.
pub struct BatchInsertion<T, G> {
    id: BatchId,
    pending: std::vec::IntoIter<T>,
    chunk_size: NonZeroUsize,
    target: G,
    token: CancellationToken,
    status: Arc<Mutex<BatchStatus>>,
}

impl<T, G: BatchTarget<T>> BatchInsertion<T, G> {
    pub fn new(id: BatchId, entities: Vec<T>, target: G, chunk_size: NonZeroUsize) -> Self {
        let total = entities.len();
        Self {
            id,
            pending: entities.into_iter(),
            chunk_size,
            target,
            token: CancellationToken::new(),
            status: Arc::new(Mutex::new(BatchStatus {
                committed: 0,
                total,
                state: BatchState::Running,
            })),
        }
    }

    pub fn handle(&self) -> BatchHandle {
        BatchHandle {
            id: self.id,
            token: self.token.clone(),
            status: self.status.clone(),
        }
    }

    /// Entities not yet appended.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Append the next chunk.
    pub fn step(&mut self) -> BatchStep {
        if self.status.lock().state != BatchState::Running {
            return self.settled_step();
        }
        if self.token.is_cancelled() {
            self.settle(BatchState::Cancelled);
            return BatchStep::Cancelled;
        }

        let chunk: Vec<T> = self.pending.by_ref().take(self.chunk_size.get()).collect();
        if chunk.is_empty() {
            self.settle(BatchState::Finished);
            return BatchStep::Finished;
        }

        let count = chunk.len();
        if !self.target.append_chunk(chunk) {
            self.pending = Vec::new().into_iter();
            self.settle(BatchState::Dropped);
            return BatchStep::TargetGone;
        }

        let mut status = self.status.lock();
        status.committed += count;
        if self.pending.len() == 0 {
            status.state = BatchState::Finished;
        }
        tracing::trace!(batch = %self.id, committed = status.committed, total = status.total, "chunk committed");
        BatchStep::Committed {
            committed: status.committed,
            total: status.total,
        }
    }

    fn settle(&self, state: BatchState) {
        self.status.lock().state = state;
    }

    fn settled_step(&self) -> BatchStep {
        match self.status.lock().state {
            BatchState::Cancelled => BatchStep::Cancelled,
            BatchState::Dropped => BatchStep::TargetGone,
            BatchState::Running | BatchState::Finished => BatchStep::Finished,
        }
    }
}

/// Type-erased insertion, so folders and items share one queue.
trait PendingBatch: Send {
    fn id(&self) -> BatchId;
    fn advance(&mut self) -> BatchStep;
    fn is_settled(&self) -> bool;
}

impl<T: Send, G: BatchTarget<T>> PendingBatch for BatchInsertion<T, G> {
    fn id(&self) -> BatchId {
        self.id
    }

    fn advance(&mut self) -> BatchStep {
        self.step()
    }

    fn is_settled(&self) -> bool {
        self.status.lock().state != BatchState::Running
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Queue of in-flight insertions, advanced one chunk per tick.
///
/// Cheap to clone; clones share the queue.
///
/// Every insertion's token is a child of the scheduler's current root token,
/// so [`cancel_all`](Self::cancel_all) reaches insertions that a running
/// [`tick`](Self::tick) has taken off the queue.
#[derive(Clone, Default)]
pub struct BatchInsertionScheduler {
    queue: Arc<Mutex<VecDeque<Box<dyn PendingBatch>>>>,
    /// Insertions taken off the queue by the running tick and not yet settled.
    in_tick: Arc<AtomicUsize>,
    cancel_root: Arc<Mutex<CancellationToken>>,
    next_id: Arc<AtomicU64>,
}

impl BatchInsertionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start inserting `entities` into `target`, `chunk_size` at a time.
    ///
    /// The first chunk is appended before this returns.
    pub fn schedule<T, G>(&self, entities: Vec<T>, target: G, chunk_size: NonZeroUsize) -> BatchHandle
    where
        T: Send + 'static,
        G: BatchTarget<T> + 'static,
    {
        let id = BatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut insertion = BatchInsertion::new(id, entities, target, chunk_size);
        insertion.token = self.cancel_root.lock().child_token();
        let handle = insertion.handle();

        tracing::debug!(batch = %id, total = handle.total(), chunk = chunk_size.get(), "batch scheduled");
        let step = insertion.step();
        log_settled(id, step, &handle);
        if !insertion.is_settled() {
            self.queue.lock().push_back(Box::new(insertion));
        }
        handle
    }

    /// Advance every queued insertion by one chunk.
    ///
    /// Returns how many insertions are still pending afterwards. Insertions
    /// scheduled from inside a tick (e.g. by a subscriber) start on the next one.
    pub fn tick(&self) -> usize {
        let mut running = {
            let mut queue = self.queue.lock();
            self.in_tick.store(queue.len(), Ordering::SeqCst);
            std::mem::take(&mut *queue)
        };

        running.retain_mut(|batch| {
            let step = batch.advance();
            if batch.is_settled() {
                self.in_tick.fetch_sub(1, Ordering::SeqCst);
                log_step(batch.id(), step);
                false
            } else {
                true
            }
        });

        let mut queue = self.queue.lock();
        self.in_tick.store(0, Ordering::SeqCst);
        let scheduled_meanwhile = std::mem::replace(&mut *queue, running);
        queue.extend(scheduled_meanwhile);
        queue.len()
    }

    /// Number of insertions still waiting for ticks, counting those the
    /// running tick is advancing.
    pub fn pending(&self) -> usize {
        let queue = self.queue.lock();
        queue.len() + self.in_tick.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Cancel every insertion scheduled so far. They settle on the next tick.
    ///
    /// Safe to call from a subscriber reacting to a chunk; insertions
    /// scheduled afterwards are unaffected.
    pub fn cancel_all(&self) {
        let mut root = self.cancel_root.lock();
        root.cancel();
        *root = CancellationToken::new();
    }

    /// Host loop: wait for the ticker, tick, repeat until nothing is pending.
    pub async fn drive<K: Ticker + ?Sized>(&self, ticker: &mut K) {
        while !self.is_idle() {
            ticker.tick().await;
            self.tick();
        }
    }
}

impl std::fmt::Debug for BatchInsertionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchInsertionScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

fn log_settled(id: BatchId, step: BatchStep, handle: &BatchHandle) {
    if handle.state() != BatchState::Running {
        log_step(id, step);
    }
}

fn log_step(id: BatchId, step: BatchStep) {
    match step {
        BatchStep::Committed { committed, total } => {
            tracing::info!(batch = %id, committed, total, "batch finished");
        }
        BatchStep::Finished => tracing::info!(batch = %id, "batch finished"),
        BatchStep::Cancelled => tracing::info!(batch = %id, "batch cancelled"),
        BatchStep::TargetGone => tracing::info!(batch = %id, "batch target gone, dropping remaining chunks"),
    }
}

// ============================================================================
// Tick primitives
// ============================================================================

/// The host's "next point to yield control" primitive.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self);
}

/// Yields to the tokio scheduler between chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldTicker;

#[async_trait]
impl Ticker for YieldTicker {
    async fn tick(&mut self) {
        tokio::task::yield_now().await;
    }
}

/// Fires at a fixed frame interval.
pub struct FrameTicker {
    interval: tokio::time::Interval,
}

impl FrameTicker {
    /// Default frame period (~60 Hz).
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(16);

    /// Must be called from inside a tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Default for FrameTicker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERIOD)
    }
}

#[async_trait]
impl Ticker for FrameTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
