//! Worker pool and pipeline driver.
//!
//! Each run spawns `worker_count` tasks onto a dedicated multi-thread tokio
//! runtime. A worker claims one sample from the [`SampleStore`], drives it
//! stage by stage and releases it. Claims and releases happen under the store
//! mutex, so a sample is never visible to two workers at once.

use super::dispatch::{Completion, Dispatcher, Notifier, Progress, RunSummary};
use super::store::{Claim, Disposition, SampleStore};
use super::RunState;
use crate::data::Sample;
use crate::error::Status;
use crate::stage::{StageError, StageOutcome, StageRegistry};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::JoinSet;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between the runtime facade and its workers.
pub(crate) struct Shared {
    pub(crate) store: Mutex<SampleStore>,
    pub(crate) state: Mutex<RunState>,
    pub(crate) cancelled: AtomicBool,
    /// Samples completed since the last reset; never decremented by regrouping.
    pub(crate) completed: AtomicUsize,
    pub(crate) failed: AtomicUsize,
    tally: Mutex<CheckpointTally>,
    wakeup: Notify,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            store: Mutex::new(SampleStore::new()),
            state: Mutex::new(RunState::Idle),
            cancelled: AtomicBool::new(false),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            tally: Mutex::new(CheckpointTally::default()),
            wakeup: Notify::new(),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Raise the cancellation flag and wake idle workers.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wakeup.notify_waiters();
    }

    /// Clear counters and flags for a fresh batch.
    pub(crate) fn reset_counters(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        *lock(&self.tally) = CheckpointTally::default();
    }
}

/// At-or-above counts per declared checkpoint for the current run.
#[derive(Debug, Default)]
struct CheckpointTally {
    counts: BTreeMap<u32, usize>,
    total: usize,
}

/// Immutable inputs of one run.
pub(crate) struct RunPlan {
    pub(crate) registry: Arc<StageRegistry>,
    pub(crate) checkpoints: BTreeSet<u32>,
    pub(crate) max_stages: Option<u32>,
    pub(crate) workers: usize,
    pub(crate) total: usize,
}

impl RunPlan {
    /// Seed the checkpoint tally with samples already past each checkpoint.
    pub(crate) fn prime(&self, shared: &Shared, store: &SampleStore) {
        let mut tally = lock(&shared.tally);
        tally.total = self.total;
        tally.counts = self
            .checkpoints
            .iter()
            .map(|&stage| (stage, store.count_at_or_above(stage)))
            .collect();
    }
}

/// Where driving a sample stopped.
#[derive(Clone, Copy)]
enum Stop {
    /// More stages remain (checkpoint reached or cancellation observed).
    Paused,
    Completed,
    Failed,
}

/// Run every worker to exhaustion and emit the completion event.
///
/// Returns the completion together with the dispatch thread handle so that
/// synchronous callers can wait for delivery.
pub(crate) async fn supervise(
    shared: Arc<Shared>,
    plan: Arc<RunPlan>,
    dispatcher: Dispatcher,
) -> (Completion, std::thread::JoinHandle<()>) {
    info!(
        "Starting run: {} samples, {} workers, stage limit {:?}",
        plan.total, plan.workers, plan.max_stages
    );

    let mut workers = JoinSet::new();
    for worker_id in 0..plan.workers {
        workers.spawn(worker_loop(
            worker_id,
            shared.clone(),
            plan.clone(),
            dispatcher.notifier(),
        ));
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!("Worker task ended abnormally: {}", e);
        }
    }

    let cancelled = shared.is_cancelled();
    let summary = {
        let store = lock(&shared.store);
        RunSummary {
            total: plan.total,
            completed: shared.completed.load(Ordering::SeqCst),
            failed: shared.failed.load(Ordering::SeqCst),
            pending: store.pending_count(),
        }
    };
    let (status, terminal) = if cancelled {
        (Status::Cancelled, RunState::Cancelled)
    } else {
        (Status::Ok, RunState::Completed)
    };
    *lock(&shared.state) = terminal;

    info!(
        "Run finished ({:?}): {} completed, {} failed, {} pending of {}",
        status, summary.completed, summary.failed, summary.pending, summary.total
    );

    let completion = Completion { status, summary };
    let handle = dispatcher.complete(completion);
    (completion, handle)
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>, plan: Arc<RunPlan>, notifier: Notifier) {
    loop {
        let notified = shared.wakeup.notified();
        tokio::pin!(notified);
        // Register interest before inspecting the store so a release between
        // the check and the await is not missed.
        notified.as_mut().enable();

        if shared.is_cancelled() {
            debug!("Worker {} observed cancellation", worker_id);
            break;
        }

        let claim = lock(&shared.store).claim();
        match claim {
            Claim::Ready(sample) => {
                debug!(
                    "Worker {} claimed {} at stage {}",
                    worker_id,
                    sample.id(),
                    sample.stage()
                );
                drive(&shared, &plan, &notifier, sample).await;
            }
            Claim::Wait => notified.await,
            Claim::Drained => break,
        }
    }

    // Let idle peers re-check for drain.
    shared.wakeup.notify_waiters();
}

/// A claimed sample, handed back to the store when dropped.
///
/// Dropping without a recorded stop means the driving future was torn down
/// early: on unwind the sample is released as failed, otherwise as pending.
/// Either way `in_flight` drops and idle workers are woken.
struct Held<'a> {
    shared: &'a Shared,
    sample: Option<Sample>,
    stop: Option<Stop>,
}

impl<'a> Held<'a> {
    fn new(shared: &'a Shared, sample: Sample) -> Self {
        Self {
            shared,
            sample: Some(sample),
            stop: None,
        }
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        let Some(mut sample) = self.sample.take() else {
            return;
        };
        let stop = match self.stop.take() {
            Some(stop) => stop,
            None if std::thread::panicking() => {
                let stage = sample.stage().saturating_add(1);
                warn!("Worker panicked while driving {} towards stage {}", sample.id(), stage);
                sample.record_failure(stage, StageError::new("worker panicked"));
                Stop::Failed
            }
            None => Stop::Paused,
        };
        release(self.shared, sample, stop);
    }
}

/// Advance one sample until it completes, fails, reaches a checkpoint, or
/// cancellation is observed; then hand it back to the store.
async fn drive(shared: &Shared, plan: &RunPlan, notifier: &Notifier, sample: Sample) {
    let mut held = Held::new(shared, sample);
    let Some(sample) = held.sample.as_mut() else {
        return;
    };
    let stop = drive_stages(shared, plan, notifier, sample).await;
    held.stop = Some(stop);
}

async fn drive_stages(
    shared: &Shared,
    plan: &RunPlan,
    notifier: &Notifier,
    sample: &mut Sample,
) -> Stop {
    loop {
        let current = sample.stage();
        if plan.max_stages.is_some_and(|max| current >= max) {
            return Stop::Completed;
        }

        // No stage number exists past u32::MAX.
        let Some(next) = current.checked_add(1) else {
            return Stop::Completed;
        };
        let Some(stage) = plan.registry.get(next) else {
            return Stop::Completed;
        };

        if shared.is_cancelled() {
            return Stop::Paused;
        }

        let result = catch_unwind(AssertUnwindSafe(|| stage.process(sample)))
            .unwrap_or_else(|_| Err(StageError::new(format!("stage {} panicked", stage.name()))));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Stage {} ({}) failed for {}: {}", next, stage.name(), sample.id(), e);
                sample.record_failure(next, e);
                return Stop::Failed;
            }
        };

        sample.advance_stage();

        let at_checkpoint = plan.checkpoints.contains(&next);
        if at_checkpoint {
            report_crossing(shared, notifier, sample, next);
        }

        if outcome == StageOutcome::Final || plan.max_stages.is_some_and(|max| next >= max) {
            return Stop::Completed;
        }
        if at_checkpoint {
            return Stop::Paused;
        }

        tokio::task::yield_now().await;
    }
}

fn report_crossing(shared: &Shared, notifier: &Notifier, sample: &Sample, stage: u32) {
    let mut tally = lock(&shared.tally);
    let total = tally.total;
    let count = tally.counts.entry(stage).or_insert(0);
    *count += 1;

    debug!(
        "Sample {} reached checkpoint {} ({}/{})",
        sample.id(),
        stage,
        *count,
        total
    );

    // Queued under the tally lock so counts arrive in non-decreasing order.
    notifier.progress(Progress {
        stage,
        completed: *count,
        total,
    });
    notifier.sample(sample.clone());
}

fn release(shared: &Shared, sample: Sample, stop: Stop) {
    let disposition = match stop {
        Stop::Paused => Disposition::Pending,
        Stop::Completed => Disposition::Completed,
        Stop::Failed => Disposition::Failed,
    };

    {
        let mut store = lock(&shared.store);
        let id = sample.id().to_string();
        match store.release(sample, disposition) {
            Ok(()) => match disposition {
                Disposition::Completed => {
                    shared.completed.fetch_add(1, Ordering::SeqCst);
                }
                Disposition::Failed => {
                    shared.failed.fetch_add(1, Ordering::SeqCst);
                }
                Disposition::Pending => {}
            },
            Err(e) => warn!("Could not return sample {} to the store: {}", id, e),
        }
    }

    shared.wakeup.notify_waiters();
}
