//! Runtime facade for SAXS batch processing.

use super::config::RuntimeConfig;
use super::dispatch::{Completion, Dispatcher, Observer};
use super::scheduler::{lock, supervise, RunPlan, Shared};
use super::store::SampleInfo;
use super::RunState;
use crate::data::Sample;
use crate::error::{Error, Result};
use crate::stage::{Stage, StageRegistry};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Runtime as TokioRuntime;

/// Main runtime for SAXS batch processing.
///
/// All methods take `&self`, so a runtime can be shared behind an `Arc` and
/// cancelled or regrouped from another thread while a run is in progress.
pub struct Runtime {
    config: RuntimeConfig,
    registry: Mutex<Arc<StageRegistry>>,
    checkpoints: Mutex<BTreeSet<u32>>,
    shared: Arc<Shared>,
    /// Worker pool of the current asynchronous run.
    pool: Mutex<Option<TokioRuntime>>,
}

impl Runtime {
    /// Create a runtime with an empty stage registry.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_registry(config, StageRegistry::new())
    }

    /// Create a runtime with a prepared stage registry.
    pub fn with_registry(config: RuntimeConfig, registry: StageRegistry) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            registry: Mutex::new(Arc::new(registry)),
            checkpoints: Mutex::new(BTreeSet::new()),
            shared: Arc::new(Shared::new()),
            pool: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        *lock(&self.shared.state)
    }

    /// Fail with `InvalidState` while a run is in progress.
    fn ensure_not_running(&self, operation: &'static str) -> Result<MutexGuard<'_, RunState>> {
        let state = lock(&self.shared.state);
        if *state == RunState::Running {
            return Err(Error::InvalidState {
                operation,
                state: *state,
            });
        }
        Ok(state)
    }

    /// Register the function that moves samples from stage `stage_num - 1`
    /// to `stage_num`.
    pub fn register_stage<S: Stage + 'static>(&self, stage_num: u32, stage: S) -> Result<()> {
        if stage_num == 0 {
            return Err(Error::InvalidArgument(
                "stage numbers start at 1".to_string(),
            ));
        }
        let _state = self.ensure_not_running("register_stage")?;
        Arc::make_mut(&mut lock(&self.registry)).register(stage_num, stage);
        Ok(())
    }

    /// Snapshot of the current stage registry.
    pub fn registry(&self) -> Arc<StageRegistry> {
        lock(&self.registry).clone()
    }

    /// Add a sample to the store.
    ///
    /// # Errors
    /// `DuplicateSample` if the identifier is taken, `InvalidState` while
    /// running.
    pub fn add_sample(&self, sample: Sample) -> Result<()> {
        let _state = self.ensure_not_running("add_sample")?;
        lock(&self.shared.store).insert(sample)
    }

    /// Add several samples, stopping at the first rejected one.
    pub fn add_samples(&self, samples: impl IntoIterator<Item = Sample>) -> Result<()> {
        let _state = self.ensure_not_running("add_samples")?;
        let mut store = lock(&self.shared.store);
        for sample in samples {
            store.insert(sample)?;
        }
        Ok(())
    }

    /// Replace the checkpoint set.
    pub fn set_checkpoints(&self, stages: &[u32]) -> Result<()> {
        if stages.contains(&0) {
            return Err(Error::InvalidArgument(
                "checkpoint stages start at 1".to_string(),
            ));
        }
        let _state = self.ensure_not_running("set_checkpoints")?;
        *lock(&self.checkpoints) = stages.iter().copied().collect();
        Ok(())
    }

    pub fn add_checkpoint(&self, stage: u32) -> Result<()> {
        if stage == 0 {
            return Err(Error::InvalidArgument(
                "checkpoint stages start at 1".to_string(),
            ));
        }
        let _state = self.ensure_not_running("add_checkpoint")?;
        lock(&self.checkpoints).insert(stage);
        Ok(())
    }

    pub fn clear_checkpoints(&self) -> Result<()> {
        let _state = self.ensure_not_running("clear_checkpoints")?;
        lock(&self.checkpoints).clear();
        Ok(())
    }

    /// Declared checkpoints in ascending order.
    pub fn checkpoints(&self) -> Vec<u32> {
        lock(&self.checkpoints).iter().copied().collect()
    }

    /// Samples not yet completed or failed, including those held by workers.
    pub fn pending_count(&self) -> usize {
        lock(&self.shared.store).pending_count()
    }

    /// Samples completed since the last reset. Regrouping does not lower it.
    pub fn completed_count(&self) -> usize {
        self.shared.completed.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> usize {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Samples currently in the store.
    pub fn total_count(&self) -> usize {
        lock(&self.shared.store).len()
    }

    /// Clone of a stored sample.
    ///
    /// # Errors
    /// `NotFound`, or `SampleBusy` while a worker holds it.
    pub fn sample(&self, id: &str) -> Result<Sample> {
        lock(&self.shared.store).get(id).cloned()
    }

    pub fn sample_info(&self, id: &str) -> Result<SampleInfo> {
        lock(&self.shared.store).info(id)
    }

    /// Move to `Running` and capture the inputs of the run.
    fn begin(&self) -> Result<Arc<RunPlan>> {
        let mut state = lock(&self.shared.state);
        if *state != RunState::Idle {
            return Err(Error::InvalidState {
                operation: "run",
                state: *state,
            });
        }

        let store = lock(&self.shared.store);
        let plan = Arc::new(RunPlan {
            registry: lock(&self.registry).clone(),
            checkpoints: lock(&self.checkpoints).clone(),
            max_stages: self.config.stage_limit(),
            workers: self.config.resolved_worker_count(),
            total: store.len(),
        });
        plan.prime(&self.shared, &store);
        drop(store);

        self.shared.cancelled.store(false, Ordering::SeqCst);
        *state = RunState::Running;
        Ok(plan)
    }

    /// Return to `Idle` after the pool failed to start.
    fn abort_start(&self, err: Error) -> Error {
        warn!("Run could not start: {}", err);
        *lock(&self.shared.state) = RunState::Idle;
        err
    }

    fn build_pool(workers: usize) -> Result<TokioRuntime> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("saxs-worker")
            .build()
            .map_err(Error::WorkerPool)
    }

    /// Process every stored sample and block until the run ends.
    ///
    /// Returns after `observer` has received every notification, including
    /// [`Observer::on_complete`]. A cancelled run still returns `Ok`; inspect
    /// [`Completion::status`].
    pub fn run_sync<O: Observer>(&self, observer: O) -> Result<Completion> {
        let plan = self.begin()?;

        let pool = Self::build_pool(plan.workers).map_err(|e| self.abort_start(e))?;
        let dispatcher = Dispatcher::spawn(observer).map_err(|e| self.abort_start(e))?;

        let (completion, dispatch) = pool.block_on(supervise(self.shared.clone(), plan, dispatcher));
        drop(pool);

        if dispatch.join().is_err() {
            warn!("Observer panicked while handling notifications");
        }
        Ok(completion)
    }

    /// Start processing in the background and return immediately.
    ///
    /// The outcome is reported only through [`Observer::on_complete`].
    pub fn run_async<O: Observer>(&self, observer: O) -> Result<()> {
        let plan = self.begin()?;

        let pool = Self::build_pool(plan.workers).map_err(|e| self.abort_start(e))?;
        let dispatcher = Dispatcher::spawn(observer).map_err(|e| self.abort_start(e))?;

        let shared = self.shared.clone();
        pool.spawn(async move {
            // The dispatch thread finishes on its own after the completion event.
            let _ = supervise(shared, plan, dispatcher).await;
        });

        if let Some(previous) = lock(&self.pool).replace(pool) {
            previous.shutdown_background();
        }
        Ok(())
    }

    /// Request cancellation of the current run. No-op unless running.
    ///
    /// Stages already started finish; unfinished samples stay pending at
    /// their last completed stage.
    pub fn cancel(&self) {
        let state = lock(&self.shared.state);
        if *state == RunState::Running {
            debug!("Cancellation requested");
            self.shared.cancel();
        }
    }

    /// Remove up to `max_count` samples whose stage is at least `min_stage`.
    ///
    /// Only samples resting in the store are eligible; samples held by a
    /// worker are skipped. Oldest samples are returned first.
    pub fn regroup(&self, min_stage: u32, max_count: usize) -> Vec<Sample> {
        let regrouped =
            lock(&self.shared.store).remove_where(max_count, |info| info.stage >= min_stage);
        debug!(
            "Regrouped {} samples at or above stage {}",
            regrouped.len(),
            min_stage
        );
        regrouped
    }

    /// Clear samples and counters so the runtime can run again.
    ///
    /// Configuration, stages and checkpoints are kept.
    ///
    /// # Errors
    /// `InvalidState` unless the last run completed or was cancelled.
    pub fn reset(&self) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if !matches!(*state, RunState::Completed | RunState::Cancelled) {
            return Err(Error::InvalidState {
                operation: "reset",
                state: *state,
            });
        }

        if let Some(pool) = lock(&self.pool).take() {
            pool.shutdown_background();
        }
        lock(&self.shared.store).clear();
        self.shared.reset_counters();
        *state = RunState::Idle;
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shared.cancel();
        if let Some(pool) = lock(&self.pool).take() {
            pool.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("checkpoints", &self.checkpoints())
            .finish_non_exhaustive()
    }
}
