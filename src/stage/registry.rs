//! Stage registry keyed by stage number.

use super::find_peak::{FindPeakConfig, FindPeakStage};
use super::process_peak::{ProcessPeakConfig, ProcessPeakStage};
use super::traits::Stage;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of stage functions.
///
/// The function registered under stage number `n` moves a sample from stage
/// `n - 1` to `n`. An optional tail stage serves every number above the
/// highest explicit registration, which lets open-ended pipelines run until
/// the tail reports [`StageOutcome::Final`](super::StageOutcome::Final).
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<u32, Arc<dyn Stage>>,
    tail: Option<Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Peak-extraction pipeline: stage 1 finds peaks, every later stage
    /// fits and subtracts the highest remaining one.
    pub fn peak_pipeline(find: FindPeakConfig, process: ProcessPeakConfig) -> Self {
        let mut registry = Self::new();
        registry.register(1, FindPeakStage::new(find));
        registry.set_tail(ProcessPeakStage::new(process));
        registry
    }

    /// Register a stage under `stage_num`, replacing any previous one.
    pub fn register<S: Stage + 'static>(&mut self, stage_num: u32, stage: S) {
        self.stages.insert(stage_num, Arc::new(stage));
    }

    /// Register a stage from an Arc.
    pub fn register_arc(&mut self, stage_num: u32, stage: Arc<dyn Stage>) {
        self.stages.insert(stage_num, stage);
    }

    /// Set the stage used for every number above the last explicit one.
    pub fn set_tail<S: Stage + 'static>(&mut self, stage: S) {
        self.tail = Some(Arc::new(stage));
    }

    /// Get the stage that produces `stage_num`.
    pub fn get(&self, stage_num: u32) -> Option<Arc<dyn Stage>> {
        if let Some(stage) = self.stages.get(&stage_num) {
            return Some(stage.clone());
        }
        let last = self.stages.keys().next_back().copied().unwrap_or(0);
        if stage_num > last {
            self.tail.clone()
        } else {
            None
        }
    }

    /// Check if a stage is defined for `stage_num`.
    pub fn contains(&self, stage_num: u32) -> bool {
        self.get(stage_num).is_some()
    }

    /// Explicitly registered stage numbers, ascending.
    pub fn stage_numbers(&self) -> Vec<u32> {
        self.stages.keys().copied().collect()
    }

    pub fn has_tail(&self) -> bool {
        self.tail.is_some()
    }

    /// Remove a stage.
    pub fn remove(&mut self, stage_num: u32) -> Option<Arc<dyn Stage>> {
        self.stages.remove(&stage_num)
    }

    /// Clear all stages, including the tail.
    pub fn clear(&mut self) {
        self.stages.clear();
        self.tail = None;
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.tail.is_none()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field(
                "stages",
                &self
                    .stages
                    .iter()
                    .map(|(n, s)| (*n, s.name().to_string()))
                    .collect::<Vec<_>>(),
            )
            .field("tail", &self.tail.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Sample;
    use crate::stage::{StageError, StageOutcome};

    fn noop(_: &mut Sample) -> Result<StageOutcome, StageError> {
        Ok(StageOutcome::Continue)
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = StageRegistry::new();
        registry.register(1, noop);
        registry.register(3, noop);

        assert!(registry.contains(1));
        assert!(!registry.contains(2));
        assert!(registry.contains(3));
        assert!(!registry.contains(4));
        assert_eq!(registry.stage_numbers(), vec![1, 3]);
    }

    #[test]
    fn test_tail_serves_numbers_above_last() {
        let registry =
            StageRegistry::peak_pipeline(FindPeakConfig::default(), ProcessPeakConfig::default());

        assert_eq!(registry.get(1).unwrap().name(), "find_peak");
        assert_eq!(registry.get(2).unwrap().name(), "process_peak");
        assert_eq!(registry.get(50).unwrap().name(), "process_peak");
        assert!(registry.get(0).is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut registry = StageRegistry::new();
        assert!(registry.is_empty());

        registry.register(1, noop);
        registry.set_tail(noop);
        assert!(registry.remove(1).is_some());
        assert!(registry.has_tail());

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
