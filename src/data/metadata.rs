//! Peak bookkeeping carried by each sample between stages.

use std::collections::HashMap;

/// Peak state of one sample.
///
/// Maps are keyed by index into the sample's intensity array. A peak moves
/// from `unprocessed_peaks` (value: detected intensity) through
/// `current_peak` into `processed_peaks` (value: fitted amplitude).
#[derive(Clone, Debug, Default)]
pub struct SampleMetadata {
    pub unprocessed_peaks: HashMap<usize, f64>,
    pub processed_peaks: HashMap<usize, f64>,
    /// Peak selected by the last `select_highest_peak`.
    pub current_peak: Option<usize>,
}

impl SampleMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices of processed peaks in ascending order.
    pub fn processed_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.processed_peaks.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Add peaks to the unprocessed set, skipping ones already processed.
    pub fn add_unprocessed_peaks(&mut self, peaks: impl IntoIterator<Item = (usize, f64)>) {
        for (idx, value) in peaks {
            if !self.processed_peaks.contains_key(&idx) {
                self.unprocessed_peaks.insert(idx, value);
            }
        }
    }

    /// Select and remove the highest intensity peak from unprocessed.
    ///
    /// Ties go to the lowest index so the choice does not depend on hash
    /// order.
    pub fn select_highest_peak(&mut self) -> Option<usize> {
        let idx = self
            .unprocessed_peaks
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(&idx, _)| idx)?;

        self.unprocessed_peaks.remove(&idx);
        self.current_peak = Some(idx);
        Some(idx)
    }

    /// Record the fitted amplitude of the current peak.
    pub fn mark_current_processed(&mut self, amplitude: f64) {
        if let Some(idx) = self.current_peak.take() {
            self.processed_peaks.insert(idx, amplitude);
        }
    }

    pub fn has_unprocessed_peaks(&self) -> bool {
        !self.unprocessed_peaks.is_empty()
    }

    /// Forget every detected and processed peak.
    pub fn clear_peaks(&mut self) {
        self.unprocessed_peaks.clear();
        self.processed_peaks.clear();
        self.current_peak = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_highest_peak() {
        let mut metadata = SampleMetadata::new();
        metadata.unprocessed_peaks.insert(5, 1.0);
        metadata.unprocessed_peaks.insert(10, 3.0);
        metadata.unprocessed_peaks.insert(15, 2.0);

        let selected = metadata.select_highest_peak();
        assert_eq!(selected, Some(10));
        assert_eq!(metadata.current_peak, Some(10));
        assert!(!metadata.unprocessed_peaks.contains_key(&10));
    }

    #[test]
    fn test_select_tie_prefers_lowest_index() {
        let mut metadata = SampleMetadata::new();
        metadata.add_unprocessed_peaks([(30, 2.0), (7, 2.0), (12, 2.0)]);

        assert_eq!(metadata.select_highest_peak(), Some(7));
        assert_eq!(metadata.select_highest_peak(), Some(12));
        assert_eq!(metadata.select_highest_peak(), Some(30));
        assert_eq!(metadata.select_highest_peak(), None);
    }

    #[test]
    fn test_mark_processed() {
        let mut metadata = SampleMetadata::new();
        metadata.unprocessed_peaks.insert(5, 1.0);

        metadata.select_highest_peak();
        metadata.mark_current_processed(0.95);

        assert!(metadata.current_peak.is_none());
        assert_eq!(metadata.processed_peaks.get(&5), Some(&0.95));
    }

    #[test]
    fn test_processed_peaks_not_readded() {
        let mut metadata = SampleMetadata::new();
        metadata.processed_peaks.insert(5, 0.9);
        metadata.add_unprocessed_peaks([(5, 1.0), (8, 2.0)]);

        assert!(!metadata.unprocessed_peaks.contains_key(&5));
        assert!(metadata.has_unprocessed_peaks());

        metadata.clear_peaks();
        assert!(!metadata.has_unprocessed_peaks());
        assert!(metadata.processed_peaks.is_empty());
    }
}
