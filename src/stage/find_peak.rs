//! FindPeak stage implementation.

use super::traits::{Stage, StageError, StageOutcome};
use crate::data::{find_peaks, Peak, Sample};

/// Configuration for peak finding.
#[derive(Debug, Clone)]
pub struct FindPeakConfig {
    /// Minimum peak height.
    pub min_height: f64,
    /// Minimum peak prominence.
    pub min_prominence: f64,
    /// Minimum distance between peaks (in indices).
    pub min_distance: usize,
}

impl Default for FindPeakConfig {
    fn default() -> Self {
        Self {
            min_height: 0.5,
            min_prominence: 0.3,
            min_distance: 10,
        }
    }
}

/// Stage for finding peaks in SAXS intensity data.
#[derive(Debug, Clone, Default)]
pub struct FindPeakStage {
    config: FindPeakConfig,
}

impl FindPeakStage {
    /// Create with custom configuration.
    pub fn new(config: FindPeakConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FindPeakConfig {
        &self.config
    }
}

impl Stage for FindPeakStage {
    fn name(&self) -> &str {
        "find_peak"
    }

    fn process(&self, sample: &mut Sample) -> Result<StageOutcome, StageError> {
        let peaks = find_peaks(
            sample.intensity(),
            self.config.min_height,
            self.config.min_prominence,
        )?;

        let peaks = if self.config.min_distance > 1 {
            filter_by_distance(peaks, self.config.min_distance)
        } else {
            peaks
        };

        let metadata = sample.metadata_mut();
        metadata.add_unprocessed_peaks(peaks.iter().map(|p| (p.index, p.value)));

        if metadata.has_unprocessed_peaks() {
            Ok(StageOutcome::Continue)
        } else {
            Ok(StageOutcome::Final)
        }
    }
}

/// Filter peaks to ensure minimum distance between them.
/// Keeps higher peaks when there's a conflict.
fn filter_by_distance(mut peaks: Vec<Peak>, min_distance: usize) -> Vec<Peak> {
    // Highest first; equal heights keep index order.
    peaks.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.index.cmp(&b.index)));

    let mut kept: Vec<Peak> = Vec::new();

    for peak in peaks {
        let too_close = kept
            .iter()
            .any(|k| k.index.abs_diff(peak.index) < min_distance);

        if !too_close {
            kept.push(peak);
        }
    }

    kept.sort_by_key(|p| p.index);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sample_with_peaks() -> Sample {
        let mut intensity = vec![0.0; 100];
        intensity[20] = 2.0;
        intensity[50] = 3.0;
        intensity[80] = 1.5;

        Sample::new(
            "test",
            (0..100).map(|i| i as f64 * 0.01).collect(),
            intensity,
            vec![0.1; 100],
        )
        .unwrap()
    }

    #[test]
    fn test_find_peaks_stage() {
        let stage = FindPeakStage::new(FindPeakConfig {
            min_height: 1.0,
            min_prominence: 0.5,
            min_distance: 1,
        });

        let mut sample = make_sample_with_peaks();
        let outcome = stage.process(&mut sample).unwrap();

        assert_eq!(outcome, StageOutcome::Continue);
        let unprocessed = &sample.metadata().unprocessed_peaks;
        assert_eq!(unprocessed.len(), 3);
        assert_eq!(unprocessed.get(&50), Some(&3.0));
    }

    #[test]
    fn test_no_peaks_found() {
        let stage = FindPeakStage::new(FindPeakConfig {
            min_height: 10.0,
            min_prominence: 0.0,
            min_distance: 1,
        });

        let mut sample = make_sample_with_peaks();
        assert_eq!(stage.process(&mut sample).unwrap(), StageOutcome::Final);
        assert!(!sample.metadata().has_unprocessed_peaks());
    }

    #[test]
    fn test_nan_threshold_is_stage_error() {
        let stage = FindPeakStage::new(FindPeakConfig {
            min_height: f64::NAN,
            min_prominence: 0.0,
            min_distance: 1,
        });

        let mut sample = make_sample_with_peaks();
        let err = stage.process(&mut sample).unwrap_err();
        assert!(err.message().contains("NaN"));
    }

    #[test]
    fn test_distance_filtering() {
        let peaks = vec![
            Peak::new(10, 2.0, 1.0),
            Peak::new(12, 1.5, 1.0),
            Peak::new(25, 3.0, 1.0),
        ];

        let filtered = filter_by_distance(peaks, 5);

        let indices: Vec<usize> = filtered.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![10, 25]);
    }
}
