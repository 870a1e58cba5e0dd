//! SAXS Sample data structure.

use super::metadata::SampleMetadata;
use crate::error::{Error, Result};
use crate::stage::StageError;

/// A SAXS sample containing measurement data.
///
/// The three arrays always have the same length, fixed at construction. The
/// stage number only moves forward.
#[derive(Clone, Debug)]
pub struct Sample {
    id: String,
    q_values: Vec<f64>,
    intensity: Vec<f64>,
    intensity_err: Vec<f64>,
    stage_num: u32,
    metadata: SampleMetadata,
    failure: Option<SampleFailure>,
}

/// A stage failure recorded on the sample it happened to.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleFailure {
    /// Stage number whose function failed.
    pub stage: u32,
    /// Error reported by the stage function.
    pub error: StageError,
}

impl Sample {
    /// Create a new sample at stage 0.
    ///
    /// # Errors
    /// `LengthMismatch` if the three arrays differ in length.
    pub fn new(
        id: impl Into<String>,
        q_values: Vec<f64>,
        intensity: Vec<f64>,
        intensity_err: Vec<f64>,
    ) -> Result<Self> {
        let len = q_values.len();
        if intensity.len() != len || intensity_err.len() != len {
            return Err(Error::LengthMismatch {
                q_len: len,
                intensity_len: intensity.len(),
                err_len: intensity_err.len(),
            });
        }

        Ok(Self {
            id: id.into(),
            q_values,
            intensity,
            intensity_err,
            stage_num: 0,
            metadata: SampleMetadata::default(),
            failure: None,
        })
    }

    /// Unique identifier for this sample.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the number of data points.
    #[inline]
    pub fn len(&self) -> usize {
        self.q_values.len()
    }

    /// Check if sample has no data points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.q_values.is_empty()
    }

    /// Current stage number in the pipeline.
    #[inline]
    pub fn stage(&self) -> u32 {
        self.stage_num
    }

    /// Increment stage number, saturating at `u32::MAX`.
    #[inline]
    pub fn advance_stage(&mut self) {
        self.stage_num = self.stage_num.saturating_add(1);
    }

    /// Move the sample to `stage`.
    ///
    /// # Errors
    /// `StageRegression` if `stage` is below the current stage.
    pub fn advance_to(&mut self, stage: u32) -> Result<()> {
        if stage < self.stage_num {
            return Err(Error::StageRegression {
                id: self.id.clone(),
                current: self.stage_num,
                requested: stage,
            });
        }
        self.stage_num = stage;
        Ok(())
    }

    /// Get intensity at a specific index.
    #[inline]
    pub fn get_intensity(&self, index: usize) -> Option<f64> {
        self.intensity.get(index).copied()
    }

    /// Set intensity at a specific index.
    #[inline]
    pub fn set_intensity(&mut self, index: usize, value: f64) -> bool {
        if let Some(v) = self.intensity.get_mut(index) {
            *v = value;
            true
        } else {
            false
        }
    }

    /// Get q value at a specific index.
    #[inline]
    pub fn get_q(&self, index: usize) -> Option<f64> {
        self.q_values.get(index).copied()
    }

    /// Scattering vector values (q).
    #[inline]
    pub fn q_values(&self) -> &[f64] {
        &self.q_values
    }

    /// Measured intensity values.
    #[inline]
    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    /// Mutable intensity values. The length cannot change through this view.
    #[inline]
    pub fn intensity_mut(&mut self) -> &mut [f64] {
        &mut self.intensity
    }

    /// Split borrow of q values (shared) and intensity (mutable).
    #[inline]
    pub fn q_and_intensity_mut(&mut self) -> (&[f64], &mut [f64]) {
        (&self.q_values, &mut self.intensity)
    }

    /// Intensity uncertainty values.
    #[inline]
    pub fn intensity_err(&self) -> &[f64] {
        &self.intensity_err
    }

    #[inline]
    pub fn metadata(&self) -> &SampleMetadata {
        &self.metadata
    }

    #[inline]
    pub fn metadata_mut(&mut self) -> &mut SampleMetadata {
        &mut self.metadata
    }

    /// Failure recorded by the last run, if a stage function failed.
    #[inline]
    pub fn failure(&self) -> Option<&SampleFailure> {
        self.failure.as_ref()
    }

    /// `Err(Error::Stage)` if a stage function failed for this sample.
    pub fn check(&self) -> Result<()> {
        match &self.failure {
            Some(failure) => Err(Error::Stage {
                id: self.id.clone(),
                stage: failure.stage,
                source: failure.error.clone(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn record_failure(&mut self, stage: u32, error: StageError) {
        self.failure = Some(SampleFailure { stage, error });
    }
}
