//! ProcessPeak stage implementation.

use super::traits::{Stage, StageError, StageOutcome};
use crate::data::Sample;

/// Configuration for peak processing.
#[derive(Debug, Clone)]
pub struct ProcessPeakConfig {
    /// Range (in indices) around peak for parabola fitting.
    pub parabola_range: usize,
    /// Multiplier for Gaussian fit range based on sigma.
    pub gaussian_range_multiplier: f64,
}

impl Default for ProcessPeakConfig {
    fn default() -> Self {
        Self {
            parabola_range: 5,
            gaussian_range_multiplier: 3.0,
        }
    }
}

/// Gaussian estimate of a single peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub mu: f64,
    pub sigma: f64,
    pub amplitude: f64,
}

impl GaussianFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.amplitude * (-(x - self.mu).powi(2) / self.sigma.powi(2)).exp()
    }
}

/// Stage for processing (fitting and subtracting) the highest unprocessed
/// peak of a sample.
#[derive(Debug, Clone, Default)]
pub struct ProcessPeakStage {
    config: ProcessPeakConfig,
}

impl ProcessPeakStage {
    /// Create with custom configuration.
    pub fn new(config: ProcessPeakConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessPeakConfig {
        &self.config
    }
}

impl Stage for ProcessPeakStage {
    fn name(&self) -> &str {
        "process_peak"
    }

    fn process(&self, sample: &mut Sample) -> Result<StageOutcome, StageError> {
        let peak_idx = match sample.metadata_mut().select_highest_peak() {
            Some(idx) => idx,
            None => return Ok(StageOutcome::Final),
        };

        if peak_idx >= sample.len() {
            sample.metadata_mut().current_peak = None;
            return Err(StageError::new(format!(
                "peak index {} out of bounds for length {}",
                peak_idx,
                sample.len()
            )));
        }

        let (q, intensity) = sample.q_and_intensity_mut();
        let initial = fit_parabola(q, intensity, peak_idx, self.config.parabola_range);
        let fit = fit_gaussian(
            q,
            intensity,
            peak_idx,
            initial,
            self.config.gaussian_range_multiplier,
        );
        subtract_gaussian(intensity, q, &fit);

        let metadata = sample.metadata_mut();
        metadata.mark_current_processed(fit.amplitude);

        if metadata.has_unprocessed_peaks() {
            Ok(StageOutcome::Continue)
        } else {
            Ok(StageOutcome::Final)
        }
    }
}

/// Estimate Gaussian parameters from the local curvature around a peak.
fn fit_parabola(q: &[f64], intensity: &[f64], peak_idx: usize, range: usize) -> GaussianFit {
    let start = peak_idx.saturating_sub(range);
    let end = peak_idx.saturating_add(range).saturating_add(1).min(intensity.len());

    let mu = q[peak_idx];
    let amplitude = intensity[peak_idx];

    if end - start < 3 {
        return GaussianFit {
            mu,
            sigma: 0.1,
            amplitude,
        };
    }

    let delta_q = (q[end - 1] - q[start]) / (end - start - 1) as f64;

    // Second derivative at the peak; for a Gaussian it is -amplitude/sigma².
    let left = intensity[peak_idx.saturating_sub(1).max(start)];
    let right = intensity[(peak_idx + 1).min(end - 1)];
    let d2 = (right - 2.0 * amplitude + left) / (delta_q * delta_q);

    let sigma = if d2 < -1e-10 {
        (-amplitude / d2).sqrt().abs()
    } else {
        delta_q.abs() * 3.0
    };

    GaussianFit {
        mu,
        sigma: sigma.max(0.01),
        amplitude,
    }
}

/// Refine a Gaussian estimate with weighted first and second moments.
fn fit_gaussian(
    q: &[f64],
    intensity: &[f64],
    peak_idx: usize,
    initial: GaussianFit,
    range_multiplier: f64,
) -> GaussianFit {
    let delta_q = if q.len() > 1 {
        ((q[q.len() - 1] - q[0]) / (q.len() - 1) as f64).abs()
    } else {
        0.01
    };
    if !(delta_q > 0.0) {
        return initial;
    }

    let range_indices = ((initial.sigma * range_multiplier) / delta_q).ceil() as usize;
    let start = peak_idx.saturating_sub(range_indices);
    let end = peak_idx
        .saturating_add(range_indices)
        .saturating_add(1)
        .min(intensity.len());

    if end - start < 3 {
        return initial;
    }

    let window = start..end;
    let mut fit = initial;

    for _ in 0..5 {
        let mut sum_w = 0.0;
        let mut sum_wq = 0.0;
        for i in window.clone() {
            let weight = intensity[i].max(0.0);
            sum_w += weight;
            sum_wq += weight * q[i];
        }
        if sum_w <= 1e-10 {
            break;
        }
        fit.mu = sum_wq / sum_w;

        let sum_var: f64 = window
            .clone()
            .map(|i| intensity[i].max(0.0) * (q[i] - fit.mu).powi(2))
            .sum();
        fit.sigma = (sum_var / sum_w).sqrt().max(0.01);
    }

    fit.amplitude = intensity[peak_idx];
    fit
}

/// Subtract a Gaussian from intensity data, clamping at zero.
fn subtract_gaussian(intensity: &mut [f64], q: &[f64], fit: &GaussianFit) {
    for (value, &qi) in intensity.iter_mut().zip(q) {
        *value = (*value - fit.eval(qi)).max(0.0);
    }
}
