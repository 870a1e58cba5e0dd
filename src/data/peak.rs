//! Peak detection and array reductions.

use crate::error::{Error, Result};

/// A detected peak with its properties.
#[derive(Clone, Debug, PartialEq)]
pub struct Peak {
    /// Index in the original array.
    pub index: usize,

    /// Peak value (intensity at index).
    pub value: f64,

    /// Peak prominence (descent required before higher terrain is reached).
    pub prominence: f64,
}

impl Peak {
    /// Create a new peak.
    pub fn new(index: usize, value: f64, prominence: f64) -> Self {
        Self {
            index,
            value,
            prominence,
        }
    }
}

/// Find prominent local maxima in 1D data.
///
/// # Arguments
/// * `data` - Slice of intensity values
/// * `min_height` - Minimum peak value (use `f64::NEG_INFINITY` for no filter)
/// * `min_prominence` - Minimum prominence (use 0.0 for no filter)
///
/// Boundary elements are never peaks. A flat plateau is reported once, at its
/// leftmost index, and only if the data descends again after it: a plateau
/// that runs into a rise or into the last element is not a peak, even though
/// its left edge satisfies `v[i] > v[i-1] && v[i] >= v[i+1]`.
///
/// # Errors
/// `InvalidArgument` if either threshold is NaN.
pub fn find_peaks(data: &[f64], min_height: f64, min_prominence: f64) -> Result<Vec<Peak>> {
    check_thresholds(min_height, min_prominence)?;
    Ok(detect(data, min_height, min_prominence))
}

/// Find peaks in batch (multiple rows) using parallel processing.
pub fn find_peaks_batch(
    data: &[Vec<f64>],
    min_height: f64,
    min_prominence: f64,
) -> Result<Vec<Vec<Peak>>> {
    use rayon::prelude::*;

    check_thresholds(min_height, min_prominence)?;
    Ok(data
        .par_iter()
        .map(|row| detect(row, min_height, min_prominence))
        .collect())
}

fn check_thresholds(min_height: f64, min_prominence: f64) -> Result<()> {
    if min_height.is_nan() {
        return Err(Error::InvalidArgument("min_height is NaN".into()));
    }
    if min_prominence.is_nan() {
        return Err(Error::InvalidArgument("min_prominence is NaN".into()));
    }
    Ok(())
}

fn detect(data: &[f64], min_height: f64, min_prominence: f64) -> Vec<Peak> {
    let n = data.len();
    if n < 3 {
        return Vec::new();
    }

    let mut peaks = Vec::new();
    let mut i = 1;
    while i < n - 1 {
        let value = data[i];
        if !(value > data[i - 1]) {
            i += 1;
            continue;
        }

        // Walk to the right edge of a possible plateau.
        let mut edge = i + 1;
        while edge < n && data[edge] == value {
            edge += 1;
        }

        if edge < n && data[edge] < value && value >= min_height {
            let prominence = calc_prominence(data, i);
            if prominence >= min_prominence {
                peaks.push(Peak::new(i, value, prominence));
            }
        }

        i = edge.max(i + 1);
    }

    peaks
}

/// Calculate the topographic prominence of the value at `peak_idx`.
///
/// Each side is scanned away from the peak until the data ends or exceeds the
/// peak value; the prominence is the peak value minus the higher of the two
/// minima seen.
///
/// # Panics
/// If `peak_idx` is out of bounds.
pub fn calc_prominence(data: &[f64], peak_idx: usize) -> f64 {
    let peak_val = data[peak_idx];

    let left_min = data[..peak_idx]
        .iter()
        .rev()
        .take_while(|&&v| !(v > peak_val))
        .copied()
        .fold(peak_val, f64::min);

    let right_min = data[peak_idx + 1..]
        .iter()
        .take_while(|&&v| !(v > peak_val))
        .copied()
        .fold(peak_val, f64::min);

    (peak_val - left_min.max(right_min)).max(0.0)
}

/// Find the maximum value and the index of its first occurrence.
///
/// NaN values are skipped.
///
/// # Errors
/// `InvalidArgument` for empty input or input without a comparable value.
pub fn find_max(data: &[f64]) -> Result<(f64, usize)> {
    if data.is_empty() {
        return Err(Error::InvalidArgument("find_max on empty data".into()));
    }

    let mut best: Option<(f64, usize)> = None;
    for (i, &val) in data.iter().enumerate() {
        if val.is_nan() {
            continue;
        }
        match best {
            Some((max_val, _)) if val <= max_val => {}
            _ => best = Some((val, i)),
        }
    }

    best.ok_or_else(|| Error::InvalidArgument("find_max on data without comparable values".into()))
}

/// Compute differences between consecutive elements.
pub fn diff(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Compute consecutive differences into a caller-provided buffer.
///
/// # Errors
/// `BufferLength` unless `out.len()` equals `data.len() - 1` (or 0 for
/// inputs shorter than two elements).
pub fn diff_into(data: &[f64], out: &mut [f64]) -> Result<()> {
    let expected = data.len().saturating_sub(1);
    if out.len() != expected {
        return Err(Error::BufferLength {
            expected,
            actual: out.len(),
        });
    }

    for (slot, w) in out.iter_mut().zip(data.windows(2)) {
        *slot = w[1] - w[0];
    }
    Ok(())
}
