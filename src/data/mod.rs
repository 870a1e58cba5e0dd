//! Data structures for SAXS processing.

pub mod metadata;
pub mod peak;
pub mod sample;

pub use metadata::SampleMetadata;
pub use peak::{calc_prominence, diff, diff_into, find_max, find_peaks, find_peaks_batch, Peak};
pub use sample::{Sample, SampleFailure};
