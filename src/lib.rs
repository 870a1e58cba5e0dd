//! SAXS Rust Runtime - staged batch processing of SAXS curves.
//!
//! This crate provides a runtime for batch processing Small-Angle X-ray
//! Scattering (SAXS) data with:
//!
//! - A sample store with lowest-stage-first claiming
//! - A tokio worker pool driving samples through numbered stages
//! - Checkpoint progress, cancellation and partial collection (regrouping)
//! - Peak detection primitives, parallelised across curves with rayon
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Runtime facade             │
//! │  samples · stages · checkpoints · state │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  ┌─────────────┐   ┌─────────────────┐  │
//! │  │ SampleStore │◀─▶│  Tokio workers  │  │
//! │  │ (by stage)  │   │ (StageRegistry) │  │
//! │  └─────────────┘   └─────────────────┘  │
//! │                            │ events     │
//! │                            ▼            │
//! │                   ┌─────────────────┐   │
//! │                   │ Dispatch thread │──▶ Observer
//! │                   └─────────────────┘   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use saxs_runtime::{Runtime, RuntimeConfig, Sample, StageOutcome, StageError};
//! use saxs_runtime::runtime::Callbacks;
//!
//! let runtime = Runtime::new(RuntimeConfig::new(2, 3)).unwrap();
//! for stage in 1..=3 {
//!     runtime
//!         .register_stage(stage, |s: &mut Sample| -> Result<StageOutcome, StageError> {
//!             for v in s.intensity_mut() {
//!                 *v *= 0.5;
//!             }
//!             Ok(StageOutcome::Continue)
//!         })
//!         .unwrap();
//! }
//! runtime.set_checkpoints(&[2]).unwrap();
//!
//! let sample = Sample::new("s1", vec![0.1, 0.2], vec![4.0, 8.0], vec![0.1, 0.1]).unwrap();
//! runtime.add_sample(sample).unwrap();
//!
//! let completion = runtime
//!     .run_sync(Callbacks::new().on_progress(|p| println!("{}/{}", p.completed, p.total)))
//!     .unwrap();
//! assert_eq!(completion.summary.completed, 1);
//! assert_eq!(runtime.sample("s1").unwrap().intensity(), &[0.5, 1.0]);
//! ```

pub mod data;
pub mod error;
pub mod runtime;
pub mod stage;

// Re-export commonly used items
pub use data::{Peak, Sample, SampleFailure, SampleMetadata};
pub use error::{Error, Result, Status};
pub use runtime::{
    Completion, Observer, Progress, RunState, RunSummary, Runtime, RuntimeConfig,
};
pub use stage::{Stage, StageError, StageOutcome, StageRegistry};
