//! # dashlens
//!
//! Facade over the workspace crates: `dash_math` for the numeric kernels and
//! `dash_pipeline` for the filter, aggregate, forecast and segment stages
//! behind the pandemic and e-commerce dashboards.
//!
//! ## Example
//!
//! ```
//! use dashlens_workspace::math::rolling_mean;
//!
//! let smoothed = rolling_mean(&[2.0, 4.0, 6.0, 8.0], 2).unwrap();
//! assert_eq!(smoothed, vec![2.0, 3.0, 5.0, 7.0]);
//! ```

pub use dash_math as math;
pub use dash_pipeline as pipeline;

pub use dash_pipeline::{
    FilterSpec, FilteredView, Pipeline, PipelineConfig, PipelineError, RunOutput, RunRequest,
    SnapshotCache, StageOutcome,
};
