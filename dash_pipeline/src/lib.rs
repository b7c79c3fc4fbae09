//! # Dash Pipeline
//!
//! The filter-aggregate-model pipeline behind the pandemic and e-commerce
//! analytics dashboards.
//!
//! ## Features
//!
//! - Dataset loading from CSV (polars) or a seeded synthetic sales generator
//! - A time-bounded snapshot cache shared across pipeline runs
//! - Filtering by date range and categorical membership
//! - Grouped aggregation and trailing rolling means
//! - Revenue forecasting with calendar and rolling-window features
//! - Customer segmentation with standardized features and k-means
//! - Dashboard summary tables and CSV export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dash_pipeline::{Pipeline, PipelineConfig, RunRequest, SnapshotCache, SyntheticSalesSource};
//! use dash_pipeline::filter::FilterSpec;
//!
//! let config = PipelineConfig::default();
//! let mut cache = SnapshotCache::new(config.cache_ttl());
//! let source = SyntheticSalesSource::new(42);
//!
//! let request = RunRequest::sales(FilterSpec::new(), &config);
//! let output = Pipeline::run(&mut cache, &source, &request)?;
//!
//! if let Some(report) = output.forecast.ready() {
//!     println!("{report}");
//! }
//! # Ok::<(), dash_pipeline::PipelineError>(())
//! ```

pub mod aggregate;
pub mod config;
pub mod dashboards;
pub mod data;
pub mod error;
pub mod export;
pub mod features;
pub mod filter;
pub mod forecast;
pub mod models;
pub mod pipeline;
pub mod schema;
pub mod segmentation;
pub mod synthetic;
pub mod table;
pub mod utils;

// Re-export commonly used types
pub use crate::aggregate::{aggregate, rolling_mean_table, AggregationKeySpec, Reduction};
pub use crate::config::PipelineConfig;
pub use crate::data::{CsvSource, DataSource, RecordSet, SnapshotCache};
pub use crate::error::{PipelineError, Result};
pub use crate::filter::{FilterSpec, FilteredView};
pub use crate::forecast::ForecastReport;
pub use crate::pipeline::{Pipeline, RunOutput, RunRequest, StageOutcome};
pub use crate::schema::{Schema, Value};
pub use crate::segmentation::SegmentationReport;
pub use crate::synthetic::SyntheticSalesSource;
pub use crate::table::Table;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
