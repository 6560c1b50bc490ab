//! Vehicle Resale Analytics Pipeline Library
//!
//! A batch analytics pipeline for wholesale vehicle transaction data built
//! with Rust and Polars.
//!
//! # Overview
//!
//! The pipeline turns a raw transaction dump into pricing intelligence in
//! five stages:
//!
//! - **Cleaning**: schema validation, completeness filtering, date parsing,
//!   integrity checks on price and odometer fields
//! - **Feature Engineering**: vehicle age, pricing gap vs. the MMR market
//!   benchmark, and a per-make aggregate summary
//! - **Regression Modeling**: an OLS fit explaining the pricing gap from
//!   vehicle attributes, with full inference statistics
//! - **Seller Segmentation**: per-seller pricing behavior profiles clustered
//!   into interpretable segments with seeded k-means
//! - **BI Export**: four flat reporting tables ready for dashboard ingestion
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use resale_analytics::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .output_dir("outputs")
//!     .min_transactions(10)
//!     .build()?;
//!
//! let summary = Pipeline::new(config).run("vehicle_sales.csv".as_ref())?;
//! println!(
//!     "{} rows cleaned, {} sellers clustered in {}ms",
//!     summary.rows_cleaned, summary.sellers_clustered, summary.duration_ms
//! );
//! ```
//!
//! Stages are also usable standalone; each takes a `DataFrame` and returns
//! validated output frames without touching the filesystem. See [`cleaner`],
//! [`features`], [`regression`], [`segmentation`], and [`export`].

pub mod cleaner;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod io;
pub mod pipeline;
pub mod regression;
pub mod schema;
pub mod segmentation;

// Re-exports for convenient access
pub use cleaner::Cleaner;
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, Result, ResultExt};
pub use export::{ExportTables, Exporter, label_for};
pub use features::{FeatureBuilder, FeatureOutput};
pub use pipeline::{Pipeline, PipelineRunSummary};
pub use regression::{Coefficient, RegressionModeler, RegressionResult, render_summary};
pub use segmentation::{SegmentationResult, SellerSegmenter};
