//! Pipeline orchestrator.
//!
//! Runs the five stages in dependency order, handing DataFrames forward in
//! memory and writing each stage's files only after the stage succeeded.
//! Data flows strictly forward; no stage calls back into an earlier one.

use crate::cleaner::Cleaner;
use crate::config::PipelineConfig;
use crate::error::{Result, ResultExt};
use crate::export::Exporter;
use crate::features::FeatureBuilder;
use crate::io;
use crate::regression::{RegressionModeler, render_summary};
use crate::segmentation::SellerSegmenter;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Stage output file names, resolved under the configured output directory.
pub const CLEANED_FILE: &str = "cleaned.csv";
pub const FEATURES_FILE: &str = "feature_engineered_data.csv";
pub const MAKE_AGGREGATE_FILE: &str = "aggregate_make.csv";
pub const MODEL_SUMMARY_FILE: &str = "model_summary.txt";
pub const MODEL_COEFFICIENTS_FILE: &str = "model_coefficients.csv";
pub const SELLER_CLUSTERS_FILE: &str = "seller_clusters.csv";
pub const CLUSTER_CENTERS_FILE: &str = "seller_cluster_centers.csv";
pub const TABLES_DIR: &str = "tables";
pub const PRICING_SUMMARY_TABLE: &str = "vehicle_pricing_summary.csv";
pub const SELLER_SEGMENTS_TABLE: &str = "seller_segments.csv";
pub const PRICING_TRENDS_TABLE: &str = "pricing_trends.csv";
pub const DEMAND_SIGNALS_TABLE: &str = "demand_signals.csv";

/// Row counts and timing from a full pipeline run.
#[derive(Debug)]
pub struct PipelineRunSummary {
    pub rows_loaded: usize,
    pub rows_cleaned: usize,
    pub rows_engineered: usize,
    pub makes_aggregated: usize,
    pub coefficients_fit: usize,
    pub sellers_clustered: usize,
    pub duration_ms: u128,
}

/// The end-to-end analytics pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use resale_analytics::{Pipeline, PipelineConfig};
///
/// let config = PipelineConfig::builder().output_dir("outputs").build()?;
/// let summary = Pipeline::new(config).run("vehicle_sales.csv".as_ref())?;
/// println!("{} sellers clustered", summary.sellers_clustered);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    cleaner: Cleaner,
    feature_builder: FeatureBuilder,
    modeler: RegressionModeler,
    segmenter: SellerSegmenter,
    exporter: Exporter,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let feature_builder = FeatureBuilder::new(config.reference_year);
        let segmenter = SellerSegmenter::new(&config);
        Self {
            config,
            cleaner: Cleaner,
            feature_builder,
            modeler: RegressionModeler,
            segmenter,
            exporter: Exporter,
        }
    }

    /// Run all five stages over a raw transactions file.
    ///
    /// Each stage validates before anything is written, so a failing stage
    /// leaves no partial outputs behind.
    pub fn run(&self, input: &Path) -> Result<PipelineRunSummary> {
        let started = Instant::now();
        let out = &self.config.output_dir;

        info!("Loading raw transactions from {:?}", input);
        let raw = io::read_csv(input)?;
        let rows_loaded = raw.height();

        info!("Stage 1/5: cleaning");
        let mut cleaned = self.cleaner.run(raw).context("cleaning stage")?;
        io::write_csv(&mut cleaned, &out.join(CLEANED_FILE))?;

        info!("Stage 2/5: feature engineering");
        let mut features = self
            .feature_builder
            .run(cleaned.clone())
            .context("feature stage")?;
        io::write_csv(&mut features.transactions, &out.join(FEATURES_FILE))?;
        io::write_csv(&mut features.make_summary, &out.join(MAKE_AGGREGATE_FILE))?;

        info!("Stage 3/5: regression modeling");
        let fit = self
            .modeler
            .run(&features.transactions)
            .context("regression stage")?;
        io::write_text(&render_summary(&fit), &out.join(MODEL_SUMMARY_FILE))?;
        let mut coefficients = fit.coefficient_table()?;
        io::write_csv(&mut coefficients, &out.join(MODEL_COEFFICIENTS_FILE))?;

        info!("Stage 4/5: seller segmentation");
        let mut segmentation = self
            .segmenter
            .run(&features.transactions)
            .context("segmentation stage")?;
        io::write_csv(&mut segmentation.seller_clusters, &out.join(SELLER_CLUSTERS_FILE))?;
        io::write_csv(&mut segmentation.cluster_centers, &out.join(CLUSTER_CENTERS_FILE))?;

        info!("Stage 5/5: BI export");
        let mut tables = self
            .exporter
            .run(&features.transactions, &segmentation.seller_clusters)
            .context("export stage")?;
        let tables_dir = out.join(TABLES_DIR);
        io::write_csv(
            &mut tables.vehicle_pricing_summary,
            &tables_dir.join(PRICING_SUMMARY_TABLE),
        )?;
        io::write_csv(
            &mut tables.seller_segments,
            &tables_dir.join(SELLER_SEGMENTS_TABLE),
        )?;
        io::write_csv(
            &mut tables.pricing_trends,
            &tables_dir.join(PRICING_TRENDS_TABLE),
        )?;
        io::write_csv(
            &mut tables.demand_signals,
            &tables_dir.join(DEMAND_SIGNALS_TABLE),
        )?;

        let summary = PipelineRunSummary {
            rows_loaded,
            rows_cleaned: cleaned.height(),
            rows_engineered: features.transactions.height(),
            makes_aggregated: features.make_summary.height(),
            coefficients_fit: fit.coefficients.len(),
            sellers_clustered: segmentation.seller_clusters.height(),
            duration_ms: started.elapsed().as_millis(),
        };
        info!("Pipeline completed in {}ms", summary.duration_ms);
        Ok(summary)
    }
}
