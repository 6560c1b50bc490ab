//! CLI entry point for the vehicle resale analytics pipeline.

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use resale_analytics::pipeline::{
    CLEANED_FILE, CLUSTER_CENTERS_FILE, DEMAND_SIGNALS_TABLE, FEATURES_FILE, MAKE_AGGREGATE_FILE,
    MODEL_COEFFICIENTS_FILE, MODEL_SUMMARY_FILE, PRICING_SUMMARY_TABLE, PRICING_TRENDS_TABLE,
    SELLER_CLUSTERS_FILE, SELLER_SEGMENTS_TABLE, TABLES_DIR,
};
use resale_analytics::{
    Cleaner, Exporter, FeatureBuilder, Pipeline, PipelineConfig, PipelineRunSummary,
    RegressionModeler, SellerSegmenter, io, render_summary,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Vehicle resale pricing analytics",
    long_about = "Batch analytics over wholesale vehicle transactions.\n\n\
                  EXAMPLES:\n  \
                  # Full pipeline over a raw transaction dump\n  \
                  resale-analytics run vehicle_sales.csv\n\n  \
                  # Re-segment sellers from an existing feature file\n  \
                  resale-analytics segment outputs/feature_engineered_data.csv --n-clusters 4\n\n  \
                  # Stage-by-stage\n  \
                  resale-analytics clean vehicle_sales.csv -o outputs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all five stages over a raw transactions CSV
    Run {
        /// Path to the raw transactions CSV
        input: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Validate and clean a raw transactions CSV
    Clean {
        /// Path to the raw transactions CSV
        input: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Derive pricing features and the per-make summary from cleaned data
    Features {
        /// Path to a cleaned transactions CSV
        input: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Fit the explanatory pricing-gap regression on feature-engineered data
    Model {
        /// Path to a feature-engineered transactions CSV
        input: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Cluster sellers by pricing behavior from feature-engineered data
    Segment {
        /// Path to a feature-engineered transactions CSV
        input: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Build the four BI reporting tables
    Export {
        /// Path to a feature-engineered transactions CSV
        features: PathBuf,
        /// Path to the seller clusters CSV
        clusters: PathBuf,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Configuration overrides shared by every subcommand. Unset flags fall back
/// to the library defaults.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Output directory for stage results
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,

    /// Year vehicle age is computed against
    #[arg(long)]
    reference_year: Option<i32>,

    /// Minimum transaction count for a seller to be clustered
    #[arg(long)]
    min_transactions: Option<u32>,

    /// Absolute pricing gap that counts as an extreme pricing event
    #[arg(long)]
    extreme_gap_threshold: Option<f64>,

    /// Number of seller segments
    #[arg(long)]
    n_clusters: Option<usize>,

    /// Number of k-means restarts
    #[arg(long)]
    n_restarts: Option<usize>,

    /// Seed for the clustering restart search
    #[arg(long)]
    random_seed: Option<u64>,
}

impl ConfigArgs {
    fn build(&self) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder().output_dir(&self.output);
        if let Some(year) = self.reference_year {
            builder = builder.reference_year(year);
        }
        if let Some(count) = self.min_transactions {
            builder = builder.min_transactions(count);
        }
        if let Some(threshold) = self.extreme_gap_threshold {
            builder = builder.extreme_gap_threshold(threshold);
        }
        if let Some(k) = self.n_clusters {
            builder = builder.n_clusters(k);
        }
        if let Some(runs) = self.n_restarts {
            builder = builder.n_restarts(runs);
        }
        if let Some(seed) = self.random_seed {
            builder = builder.random_seed(seed);
        }
        Ok(builder.build()?)
    }
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.quiet);

    match cli.command {
        Command::Run { input, config } => {
            let config = config.build()?;
            let output_dir = config.output_dir.clone();
            let summary = Pipeline::new(config)
                .run(&existing(&input)?)
                .map_err(|e| anyhow!("Pipeline failed: {e}"))?;
            print_run_summary(&summary, &output_dir);
        }
        Command::Clean { input, config } => {
            let config = config.build()?;
            let raw = io::read_csv(&existing(&input)?)?;
            let mut cleaned = Cleaner.run(raw)?;
            let path = config.output_dir.join(CLEANED_FILE);
            io::write_csv(&mut cleaned, &path)?;
            info!("Wrote {} rows to {}", cleaned.height(), path.display());
        }
        Command::Features { input, config } => {
            let config = config.build()?;
            let cleaned = io::read_csv(&existing(&input)?)?;
            let mut features = FeatureBuilder::new(config.reference_year).run(cleaned)?;
            io::write_csv(
                &mut features.transactions,
                &config.output_dir.join(FEATURES_FILE),
            )?;
            io::write_csv(
                &mut features.make_summary,
                &config.output_dir.join(MAKE_AGGREGATE_FILE),
            )?;
            info!(
                "Derived features for {} transactions across {} makes",
                features.transactions.height(),
                features.make_summary.height()
            );
        }
        Command::Model { input, config } => {
            let config = config.build()?;
            let features = io::read_csv(&existing(&input)?)?;
            let fit = RegressionModeler.run(&features)?;
            let text = render_summary(&fit);
            io::write_text(&text, &config.output_dir.join(MODEL_SUMMARY_FILE))?;
            let mut coefficients = fit.coefficient_table()?;
            io::write_csv(
                &mut coefficients,
                &config.output_dir.join(MODEL_COEFFICIENTS_FILE),
            )?;
            println!("{text}");
        }
        Command::Segment { input, config } => {
            let config = config.build()?;
            let features = io::read_csv(&existing(&input)?)?;
            let mut result = SellerSegmenter::new(&config).run(&features)?;
            io::write_csv(
                &mut result.seller_clusters,
                &config.output_dir.join(SELLER_CLUSTERS_FILE),
            )?;
            io::write_csv(
                &mut result.cluster_centers,
                &config.output_dir.join(CLUSTER_CENTERS_FILE),
            )?;
            info!(
                "Clustered {} sellers into {} segments",
                result.seller_clusters.height(),
                config.n_clusters
            );
        }
        Command::Export {
            features,
            clusters,
            config,
        } => {
            let config = config.build()?;
            let transactions = io::read_csv(&existing(&features)?)?;
            let seller_clusters = io::read_csv(&existing(&clusters)?)?;
            let mut tables = Exporter.run(&transactions, &seller_clusters)?;
            let tables_dir = config.output_dir.join(TABLES_DIR);
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
            info!("Wrote 4 reporting tables to {}", tables_dir.display());
        }
    }

    Ok(())
}

fn existing(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(anyhow!("Input file not found: {}", path.display()));
    }
    Ok(path.to_path_buf())
}

/// Print the end-of-run summary.
///
/// Uses `println!` intentionally: this is the primary CLI output and should
/// be visible regardless of log level.
fn print_run_summary(summary: &PipelineRunSummary, output_dir: &Path) {
    println!();
    println!("{}", "=".repeat(80));
    println!("PIPELINE COMPLETE");
    println!("{}", "=".repeat(80));
    println!();
    println!(
        "Rows: {} loaded -> {} cleaned -> {} feature-engineered",
        summary.rows_loaded, summary.rows_cleaned, summary.rows_engineered
    );
    println!("Makes aggregated:    {}", summary.makes_aggregated);
    println!("Model coefficients:  {}", summary.coefficients_fit);
    println!("Sellers clustered:   {}", summary.sellers_clustered);
    println!("Duration:            {}ms", summary.duration_ms);
    println!();
    println!("Outputs under {}:", output_dir.display());
    for name in [
        CLEANED_FILE,
        FEATURES_FILE,
        MAKE_AGGREGATE_FILE,
        MODEL_SUMMARY_FILE,
        MODEL_COEFFICIENTS_FILE,
        SELLER_CLUSTERS_FILE,
        CLUSTER_CENTERS_FILE,
    ] {
        println!("  - {name}");
    }
    for name in [
        PRICING_SUMMARY_TABLE,
        SELLER_SEGMENTS_TABLE,
        PRICING_TRENDS_TABLE,
        DEMAND_SIGNALS_TABLE,
    ] {
        println!("  - {TABLES_DIR}/{name}");
    }
    println!("{}", "=".repeat(80));
}
