//! Configuration types for the analytics pipeline.
//!
//! Every tunable the pipeline relies on (reference year, activity and
//! extremity thresholds, cluster count, seed) lives here rather than as an
//! embedded literal, so stages can be exercised deterministically on small
//! synthetic datasets.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the analytics pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration with a
/// fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use resale_analytics::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .min_transactions(5)
///     .n_clusters(4)
///     .random_seed(7)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Year used as the basis for vehicle age (`age = reference_year - year`).
    /// Default: 2026
    pub reference_year: i32,

    /// Minimum transaction count for a seller to enter clustering.
    /// Default: 10
    pub min_transactions: u32,

    /// Absolute pricing gap beyond which a transaction counts as an extreme
    /// pricing event, in currency units.
    /// Default: 5000.0
    pub extreme_gap_threshold: f64,

    /// Number of behavioral seller segments.
    /// Default: 3
    pub n_clusters: usize,

    /// Number of k-means restarts used to escape poor local optima.
    /// Default: 20
    pub n_restarts: usize,

    /// Seed for the k-means restart search. Makes repeated runs over the
    /// same data reproducible; cluster id semantics may still differ across
    /// independent datasets.
    /// Default: 42
    pub random_seed: u64,

    /// Directory all stage outputs are written under.
    /// Default: "outputs"
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_year: 2026,
            min_transactions: 10,
            extreme_gap_threshold: 5000.0,
            n_clusters: 3,
            n_restarts: 20,
            random_seed: 42,
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.n_clusters == 0 {
            return Err(ConfigValidationError::InvalidClusterCount(self.n_clusters));
        }

        if self.min_transactions == 0 {
            return Err(ConfigValidationError::InvalidMinTransactions(
                self.min_transactions,
            ));
        }

        if self.n_restarts == 0 {
            return Err(ConfigValidationError::InvalidRestarts(self.n_restarts));
        }

        if self.extreme_gap_threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "extreme_gap_threshold".to_string(),
                value: self.extreme_gap_threshold,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid cluster count: {0} (must be at least 1)")]
    InvalidClusterCount(usize),

    #[error("Invalid minimum transaction count: {0} (must be at least 1)")]
    InvalidMinTransactions(u32),

    #[error("Invalid restart count: {0} (must be at least 1)")]
    InvalidRestarts(usize),

    #[error("Invalid threshold for '{field}': {value} (must be positive)")]
    InvalidThreshold { field: String, value: f64 },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    reference_year: Option<i32>,
    min_transactions: Option<u32>,
    extreme_gap_threshold: Option<f64>,
    n_clusters: Option<usize>,
    n_restarts: Option<usize>,
    random_seed: Option<u64>,
    output_dir: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    /// Set the reference year vehicle age is computed against.
    pub fn reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// Set the minimum transaction count for sellers to be clustered.
    pub fn min_transactions(mut self, count: u32) -> Self {
        self.min_transactions = Some(count);
        self
    }

    /// Set the absolute pricing-gap threshold for extreme pricing events.
    pub fn extreme_gap_threshold(mut self, threshold: f64) -> Self {
        self.extreme_gap_threshold = Some(threshold);
        self
    }

    /// Set the number of seller segments.
    pub fn n_clusters(mut self, k: usize) -> Self {
        self.n_clusters = Some(k);
        self
    }

    /// Set the number of k-means restarts.
    pub fn n_restarts(mut self, runs: usize) -> Self {
        self.n_restarts = Some(runs);
        self
    }

    /// Set the seed for the clustering restart search.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Set the output directory for stage results.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            reference_year: self.reference_year.unwrap_or(defaults.reference_year),
            min_transactions: self.min_transactions.unwrap_or(defaults.min_transactions),
            extreme_gap_threshold: self
                .extreme_gap_threshold
                .unwrap_or(defaults.extreme_gap_threshold),
            n_clusters: self.n_clusters.unwrap_or(defaults.n_clusters),
            n_restarts: self.n_restarts.unwrap_or(defaults.n_restarts),
            random_seed: self.random_seed.unwrap_or(defaults.random_seed),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.reference_year, 2026);
        assert_eq!(config.min_transactions, 10);
        assert_eq!(config.extreme_gap_threshold, 5000.0);
        assert_eq!(config.n_clusters, 3);
        assert_eq!(config.n_restarts, 20);
        assert_eq!(config.random_seed, 42);
    }

    #[test]
    fn test_builder_defaults() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.n_clusters, 3);
        assert_eq!(config.min_transactions, 10);
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .reference_year(2030)
            .min_transactions(5)
            .extreme_gap_threshold(2500.0)
            .n_clusters(4)
            .n_restarts(50)
            .random_seed(7)
            .output_dir("custom_out")
            .build()
            .unwrap();

        assert_eq!(config.reference_year, 2030);
        assert_eq!(config.min_transactions, 5);
        assert_eq!(config.extreme_gap_threshold, 2500.0);
        assert_eq!(config.n_clusters, 4);
        assert_eq!(config.n_restarts, 50);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.output_dir.to_str().unwrap(), "custom_out");
    }

    #[test]
    fn test_validation_zero_clusters() {
        let result = PipelineConfig::builder().n_clusters(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidClusterCount(0)
        ));
    }

    #[test]
    fn test_validation_zero_min_transactions() {
        let result = PipelineConfig::builder().min_transactions(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidMinTransactions(0)
        ));
    }

    #[test]
    fn test_validation_negative_threshold() {
        let result = PipelineConfig::builder().extreme_gap_threshold(-1.0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold { .. }
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.reference_year, deserialized.reference_year);
        assert_eq!(config.random_seed, deserialized.random_seed);
        assert_eq!(config.output_dir, deserialized.output_dir);
    }
}
