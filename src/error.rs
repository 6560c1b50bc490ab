//! Custom error types for the analytics pipeline.
//!
//! The taxonomy separates routine filtering (dropped null rows, unparseable
//! dates) from alarm conditions: schema violations, out-of-range numeric
//! values, residual nulls after a transformation, and degenerate clustering
//! populations all abort the run. No stage retries; a failure is fixed by
//! fixing the input.

use thiserror::Error;

/// The main error type for the analytics pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// One or more required columns are absent from the input table.
    #[error("missing required columns: {missing:?}")]
    SchemaError { missing: Vec<String> },

    /// A numeric sanity assertion failed on rows that survived cleaning.
    /// Indicates corrupted upstream data, not routine noise.
    #[error("data integrity violation: {condition} ({violations} offending rows)")]
    IntegrityError {
        condition: String,
        violations: usize,
    },

    /// A column that must be fully populated after a transformation still
    /// contains nulls.
    #[error("column '{column}' contains {nulls} null values after transformation")]
    ResidualNulls { column: String, nulls: usize },

    /// A cluster id fell outside the fixed label map.
    #[error("cluster id {0} has no business label assigned")]
    UnknownClusterId(u32),

    /// Every seller was removed by the minimum-activity filter.
    #[error("no sellers with at least {min_transactions} transactions remain; nothing to cluster")]
    NoSellersRetained { min_transactions: u32 },

    /// Fewer sellers survived filtering than the requested cluster count.
    #[error("only {sellers} sellers remain after filtering, fewer than the {clusters} requested clusters")]
    TooFewSellers { sellers: usize, clusters: usize },

    /// The regression could not be fit (e.g. singular design matrix).
    #[error("regression failed: {0}")]
    RegressionFailed(String),

    /// K-means failed to converge or was otherwise rejected by the solver.
    #[error("clustering failed: {0}")]
    ClusteringFailed(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error points at corrupted input data rather than an
    /// environment or configuration problem.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaError { .. }
                | Self::IntegrityError { .. }
                | Self::ResidualNulls { .. }
                | Self::NoSellersRetained { .. }
                | Self::TooFewSellers { .. }
        )
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}
