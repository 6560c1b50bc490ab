//! Stage 1: validation and cleaning of raw transaction records.
//!
//! Enforces the required column set, drops incomplete rows, normalizes
//! categorical text, parses sale dates (best effort, failures become nulls),
//! removes identifier columns, and asserts numeric sanity. Row-level null
//! filtering is routine; a numeric sanity violation is treated as upstream
//! corruption and aborts the run.

use crate::error::{PipelineError, Result};
use crate::schema::{
    self, MAKE, MMR, ODOMETER, REQUIRED_RAW_COLUMNS, SALE_DATE, SELLING_PRICE, STATE, VIN,
};
use polars::prelude::*;
use tracing::{debug, info};

/// Validator/cleaner for raw marketplace transactions.
pub struct Cleaner;

impl Cleaner {
    /// Clean a raw transactions frame.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SchemaError`] when required columns are
    /// absent and [`PipelineError::IntegrityError`] when surviving rows
    /// violate the numeric sanity assertions.
    pub fn run(&self, df: DataFrame) -> Result<DataFrame> {
        schema::require_columns(&df, REQUIRED_RAW_COLUMNS)?;

        self.log_snapshot(&df)?;
        let initial_rows = df.height();

        // Pricing analysis requires fully observed transactions; partial
        // imputation is out of the question here. The sale date is exempt
        // from the completeness drop: a null there means "unparseable or
        // missing", the row survives to the feature stage (which drops
        // undated rows), and re-running the cleaner on its own output, in
        // memory or through a CSV round trip, changes nothing.
        let completeness_subset: Vec<String> = df
            .get_column_names()
            .iter()
            .filter(|name| name.as_str() != SALE_DATE)
            .map(|name| name.to_string())
            .collect();
        let mut df = df.lazy().drop_nulls(Some(cols(completeness_subset))).collect()?;
        info!(
            "Row count after dropping missing values: {} ({} removed)",
            df.height(),
            initial_rows - df.height()
        );

        let date_expr = parse_saledate_expr(&df)?;
        df = df
            .lazy()
            .with_columns([
                col(MAKE).str().to_uppercase().alias(MAKE),
                col(STATE).str().to_uppercase().alias(STATE),
            ])
            .with_column(date_expr)
            .collect()?;

        let unparsed = df.column(SALE_DATE)?.null_count();
        if unparsed > 0 {
            debug!("{} sale dates could not be parsed and were nulled", unparsed);
        }

        // Vehicle identification numbers are non-analytical.
        if df.get_column_names().iter().any(|c| c.as_str() == VIN) {
            df = df.drop(VIN)?;
            debug!("Dropped identifier column '{}'", VIN);
        }

        self.assert_integrity(&df)?;

        info!("Final cleaned row count: {}", df.height());
        Ok(df)
    }

    /// Diagnostic summary of the raw frame for human audit: shape,
    /// missingness by column, duplicate rows. Not consumed downstream.
    fn log_snapshot(&self, df: &DataFrame) -> Result<()> {
        info!("Initial shape: {:?}", df.shape());

        for column in df.get_columns() {
            let nulls = column.null_count();
            if nulls > 0 {
                info!("Missing values in '{}': {}", column.name(), nulls);
            }
        }

        let duplicates =
            df.height() - df.unique::<&str, &str>(None, UniqueKeepStrategy::First, None)?.height();
        info!("Duplicate rows: {}", duplicates);
        Ok(())
    }

    /// Hard numeric sanity checks. A violation here means corrupted upstream
    /// data that needs investigation, not routine noise to filter.
    fn assert_integrity(&self, df: &DataFrame) -> Result<()> {
        let checks: [(&str, &str, fn(f64) -> bool); 3] = [
            (SELLING_PRICE, "sellingprice > 0", |v| v > 0.0),
            (MMR, "mmr > 0", |v| v > 0.0),
            (ODOMETER, "odometer >= 0", |v| v >= 0.0),
        ];

        for (column, condition, holds) in checks {
            let violations = schema::count_violations(df, column, holds)?;
            if violations > 0 {
                return Err(PipelineError::IntegrityError {
                    condition: condition.to_string(),
                    violations,
                });
            }
        }
        Ok(())
    }
}

/// Best-effort parse of the sale date into a naive datetime.
///
/// The raw feed carries verbose strings like
/// `Tue Dec 16 2014 12:30:00 GMT-0800 (PST)`; the leading portion is matched
/// non-exactly and the offset is discarded (downstream only needs calendar
/// dates). ISO strings from a previous cleaning pass parse through the
/// inferred-format fallback, keeping the cleaner idempotent on its own
/// output. Strings that match neither become nulls, not errors.
fn parse_saledate_expr(df: &DataFrame) -> Result<Expr> {
    if df.column(SALE_DATE)?.dtype() != &DataType::String {
        // Already parsed (e.g. an in-memory rerun); leave untouched.
        return Ok(col(SALE_DATE));
    }

    let verbose = StrptimeOptions {
        format: Some("%a %b %d %Y %H:%M:%S".into()),
        strict: false,
        exact: false,
        cache: true,
    };
    let inferred = StrptimeOptions {
        format: None,
        strict: false,
        exact: true,
        cache: true,
    };

    Ok(coalesce(&[
        col(SALE_DATE)
            .str()
            .to_datetime(Some(TimeUnit::Microseconds), None, verbose, lit("raise")),
        col(SALE_DATE)
            .str()
            .to_datetime(Some(TimeUnit::Microseconds), None, inferred, lit("raise")),
    ])
    .alias(SALE_DATE))
}
