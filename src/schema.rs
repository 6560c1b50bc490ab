//! Column names and required-column sets shared across stages.
//!
//! Stage boundaries are flat CSV tables with fixed column sets; keeping the
//! names here means a rename touches one place.

use crate::error::{PipelineError, Result};
use polars::prelude::*;

pub const YEAR: &str = "year";
pub const MAKE: &str = "make";
pub const MODEL: &str = "model";
pub const BODY: &str = "body";
pub const TRANSMISSION: &str = "transmission";
pub const SELLING_PRICE: &str = "sellingprice";
pub const MMR: &str = "mmr";
pub const ODOMETER: &str = "odometer";
pub const CONDITION: &str = "condition";
pub const SELLER: &str = "seller";
pub const SALE_DATE: &str = "saledate";
pub const STATE: &str = "state";
pub const VIN: &str = "vin";

pub const VEHICLE_AGE: &str = "vehicle_age";
pub const PRICING_GAP: &str = "pricing_gap";
pub const PRICING_GAP_PCT: &str = "pricing_gap_pct";
pub const IS_ABOVE_MMR: &str = "is_above_mmr";

pub const MEAN_PRICING_GAP: &str = "mean_pricing_gap";
pub const PRICING_GAP_VARIANCE: &str = "pricing_gap_variance";
pub const EXTREME_PRICING_COUNT: &str = "extreme_pricing_count";
pub const TRANSACTION_COUNT: &str = "transaction_count";
pub const LOG_PRICING_GAP_VARIANCE: &str = "log_pricing_gap_variance";
pub const LOG_EXTREME_PRICING_COUNT: &str = "log_extreme_pricing_count";
pub const CLUSTER: &str = "cluster";
pub const CLUSTER_LABEL: &str = "cluster_label";

/// Columns the raw transactions file must carry for the cleaner to run.
pub const REQUIRED_RAW_COLUMNS: &[&str] = &[
    YEAR,
    MAKE,
    MODEL,
    SELLING_PRICE,
    MMR,
    ODOMETER,
    CONDITION,
    SELLER,
    SALE_DATE,
    STATE,
];

/// Columns the regression modeler needs on top of the engineered table.
pub const REQUIRED_MODEL_COLUMNS: &[&str] = &[
    PRICING_GAP,
    VEHICLE_AGE,
    ODOMETER,
    CONDITION,
    BODY,
    TRANSMISSION,
    MAKE,
];

/// Fail fast if any of `required` is absent from the frame.
pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    let present: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let missing: Vec<String> = required
        .iter()
        .filter(|name| !present.iter().any(|p| p == *name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SchemaError { missing })
    }
}

/// Error if `column` carries any null; used for values that must be fully
/// populated after a transformation.
pub fn assert_no_nulls(df: &DataFrame, column: &str) -> Result<()> {
    let nulls = df.column(column)?.null_count();
    if nulls > 0 {
        return Err(PipelineError::ResidualNulls {
            column: column.to_string(),
            nulls,
        });
    }
    Ok(())
}

/// Count non-null values in `column` that fail `holds`, after casting to
/// f64. Used by the hard numeric sanity assertions.
pub(crate) fn count_violations(
    df: &DataFrame,
    column: &str,
    holds: fn(f64) -> bool,
) -> Result<usize> {
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .filter(|v| matches!(v, Some(x) if !holds(*x)))
        .count())
}
