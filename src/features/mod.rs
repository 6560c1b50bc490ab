//! Stage 2: derived pricing-efficiency features and make-level summaries.
//!
//! Adds vehicle age, pricing gap, pricing-gap percentage, and the above-MMR
//! indicator to the cleaned transactions, normalizes the sale date to
//! calendar-date granularity, and aggregates pricing metrics by make for
//! dashboard consumption.

use crate::error::{PipelineError, Result};
use crate::schema::{
    self, IS_ABOVE_MMR, MAKE, MMR, PRICING_GAP, PRICING_GAP_PCT, SALE_DATE, SELLING_PRICE,
    VEHICLE_AGE, YEAR,
};
use polars::prelude::*;
use tracing::{debug, info};

/// Output of the feature-building stage.
#[derive(Debug)]
pub struct FeatureOutput {
    /// Per-transaction table with derived analytical columns.
    pub transactions: DataFrame,
    /// Pricing metrics aggregated by make.
    pub make_summary: DataFrame,
}

/// Derives analytical columns and the make-level aggregate.
pub struct FeatureBuilder {
    reference_year: i32,
}

impl FeatureBuilder {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    /// Build features over a cleaned transactions frame.
    ///
    /// # Errors
    ///
    /// Negative vehicle ages and residual nulls in the derived pricing
    /// columns are hard errors; rows whose sale date cannot be normalized
    /// to a calendar date are silently dropped.
    pub fn run(&self, df: DataFrame) -> Result<FeatureOutput> {
        schema::require_columns(&df, &[YEAR, MAKE, SELLING_PRICE, MMR, SALE_DATE])?;

        let before = df.height();
        let date_expr = calendar_date_expr(&df)?;
        let mut df = df
            .lazy()
            .with_columns([
                (lit(self.reference_year as i64) - col(YEAR)).alias(VEHICLE_AGE),
                (col(SELLING_PRICE) - col(MMR)).alias(PRICING_GAP),
            ])
            .with_columns([
                (col(PRICING_GAP) / col(MMR)).alias(PRICING_GAP_PCT),
                col(PRICING_GAP).gt(lit(0.0)).alias(IS_ABOVE_MMR),
            ])
            .with_column(date_expr)
            .collect()?;

        // Guards against bad model-year data slipping through cleaning.
        let negative_ages = schema::count_violations(&df, VEHICLE_AGE, |v| v >= 0.0)?;
        if negative_ages > 0 {
            return Err(PipelineError::IntegrityError {
                condition: "vehicle_age >= 0".to_string(),
                violations: negative_ages,
            });
        }

        // The cleaner enforced mmr > 0, so both derived columns must be
        // fully populated; a residual null means something upstream broke.
        schema::assert_no_nulls(&df, PRICING_GAP)?;
        schema::assert_no_nulls(&df, PRICING_GAP_PCT)?;

        df = df.lazy().drop_nulls(Some(cols([SALE_DATE]))).collect()?;
        let dropped_dates = before - df.height();
        if dropped_dates > 0 {
            debug!("Dropped {} rows with unusable sale dates", dropped_dates);
        }

        let make_summary = self.aggregate_by_make(&df)?;

        info!(
            "Feature engineering complete: {} transactions, {} makes",
            df.height(),
            make_summary.height()
        );

        Ok(FeatureOutput {
            transactions: df,
            make_summary,
        })
    }

    /// Aggregate pricing metrics by make: systematic over/underpricing per
    /// brand is the high-level demand signal the dashboards lead with.
    fn aggregate_by_make(&self, df: &DataFrame) -> Result<DataFrame> {
        let summary = df
            .clone()
            .lazy()
            .group_by([col(MAKE)])
            .agg([
                col(SELLING_PRICE).mean().alias("avg_selling_price"),
                col(MMR).mean().alias("avg_mmr"),
                col(PRICING_GAP).mean().alias("avg_pricing_gap"),
                col(PRICING_GAP_PCT).mean().alias("avg_pricing_gap_pct"),
                col(IS_ABOVE_MMR).mean().alias("pct_above_mmr"),
                col(VEHICLE_AGE).mean().alias("avg_vehicle_age"),
                col(SELLING_PRICE).count().alias("transaction_count"),
            ])
            .sort([MAKE], SortMultipleOptions::default())
            .collect()?;
        Ok(summary)
    }
}

/// Normalize the sale date to a pure calendar date, discarding time of day.
/// String inputs (a stage re-read from CSV) are parsed first; parse
/// failures become nulls and are dropped by the caller.
fn calendar_date_expr(df: &DataFrame) -> Result<Expr> {
    let expr = match df.column(SALE_DATE)?.dtype() {
        DataType::String => {
            let options = StrptimeOptions {
                format: None,
                strict: false,
                exact: true,
                cache: true,
            };
            col(SALE_DATE)
                .str()
                .to_datetime(Some(TimeUnit::Microseconds), None, options, lit("raise"))
                .cast(DataType::Date)
        }
        DataType::Date => col(SALE_DATE),
        _ => col(SALE_DATE).cast(DataType::Date),
    };
    Ok(expr.alias(SALE_DATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CONDITION, MODEL, ODOMETER, SELLER, STATE};
    use pretty_assertions::assert_eq;

    fn cleaned_frame() -> DataFrame {
        df!(
            YEAR => [2018i64, 2020, 2010],
            MAKE => ["TOYOTA", "TOYOTA", "FORD"],
            MODEL => ["Camry", "Corolla", "F-150"],
            SELLING_PRICE => [20000.0f64, 18000.0, 8000.0],
            MMR => [18000.0f64, 18000.0, 10000.0],
            ODOMETER => [30000.0f64, 20000.0, 150000.0],
            CONDITION => [4.0f64, 4.5, 2.0],
            SELLER => ["A", "A", "B"],
            SALE_DATE => ["2015-06-01T09:30:00", "2015-06-15T10:00:00", "2014-01-20T08:00:00"],
            STATE => ["CA", "CA", "WA"],
        )
        .unwrap()
    }

    #[test]
    fn test_derived_columns_exact() {
        let out = FeatureBuilder::new(2026).run(cleaned_frame()).unwrap();
        let df = &out.transactions;

        let gaps: Vec<f64> = df.column(PRICING_GAP).unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(gaps, vec![2000.0, 0.0, -2000.0]);

        let pcts: Vec<f64> = df.column(PRICING_GAP_PCT).unwrap().f64().unwrap().into_no_null_iter().collect();
        assert!((pcts[0] - 2000.0 / 18000.0).abs() < 1e-12);
        assert_eq!(pcts[1], 0.0);

        let above: Vec<bool> = df.column(IS_ABOVE_MMR).unwrap().bool().unwrap().into_no_null_iter().collect();
        assert_eq!(above, vec![true, false, false]);

        let ages: Vec<i64> = df.column(VEHICLE_AGE).unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(ages, vec![8, 6, 16]);
    }

    #[test]
    fn test_sale_date_normalized_to_calendar_date() {
        let out = FeatureBuilder::new(2026).run(cleaned_frame()).unwrap();
        assert_eq!(
            out.transactions.column(SALE_DATE).unwrap().dtype(),
            &DataType::Date
        );
    }

    #[test]
    fn test_unusable_dates_dropped() {
        let df = cleaned_frame()
            .lazy()
            .with_column(
                lit(Series::new(
                    SALE_DATE.into(),
                    [Some("2015-06-01T09:30:00"), None, Some("garbage")],
                ))
                .alias(SALE_DATE),
            )
            .collect()
            .unwrap();

        let out = FeatureBuilder::new(2026).run(df).unwrap();
        assert_eq!(out.transactions.height(), 1);
    }

    #[test]
    fn test_future_model_year_fails() {
        let out = FeatureBuilder::new(2015).run(cleaned_frame());
        match out.unwrap_err() {
            PipelineError::IntegrityError { condition, .. } => {
                assert_eq!(condition, "vehicle_age >= 0");
            }
            other => panic!("expected IntegrityError, got {other:?}"),
        }
    }

    #[test]
    fn test_make_summary_values() {
        let out = FeatureBuilder::new(2026).run(cleaned_frame()).unwrap();
        let summary = &out.make_summary;
        assert_eq!(summary.height(), 2);

        // Sorted by make: FORD first.
        let makes: Vec<&str> = summary.column(MAKE).unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(makes, vec!["FORD", "TOYOTA"]);

        let avg_gap: Vec<f64> = summary
            .column("avg_pricing_gap")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(avg_gap, vec![-2000.0, 1000.0]);

        let counts: Vec<u32> = summary
            .column("transaction_count")
            .unwrap()
            .u32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(counts, vec![1, 2]);

        let pct_above: Vec<f64> = summary
            .column("pct_above_mmr")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(pct_above, vec![0.0, 0.5]);
    }
}
