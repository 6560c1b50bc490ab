//! Stage 5: denormalized, BI-consumable tables.
//!
//! Reshapes the feature-engineered transactions and the seller clusters
//! into four flat tables for dashboarding. No new statistics are computed
//! beyond time- and age-bucketed aggregation; the cluster-id-to-label
//! mapping is a fixed business convention, not inferred from data.

use crate::error::{PipelineError, Result};
use crate::schema::{
    CLUSTER, CLUSTER_LABEL, CONDITION, IS_ABOVE_MMR, MAKE, MMR, MODEL, ODOMETER, PRICING_GAP,
    PRICING_GAP_PCT, SALE_DATE, SELLER, SELLING_PRICE, STATE, VEHICLE_AGE,
};
use polars::prelude::*;
use tracing::info;

/// Business labels per cluster id. An id outside this map is a hard error,
/// never a blank label.
pub const CLUSTER_LABELS: &[(u32, &str)] = &[
    (0, "Market-Aligned Sellers"),
    (1, "Opportunistic Sellers"),
    (2, "High-Variance Sellers"),
];

/// Vehicle-age bucket boundaries; each bucket is left-open, right-closed.
const AGE_BUCKETS: &[(i64, i64, &str)] = &[
    (0, 2, "0-2"),
    (2, 5, "3-5"),
    (5, 10, "6-10"),
    (10, 20, "11-20"),
    (20, 50, "20+"),
];

/// The four exported tables.
#[derive(Debug)]
pub struct ExportTables {
    pub vehicle_pricing_summary: DataFrame,
    pub seller_segments: DataFrame,
    pub pricing_trends: DataFrame,
    pub demand_signals: DataFrame,
}

/// Builds the BI export tables.
pub struct Exporter;

impl Exporter {
    /// Produce all four tables from the upstream stage outputs.
    pub fn run(
        &self,
        transactions: &DataFrame,
        seller_clusters: &DataFrame,
    ) -> Result<ExportTables> {
        let transactions = normalize_sale_date(transactions)?;

        let tables = ExportTables {
            vehicle_pricing_summary: self.vehicle_pricing_summary(&transactions)?,
            seller_segments: self.seller_segments(seller_clusters)?,
            pricing_trends: self.pricing_trends(&transactions)?,
            demand_signals: self.demand_signals(&transactions)?,
        };

        info!(
            "Export tables built: {} transactions, {} seller segments, {} months, {} demand cells",
            tables.vehicle_pricing_summary.height(),
            tables.seller_segments.height(),
            tables.pricing_trends.height(),
            tables.demand_signals.height()
        );
        Ok(tables)
    }

    /// Fixed transaction-level projection.
    fn vehicle_pricing_summary(&self, transactions: &DataFrame) -> Result<DataFrame> {
        let summary = transactions.select([
            SALE_DATE,
            MAKE,
            MODEL,
            STATE,
            VEHICLE_AGE,
            SELLING_PRICE,
            MMR,
            PRICING_GAP,
            PRICING_GAP_PCT,
            IS_ABOVE_MMR,
            ODOMETER,
            CONDITION,
            SELLER,
        ])?;
        Ok(summary)
    }

    /// Seller aggregates with human-readable segment labels attached.
    fn seller_segments(&self, seller_clusters: &DataFrame) -> Result<DataFrame> {
        // Validate every id against the fixed map before joining.
        let ids = seller_clusters
            .column(CLUSTER)?
            .as_materialized_series()
            .cast(&DataType::UInt32)?;
        for id in ids.u32()?.into_no_null_iter() {
            if label_for(id).is_none() {
                return Err(PipelineError::UnknownClusterId(id));
            }
        }

        let label_ids: Vec<u32> = CLUSTER_LABELS.iter().map(|(id, _)| *id).collect();
        let label_names: Vec<&str> = CLUSTER_LABELS.iter().map(|(_, name)| *name).collect();
        let labels = df!(
            CLUSTER => label_ids,
            CLUSTER_LABEL => label_names,
        )?;

        let segments = seller_clusters
            .clone()
            .lazy()
            .with_column(col(CLUSTER).cast(DataType::UInt32))
            .join(
                labels.lazy(),
                [col(CLUSTER)],
                [col(CLUSTER)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
        Ok(segments)
    }

    /// Monthly pricing trend: mean gap, share above MMR, volume.
    fn pricing_trends(&self, transactions: &DataFrame) -> Result<DataFrame> {
        let trends = transactions
            .clone()
            .lazy()
            .group_by([col(SALE_DATE).dt().to_string("%Y-%m").alias("sale_month")])
            .agg([
                col(PRICING_GAP).mean().alias("mean_pricing_gap"),
                col(IS_ABOVE_MMR).mean().alias("pct_above_mmr"),
                col(PRICING_GAP).count().alias("transaction_volume"),
            ])
            .sort(["sale_month"], SortMultipleOptions::default())
            .collect()?;
        Ok(trends)
    }

    /// Demand signals bucketed by make and vehicle age. Ages outside every
    /// bucket (zero or negative after the left-open boundary, or past 50)
    /// are excluded from the table.
    fn demand_signals(&self, transactions: &DataFrame) -> Result<DataFrame> {
        let signals = transactions
            .clone()
            .lazy()
            .with_column(age_bucket_expr().alias("vehicle_age_bucket"))
            .drop_nulls(Some(cols(["vehicle_age_bucket"])))
            .group_by([col(MAKE), col("vehicle_age_bucket")])
            .agg([
                col(PRICING_GAP).mean().alias("mean_pricing_gap"),
                col(PRICING_GAP).count().alias("transaction_count"),
            ])
            .sort(
                [MAKE, "vehicle_age_bucket"],
                SortMultipleOptions::default(),
            )
            .collect()?;
        Ok(signals)
    }
}

/// Look up the business label for a cluster id.
pub fn label_for(id: u32) -> Option<&'static str> {
    CLUSTER_LABELS
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .map(|(_, label)| *label)
}

fn age_bucket_expr() -> Expr {
    AGE_BUCKETS
        .iter()
        .rev()
        .fold(lit(NULL), |fallback, &(low, high, label)| {
            when(
                col(VEHICLE_AGE)
                    .gt(lit(low))
                    .and(col(VEHICLE_AGE).lt_eq(lit(high))),
            )
            .then(lit(label))
            .otherwise(fallback)
        })
}

/// The trends/demand aggregations need a real date column; a stage re-read
/// from CSV arrives with strings.
fn normalize_sale_date(transactions: &DataFrame) -> Result<DataFrame> {
    match transactions.column(SALE_DATE)?.dtype() {
        DataType::Date => Ok(transactions.clone()),
        DataType::String => {
            let options = StrptimeOptions {
                format: None,
                strict: false,
                exact: true,
                cache: true,
            };
            let df = transactions
                .clone()
                .lazy()
                .with_column(col(SALE_DATE).str().to_date(options).alias(SALE_DATE))
                .drop_nulls(Some(cols([SALE_DATE])))
                .collect()?;
            Ok(df)
        }
        _ => {
            let df = transactions
                .clone()
                .lazy()
                .with_column(col(SALE_DATE).cast(DataType::Date).alias(SALE_DATE))
                .collect()?;
            Ok(df)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        EXTREME_PRICING_COUNT, LOG_EXTREME_PRICING_COUNT, LOG_PRICING_GAP_VARIANCE,
        MEAN_PRICING_GAP, PRICING_GAP_VARIANCE, TRANSACTION_COUNT,
    };
    use pretty_assertions::assert_eq;

    fn feature_frame() -> DataFrame {
        df!(
            SALE_DATE => ["2015-01-10", "2015-01-25", "2015-02-03"],
            MAKE => ["TOYOTA", "TOYOTA", "FORD"],
            MODEL => ["Camry", "Corolla", "F-150"],
            STATE => ["CA", "CA", "WA"],
            VEHICLE_AGE => [1i64, 4, 25],
            SELLING_PRICE => [20000.0f64, 18000.0, 8000.0],
            MMR => [18000.0f64, 18000.0, 10000.0],
            PRICING_GAP => [2000.0f64, 0.0, -2000.0],
            PRICING_GAP_PCT => [0.1111f64, 0.0, -0.2],
            IS_ABOVE_MMR => [true, false, false],
            ODOMETER => [30000.0f64, 20000.0, 150000.0],
            CONDITION => [4.0f64, 4.5, 2.0],
            SELLER => ["A", "A", "B"],
        )
        .unwrap()
    }

    fn cluster_frame(ids: Vec<u32>) -> DataFrame {
        let n = ids.len();
        df!(
            SELLER => (0..n).map(|i| format!("S{i}")).collect::<Vec<_>>(),
            MEAN_PRICING_GAP => vec![100.0f64; n],
            PRICING_GAP_VARIANCE => vec![50.0f64; n],
            EXTREME_PRICING_COUNT => vec![1u32; n],
            TRANSACTION_COUNT => vec![12u32; n],
            LOG_PRICING_GAP_VARIANCE => vec![3.93f64; n],
            LOG_EXTREME_PRICING_COUNT => vec![0.69f64; n],
            CLUSTER => ids,
        )
        .unwrap()
    }

    #[test]
    fn test_pricing_summary_projection() {
        let tables = Exporter.run(&feature_frame(), &cluster_frame(vec![0, 1])).unwrap();
        let summary = &tables.vehicle_pricing_summary;
        assert_eq!(summary.width(), 13);
        assert_eq!(summary.height(), 3);
        assert_eq!(summary.get_column_names()[0].as_str(), SALE_DATE);
    }

    #[test]
    fn test_segment_labels_applied() {
        let tables = Exporter.run(&feature_frame(), &cluster_frame(vec![0, 2, 1])).unwrap();
        let labels: Vec<&str> = tables
            .seller_segments
            .column(CLUSTER_LABEL)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(
            labels,
            vec![
                "Market-Aligned Sellers",
                "High-Variance Sellers",
                "Opportunistic Sellers"
            ]
        );
    }

    #[test]
    fn test_unknown_cluster_id_is_hard_error() {
        let err = Exporter
            .run(&feature_frame(), &cluster_frame(vec![0, 7]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownClusterId(7)));
    }

    #[test]
    fn test_monthly_trends() {
        let tables = Exporter.run(&feature_frame(), &cluster_frame(vec![0])).unwrap();
        let trends = &tables.pricing_trends;
        assert_eq!(trends.height(), 2);

        let months: Vec<&str> = trends
            .column("sale_month")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(months, vec!["2015-01", "2015-02"]);

        let volume: Vec<u32> = trends
            .column("transaction_volume")
            .unwrap()
            .u32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(volume, vec![2, 1]);

        let pct: Vec<f64> = trends
            .column("pct_above_mmr")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(pct, vec![0.5, 0.0]);
    }

    #[test]
    fn test_demand_signal_buckets() {
        let tables = Exporter.run(&feature_frame(), &cluster_frame(vec![0])).unwrap();
        let signals = &tables.demand_signals;

        let buckets: Vec<&str> = signals
            .column("vehicle_age_bucket")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        // FORD age 25 -> 20+; TOYOTA ages 1 and 4 -> 0-2 and 3-5.
        assert_eq!(buckets, vec!["20+", "0-2", "3-5"]);
    }

    #[test]
    fn test_bucket_zero_to_two_is_left_open() {
        // Age 0 falls outside (0, 2] and must be excluded; age 2 is inside.
        let df = feature_frame()
            .lazy()
            .with_column(
                lit(Series::new(VEHICLE_AGE.into(), [0i64, 2, 60])).alias(VEHICLE_AGE),
            )
            .collect()
            .unwrap();

        let tables = Exporter.run(&df, &cluster_frame(vec![0])).unwrap();
        let signals = &tables.demand_signals;
        assert_eq!(signals.height(), 1);

        let buckets: Vec<&str> = signals
            .column("vehicle_age_bucket")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(buckets, vec!["0-2"]);
    }

    #[test]
    fn test_label_lookup() {
        assert_eq!(label_for(1), Some("Opportunistic Sellers"));
        assert_eq!(label_for(9), None);
    }
}
