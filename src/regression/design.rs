//! Design-matrix construction for the pricing-gap regression.
//!
//! Continuous predictors enter as-is; categoricals use baseline (treatment)
//! encoding: levels are sorted, the first level is the implicit reference,
//! and every other level gets a 0/1 indicator whose coefficient reads as an
//! offset from that baseline.

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// A fitted-ready design: predictor names aligned with the columns of `x`.
#[derive(Debug)]
pub struct DesignMatrix {
    pub names: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

/// Build the design matrix with an intercept, the given continuous
/// predictors, and baseline-encoded categorical predictors.
pub fn build_design(
    df: &DataFrame,
    target: &str,
    continuous: &[&str],
    categorical: &[&str],
) -> Result<DesignMatrix> {
    let n = df.height();

    let mut names = vec!["Intercept".to_string()];
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];

    for &name in continuous {
        columns.push(numeric_column(df, name)?);
        names.push(name.to_string());
    }

    for &name in categorical {
        let values = string_column(df, name)?;
        let mut levels: Vec<&str> = values.iter().map(String::as_str).collect();
        levels.sort_unstable();
        levels.dedup();

        if levels.len() < 2 {
            // A single-level categorical adds no information beyond the
            // intercept and would make the design singular.
            continue;
        }

        // First sorted level is the baseline.
        for level in levels.iter().skip(1) {
            let indicator: Vec<f64> = values
                .iter()
                .map(|v| if v == level { 1.0 } else { 0.0 })
                .collect();
            columns.push(indicator);
            names.push(format!("{name}[T.{level}]"));
        }
    }

    let p = columns.len();
    let mut x = Array2::<f64>::zeros((n, p));
    for (j, column) in columns.iter().enumerate() {
        for (i, v) in column.iter().enumerate() {
            x[(i, j)] = *v;
        }
    }

    let y = Array1::from_vec(numeric_column(df, target)?);

    Ok(DesignMatrix { names, x, y })
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let ca = series.f64()?;
    if ca.null_count() > 0 {
        return Err(PipelineError::ResidualNulls {
            column: name.to_string(),
            nulls: ca.null_count(),
        });
    }
    Ok(ca.into_no_null_iter().collect())
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let ca = series.str()?;
    if ca.null_count() > 0 {
        return Err(PipelineError::ResidualNulls {
            column: name.to_string(),
            nulls: ca.null_count(),
        });
    }
    Ok(ca.into_no_null_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_baseline_encoding_drops_first_level() {
        let df = df!(
            "y" => [1.0f64, 2.0, 3.0],
            "x" => [0.5f64, 1.5, 2.5],
            "body" => ["SUV", "Coupe", "Sedan"],
        )
        .unwrap();

        let design = build_design(&df, "y", &["x"], &["body"]).unwrap();
        // Coupe sorts first and becomes the baseline.
        assert_eq!(
            design.names,
            vec!["Intercept", "x", "body[T.SUV]", "body[T.Sedan]"]
        );
        assert_eq!(design.x.shape(), &[3, 4]);
        // Row 0 is an SUV.
        assert_eq!(design.x[(0, 2)], 1.0);
        assert_eq!(design.x[(0, 3)], 0.0);
        // Row 1 is the baseline Coupe: both indicators zero.
        assert_eq!(design.x[(1, 2)], 0.0);
        assert_eq!(design.x[(1, 3)], 0.0);
    }

    #[test]
    fn test_single_level_categorical_skipped() {
        let df = df!(
            "y" => [1.0f64, 2.0],
            "x" => [0.0f64, 1.0],
            "transmission" => ["automatic", "automatic"],
        )
        .unwrap();

        let design = build_design(&df, "y", &["x"], &["transmission"]).unwrap();
        assert_eq!(design.names, vec!["Intercept", "x"]);
    }

    #[test]
    fn test_null_in_predictor_is_an_error() {
        let df = df!(
            "y" => [1.0f64, 2.0],
            "x" => [Some(0.0f64), None],
        )
        .unwrap();

        assert!(matches!(
            build_design(&df, "y", &["x"], &[]).unwrap_err(),
            PipelineError::ResidualNulls { .. }
        ));
    }
}
