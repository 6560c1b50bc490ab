//! Stage 3: OLS regression of pricing gap on vehicle attributes.
//!
//! Fits `pricing_gap ~ vehicle_age + odometer + condition + C(body) +
//! C(transmission) + C(make)` and reports coefficients with standard
//! errors, t statistics, and two-sided p-values. Positive coefficients
//! indicate systematic overpricing or excess demand relative to the
//! baseline; negative ones indicate discounting or weak demand. The stage
//! is read-only over its input.

mod design;
mod summary;

pub use design::{DesignMatrix, build_design};
pub use summary::render_summary;

use crate::error::{PipelineError, Result};
use crate::schema::{
    self, BODY, CONDITION, MAKE, MMR, ODOMETER, PRICING_GAP, REQUIRED_MODEL_COLUMNS, TRANSMISSION,
    VEHICLE_AGE,
};
use ndarray::Array2;
use polars::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::info;

/// One fitted coefficient with its inference statistics.
#[derive(Debug, Clone)]
pub struct Coefficient {
    pub feature: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// Result of an OLS fit.
#[derive(Debug)]
pub struct RegressionResult {
    pub coefficients: Vec<Coefficient>,
    pub n_observations: usize,
    pub dof_residuals: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
}

impl RegressionResult {
    /// Flat feature -> coefficient table, the reusable output contract.
    pub fn coefficient_table(&self) -> Result<DataFrame> {
        let features: Vec<&str> = self.coefficients.iter().map(|c| c.feature.as_str()).collect();
        let estimates: Vec<f64> = self.coefficients.iter().map(|c| c.estimate).collect();
        let df = df!(
            "feature" => features,
            "coefficient" => estimates,
        )?;
        Ok(df)
    }
}

/// Fits the explanatory pricing-gap model.
pub struct RegressionModeler;

impl RegressionModeler {
    /// Fit the model over a feature-engineered frame.
    pub fn run(&self, df: &DataFrame) -> Result<RegressionResult> {
        schema::require_columns(df, REQUIRED_MODEL_COLUMNS)?;
        schema::assert_no_nulls(df, PRICING_GAP)?;
        schema::assert_no_nulls(df, MMR)?;

        let design = build_design(
            df,
            PRICING_GAP,
            &[VEHICLE_AGE, ODOMETER, CONDITION],
            &[BODY, TRANSMISSION, MAKE],
        )?;

        let result = fit_ols(&design)?;
        info!(
            "OLS fit: {} observations, {} parameters, R^2 = {:.4}",
            result.n_observations,
            result.coefficients.len(),
            result.r_squared
        );
        Ok(result)
    }
}

/// Ordinary least squares via the normal equations, with classical
/// inference statistics derived from the inverse Gram matrix.
fn fit_ols(design: &DesignMatrix) -> Result<RegressionResult> {
    let n = design.x.nrows();
    let p = design.x.ncols();

    if n <= p {
        return Err(PipelineError::RegressionFailed(format!(
            "{n} observations cannot identify {p} parameters"
        )));
    }

    let xt = design.x.t();
    let xtx = xt.dot(&design.x);
    let xty = xt.dot(&design.y);

    let xtx_inv = invert(&xtx).ok_or_else(|| {
        PipelineError::RegressionFailed(
            "design matrix is singular (perfectly collinear predictors)".to_string(),
        )
    })?;
    let beta = xtx_inv.dot(&xty);

    let fitted = design.x.dot(&beta);
    let residuals = &design.y - &fitted;
    let rss: f64 = residuals.iter().map(|r| r * r).sum();

    let y_mean = design.y.mean().unwrap_or(0.0);
    let tss: f64 = design.y.iter().map(|v| (v - y_mean).powi(2)).sum();

    let dof = n - p;
    let sigma2 = rss / dof as f64;

    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * ((n - 1) as f64 / dof as f64);

    let t_dist = StudentsT::new(0.0, 1.0, dof as f64)
        .map_err(|e| PipelineError::RegressionFailed(e.to_string()))?;

    let coefficients = design
        .names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let std_error = (sigma2 * xtx_inv[(i, i)]).sqrt();
            let t_value = if std_error > 0.0 {
                beta[i] / std_error
            } else {
                0.0
            };
            let p_value = 2.0 * (1.0 - t_dist.cdf(t_value.abs()));
            Coefficient {
                feature: name.clone(),
                estimate: beta[i],
                std_error,
                t_value,
                p_value,
            }
        })
        .collect();

    Ok(RegressionResult {
        coefficients,
        n_observations: n,
        dof_residuals: dof,
        r_squared,
        adj_r_squared,
    })
}

/// Gauss-Jordan inversion with partial pivoting. Returns `None` when the
/// matrix is numerically singular. The Gram matrix here is small (a handful
/// of continuous slopes plus one column per non-baseline category level),
/// so no factorization library is warranted.
fn invert(a: &Array2<f64>) -> Option<Array2<f64>> {
    let p = a.nrows();
    let mut work = a.clone();
    let mut inv = Array2::<f64>::eye(p);

    for col in 0..p {
        // Partial pivot.
        let mut pivot_row = col;
        let mut pivot_mag = work[(col, col)].abs();
        for row in (col + 1)..p {
            let mag = work[(row, col)].abs();
            if mag > pivot_mag {
                pivot_row = row;
                pivot_mag = mag;
            }
        }
        if pivot_mag < 1e-10 {
            return None;
        }
        if pivot_row != col {
            for j in 0..p {
                work.swap((col, j), (pivot_row, j));
                inv.swap((col, j), (pivot_row, j));
            }
        }

        let pivot = work[(col, col)];
        for j in 0..p {
            work[(col, j)] /= pivot;
            inv[(col, j)] /= pivot;
        }

        for row in 0..p {
            if row == col {
                continue;
            }
            let factor = work[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in 0..p {
                work[(row, j)] -= factor * work[(col, j)];
                inv[(row, j)] -= factor * inv[(col, j)];
            }
        }
    }

    Some(inv)
}
