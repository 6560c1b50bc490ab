//! Human-readable rendering of the fitted regression.

use super::RegressionResult;

/// Render the full statistical summary as plain text, suitable for
/// `model_summary.txt`.
pub fn render_summary(result: &RegressionResult) -> String {
    let mut out = String::new();

    out.push_str(&"=".repeat(78));
    out.push('\n');
    out.push_str("OLS Regression Results: pricing_gap\n");
    out.push_str(&"=".repeat(78));
    out.push('\n');
    out.push_str(&format!(
        "Observations: {:<10} Residual dof: {:<10}\n",
        result.n_observations, result.dof_residuals
    ));
    out.push_str(&format!(
        "R-squared:    {:<10.4} Adj. R-squared: {:.4}\n",
        result.r_squared, result.adj_r_squared
    ));
    out.push_str(&"-".repeat(78));
    out.push('\n');
    out.push_str(&format!(
        "{:<36} {:>12} {:>10} {:>8} {:>8}\n",
        "feature", "coef", "std err", "t", "P>|t|"
    ));
    out.push_str(&"-".repeat(78));
    out.push('\n');

    for coef in &result.coefficients {
        out.push_str(&format!(
            "{:<36} {:>12.4} {:>10.4} {:>8.3} {:>8.3}\n",
            truncate(&coef.feature, 36),
            coef.estimate,
            coef.std_error,
            coef.t_value,
            coef.p_value
        ));
    }

    out.push_str(&"=".repeat(78));
    out.push('\n');
    out.push_str("\nInterpretation notes:\n");
    out.push_str("- Positive coefficients indicate systematic overpricing / excess demand\n");
    out.push_str("- Negative coefficients indicate discounting or weak demand\n");
    out.push_str("- Categorical effects are relative to the baseline category per variable\n");

    out
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    // Back off to a char boundary so multi-byte level names cannot panic.
    let mut end = max_len - 3;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::Coefficient;

    #[test]
    fn test_summary_contains_coefficients_and_fit() {
        let result = RegressionResult {
            coefficients: vec![
                Coefficient {
                    feature: "Intercept".to_string(),
                    estimate: 120.5,
                    std_error: 10.0,
                    t_value: 12.05,
                    p_value: 0.0001,
                },
                Coefficient {
                    feature: "vehicle_age".to_string(),
                    estimate: -45.2,
                    std_error: 3.1,
                    t_value: -14.58,
                    p_value: 0.0,
                },
            ],
            n_observations: 500,
            dof_residuals: 498,
            r_squared: 0.42,
            adj_r_squared: 0.41,
        };

        let text = render_summary(&result);
        assert!(text.contains("Intercept"));
        assert!(text.contains("vehicle_age"));
        assert!(text.contains("Observations: 500"));
        assert!(text.contains("0.4200"));
        assert!(text.contains("baseline category"));
    }

    #[test]
    fn test_truncate_long_feature_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("averyveryverylongname", 10), "averyve...");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // The cut point lands inside the two-byte 'É' and must back off.
        assert_eq!(truncate("ABÉCDE", 6), "AB...");
        assert_eq!(truncate("CITROËN C3 AIRCROSS PICASSO LONG", 10), "CITROË...");
    }
}
