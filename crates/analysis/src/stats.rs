//! Hypothesis tests used by the comparator.
//!
//! Each test returns `None` when its statistic is undefined for the given
//! samples (too few observations, zero spread, degenerate tables).

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};
use statrs::statistics::Statistics;

/// Alternative hypothesis for a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    TwoSided,
    /// First sample's mean is larger
    Greater,
    /// First sample's mean is smaller
    Less,
}

/// Statistic and p-value of one test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Chi-square test of independence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
    /// Expected frequencies under independence
    pub expected: Vec<Vec<f64>>,
}

impl ChiSquareResult {
    pub fn as_test_result(&self) -> TestResult {
        TestResult {
            statistic: self.statistic,
            p_value: self.p_value,
        }
    }
}

/// Outcome of comparing a p-value with alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Significance {
    Significant,
    NotSignificant,
    /// The test could not be computed
    Undetermined,
}

impl Significance {
    pub fn classify(p_value: Option<f64>, alpha: f64) -> Self {
        match p_value {
            Some(p) if p.is_nan() => Self::Undetermined,
            Some(p) if p < alpha => Self::Significant,
            Some(_) => Self::NotSignificant,
            None => Self::Undetermined,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Significant => "significant",
            Self::NotSignificant => "not significant",
            Self::Undetermined => "undetermined",
        }
    }
}

impl std::fmt::Display for Significance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample mean and unbiased variance; `None` below two observations.
fn mean_var(sample: &[f64]) -> Option<(f64, f64)> {
    if sample.len() < 2 {
        return None;
    }
    Some((sample.iter().mean(), sample.iter().variance()))
}

fn p_value_t(t: f64, df: f64, alternative: Alternative) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(match alternative {
        Alternative::TwoSided => 2.0 * dist.sf(t.abs()),
        Alternative::Greater => dist.sf(t),
        Alternative::Less => dist.cdf(t),
    })
}

fn finite(result: TestResult) -> Option<TestResult> {
    (result.statistic.is_finite() && result.p_value.is_finite()).then_some(result)
}

/// Pooled two-proportion z-test, two-sided.
///
/// `count[i]` successes out of `nobs[i]` trials; the statistic is for
/// `p0 - p1`.
pub fn two_proportion_ztest(count: [u64; 2], nobs: [u64; 2]) -> Option<TestResult> {
    if nobs[0] == 0 || nobs[1] == 0 {
        return None;
    }
    let (n0, n1) = (nobs[0] as f64, nobs[1] as f64);
    let p0 = count[0] as f64 / n0;
    let p1 = count[1] as f64 / n1;
    let pooled = (count[0] + count[1]) as f64 / (n0 + n1);
    let variance = pooled * (1.0 - pooled) * (1.0 / n0 + 1.0 / n1);
    if variance <= 0.0 {
        return None;
    }

    let z = (p0 - p1) / variance.sqrt();
    let normal = Normal::new(0.0, 1.0).ok()?;
    finite(TestResult {
        statistic: z,
        p_value: 2.0 * normal.sf(z.abs()),
    })
}

/// Welch's unequal-variance t-test for `a - b`.
pub fn welch_ttest(a: &[f64], b: &[f64], alternative: Alternative) -> Option<TestResult> {
    let (mean_a, var_a) = mean_var(a)?;
    let (mean_b, var_b) = mean_var(b)?;
    let (na, nb) = (a.len() as f64, b.len() as f64);

    let se_a = var_a / na;
    let se_b = var_b / nb;
    let se = se_a + se_b;
    if se <= 0.0 {
        return None;
    }

    let t = (mean_a - mean_b) / se.sqrt();
    let df = se * se / (se_a * se_a / (na - 1.0) + se_b * se_b / (nb - 1.0));
    finite(TestResult {
        statistic: t,
        p_value: p_value_t(t, df, alternative)?,
    })
}

/// Student's pooled-variance two-sample t-test for `a - b`.
pub fn student_ttest(a: &[f64], b: &[f64], alternative: Alternative) -> Option<TestResult> {
    let (mean_a, var_a) = mean_var(a)?;
    let (mean_b, var_b) = mean_var(b)?;
    let (na, nb) = (a.len() as f64, b.len() as f64);

    let df = na + nb - 2.0;
    let pooled = ((na - 1.0) * var_a + (nb - 1.0) * var_b) / df;
    let se = (pooled * (1.0 / na + 1.0 / nb)).sqrt();
    if se <= 0.0 {
        return None;
    }

    let t = (mean_a - mean_b) / se;
    finite(TestResult {
        statistic: t,
        p_value: p_value_t(t, df, alternative)?,
    })
}

/// One-sample t-test of the sample mean against `population_mean`, two-sided.
pub fn one_sample_ttest(sample: &[f64], population_mean: f64) -> Option<TestResult> {
    let (mean, var) = mean_var(sample)?;
    let n = sample.len() as f64;
    let se = (var / n).sqrt();
    if se <= 0.0 {
        return None;
    }

    let t = (mean - population_mean) / se;
    finite(TestResult {
        statistic: t,
        p_value: p_value_t(t, n - 1.0, Alternative::TwoSided)?,
    })
}

/// Chi-square test of independence on an r x c contingency table.
///
/// With one degree of freedom and `yates` set, each observed count is moved
/// up to 0.5 towards its expected value before the statistic is formed.
pub fn chi_square_independence(table: &[Vec<u64>], yates: bool) -> Option<ChiSquareResult> {
    let rows = table.len();
    let cols = table.first()?.len();
    if rows < 2 || cols < 2 || table.iter().any(|r| r.len() != cols) {
        return None;
    }

    let row_totals: Vec<f64> = table.iter().map(|r| r.iter().sum::<u64>() as f64).collect();
    let col_totals: Vec<f64> = (0..cols)
        .map(|j| table.iter().map(|r| r[j]).sum::<u64>() as f64)
        .collect();
    let total: f64 = row_totals.iter().sum();
    if row_totals.iter().chain(col_totals.iter()).any(|t| *t == 0.0) {
        return None;
    }

    let expected: Vec<Vec<f64>> = row_totals
        .iter()
        .map(|r| col_totals.iter().map(|c| r * c / total).collect())
        .collect();
    let dof = (rows - 1) * (cols - 1);
    let correct = yates && dof == 1;

    let mut statistic = 0.0;
    for (observed_row, expected_row) in table.iter().zip(&expected) {
        for (&observed, &e) in observed_row.iter().zip(expected_row) {
            let mut o = observed as f64;
            if correct {
                let diff = e - o;
                o += diff.signum() * diff.abs().min(0.5);
            }
            statistic += (o - e).powi(2) / e;
        }
    }

    let dist = ChiSquared::new(dof as f64).ok()?;
    let p_value = dist.sf(statistic);
    if !statistic.is_finite() || !p_value.is_finite() {
        return None;
    }
    Some(ChiSquareResult {
        statistic,
        p_value,
        dof,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: f64, expected: f64, tol: f64) -> bool {
        (actual - expected).abs() < tol
    }

    #[test]
    fn test_ztest_reference_value() {
        let result = two_proportion_ztest([40, 60], [100, 120]).unwrap();
        assert!(close(result.statistic, -1.4832, 1e-3), "z = {}", result.statistic);
        assert!(close(result.p_value, 0.1380, 1e-3), "p = {}", result.p_value);
    }

    #[test]
    fn test_ztest_is_deterministic() {
        let a = two_proportion_ztest([40, 60], [100, 120]).unwrap();
        let b = two_proportion_ztest([40, 60], [100, 120]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ztest_degenerate() {
        assert!(two_proportion_ztest([0, 0], [10, 10]).is_none());
        assert!(two_proportion_ztest([1, 0], [0, 10]).is_none());
    }

    #[test]
    fn test_welch_reference_value() {
        // scipy.stats.ttest_ind(a, b, equal_var=False)
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0, 12.0];
        let result = welch_ttest(&a, &b, Alternative::TwoSided).unwrap();
        assert!(close(result.statistic, -2.3764, 1e-3), "t = {}", result.statistic);
        assert!(close(result.p_value, 0.0493, 1e-3), "p = {}", result.p_value);
    }

    #[test]
    fn test_welch_needs_two_observations() {
        assert!(welch_ttest(&[1.0], &[1.0, 2.0], Alternative::TwoSided).is_none());
        assert!(welch_ttest(&[3.0, 3.0], &[3.0, 3.0], Alternative::TwoSided).is_none());
    }

    #[test]
    fn test_student_one_sided() {
        let test = [12.0, 14.0, 15.0, 16.0, 18.0];
        let control = [10.0, 11.0, 12.0, 13.0, 14.0];
        let greater = student_ttest(&test, &control, Alternative::Greater).unwrap();
        let two_sided = student_ttest(&test, &control, Alternative::TwoSided).unwrap();

        assert!(greater.statistic > 0.0);
        assert!(close(greater.p_value * 2.0, two_sided.p_value, 1e-9));
        // t = 3 / sqrt(1.5), df = 8
        assert!(close(greater.statistic, 2.4495, 1e-3));
        assert!(close(greater.p_value, 0.0200, 1e-3), "p = {}", greater.p_value);

        let less = student_ttest(&test, &control, Alternative::Less).unwrap();
        assert!(close(less.p_value, 1.0 - greater.p_value, 1e-9));
    }

    #[test]
    fn test_one_sample_reference_value() {
        let sample = [5.0, 7.0, 9.0, 11.0];
        let result = one_sample_ttest(&sample, 5.0).unwrap();
        // mean 8, sd 2.582, se 1.291 → t = 2.3238, df = 3
        assert!(close(result.statistic, 2.3238, 1e-3), "t = {}", result.statistic);
        assert!(close(result.p_value, 0.1027, 1e-3), "p = {}", result.p_value);
        assert_eq!(one_sample_ttest(&sample, 5.0), Some(result));
    }

    #[test]
    fn test_one_sample_degenerate() {
        assert!(one_sample_ttest(&[4.0], 5.0).is_none());
        assert!(one_sample_ttest(&[4.0, 4.0, 4.0], 5.0).is_none());
    }

    #[test]
    fn test_chi_square_with_yates() {
        // scipy.stats.chi2_contingency([[90, 10], [70, 30]])
        let table = vec![vec![90, 10], vec![70, 30]];
        let result = chi_square_independence(&table, true).unwrap();
        assert_eq!(result.dof, 1);
        assert!(close(result.expected[0][0], 80.0, 1e-9));
        assert!(close(result.statistic, 11.2813, 1e-3), "chi2 = {}", result.statistic);
        assert!(close(result.p_value, 0.00078, 1e-4), "p = {}", result.p_value);

        let uncorrected = chi_square_independence(&table, false).unwrap();
        assert!(close(uncorrected.statistic, 12.5, 1e-9));
    }

    #[test]
    fn test_chi_square_degenerate_table() {
        assert!(chi_square_independence(&[vec![10, 0], vec![20, 0]], true).is_none());
        assert!(chi_square_independence(&[vec![0, 0], vec![20, 5]], true).is_none());
        assert!(chi_square_independence(&[vec![1, 2]], true).is_none());
    }

    #[test]
    fn test_significance() {
        assert_eq!(Significance::classify(Some(0.01), 0.05), Significance::Significant);
        assert_eq!(Significance::classify(Some(0.05), 0.05), Significance::NotSignificant);
        assert_eq!(Significance::classify(None, 0.05), Significance::Undetermined);
    }
}
