// Per-component screening scores on the clr scale.

use crate::composition::Composition;
use crate::error::{Result, SlrError};
use crate::options::{ResponseType, S0Percentile, ScreenMethod};
use crate::regression::{design_with_intercept, LogisticRegression};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Association score of every component of `x` with `y`.
///
/// The returned vector has one entry per column of `x`. Only its absolute value is
/// meaningful for thresholding.
///
/// * `Correlation` - Pearson correlation of each clr column with `y`.
/// * `Wald` with a continuous response - Student-t CDF (n - 2 df) of the moderated
///   statistic `|b / (se + s0)|` from a univariate least-squares fit on the
///   standardized clr column.
/// * `Wald` with a binary response - standard normal CDF of the absolute Wald z of a
///   univariate logistic fit on the standardized clr column.
///
/// # Errors
/// `InvalidInput` on a length mismatch or too few samples, `NotImplemented` for survival
/// responses, `InvalidOption` for a quantile outside `[0, 1]`.
pub fn feature_scores(
    x: &Composition,
    y: ArrayView1<'_, f64>,
    method: ScreenMethod,
    response_type: ResponseType,
    s0_percentile: S0Percentile,
) -> Result<Array1<f64>> {
    if y.len() != x.nrows() {
        return Err(SlrError::InvalidInput(format!(
            "Response has {} values but the composition has {} samples.",
            y.len(),
            x.nrows()
        )));
    }
    let clr = x.clr();
    let scores = match (method, response_type) {
        (_, ResponseType::Survival) => {
            return Err(SlrError::NotImplemented("screening for survival responses".into()))
        }
        (ScreenMethod::Correlation, _) => correlation_scores(&clr, y),
        (ScreenMethod::Wald, ResponseType::Continuous) => continuous_wald_scores(&clr, y, s0_percentile)?,
        (ScreenMethod::Wald, ResponseType::Binary) => binary_wald_scores(&clr, y)?,
    };
    debug!(
        "Screened {} components with {:?} ({} response); max |score| = {:.4}",
        scores.len(),
        method,
        response_type,
        scores.iter().fold(0.0_f64, |m, s| m.max(s.abs()))
    );
    Ok(scores)
}

/// Pearson correlation; zero when either side is constant.
pub fn pearson(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.sum() / n;
    let mean_b = b.sum() / n;
    let mut sab = 0.0;
    let mut saa = 0.0;
    let mut sbb = 0.0;
    for (&ai, &bi) in a.iter().zip(b.iter()) {
        let da = ai - mean_a;
        let db = bi - mean_b;
        sab += da * db;
        saa += da * da;
        sbb += db * db;
    }
    if saa <= 0.0 || sbb <= 0.0 {
        0.0
    } else {
        sab / (saa.sqrt() * sbb.sqrt())
    }
}

fn correlation_scores(clr: &Array2<f64>, y: ArrayView1<'_, f64>) -> Array1<f64> {
    let scores: Vec<f64> = clr
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|column| pearson(column, y))
        .collect();
    Array1::from_vec(scores)
}

/// Centers and scales each column to unit sample variance; constant columns become zeros.
fn standardize_columns(clr: &Array2<f64>) -> Array2<f64> {
    let n = clr.nrows() as f64;
    let mut out = clr.clone();
    for mut column in out.axis_iter_mut(Axis(1)) {
        let mean = column.sum() / n;
        column.mapv_inplace(|v| v - mean);
        let sd = (column.iter().map(|v| v * v).sum::<f64>() / (n - 1.0)).sqrt();
        if sd > 1e-12 {
            column.mapv_inplace(|v| v / sd);
        } else {
            column.fill(0.0);
        }
    }
    out
}

/// Type-7 (linear interpolation) sample quantile of unsorted values.
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

fn continuous_wald_scores(clr: &Array2<f64>, y: ArrayView1<'_, f64>, s0_percentile: S0Percentile) -> Result<Array1<f64>> {
    let n = clr.nrows();
    if n < 3 {
        return Err(SlrError::InvalidInput(format!(
            "The continuous Wald screen needs at least 3 samples, got {}.",
            n
        )));
    }
    let z = standardize_columns(clr);
    let y_mean = y.sum() / n as f64;
    let y_centered = y.mapv(|v| v - y_mean);

    // (slope, standard error) per column; constant columns carry no information.
    let fits: Vec<Option<(f64, f64)>> = z
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|column| {
            let sxx = column.dot(&column);
            if sxx <= 0.0 {
                return None;
            }
            let slope = column.dot(&y_centered) / sxx;
            let rss: f64 = column
                .iter()
                .zip(y_centered.iter())
                .map(|(&zi, &yi)| (yi - slope * zi).powi(2))
                .sum();
            let se = (rss / (n as f64 - 2.0) / sxx).sqrt();
            Some((slope, se))
        })
        .collect();

    let ses: Vec<f64> = fits.iter().flatten().map(|&(_, se)| se).collect();
    let fudge = match s0_percentile {
        S0Percentile::Disabled => 0.0,
        S0Percentile::Median => quantile(&ses, 0.5),
        S0Percentile::Quantile(q) => {
            if !(0.0..=1.0).contains(&q) {
                return Err(SlrError::InvalidOption(format!(
                    "s0 percentile must lie in [0, 1] (or be negative to disable), got {}.",
                    q
                )));
            }
            quantile(&ses, q)
        }
    };
    let fudge = if fudge.is_finite() { fudge } else { 0.0 };

    let t_dist = StudentsT::new(0.0, 1.0, n as f64 - 2.0)
        .map_err(|e| SlrError::Numerical(format!("Student-t distribution: {}", e)))?;
    Ok(fits
        .iter()
        .map(|fit| match fit {
            Some((slope, se)) => {
                let denom = se + fudge;
                if denom > 0.0 {
                    t_dist.cdf((slope / denom).abs())
                } else if *slope != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        })
        .collect())
}

fn binary_wald_scores(clr: &Array2<f64>, y: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    let n = clr.nrows();
    let z = standardize_columns(clr);
    let normal = Normal::new(0.0, 1.0).map_err(|e| SlrError::Numerical(format!("Normal distribution: {}", e)))?;
    let scores = z
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|column| {
            if column.iter().all(|&v| v == 0.0) {
                return Ok(0.0);
            }
            let design = design_with_intercept(&[column], n)?;
            let fit = LogisticRegression::fit(design.view(), y)?;
            let wald = fit.z_statistics()[1];
            Ok(if wald.is_finite() { normal.cdf(wald.abs()) } else { 1.0 })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(Array1::from_vec(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn linear_toy() -> (Composition, Array1<f64>) {
        // y tracks log(c0 / c2); c1 is noise.
        let x = Composition::from_values(array![
            [0.10, 0.30, 0.60],
            [0.20, 0.25, 0.55],
            [0.40, 0.35, 0.25],
            [0.60, 0.28, 0.12],
        ])
        .unwrap();
        let y: Array1<f64> = x.values().rows().into_iter().map(|r| (r[0] / r[2]).ln()).collect();
        (x, y)
    }

    #[test]
    fn correlation_matches_direct_pearson_on_clr() {
        let (x, y) = linear_toy();
        let scores = feature_scores(&x, y.view(), ScreenMethod::Correlation, ResponseType::Continuous, S0Percentile::Median).unwrap();
        let clr = x.clr();
        for j in 0..3 {
            assert_abs_diff_eq!(scores[j], pearson(clr.column(j), y.view()), epsilon = 1e-12);
        }
        // c0 and c2 define y and carry opposite signs; c1 is noise.
        assert!(scores[0] > 0.99);
        assert!(scores[2] < -0.99);
        assert!(scores[1].abs() < 0.1);
        assert!(scores[1].abs() < scores[0].abs().min(scores[2].abs()));
    }

    #[test]
    fn continuous_wald_scores_are_probabilities() {
        let (x, y) = linear_toy();
        for s0 in [S0Percentile::Median, S0Percentile::Quantile(0.1), S0Percentile::Disabled] {
            let scores = feature_scores(&x, y.view(), ScreenMethod::Wald, ResponseType::Continuous, s0).unwrap();
            assert_eq!(scores.len(), 3);
            assert!(scores.iter().all(|&s| (0.5..=1.0).contains(&s)));
        }
    }

    #[test]
    fn larger_fudge_shrinks_wald_scores() {
        let (x, y) = linear_toy();
        let none = feature_scores(&x, y.view(), ScreenMethod::Wald, ResponseType::Continuous, S0Percentile::Disabled).unwrap();
        let median = feature_scores(&x, y.view(), ScreenMethod::Wald, ResponseType::Continuous, S0Percentile::Median).unwrap();
        for j in 0..3 {
            assert!(median[j] <= none[j] + 1e-12);
        }
    }

    #[test]
    fn binary_wald_scores_lie_in_upper_half() {
        let x = Composition::from_values(array![
            [0.1, 0.3, 0.6],
            [0.2, 0.3, 0.5],
            [0.3, 0.2, 0.5],
            [0.5, 0.2, 0.3],
            [0.6, 0.1, 0.3],
            [0.4, 0.4, 0.2],
        ])
        .unwrap();
        let y = array![0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let scores = feature_scores(&x, y.view(), ScreenMethod::Wald, ResponseType::Binary, S0Percentile::Median).unwrap();
        assert!(scores.iter().all(|&s| (0.5..=1.0).contains(&s)));
    }

    #[test]
    fn survival_is_not_implemented() {
        let (x, y) = linear_toy();
        let res = feature_scores(&x, y.view(), ScreenMethod::Correlation, ResponseType::Survival, S0Percentile::Median);
        assert!(matches!(res, Err(SlrError::NotImplemented(_))));
    }

    #[test]
    fn quantile_interpolates() {
        assert_abs_diff_eq!(quantile(&[4.0, 1.0, 3.0, 2.0], 0.5), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&[1.0, 2.0, 3.0], 1.0), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_length_mismatch() {
        let (x, _) = linear_toy();
        let y = array![1.0, 2.0];
        assert!(feature_scores(&x, y.view(), ScreenMethod::Correlation, ResponseType::Continuous, S0Percentile::Median).is_err());
    }
}
