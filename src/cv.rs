// K-fold cross-validation over a grid of screening thresholds.

use crate::composition::Composition;
use crate::error::{Result, SlrError};
use crate::model::{fit, fit_with_scores, predict, validate_response, FittedModel, SlrConfig};
use crate::options::{ResponseType, TypeMeasure};
use crate::screening::feature_scores;
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Smallest accepted number of folds.
pub const MIN_FOLDS: usize = 3;

/// Configuration of [`cross_validate`].
#[derive(Clone, Debug, PartialEq)]
pub struct CvConfig {
    /// Settings shared by every fold fit; its `threshold` is ignored.
    pub slr: SlrConfig,
    /// Candidate thresholds. Defaults to the sorted screening scores on the full data.
    pub threshold_grid: Option<Vec<f64>>,
    pub type_measure: TypeMeasure,
    pub nfolds: usize,
    /// Fold label in `0..nfolds` per labeled sample. Drawn at random when absent.
    pub fold_assignment: Option<Vec<usize>>,
    /// Per-fold weights for averaging the held-out error. Uniform when absent.
    pub weights: Option<Vec<f64>>,
    /// Hold out unlabeled samples fold by fold instead of always using all of them.
    pub fold_unlabeled_separately: bool,
    pub fold_assignment_unlabeled: Option<Vec<usize>>,
}

impl Default for CvConfig {
    fn default() -> Self {
        CvConfig {
            slr: SlrConfig::default(),
            threshold_grid: None,
            type_measure: TypeMeasure::Mse,
            nfolds: 10,
            fold_assignment: None,
            weights: None,
            fold_unlabeled_separately: false,
            fold_assignment_unlabeled: None,
        }
    }
}

impl CvConfig {
    /// Defaults for a response type, with the matching error measure
    /// (`Mse` for continuous, `Auc` for binary responses).
    pub fn for_response(response_type: ResponseType) -> Self {
        CvConfig {
            slr: SlrConfig { response_type, ..SlrConfig::default() },
            type_measure: TypeMeasure::default_for(response_type),
            ..CvConfig::default()
        }
    }
}

/// Which selected threshold to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// The threshold with minimum mean error.
    Min,
    /// The largest threshold within one standard error of the minimum.
    OneSe,
}

/// Thresholds chosen from aggregated fold errors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSelection {
    pub threshold_min: f64,
    pub index_min: usize,
    pub threshold_1se: f64,
    pub index_1se: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    pub thresholds: Array1<f64>,
    /// Weighted mean held-out error per threshold.
    pub cvm: Array1<f64>,
    /// Standard error of `cvm` per threshold.
    pub cvsd: Array1<f64>,
    /// Held-out error per (fold, threshold); `NaN` marks a cell whose AUC was undefined.
    pub fold_errors: Array2<f64>,
    pub fold_assignment: Vec<usize>,
    pub fold_assignment_unlabeled: Option<Vec<usize>>,
    pub type_measure: TypeMeasure,
    pub selection: ThresholdSelection,
}

impl CvResult {
    pub fn threshold_min(&self) -> f64 {
        self.selection.threshold_min
    }

    pub fn threshold_1se(&self) -> f64 {
        self.selection.threshold_1se
    }

    pub fn threshold(&self, selection: Selection) -> f64 {
        match selection {
            Selection::Min => self.selection.threshold_min,
            Selection::OneSe => self.selection.threshold_1se,
        }
    }

    /// Fits the final model on all of `x` at the selected threshold.
    pub fn refit(
        &self,
        x: &Composition,
        y: ArrayView1<'_, f64>,
        base: &SlrConfig,
        selection: Selection,
        x_unlabeled: Option<&Composition>,
    ) -> Result<FittedModel> {
        let config = SlrConfig { threshold: self.threshold(selection), ..base.clone() };
        fit(x, y, &config, x_unlabeled)
    }
}

/// Area under the ROC curve via the Mann-Whitney statistic, averaging ranks over ties.
///
/// # Errors
/// `Numerical` when only one class is present.
pub fn auc(labels: ArrayView1<'_, f64>, scores: ArrayView1<'_, f64>) -> Result<f64> {
    if labels.len() != scores.len() {
        return Err(SlrError::InvalidInput(format!(
            "AUC got {} labels and {} scores.",
            labels.len(),
            scores.len()
        )));
    }
    let n = labels.len();
    let n_pos = labels.iter().filter(|&&t| t > 0.5).count() as f64;
    let n_neg = n as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return Err(SlrError::Numerical("AUC is undefined when only one class is present.".into()));
    }

    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&i, &j| scores[i].partial_cmp(&scores[j]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && scores[idx[j]] == scores[idx[i]] {
            j += 1;
        }
        let avg_rank = (i + j - 1) as f64 / 2.0 + 1.0;
        for &k in &idx[i..j] {
            ranks[k] = avg_rank;
        }
        i = j;
    }

    let sum_ranks_pos: f64 = (0..n).filter(|&k| labels[k] > 0.5).map(|k| ranks[k]).sum();
    Ok((sum_ranks_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Picks the minimum-error and one-standard-error thresholds.
///
/// Both rules break ties toward the largest threshold, i.e. the sparser model. When the
/// grid repeats the chosen threshold value, the reported index is its first occurrence.
/// `NaN` means are skipped; a `NaN` standard error at the minimum counts as zero.
///
/// # Errors
/// `InvalidInput` on length mismatches, `Numerical` when every mean is `NaN`.
pub fn select_thresholds(
    thresholds: ArrayView1<'_, f64>,
    cvm: ArrayView1<'_, f64>,
    cvsd: ArrayView1<'_, f64>,
) -> Result<ThresholdSelection> {
    if thresholds.len() != cvm.len() || cvm.len() != cvsd.len() {
        return Err(SlrError::InvalidInput(format!(
            "Threshold grid ({}), cvm ({}) and cvsd ({}) lengths differ.",
            thresholds.len(),
            cvm.len(),
            cvsd.len()
        )));
    }
    let min_error = cvm
        .iter()
        .filter(|v| !v.is_nan())
        .fold(f64::INFINITY, |m, &v| m.min(v));
    if !min_error.is_finite() {
        return Err(SlrError::Numerical("No threshold has a defined cross-validation error.".into()));
    }

    let largest_where = |pred: &dyn Fn(f64) -> bool| -> Option<usize> {
        let largest = (0..cvm.len())
            .filter(|&j| !cvm[j].is_nan() && pred(cvm[j]))
            .map(|j| thresholds[j])
            .fold(None, |best: Option<f64>, t| Some(best.map_or(t, |b| b.max(t))))?;
        thresholds.iter().position(|&t| t == largest)
    };

    let index_min = largest_where(&|v| v == min_error)
        .ok_or_else(|| SlrError::Numerical("Failed to locate the minimum error.".into()))?;
    let se = if cvsd[index_min].is_nan() { 0.0 } else { cvsd[index_min] };
    let bound = cvm[index_min] + se;
    let index_1se = largest_where(&|v| v <= bound).unwrap_or(index_min);

    Ok(ThresholdSelection {
        threshold_min: thresholds[index_min],
        index_min,
        threshold_1se: thresholds[index_1se],
        index_1se,
    })
}

fn check_measure(response_type: ResponseType, measure: TypeMeasure) -> Result<()> {
    match (response_type, measure) {
        (ResponseType::Continuous, TypeMeasure::Mse) => Ok(()),
        (ResponseType::Continuous, other) => Err(SlrError::InvalidOption(format!(
            "Continuous responses support only 'mse', got '{}'.",
            other
        ))),
        (ResponseType::Binary, TypeMeasure::Accuracy | TypeMeasure::Auc) => Ok(()),
        (ResponseType::Binary, other) => Err(SlrError::InvalidOption(format!(
            "Binary responses support 'accuracy' or 'auc', got '{}'.",
            other
        ))),
        (ResponseType::Survival, _) => Err(SlrError::NotImplemented("cross-validation for survival responses".into())),
    }
}

/// Balanced random fold labels: `i % nfolds` for every sample, shuffled.
pub fn random_folds(n: usize, nfolds: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut folds: Vec<usize> = (0..n).map(|i| i % nfolds).collect();
    folds.shuffle(rng);
    folds
}

fn check_folds(assignment: &[usize], n: usize, nfolds: usize, what: &str) -> Result<()> {
    if assignment.len() != n {
        return Err(SlrError::InvalidInput(format!(
            "{} fold assignment has {} entries for {} samples.",
            what,
            assignment.len(),
            n
        )));
    }
    if let Some(&bad) = assignment.iter().find(|&&f| f >= nfolds) {
        return Err(SlrError::InvalidInput(format!(
            "{} fold label {} is outside 0..{}.",
            what, bad, nfolds
        )));
    }
    Ok(())
}

fn held_out_error(measure: TypeMeasure, truth: ArrayView1<'_, f64>, predicted: &Array1<f64>) -> f64 {
    let n = truth.len() as f64;
    match measure {
        TypeMeasure::Mse => truth.iter().zip(predicted.iter()).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n,
        TypeMeasure::Accuracy => {
            truth
                .iter()
                .zip(predicted.iter())
                .filter(|&(&t, &p)| (p > 0.5) != (t > 0.5))
                .count() as f64
                / n
        }
        TypeMeasure::Auc => match auc(truth, predicted.view()) {
            Ok(area) => 1.0 - area,
            Err(e) => {
                debug!("Recording a missing AUC cell: {}", e);
                f64::NAN
            }
        },
    }
}

/// Aggregates a (fold, threshold) error matrix into weighted means and standard errors,
/// skipping `NaN` cells.
pub fn aggregate_errors(fold_errors: &Array2<f64>, weights: &[f64]) -> (Array1<f64>, Array1<f64>) {
    let nfolds = fold_errors.nrows() as f64;
    let mut cvm = Array1::<f64>::from_elem(fold_errors.ncols(), f64::NAN);
    let mut cvsd = Array1::<f64>::from_elem(fold_errors.ncols(), f64::NAN);
    for (j, column) in fold_errors.axis_iter(Axis(1)).enumerate() {
        let present: Vec<(f64, f64)> = column
            .iter()
            .zip(weights.iter())
            .filter(|(e, _)| !e.is_nan())
            .map(|(&e, &w)| (e, w))
            .collect();
        let weight_sum: f64 = present.iter().map(|(_, w)| w).sum();
        if present.is_empty() || weight_sum <= 0.0 {
            continue;
        }
        cvm[j] = present.iter().map(|(e, w)| e * w).sum::<f64>() / weight_sum;
        if present.len() > 1 {
            let k = present.len() as f64;
            let mean = present.iter().map(|(e, _)| e).sum::<f64>() / k;
            let var = present.iter().map(|(e, _)| (e - mean).powi(2)).sum::<f64>() / (k - 1.0);
            cvsd[j] = var.sqrt() / nfolds.sqrt();
        }
    }
    (cvm, cvsd)
}

/// Cross-validates the balance model over a threshold grid and selects thresholds.
///
/// Every (fold, threshold) fit is independent and they run in parallel. Each cell seeds
/// its own k-means generator from `config.slr.seed`, so results do not depend on scheduling.
///
/// # Errors
/// Validation errors (fewer than 3 folds, mismatched assignments or weights, a measure
/// that does not fit the response type, missing unlabeled data), `NotImplemented` for
/// survival responses, and any failure of a fold fit. An undefined AUC is not an error.
pub fn cross_validate(
    x: &Composition,
    y: ArrayView1<'_, f64>,
    config: &CvConfig,
    x_unlabeled: Option<&Composition>,
) -> Result<CvResult> {
    let slr = &config.slr;
    let n = x.nrows();
    validate_response(y, n, slr.response_type)?;
    check_measure(slr.response_type, config.type_measure)?;

    let mut rng = ChaCha8Rng::seed_from_u64(slr.seed);
    let (fold_assignment, nfolds) = match &config.fold_assignment {
        Some(assignment) => {
            let nfolds = assignment.iter().max().map_or(0, |m| m + 1);
            check_folds(assignment, n, nfolds, "Labeled")?;
            (assignment.clone(), nfolds)
        }
        None => {
            if config.nfolds < MIN_FOLDS {
                return Err(SlrError::InvalidInput(format!(
                    "nfolds must be at least {}, got {}.",
                    MIN_FOLDS, config.nfolds
                )));
            }
            if n < config.nfolds {
                return Err(SlrError::InvalidInput(format!(
                    "Cannot split {} samples into {} folds.",
                    n, config.nfolds
                )));
            }
            (random_folds(n, config.nfolds, &mut rng), config.nfolds)
        }
    };
    if nfolds < MIN_FOLDS {
        return Err(SlrError::InvalidInput(format!(
            "nfolds must be at least {}, got {}.",
            MIN_FOLDS, nfolds
        )));
    }

    let weights = match &config.weights {
        Some(w) if w.len() != nfolds => {
            return Err(SlrError::InvalidInput(format!(
                "Got {} fold weights for {} folds.",
                w.len(),
                nfolds
            )))
        }
        Some(w) if w.iter().any(|&v| !(v >= 0.0) || !v.is_finite()) => {
            return Err(SlrError::InvalidInput("Fold weights must be finite and nonnegative.".into()))
        }
        Some(w) => w.clone(),
        None => vec![1.0; nfolds],
    };

    let unlabeled = if slr.use_unlabeled {
        Some(x_unlabeled.ok_or_else(|| {
            SlrError::MissingData("use_unlabeled is set but no unlabeled composition was supplied.".into())
        })?)
    } else {
        None
    };
    let fold_assignment_unlabeled = match (unlabeled, config.fold_unlabeled_separately) {
        (Some(u), true) => Some(match &config.fold_assignment_unlabeled {
            Some(assignment) => {
                check_folds(assignment, u.nrows(), nfolds, "Unlabeled")?;
                assignment.clone()
            }
            None => {
                if u.nrows() < nfolds {
                    return Err(SlrError::InvalidInput(format!(
                        "Folding unlabeled data separately needs at least {} unlabeled samples, got {}.",
                        nfolds,
                        u.nrows()
                    )));
                }
                random_folds(u.nrows(), nfolds, &mut rng)
            }
        }),
        _ => None,
    };

    let thresholds: Array1<f64> = match &config.threshold_grid {
        Some(grid) if grid.is_empty() => {
            return Err(SlrError::InvalidInput("Threshold grid is empty.".into()))
        }
        Some(grid) => Array1::from_vec(grid.clone()),
        None => {
            let mut scores = feature_scores(x, y, slr.screen_method, slr.response_type, slr.s0_percentile)?.to_vec();
            scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            Array1::from_vec(scores)
        }
    };
    let n_thresholds = thresholds.len();

    info!(
        "Cross-validating over {} folds x {} thresholds ({} samples, {} components, measure {})",
        nfolds,
        n_thresholds,
        n,
        x.ncols(),
        config.type_measure
    );
    let start = std::time::Instant::now();

    let rows = (0..nfolds)
        .into_par_iter()
        .map(|fold| -> Result<Vec<f64>> {
            let train: Vec<usize> = (0..n).filter(|&i| fold_assignment[i] != fold).collect();
            let test: Vec<usize> = (0..n).filter(|&i| fold_assignment[i] == fold).collect();
            if test.is_empty() || train.is_empty() {
                return Err(SlrError::InvalidInput(format!("Fold {} leaves no training or no held-out samples.", fold)));
            }
            let x_train = x.select_rows(&train)?;
            let x_test = x.select_rows(&test)?;
            let y_train = y.select(Axis(0), &train);
            let y_test = y.select(Axis(0), &test);
            let u_train = match (unlabeled, &fold_assignment_unlabeled) {
                (Some(u), Some(assignment)) => {
                    let keep: Vec<usize> = (0..u.nrows()).filter(|&i| assignment[i] != fold).collect();
                    Some(u.select_rows(&keep)?)
                }
                (Some(u), None) => Some(u.clone()),
                (None, _) => None,
            };

            let scores = feature_scores(&x_train, y_train.view(), slr.screen_method, slr.response_type, slr.s0_percentile)?;
            let errors = thresholds
                .as_slice()
                .unwrap_or(&[])
                .par_iter()
                .enumerate()
                .map(|(t, &threshold)| -> Result<f64> {
                    let cell = SlrConfig {
                        threshold,
                        seed: slr.seed.wrapping_add((fold * n_thresholds + t) as u64),
                        ..slr.clone()
                    };
                    let model = fit_with_scores(&x_train, y_train.view(), &cell, u_train.as_ref(), scores.clone())?;
                    let predicted = predict(&model, Some(&x_test), slr.response_type)?;
                    Ok(held_out_error(config.type_measure, y_test.view(), &predicted))
                })
                .collect::<Result<Vec<f64>>>()?;
            debug!("Fold {}: {} training / {} held-out samples done.", fold, train.len(), test.len());
            Ok(errors)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let mut fold_errors = Array2::<f64>::zeros((nfolds, n_thresholds));
    for (i, row) in rows.iter().enumerate() {
        for (j, &e) in row.iter().enumerate() {
            fold_errors[[i, j]] = e;
        }
    }
    let (cvm, cvsd) = aggregate_errors(&fold_errors, &weights);
    let selection = select_thresholds(thresholds.view(), cvm.view(), cvsd.view())?;
    info!(
        "Cross-validation finished in {:?}: threshold.min = {:.4} (index {}), threshold.1se = {:.4} (index {})",
        start.elapsed(),
        selection.threshold_min,
        selection.index_min,
        selection.threshold_1se,
        selection.index_1se
    );

    Ok(CvResult {
        thresholds,
        cvm,
        cvsd,
        fold_errors,
        fold_assignment,
        fold_assignment_unlabeled,
        type_measure: config.type_measure,
        selection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn selection_prefers_largest_tied_threshold() {
        let thresholds = array![0.1, 0.2, 0.3, 0.4];
        let cvm = array![0.5, 0.3, 0.3, 0.4];
        let cvsd = array![0.05, 0.05, 0.05, 0.05];
        let sel = select_thresholds(thresholds.view(), cvm.view(), cvsd.view()).unwrap();
        assert_eq!(sel.threshold_min, 0.3);
        assert_eq!(sel.index_min, 2);
        // mean <= 0.35 holds at 0.2 and 0.3
        assert_eq!(sel.threshold_1se, 0.3);
        assert_eq!(sel.index_1se, 2);
    }

    #[test]
    fn one_se_moves_to_sparser_threshold() {
        let thresholds = array![0.1, 0.2, 0.3, 0.4];
        let cvm = array![0.5, 0.3, 0.33, 0.34];
        let cvsd = array![0.05, 0.05, 0.05, 0.05];
        let sel = select_thresholds(thresholds.view(), cvm.view(), cvsd.view()).unwrap();
        assert_eq!(sel.threshold_min, 0.2);
        assert_eq!(sel.threshold_1se, 0.4);
    }

    #[test]
    fn selection_skips_missing_means() {
        let thresholds = array![0.1, 0.2, 0.3];
        let cvm = array![f64::NAN, 0.2, 0.4];
        let cvsd = array![f64::NAN, f64::NAN, 0.1];
        let sel = select_thresholds(thresholds.view(), cvm.view(), cvsd.view()).unwrap();
        assert_eq!(sel.index_min, 1);
        assert_eq!(sel.index_1se, 1);

        let all_nan = array![f64::NAN, f64::NAN, f64::NAN];
        assert!(select_thresholds(thresholds.view(), all_nan.view(), cvsd.view()).is_err());
    }

    #[test]
    fn repeated_thresholds_report_first_position() {
        // saturated scores put 1.0 on the grid twice
        let thresholds = array![0.2, 0.6, 1.0, 1.0];
        let cvm = array![0.5, 0.4, 0.3, 0.3];
        let cvsd = array![0.05, 0.05, 0.05, 0.05];
        let sel = select_thresholds(thresholds.view(), cvm.view(), cvsd.view()).unwrap();
        assert_eq!(sel.threshold_min, 1.0);
        assert_eq!(sel.index_min, 2);
        assert_eq!(sel.index_1se, 2);

        // the repeated value that is not itself minimal still reports its first position
        let cvm_second = array![0.5, 0.4, 0.35, 0.3];
        let sel = select_thresholds(thresholds.view(), cvm_second.view(), cvsd.view()).unwrap();
        assert_eq!(sel.threshold_min, 1.0);
        assert_eq!(sel.index_min, 2);
    }

    #[test]
    fn config_for_response_picks_matching_measure() {
        let binary = CvConfig::for_response(ResponseType::Binary);
        assert_eq!(binary.type_measure, TypeMeasure::Auc);
        assert_eq!(binary.slr.response_type, ResponseType::Binary);
        assert!(check_measure(binary.slr.response_type, binary.type_measure).is_ok());
        let continuous = CvConfig::for_response(ResponseType::Continuous);
        assert_eq!(continuous.type_measure, TypeMeasure::Mse);
        assert_eq!(continuous.nfolds, 10);
    }

    #[test]
    fn auc_handles_ties_and_single_class() {
        let labels = array![0.0, 0.0, 1.0, 1.0];
        let perfect = array![0.1, 0.2, 0.8, 0.9];
        assert_abs_diff_eq!(auc(labels.view(), perfect.view()).unwrap(), 1.0, epsilon = 1e-12);
        let tied = array![0.5, 0.5, 0.5, 0.5];
        assert_abs_diff_eq!(auc(labels.view(), tied.view()).unwrap(), 0.5, epsilon = 1e-12);
        let one_class = array![1.0, 1.0];
        assert!(matches!(auc(one_class.view(), array![0.2, 0.3].view()), Err(SlrError::Numerical(_))));
    }

    #[test]
    fn aggregation_ignores_missing_cells() {
        let errors = array![[1.0, f64::NAN], [3.0, 2.0], [2.0, 4.0]];
        let (cvm, cvsd) = aggregate_errors(&errors, &[1.0, 1.0, 2.0]);
        assert_abs_diff_eq!(cvm[0], (1.0 + 3.0 + 4.0) / 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cvm[1], (2.0 + 8.0) / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cvsd[0], 1.0 / 3.0_f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(cvsd[1], 2.0_f64.sqrt() / 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn random_folds_are_balanced() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let folds = random_folds(23, 5, &mut rng);
        for f in 0..5 {
            let count = folds.iter().filter(|&&v| v == f).count();
            assert!(count == 4 || count == 5);
        }
    }

    #[test]
    fn measure_must_match_response() {
        assert!(check_measure(ResponseType::Continuous, TypeMeasure::Auc).is_err());
        assert!(check_measure(ResponseType::Binary, TypeMeasure::Mse).is_err());
        assert!(check_measure(ResponseType::Binary, TypeMeasure::Accuracy).is_ok());
        assert!(matches!(
            check_measure(ResponseType::Survival, TypeMeasure::Mse),
            Err(SlrError::NotImplemented(_))
        ));
    }

    #[test]
    fn misclassification_uses_half_cutoff() {
        let truth = array![0.0, 1.0, 1.0, 0.0];
        let predicted = array![0.2, 0.7, 0.4, 0.6];
        assert_abs_diff_eq!(held_out_error(TypeMeasure::Accuracy, truth.view(), &predicted), 0.5, epsilon = 1e-12);
    }
}
