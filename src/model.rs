// Balance model fitting and prediction.

use crate::composition::{aitchison_variation, Composition, VariationMatrix};
use crate::contrast::SignVector;
use crate::error::{Result, SlrError};
use crate::hierarchical::hierarchical_partition;
use crate::options::{ClusterMethod, ResponseType, S0Percentile, ScreenMethod};
use crate::regression::{design_with_intercept, sigmoid, LinearRegression, LogisticRegression, RegressionModel};
use crate::screening::feature_scores;
use crate::spectral::spectral_partition;
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Configuration of a single balance-model fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlrConfig {
    pub screen_method: ScreenMethod,
    pub cluster_method: ClusterMethod,
    pub response_type: ResponseType,
    /// Components with `|score| >= threshold` survive screening.
    pub threshold: f64,
    /// Fudge term for the continuous Wald screen.
    pub s0_percentile: S0Percentile,
    /// Uniform edge weight (relative to the mean degree) added before spectral clustering.
    pub zeta: f64,
    /// Stack the unlabeled samples onto the labeled ones when computing the variation matrix.
    pub use_unlabeled: bool,
    /// Flip the discovered groups when the fitted slope is negative.
    pub positive_slope: bool,
    /// Seed for the k-means restarts of the spectral partitioner.
    pub seed: u64,
}

impl Default for SlrConfig {
    fn default() -> Self {
        SlrConfig {
            screen_method: ScreenMethod::Wald,
            cluster_method: ClusterMethod::Spectral,
            response_type: ResponseType::Continuous,
            threshold: 0.0,
            s0_percentile: S0Percentile::Median,
            zeta: 0.0,
            use_unlabeled: false,
            positive_slope: true,
            seed: 2025,
        }
    }
}

/// A model whose single predictor is the balance between two discovered groups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceModel {
    /// Groups over the screened components.
    pub signs: SignVector,
    /// Aitchison variation over the screened components (labeled plus any unlabeled rows).
    pub variation: VariationMatrix,
    /// Matrix handed to the partitioner: the similarity for spectral, the variation for hierarchical.
    pub cluster_matrix: Array2<f64>,
    /// `[intercept, slope]`.
    pub coefficients: Array1<f64>,
    /// Screening scores over every input component.
    pub scores: Array1<f64>,
    pub regression: RegressionModel,
}

/// Fallback when fewer than two components survive screening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterceptModel {
    /// `[intercept]`.
    pub coefficients: Array1<f64>,
    pub scores: Array1<f64>,
    pub regression: RegressionModel,
}

/// Result of [`fit`]. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FittedModel {
    Balance(BalanceModel),
    InterceptOnly(InterceptModel),
}

impl FittedModel {
    pub fn is_intercept_only(&self) -> bool {
        matches!(self, FittedModel::InterceptOnly(_))
    }

    pub fn signs(&self) -> Option<&SignVector> {
        match self {
            FittedModel::Balance(m) => Some(&m.signs),
            FittedModel::InterceptOnly(_) => None,
        }
    }

    pub fn variation(&self) -> Option<&VariationMatrix> {
        match self {
            FittedModel::Balance(m) => Some(&m.variation),
            FittedModel::InterceptOnly(_) => None,
        }
    }

    pub fn cluster_matrix(&self) -> Option<&Array2<f64>> {
        match self {
            FittedModel::Balance(m) => Some(&m.cluster_matrix),
            FittedModel::InterceptOnly(_) => None,
        }
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        match self {
            FittedModel::Balance(m) => &m.coefficients,
            FittedModel::InterceptOnly(m) => &m.coefficients,
        }
    }

    pub fn scores(&self) -> &Array1<f64> {
        match self {
            FittedModel::Balance(m) => &m.scores,
            FittedModel::InterceptOnly(m) => &m.scores,
        }
    }

    pub fn intercept(&self) -> f64 {
        self.coefficients()[0]
    }

    pub fn slope(&self) -> Option<f64> {
        match self {
            FittedModel::Balance(m) => Some(m.coefficients[1]),
            FittedModel::InterceptOnly(_) => None,
        }
    }

    pub fn positive_components(&self) -> Vec<String> {
        self.signs().map(SignVector::positive).unwrap_or_default()
    }

    pub fn negative_components(&self) -> Vec<String> {
        self.signs().map(SignVector::negative).unwrap_or_default()
    }

    /// Saves the model to `path` with bincode.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            SlrError::Persistence(format!("Failed to create file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| SlrError::Persistence(format!("Failed to serialize model: {}", e)))?;
        Ok(())
    }

    /// Loads a model written by [`FittedModel::save_model`] and checks it for consistency.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            SlrError::Persistence(format!("Failed to open file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut reader = BufReader::new(file);
        let model: FittedModel = bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
            .map_err(|e| SlrError::Persistence(format!("Failed to deserialize model: {}", e)))?;

        match &model {
            FittedModel::Balance(m) => {
                if m.coefficients.len() != 2 {
                    return Err(SlrError::Persistence(format!(
                        "Balance model must carry 2 coefficients, found {}.",
                        m.coefficients.len()
                    )));
                }
                if m.signs.positive().is_empty() || m.signs.negative().is_empty() {
                    return Err(SlrError::Persistence("Balance model has an empty group.".into()));
                }
                let k = m.signs.len();
                if m.variation.len() != k || m.cluster_matrix.dim() != (k, k) {
                    return Err(SlrError::Persistence(format!(
                        "Balance model over {} components has a {}-component variation and a {:?} cluster matrix.",
                        k,
                        m.variation.len(),
                        m.cluster_matrix.dim()
                    )));
                }
            }
            FittedModel::InterceptOnly(m) => {
                if m.coefficients.len() != 1 {
                    return Err(SlrError::Persistence(format!(
                        "Intercept-only model must carry 1 coefficient, found {}.",
                        m.coefficients.len()
                    )));
                }
            }
        }
        Ok(model)
    }
}

pub(crate) fn validate_response(y: ArrayView1<'_, f64>, n_samples: usize, response_type: ResponseType) -> Result<()> {
    if y.len() != n_samples {
        return Err(SlrError::InvalidInput(format!(
            "Response has {} values but the composition has {} samples.",
            y.len(),
            n_samples
        )));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(SlrError::InvalidInput("Response contains non-finite values.".into()));
    }
    match response_type {
        ResponseType::Binary if y.iter().any(|&v| v != 0.0 && v != 1.0) => Err(SlrError::InvalidInput(
            "Binary responses must be coded 0/1.".into(),
        )),
        ResponseType::Survival => Err(SlrError::NotImplemented("survival responses".into())),
        _ => Ok(()),
    }
}

fn fit_balance_regression(balance: &Array1<f64>, y: ArrayView1<'_, f64>, response_type: ResponseType) -> Result<RegressionModel> {
    let design = design_with_intercept(&[balance.view()], balance.len())?;
    match response_type {
        ResponseType::Continuous => Ok(RegressionModel::Linear(LinearRegression::fit(design.view(), y)?)),
        ResponseType::Binary => Ok(RegressionModel::Logistic(LogisticRegression::fit(design.view(), y)?)),
        ResponseType::Survival => Err(SlrError::NotImplemented("survival regression".into())),
    }
}

fn intercept_only(y: ArrayView1<'_, f64>, scores: Array1<f64>) -> Result<FittedModel> {
    let design = design_with_intercept(&[], y.len())?;
    let regression = RegressionModel::Linear(LinearRegression::fit(design.view(), y)?);
    Ok(FittedModel::InterceptOnly(InterceptModel {
        coefficients: regression.coefficients().clone(),
        scores,
        regression,
    }))
}

/// Screens, partitions, builds the balance and fits the single-predictor regression.
///
/// With fewer than two surviving components the result is an intercept-only least-squares
/// fit of `y`; this is a defined outcome, not an error.
///
/// # Errors
/// Input validation failures, a missing or mismatched unlabeled matrix when
/// `use_unlabeled` is set, and `NotImplemented` for survival responses.
pub fn fit(x: &Composition, y: ArrayView1<'_, f64>, config: &SlrConfig, x_unlabeled: Option<&Composition>) -> Result<FittedModel> {
    info!(
        "Fitting balance model on {} samples x {} components (threshold {:.4}, {:?}/{:?}, {} response)",
        x.nrows(),
        x.ncols(),
        config.threshold,
        config.screen_method,
        config.cluster_method,
        config.response_type
    );
    let start = std::time::Instant::now();
    validate_response(y, x.nrows(), config.response_type)?;
    let scores = feature_scores(x, y, config.screen_method, config.response_type, config.s0_percentile)?;
    let model = fit_with_scores(x, y, config, x_unlabeled, scores)?;
    info!("Fitted balance model in {:?} (intercept only: {})", start.elapsed(), model.is_intercept_only());
    Ok(model)
}

/// [`fit`] with precomputed screening scores for `x` (one per column).
///
/// Cross-validation reuses one score vector for every threshold of a fold.
pub fn fit_with_scores(
    x: &Composition,
    y: ArrayView1<'_, f64>,
    config: &SlrConfig,
    x_unlabeled: Option<&Composition>,
    scores: Array1<f64>,
) -> Result<FittedModel> {
    validate_response(y, x.nrows(), config.response_type)?;
    if scores.len() != x.ncols() {
        return Err(SlrError::InvalidInput(format!(
            "Got {} scores for {} components.",
            scores.len(),
            x.ncols()
        )));
    }

    let selected: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.abs() >= config.threshold)
        .map(|(j, _)| j)
        .collect();
    if selected.len() < 2 {
        debug!(
            "{} component(s) pass threshold {:.4}; fitting intercept only.",
            selected.len(),
            config.threshold
        );
        return intercept_only(y, scores);
    }

    let reduced = x.select_columns(&selected)?;
    let variation_input = if config.use_unlabeled {
        let unlabeled = x_unlabeled.ok_or_else(|| {
            SlrError::MissingData("use_unlabeled is set but no unlabeled composition was supplied.".into())
        })?;
        if unlabeled.names() != x.names() {
            return Err(SlrError::InvalidInput(
                "Unlabeled composition must have the same component names as the labeled one.".into(),
            ));
        }
        reduced.stack(&unlabeled.select_columns(&selected)?)?
    } else {
        reduced.clone()
    };
    let variation = aitchison_variation(&variation_input)?;

    let use_spectral = config.cluster_method == ClusterMethod::Spectral || selected.len() == 2;
    let partition = if use_spectral {
        let similarity = variation.to_similarity();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        spectral_partition(similarity.view(), variation.names(), config.zeta, &mut rng)
            .map(|signs| (signs, similarity))
    } else {
        hierarchical_partition(&variation).map(|signs| (signs, variation.matrix().clone()))
    };
    model_from_partition(partition, &reduced, variation, y, config, scores)
}

/// Turns a partition outcome into a fitted model. A degenerate partition becomes the
/// intercept-only model; any other partition error is returned.
pub(crate) fn model_from_partition(
    partition: Result<(SignVector, Array2<f64>)>,
    reduced: &Composition,
    variation: VariationMatrix,
    y: ArrayView1<'_, f64>,
    config: &SlrConfig,
    scores: Array1<f64>,
) -> Result<FittedModel> {
    let (mut signs, cluster_matrix) = match partition {
        Ok(found) => found,
        Err(SlrError::DegeneratePartition(n)) => {
            debug!("Partition of {} components collapsed to one group; fitting intercept only.", n);
            return intercept_only(y, scores);
        }
        Err(e) => return Err(e),
    };

    let mut balance = signs.balance(reduced)?;
    let mut regression = fit_balance_regression(&balance, y, config.response_type)?;
    if config.positive_slope && regression.coefficients()[1] < 0.0 {
        debug!("Fitted slope {:.4e} is negative; flipping the groups and refitting.", regression.coefficients()[1]);
        signs = signs.negated();
        balance = signs.balance(reduced)?;
        regression = fit_balance_regression(&balance, y, config.response_type)?;
    }

    debug!(
        "Balance model: {} positive / {} negative components, coefficients {:?}",
        signs.positive().len(),
        signs.negative().len(),
        regression.coefficients().as_slice()
    );
    Ok(FittedModel::Balance(BalanceModel {
        signs,
        variation,
        cluster_matrix,
        coefficients: regression.coefficients().clone(),
        scores,
        regression,
    }))
}

/// Predictions of a fitted model on new compositions.
///
/// Intercept-only models return the intercept for every sample, passed through the
/// logistic function for binary responses. Balance models align `newdata` to the sign
/// vector by name; binary responses yield probabilities.
///
/// # Errors
/// `MissingData` when `newdata` is `None`, `InvalidInput` when it lacks a component of
/// the sign vector, `NotImplemented` for survival responses.
pub fn predict(model: &FittedModel, newdata: Option<&Composition>, response_type: ResponseType) -> Result<Array1<f64>> {
    let newdata = newdata.ok_or_else(|| SlrError::MissingData("predict requires new data.".into()))?;
    if response_type == ResponseType::Survival {
        return Err(SlrError::NotImplemented("prediction for survival responses".into()));
    }
    match model {
        FittedModel::InterceptOnly(m) => {
            // The intercept comes from a least-squares fit even for binary responses.
            let b0 = m.coefficients[0];
            let value = if response_type.is_binary() { sigmoid(b0) } else { b0 };
            Ok(Array1::from_elem(newdata.nrows(), value))
        }
        FittedModel::Balance(m) => {
            let balance = m.signs.balance(newdata)?;
            let design = design_with_intercept(&[balance.view()], balance.len())?;
            match response_type {
                ResponseType::Binary => m.regression.predict_response(design.view()),
                _ => Ok(design.dot(&m.coefficients)),
            }
        }
    }
}
