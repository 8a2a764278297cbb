// Least-squares and logistic (IRLS) regression on small dense designs.

use crate::error::{Result, SlrError};
use crate::linalg_backends::{BackendSolve, LinAlgBackendProvider};
use log::{trace, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

const IRLS_MAX_ITERATIONS: usize = 100;
const IRLS_TOLERANCE: f64 = 1e-10;
const ETA_CLAMP: f64 = 700.0;
const MU_CLAMP: f64 = 1e-10;

pub fn sigmoid(eta: f64) -> f64 {
    let eta = eta.clamp(-ETA_CLAMP, ETA_CLAMP);
    1.0 / (1.0 + (-eta).exp())
}

/// Prepends a column of ones to the given predictor columns.
pub fn design_with_intercept(predictors: &[ArrayView1<'_, f64>], n_samples: usize) -> Result<Array2<f64>> {
    let mut design = Array2::<f64>::ones((n_samples, predictors.len() + 1));
    for (j, column) in predictors.iter().enumerate() {
        if column.len() != n_samples {
            return Err(SlrError::InvalidInput(format!(
                "Predictor {} has {} values for {} samples.",
                j,
                column.len(),
                n_samples
            )));
        }
        design.column_mut(j + 1).assign(column);
    }
    Ok(design)
}

fn check_design(design: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    if design.nrows() != y.len() {
        return Err(SlrError::InvalidInput(format!(
            "Design has {} rows but the response has {} values.",
            design.nrows(),
            y.len()
        )));
    }
    if design.nrows() < design.ncols() {
        return Err(SlrError::InvalidInput(format!(
            "Cannot fit {} coefficients from {} samples.",
            design.ncols(),
            design.nrows()
        )));
    }
    Ok(())
}

/// Ordinary least squares fit via the normal equations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Array1<f64>,
}

impl LinearRegression {
    pub fn fit(design: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Self> {
        check_design(design, y)?;
        let backend = LinAlgBackendProvider::<f64>::new();
        let xtx = design.t().dot(&design);
        let xty = design.t().dot(&y);
        let coefficients = backend.solve(&xtx, &xty)?;
        Ok(Self { coefficients })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn predict(&self, design: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_columns(design, self.coefficients.len())?;
        Ok(design.dot(&self.coefficients))
    }
}

/// Logistic regression fitted by iteratively reweighted least squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    coefficients: Array1<f64>,
    standard_errors: Array1<f64>,
    deviance: f64,
    iterations: usize,
    converged: bool,
}

fn binomial_deviance(y: ArrayView1<'_, f64>, mu: &Array1<f64>) -> f64 {
    -2.0 * y
        .iter()
        .zip(mu.iter())
        .map(|(&yi, &mi)| {
            let mi = mi.clamp(MU_CLAMP, 1.0 - MU_CLAMP);
            yi * mi.ln() + (1.0 - yi) * (1.0 - mi).ln()
        })
        .sum::<f64>()
}

impl LogisticRegression {
    /// Fits `P(y = 1) = sigmoid(X beta)`. The response must be 0/1.
    pub fn fit(design: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Self> {
        check_design(design, y)?;
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(SlrError::InvalidInput("Logistic regression requires a 0/1 response.".into()));
        }
        let backend = LinAlgBackendProvider::<f64>::new();
        let mut beta = Array1::<f64>::zeros(design.ncols());
        let mut mu = design.dot(&beta).mapv(sigmoid);
        let mut deviance = binomial_deviance(y, &mu);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < IRLS_MAX_ITERATIONS {
            iterations += 1;
            let eta = design.dot(&beta);
            let weights = mu.mapv(|m| (m * (1.0 - m)).max(MU_CLAMP));
            let working: Array1<f64> = eta
                .iter()
                .zip(y.iter())
                .zip(mu.iter().zip(weights.iter()))
                .map(|((&e, &yi), (&m, &w))| e + (yi - m) / w)
                .collect();
            let weighted_design = &design * &weights.view().insert_axis(Axis(1));
            let xtwx = weighted_design.t().dot(&design);
            let xtwz = weighted_design.t().dot(&working);
            let proposal = backend.solve(&xtwx, &xtwz)?;

            // Step-halving guards against deviance increases near separation.
            let mut step = proposal - &beta;
            let mut candidate = &beta + &step;
            let mut candidate_mu = design.dot(&candidate).mapv(sigmoid);
            let mut candidate_dev = binomial_deviance(y, &candidate_mu);
            let mut halvings = 0;
            while !(candidate_dev.is_finite() && candidate_dev <= deviance + 1e-12) && halvings < 30 {
                step.mapv_inplace(|s| s * 0.5);
                candidate = &beta + &step;
                candidate_mu = design.dot(&candidate).mapv(sigmoid);
                candidate_dev = binomial_deviance(y, &candidate_mu);
                halvings += 1;
            }

            let change = (deviance - candidate_dev).abs() / (candidate_dev.abs() + 0.1);
            beta = candidate;
            mu = candidate_mu;
            deviance = candidate_dev;
            trace!("IRLS iteration {}: deviance {:.6e}, relative change {:.3e}", iterations, deviance, change);
            if change < IRLS_TOLERANCE {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(
                "Logistic regression did not converge in {} iterations (deviance {:.4e}); the data may be separable.",
                IRLS_MAX_ITERATIONS, deviance
            );
        }

        let weights = mu.mapv(|m| (m * (1.0 - m)).max(MU_CLAMP));
        let weighted_design = &design * &weights.view().insert_axis(Axis(1));
        let information = weighted_design.t().dot(&design);
        let covariance = backend.inverse(&information)?;
        let standard_errors = covariance.diag().mapv(|v| v.max(0.0).sqrt());

        Ok(Self { coefficients: beta, standard_errors, deviance, iterations, converged })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn standard_errors(&self) -> &Array1<f64> {
        &self.standard_errors
    }

    /// Wald statistics `beta / se(beta)`.
    pub fn z_statistics(&self) -> Array1<f64> {
        &self.coefficients / &self.standard_errors
    }

    pub fn deviance(&self) -> f64 {
        self.deviance
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Response-scale predictions (probabilities).
    pub fn predict_proba(&self, design: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_columns(design, self.coefficients.len())?;
        Ok(design.dot(&self.coefficients).mapv(sigmoid))
    }
}

fn check_columns(design: ArrayView2<'_, f64>, n_coefficients: usize) -> Result<()> {
    if design.ncols() != n_coefficients {
        return Err(SlrError::InvalidInput(format!(
            "Design has {} columns but the model has {} coefficients.",
            design.ncols(),
            n_coefficients
        )));
    }
    Ok(())
}

/// The single-predictor (or intercept-only) regression stored in a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegressionModel {
    Linear(LinearRegression),
    Logistic(LogisticRegression),
}

impl RegressionModel {
    pub fn coefficients(&self) -> &Array1<f64> {
        match self {
            RegressionModel::Linear(m) => m.coefficients(),
            RegressionModel::Logistic(m) => m.coefficients(),
        }
    }

    /// Response-scale predictions: fitted values for linear, probabilities for logistic.
    pub fn predict_response(&self, design: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        match self {
            RegressionModel::Linear(m) => m.predict(design),
            RegressionModel::Logistic(m) => m.predict_proba(design),
        }
    }
}
