// Compositional matrices and the Aitchison variation.

use crate::error::{Result, SlrError};
use log::trace;
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Samples (rows) of strictly positive proportions over named components (columns).
///
/// Entries are validated at construction: log-ratios are taken everywhere downstream,
/// so zeros or negative values are rejected rather than propagated as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    names: Vec<String>,
    values: Array2<f64>,
}

impl Composition {
    /// Builds a composition from a `(n_samples, n_components)` matrix and its column names.
    ///
    /// # Errors
    /// Fails if the matrix is empty, the names do not match the column count or are not
    /// unique, or any entry is non-finite or not strictly positive.
    pub fn new(values: Array2<f64>, names: Vec<String>) -> Result<Self> {
        if values.nrows() == 0 || values.ncols() == 0 {
            return Err(SlrError::InvalidInput(format!(
                "Composition must have at least one sample and one component, got {}x{}.",
                values.nrows(),
                values.ncols()
            )));
        }
        if names.len() != values.ncols() {
            return Err(SlrError::InvalidInput(format!(
                "Got {} component names for {} columns.",
                names.len(),
                values.ncols()
            )));
        }
        let mut seen = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if let Some(prev) = seen.insert(name.as_str(), idx) {
                return Err(SlrError::InvalidInput(format!(
                    "Component name '{}' appears at columns {} and {}.",
                    name, prev, idx
                )));
            }
        }
        if let Some(((row, col), bad)) = values.indexed_iter().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
            return Err(SlrError::InvalidInput(format!(
                "Compositional entries must be finite and strictly positive; found {} at sample {}, component '{}'.",
                bad, row, names[col]
            )));
        }
        Ok(Self { names, values })
    }

    /// Builds a composition with generated names `c0, c1, ...`.
    pub fn from_values(values: Array2<f64>) -> Result<Self> {
        let names = (0..values.ncols()).map(|j| format!("c{}", j)).collect();
        Self::new(values, names)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Column index of a named component.
    pub fn column_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Restricts to the named components, in the order given.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_of(name.as_ref()).ok_or_else(|| {
                    SlrError::InvalidInput(format!("Component '{}' is not present in the data.", name.as_ref()))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        self.select_columns(&indices)
    }

    /// Restricts to the given column indices, in the order given.
    pub fn select_columns(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&j| j >= self.ncols()) {
            return Err(SlrError::InvalidInput(format!(
                "Column index {} out of range for {} components.",
                bad,
                self.ncols()
            )));
        }
        Ok(Self {
            names: indices.iter().map(|&j| self.names[j].clone()).collect(),
            values: self.values.select(Axis(1), indices),
        })
    }

    /// Restricts to the given samples (rows), in the order given.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.nrows()) {
            return Err(SlrError::InvalidInput(format!(
                "Sample index {} out of range for {} samples.",
                bad,
                self.nrows()
            )));
        }
        if indices.is_empty() {
            return Err(SlrError::InvalidInput("Cannot select zero samples from a composition.".into()));
        }
        Ok(Self {
            names: self.names.clone(),
            values: self.values.select(Axis(0), indices),
        })
    }

    /// Appends the rows of `other` below `self`. Both must carry identical component names.
    pub fn stack(&self, other: &Composition) -> Result<Self> {
        if self.names != other.names {
            return Err(SlrError::InvalidInput(
                "Cannot stack compositions whose component names differ.".into(),
            ));
        }
        let values = concatenate(Axis(0), &[self.values.view(), other.values.view()])
            .map_err(|e| SlrError::InvalidInput(format!("Failed to stack compositions: {}", e)))?;
        Ok(Self { names: self.names.clone(), values })
    }

    /// Elementwise natural log.
    pub fn log_values(&self) -> Array2<f64> {
        self.values.mapv(f64::ln)
    }

    /// Centered log-ratio transform: each row's logs minus that row's mean log.
    pub fn clr(&self) -> Array2<f64> {
        let mut logs = self.log_values();
        for mut row in logs.axis_iter_mut(Axis(0)) {
            let mean = row.sum() / row.len() as f64;
            row.mapv_inplace(|v| v - mean);
        }
        logs
    }
}

/// Pairwise log-ratio variances over a set of named components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationMatrix {
    names: Vec<String>,
    matrix: Array2<f64>,
}

impl VariationMatrix {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Similarity as `max(variation) - variation`, elementwise.
    pub fn to_similarity(&self) -> Array2<f64> {
        let max = self.matrix.iter().cloned().fold(0.0_f64, f64::max);
        self.matrix.mapv(|v| max - v)
    }
}

/// Sample variance with an `n - 1` denominator.
pub(crate) fn sample_variance(values: &Array1<f64>) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.sum() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)
}

/// Aitchison variation: entry `(j, k)` is the sample variance of `ln x_j - ln x_k`.
///
/// The result is symmetric with a zero diagonal. Costs `O(p^2 n)`.
///
/// # Errors
/// Fails with fewer than two samples, where the variance is undefined.
pub fn aitchison_variation(x: &Composition) -> Result<VariationMatrix> {
    if x.nrows() < 2 {
        return Err(SlrError::InvalidInput(format!(
            "Aitchison variation needs at least 2 samples, got {}.",
            x.nrows()
        )));
    }
    let logs = x.log_values();
    let p = x.ncols();
    let mut matrix = Array2::<f64>::zeros((p, p));
    for j in 0..p {
        for k in (j + 1)..p {
            let diff = &logs.column(j) - &logs.column(k);
            let var = sample_variance(&diff);
            matrix[[j, k]] = var;
            matrix[[k, j]] = var;
        }
    }
    trace!("Computed {}x{} Aitchison variation over {} samples.", p, p, x.nrows());
    Ok(VariationMatrix { names: x.names().to_vec(), matrix })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn toy() -> Composition {
        Composition::new(
            array![[0.2, 0.3, 0.5], [0.1, 0.6, 0.3], [0.4, 0.4, 0.2], [0.25, 0.25, 0.5]],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap()
    }

    #[test]
    fn rejects_zero_and_negative_entries() {
        let zero = Composition::from_values(array![[0.5, 0.5], [1.0, 0.0]]);
        assert!(matches!(zero, Err(SlrError::InvalidInput(_))));
        let negative = Composition::from_values(array![[0.5, -0.5], [0.2, 0.8]]);
        assert!(matches!(negative, Err(SlrError::InvalidInput(_))));
    }

    #[test]
    fn rejects_duplicate_and_mismatched_names() {
        let dup = Composition::new(array![[0.5, 0.5]], vec!["a".into(), "a".into()]);
        assert!(dup.is_err());
        let short = Composition::new(array![[0.5, 0.5]], vec!["a".into()]);
        assert!(short.is_err());
    }

    #[test]
    fn clr_rows_sum_to_zero() {
        let clr = toy().clr();
        for row in clr.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn variation_is_symmetric_with_zero_diagonal() {
        let var = aitchison_variation(&toy()).unwrap();
        let m = var.matrix();
        for j in 0..3 {
            assert_eq!(m[[j, j]], 0.0);
            for k in 0..3 {
                assert_eq!(m[[j, k]], m[[k, j]]);
                assert!(m[[j, k]] >= 0.0);
            }
        }
    }

    #[test]
    fn variation_matches_direct_computation() {
        let x = toy();
        let var = aitchison_variation(&x).unwrap();
        let lr: Array1<f64> = x.values().rows().into_iter().map(|r| (r[0] / r[2]).ln()).collect();
        assert_abs_diff_eq!(var.matrix()[[0, 2]], sample_variance(&lr), epsilon = 1e-12);
    }

    #[test]
    fn similarity_is_max_minus_variation() {
        let var = aitchison_variation(&toy()).unwrap();
        let sim = var.to_similarity();
        let max = var.matrix().iter().cloned().fold(0.0, f64::max);
        assert_abs_diff_eq!(sim[[0, 0]], max, epsilon = 1e-12);
        assert_abs_diff_eq!(sim[[0, 1]], max - var.matrix()[[0, 1]], epsilon = 1e-12);
    }

    #[test]
    fn select_and_stack_preserve_names() {
        let x = toy();
        let sub = x.select(&["c", "a"]).unwrap();
        assert_eq!(sub.names(), &["c".to_string(), "a".to_string()]);
        assert_eq!(sub.values()[[1, 0]], 0.3);
        assert!(x.select(&["zzz"]).is_err());

        let stacked = sub.stack(&sub).unwrap();
        assert_eq!(stacked.nrows(), 8);
        assert!(sub.stack(&x).is_err());
    }
}
