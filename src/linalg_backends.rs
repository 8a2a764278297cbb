// src/linalg_backends.rs

use crate::error::{Result, SlrError};
use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh as NdLinalgEigh, Inverse as NdLinalgInverse, Solve as NdLinalgSolve, UPLO};
use std::marker::PhantomData;

#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues in the order returned by the backend (ascending for LAPACK).
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Trait for symmetric eigendecomposition (LAPACK DSYEVD-style).
/// Implementers expect `matrix` to be symmetric and read its upper triangle.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>>;
}

/// Trait for dense linear solves used by the regression engine.
pub trait BackendSolve<F: 'static + Copy + Send + Sync> {
    /// Solves `matrix * x = rhs` for `x`.
    fn solve(&self, matrix: &Array2<F>, rhs: &Array1<F>) -> Result<Array1<F>>;
    /// Full inverse of a (small) square matrix.
    fn inverse(&self, matrix: &Array2<F>) -> Result<Array2<F>>;
}

#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_linalg_error<E: std::error::Error>(e: E) -> SlrError {
    SlrError::LinAlg(e.to_string())
}

impl BackendEigh<f64> for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>> {
        if matrix.nrows() != matrix.ncols() {
            return Err(SlrError::LinAlg(format!(
                "Matrix must be square for eigendecomposition, got {}x{}.",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.is_empty() {
            return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_linalg_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendSolve<f64> for NdarrayLinAlgBackend {
    fn solve(&self, matrix: &Array2<f64>, rhs: &Array1<f64>) -> Result<Array1<f64>> {
        matrix.solve(rhs).map_err(to_linalg_error)
    }

    fn inverse(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        matrix.inv().map_err(to_linalg_error)
    }
}

// --- LinAlgBackendProvider dispatch ---

impl<F> BackendEigh<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendEigh<F>,
{
    fn eigh_upper(&self, matrix: &Array2<F>) -> Result<EighOutput<F>> {
        NdarrayLinAlgBackend.eigh_upper(matrix)
    }
}

impl<F> BackendSolve<F> for LinAlgBackendProvider<F>
where
    F: 'static + Copy + Send + Sync,
    NdarrayLinAlgBackend: BackendSolve<F>,
{
    fn solve(&self, matrix: &Array2<F>, rhs: &Array1<F>) -> Result<Array1<F>> {
        NdarrayLinAlgBackend.solve(matrix, rhs)
    }

    fn inverse(&self, matrix: &Array2<F>) -> Result<Array2<F>> {
        NdarrayLinAlgBackend.inverse(matrix)
    }
}
