// Graph Laplacian and two-way spectral partitioning of screened components.

use crate::contrast::{Sign, SignVector};
use crate::error::{Result, SlrError};
use crate::linalg_backends::{BackendEigh, LinAlgBackendProvider};
use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of random k-means restarts used by [`spectral_partition`].
pub const KMEANS_RESTARTS: usize = 100;
const KMEANS_MAX_ITERATIONS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaplacianKind {
    /// `D^{-1/2} W D^{-1/2}`.
    Normalized,
    /// `D - W`.
    Unnormalized,
}

/// Builds a graph Laplacian from a similarity matrix after adding the uniform weight
/// `zeta * mean(colSums(W)) / n` to every pair.
///
/// # Errors
/// `InvalidInput` for a non-square matrix or negative `zeta`; `Numerical` when a vertex
/// has zero degree under the normalized kind.
pub fn graph_laplacian(similarity: ArrayView2<'_, f64>, zeta: f64, kind: LaplacianKind) -> Result<Array2<f64>> {
    let n = similarity.nrows();
    if n == 0 || similarity.ncols() != n {
        return Err(SlrError::InvalidInput(format!(
            "Similarity matrix must be square and non-empty, got {}x{}.",
            n,
            similarity.ncols()
        )));
    }
    if !(zeta >= 0.0) {
        return Err(SlrError::InvalidInput(format!("Perturbation zeta must be nonnegative, got {}.", zeta)));
    }
    let column_sums = similarity.sum_axis(Axis(0));
    let mean_degree = column_sums.sum() / n as f64;
    let regularized = similarity.mapv(|w| w + zeta * mean_degree / n as f64);
    let degrees = regularized.sum_axis(Axis(0));

    match kind {
        LaplacianKind::Unnormalized => Ok(Array2::from_diag(&degrees) - &regularized),
        LaplacianKind::Normalized => {
            if let Some(j) = degrees.iter().position(|&g| !(g > 0.0)) {
                return Err(SlrError::Numerical(format!(
                    "Vertex {} has non-positive degree {}; the normalized Laplacian is undefined.",
                    j, degrees[j]
                )));
            }
            let inv_sqrt: Array1<f64> = degrees.mapv(|g| 1.0 / g.sqrt());
            let mut laplacian = regularized;
            for ((i, j), value) in laplacian.indexed_iter_mut() {
                *value *= inv_sqrt[i] * inv_sqrt[j];
            }
            Ok(laplacian)
        }
    }
}

/// Outcome of a k-means run.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster label in `0..k` for each point.
    pub labels: Vec<usize>,
    pub centers: Array2<f64>,
    /// Total within-cluster sum of squares.
    pub inertia: f64,
}

fn squared_distance(a: ndarray::ArrayView1<'_, f64>, b: ndarray::ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn lloyd<R: Rng + ?Sized>(points: ArrayView2<'_, f64>, k: usize, max_iterations: usize, rng: &mut R) -> KMeansResult {
    let n = points.nrows();
    let init = sample(rng, n, k).into_vec();
    let mut centers = points.select(Axis(0), &init);
    let mut labels = vec![usize::MAX; n];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, point) in points.axis_iter(Axis(0)).enumerate() {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, center) in centers.axis_iter(Axis(0)).enumerate() {
                let d = squared_distance(point, center);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        for c in 0..k {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
            // An empty cluster keeps its previous center.
            if let Some(mean) = points.select(Axis(0), &members).mean_axis(Axis(0)) {
                centers.row_mut(c).assign(&mean);
            }
        }
    }

    let inertia = points
        .axis_iter(Axis(0))
        .zip(labels.iter())
        .map(|(point, &c)| squared_distance(point, centers.row(c)))
        .sum();
    KMeansResult { labels, centers, inertia }
}

/// Lloyd k-means with random restarts, keeping the run with the lowest inertia.
///
/// Each restart starts from `k` distinct points drawn from `rng`.
pub fn kmeans<R: Rng + ?Sized>(points: ArrayView2<'_, f64>, k: usize, restarts: usize, rng: &mut R) -> Result<KMeansResult> {
    if k == 0 || points.nrows() < k {
        return Err(SlrError::InvalidInput(format!(
            "k-means with k = {} needs at least k points, got {}.",
            k,
            points.nrows()
        )));
    }
    let mut best: Option<KMeansResult> = None;
    for restart in 0..restarts.max(1) {
        let run = lloyd(points, k, KMEANS_MAX_ITERATIONS, rng);
        trace!("k-means restart {}: inertia {:.6e}", restart, run.inertia);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.ok_or_else(|| SlrError::Numerical("k-means produced no result.".into()))
}

/// Splits the vertices of a similarity graph into a `-1` and a `+1` group.
///
/// The normalized Laplacian of the regularized graph is eigendecomposed, the two
/// eigenvectors with largest `|lambda|` are used as coordinates, and 2-means with
/// [`KMEANS_RESTARTS`] restarts assigns the groups (first cluster `-1`, second `+1`).
///
/// # Errors
/// `InvalidInput` for fewer than two vertices or mismatched names, and
/// `DegeneratePartition` if every vertex lands in the same cluster.
pub fn spectral_partition<R: Rng + ?Sized>(
    similarity: ArrayView2<'_, f64>,
    names: &[String],
    zeta: f64,
    rng: &mut R,
) -> Result<SignVector> {
    let n = similarity.nrows();
    if n < 2 {
        return Err(SlrError::InvalidInput(format!(
            "Spectral partitioning needs at least 2 components, got {}.",
            n
        )));
    }
    if names.len() != n {
        return Err(SlrError::InvalidInput(format!(
            "Got {} names for a {}x{} similarity matrix.",
            names.len(),
            n,
            n
        )));
    }
    let laplacian = graph_laplacian(similarity, zeta, LaplacianKind::Normalized)?;
    let eig = LinAlgBackendProvider::<f64>::new().eigh_upper(&laplacian)?;

    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .abs()
            .partial_cmp(&eig.eigenvalues[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let embedding = eig.eigenvectors.select(Axis(1), &order[..2]);
    signs_from_embedding(embedding.view(), names, rng)
}

/// 2-means over embedded vertices (one row each): first cluster `-1`, second `+1`.
pub(crate) fn signs_from_embedding<R: Rng + ?Sized>(
    embedding: ArrayView2<'_, f64>,
    names: &[String],
    rng: &mut R,
) -> Result<SignVector> {
    let n = embedding.nrows();
    let clustering = kmeans(embedding, 2, KMEANS_RESTARTS, rng)?;
    let n_negative = clustering.labels.iter().filter(|&&c| c == 0).count();
    if n_negative == 0 || n_negative == n {
        return Err(SlrError::DegeneratePartition(n));
    }
    debug!(
        "Spectral partition of {} components: {} negative, {} positive (inertia {:.4e})",
        n,
        n_negative,
        n - n_negative,
        clustering.inertia
    );

    let entries = names
        .iter()
        .zip(clustering.labels.iter())
        .map(|(name, &c)| (name.clone(), if c == 0 { Sign::Negative } else { Sign::Positive }))
        .collect();
    SignVector::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{}", i)).collect()
    }

    #[test]
    fn normalized_laplacian_is_symmetric() {
        let w = array![[1.0, 0.5, 0.1], [0.5, 1.0, 0.2], [0.1, 0.2, 1.0]];
        let l = graph_laplacian(w.view(), 0.1, LaplacianKind::Normalized).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(l[[i, j]], l[[j, i]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn regularization_adds_uniform_weight() {
        let w = array![[0.0, 2.0], [2.0, 0.0]];
        // mean(colSums) = 2, n = 2, zeta = 1 -> every entry gains 1.
        let l = graph_laplacian(w.view(), 1.0, LaplacianKind::Unnormalized).unwrap();
        assert_abs_diff_eq!(l[[0, 0]], 4.0 - 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l[[0, 1]], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn normalized_entries_scale_regularized_weights_by_degrees() {
        let w = array![[1.0, 0.5, 0.1], [0.5, 2.0, 0.2], [0.1, 0.2, 0.4]];
        let zeta = 0.3;
        let l = graph_laplacian(w.view(), zeta, LaplacianKind::Normalized).unwrap();

        let n = 3.0;
        let mean_degree = w.sum() / n;
        let shifted = w.mapv(|v| v + zeta * mean_degree / n);
        let g = shifted.sum_axis(Axis(0));
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(l[[i, j]], shifted[[i, j]] / (g[i] * g[j]).sqrt(), epsilon = 1e-12);
            }
        }
        // hand-computed: mean degree 5/3, shift 1/6; degrees 2.1, 3.2, 1.2
        assert_abs_diff_eq!(l[[0, 2]], (0.1 + 1.0 / 6.0) / (2.1_f64 * 1.2).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(l[[1, 1]], (2.0 + 1.0 / 6.0) / 3.2, epsilon = 1e-12);
    }

    #[test]
    fn unnormalized_rows_sum_to_zero() {
        let w = array![[1.0, 0.5, 0.1], [0.5, 1.0, 0.2], [0.1, 0.2, 1.0]];
        let l = graph_laplacian(w.view(), 0.0, LaplacianKind::Unnormalized).unwrap();
        for row in l.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn zero_degree_is_rejected() {
        let w = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            graph_laplacian(w.view(), 0.0, LaplacianKind::Normalized),
            Err(SlrError::Numerical(_))
        ));
    }

    #[test]
    fn kmeans_separates_two_blobs() {
        let points = array![[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [5.0, 5.0], [5.1, 5.0], [5.0, 5.1]];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let result = kmeans(points.view(), 2, 10, &mut rng).unwrap();
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[0], result.labels[2]);
        assert_eq!(result.labels[3], result.labels[4]);
        assert_ne!(result.labels[0], result.labels[3]);
        assert!(result.inertia < 0.1);
    }

    #[test]
    fn kmeans_on_coincident_points_uses_one_cluster() {
        let points = Array2::<f64>::from_elem((4, 2), 0.5);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = kmeans(points.view(), 2, 5, &mut rng).unwrap();
        assert!(result.labels.iter().all(|&c| c == result.labels[0]));
        assert_abs_diff_eq!(result.inertia, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn coincident_embedding_is_a_degenerate_partition() {
        let embedding = Array2::<f64>::from_elem((4, 2), -0.25);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        assert!(matches!(
            signs_from_embedding(embedding.view(), &names(4), &mut rng),
            Err(SlrError::DegeneratePartition(4))
        ));
    }

    #[test]
    fn partition_of_block_similarity_recovers_blocks() {
        let w = array![
            [1.0, 0.9, 0.9, 0.1, 0.1],
            [0.9, 1.0, 0.9, 0.1, 0.1],
            [0.9, 0.9, 1.0, 0.1, 0.1],
            [0.1, 0.1, 0.1, 1.0, 0.9],
            [0.1, 0.1, 0.1, 0.9, 1.0],
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let signs = spectral_partition(w.view(), &names(5), 0.0, &mut rng).unwrap();
        let codes = signs.codes();
        assert_eq!(codes[0], codes[1]);
        assert_eq!(codes[1], codes[2]);
        assert_eq!(codes[3], codes[4]);
        assert_ne!(codes[0], codes[3]);
    }

    #[test]
    fn partition_always_has_both_groups() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for n in 2..7 {
            let w = Array2::from_shape_fn((n, n), |(i, j)| if i == j { 2.0 } else { 1.0 / (1.0 + (i as f64 - j as f64).abs()) });
            let signs = spectral_partition(w.view(), &names(n), 0.05, &mut rng).unwrap();
            assert_eq!(signs.len(), n);
            assert!(!signs.positive().is_empty());
            assert!(!signs.negative().is_empty());
            assert_eq!(signs.positive().len() + signs.negative().len(), n);
        }
    }

    #[test]
    fn partition_is_reproducible_for_a_seed() {
        let w = array![[2.0, 0.3, 0.8], [0.3, 2.0, 0.2], [0.8, 0.2, 2.0]];
        let a = spectral_partition(w.view(), &names(3), 0.0, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        let b = spectral_partition(w.view(), &names(3), 0.0, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_vertex_is_rejected() {
        let w = array![[1.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(spectral_partition(w.view(), &names(1), 0.0, &mut rng).is_err());
    }
}
