// Agglomerative clustering over components and root bipartition extraction.

use crate::composition::VariationMatrix;
use crate::contrast::{Sign, SignVector};
use crate::error::{Result, SlrError};
use log::debug;
use ndarray::ArrayView2;

/// One merge step. Children index leaves (`< n_leaves`) or earlier merges
/// (`n_leaves + step`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
}

/// Complete-linkage dendrogram built from a distance matrix.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    n_leaves: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Builds the dendrogram by repeatedly merging the two closest clusters, where the
    /// distance between clusters is the largest pairwise leaf distance. Ties merge the
    /// pair with the smallest cluster ids first.
    pub fn from_distances(distances: ArrayView2<'_, f64>) -> Result<Self> {
        let n = distances.nrows();
        if n == 0 || distances.ncols() != n {
            return Err(SlrError::InvalidInput(format!(
                "Distance matrix must be square and non-empty, got {}x{}.",
                n,
                distances.ncols()
            )));
        }
        if distances.iter().any(|d| !d.is_finite()) {
            return Err(SlrError::InvalidInput("Distance matrix contains non-finite entries.".into()));
        }

        // Active cluster ids and their pairwise linkage distances, indexed by slot.
        let mut ids: Vec<usize> = (0..n).collect();
        let mut linkage = distances.to_owned();
        let mut active = vec![true; n];
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for step in 0..n.saturating_sub(1) {
            let mut best: Option<(usize, usize, f64)> = None;
            for a in 0..n {
                if !active[a] {
                    continue;
                }
                for b in (a + 1)..n {
                    if !active[b] {
                        continue;
                    }
                    let d = linkage[[a, b]];
                    if best.map_or(true, |(_, _, bd)| d < bd) {
                        best = Some((a, b, d));
                    }
                }
            }
            let (a, b, height) = best.ok_or_else(|| SlrError::Numerical("No clusters left to merge.".into()))?;
            let (left, right) = if ids[a] < ids[b] { (ids[a], ids[b]) } else { (ids[b], ids[a]) };
            merges.push(Merge { left, right, height });

            // Slot `a` now holds the merged cluster.
            for c in 0..n {
                if active[c] && c != a && c != b {
                    let d = linkage[[a, c]].max(linkage[[b, c]]);
                    linkage[[a, c]] = d;
                    linkage[[c, a]] = d;
                }
            }
            active[b] = false;
            ids[a] = n + step;
        }
        Ok(Self { n_leaves: n, merges })
    }

    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    fn leaves_under(&self, node: usize, out: &mut Vec<usize>) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current < self.n_leaves {
                out.push(current);
            } else {
                let merge = self.merges[current - self.n_leaves];
                stack.push(merge.right);
                stack.push(merge.left);
            }
        }
    }

    /// Leaves of the two subtrees joined at the root: `(first, second)`.
    ///
    /// Every leaf appears in exactly one of the two groups.
    pub fn root_bipartition(&self) -> Result<(Vec<usize>, Vec<usize>)> {
        let root = self.merges.last().ok_or_else(|| {
            SlrError::InvalidInput("A dendrogram over a single leaf has no bipartition.".into())
        })?;
        let mut first = Vec::new();
        let mut second = Vec::new();
        self.leaves_under(root.left, &mut first);
        self.leaves_under(root.right, &mut second);
        first.sort_unstable();
        second.sort_unstable();
        Ok((first, second))
    }
}

/// Sign vector from the root split of a complete-linkage clustering that uses the
/// Aitchison variation directly as the distance: first subtree `+1`, second `-1`.
pub fn hierarchical_partition(variation: &VariationMatrix) -> Result<SignVector> {
    if variation.len() < 2 {
        return Err(SlrError::InvalidInput(format!(
            "Hierarchical partitioning needs at least 2 components, got {}.",
            variation.len()
        )));
    }
    let dendrogram = Dendrogram::from_distances(variation.matrix().view())?;
    let (first, second) = dendrogram.root_bipartition()?;
    debug!(
        "Hierarchical partition of {} components: {} positive, {} negative",
        variation.len(),
        first.len(),
        second.len()
    );
    let mut signs = vec![Sign::Excluded; variation.len()];
    for &leaf in &first {
        signs[leaf] = Sign::Positive;
    }
    for &leaf in &second {
        signs[leaf] = Sign::Negative;
    }
    SignVector::new(variation.names().iter().cloned().zip(signs).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{aitchison_variation, Composition};
    use ndarray::array;

    #[test]
    fn complete_linkage_merge_heights() {
        let d = array![
            [0.0, 1.0, 4.0, 5.0],
            [1.0, 0.0, 3.0, 6.0],
            [4.0, 3.0, 0.0, 2.0],
            [5.0, 6.0, 2.0, 0.0],
        ];
        let dendrogram = Dendrogram::from_distances(d.view()).unwrap();
        let merges = dendrogram.merges();
        assert_eq!(merges.len(), 3);
        assert_eq!((merges[0].left, merges[0].right, merges[0].height), (0, 1, 1.0));
        assert_eq!((merges[1].left, merges[1].right, merges[1].height), (2, 3, 2.0));
        // complete linkage between {0,1} and {2,3} is max(4,5,3,6) = 6
        assert_eq!(merges[2].height, 6.0);

        let (first, second) = dendrogram.root_bipartition().unwrap();
        assert_eq!(first, vec![0, 1]);
        assert_eq!(second, vec![2, 3]);
    }

    #[test]
    fn partition_covers_every_component() {
        let x = Composition::new(
            array![
                [0.10, 0.12, 0.30, 0.48],
                [0.20, 0.22, 0.28, 0.30],
                [0.05, 0.06, 0.45, 0.44],
                [0.30, 0.33, 0.17, 0.20],
            ],
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        )
        .unwrap();
        let var = aitchison_variation(&x).unwrap();
        let signs = hierarchical_partition(&var).unwrap();
        assert_eq!(signs.len(), 4);
        assert!(signs.entries().iter().all(|(_, s)| *s != Sign::Excluded));
        assert!(!signs.positive().is_empty());
        assert!(!signs.negative().is_empty());
        // a and b move together, c and d move together
        assert_eq!(signs.sign_of("a"), signs.sign_of("b"));
        assert_eq!(signs.sign_of("c"), signs.sign_of("d"));
        assert_ne!(signs.sign_of("a"), signs.sign_of("c"));
    }

    #[test]
    fn single_leaf_has_no_bipartition() {
        let d = array![[0.0]];
        let dendrogram = Dendrogram::from_distances(d.view()).unwrap();
        assert!(dendrogram.root_bipartition().is_err());
    }
}
