// Sign vectors over named components and the balance they define.

use crate::composition::Composition;
use crate::error::{Result, SlrError};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Group membership of a component within a balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    Negative,
    Excluded,
    Positive,
}

impl Sign {
    pub fn from_code(code: i8) -> Result<Self> {
        match code {
            -1 => Ok(Sign::Negative),
            0 => Ok(Sign::Excluded),
            1 => Ok(Sign::Positive),
            other => Err(SlrError::InvalidContrast(format!(
                "Contrast entries must be -1, 0 or 1, got {}.",
                other
            ))),
        }
    }

    pub fn code(self) -> i8 {
        match self {
            Sign::Negative => -1,
            Sign::Excluded => 0,
            Sign::Positive => 1,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Sign::Negative => Sign::Positive,
            Sign::Excluded => Sign::Excluded,
            Sign::Positive => Sign::Negative,
        }
    }
}

/// Ordered mapping from component name to [`Sign`].
///
/// Sign vectors are always re-aligned to data by name, never by position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignVector {
    entries: Vec<(String, Sign)>,
}

impl SignVector {
    pub fn new(entries: Vec<(String, Sign)>) -> Result<Self> {
        for (i, (name, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(other, _)| other == name) {
                return Err(SlrError::InvalidContrast(format!(
                    "Component '{}' appears more than once in the contrast.",
                    name
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Builds a sign vector from names and integer codes in {-1, 0, 1}.
    pub fn from_codes(names: &[String], codes: &[i8]) -> Result<Self> {
        if names.len() != codes.len() {
            return Err(SlrError::InvalidContrast(format!(
                "Contrast has {} entries for {} components.",
                codes.len(),
                names.len()
            )));
        }
        let entries = names
            .iter()
            .zip(codes)
            .map(|(name, &code)| Ok((name.clone(), Sign::from_code(code)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, Sign)] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn sign_of(&self, name: &str) -> Option<Sign> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| *s)
    }

    pub fn codes(&self) -> Vec<i8> {
        self.entries.iter().map(|(_, s)| s.code()).collect()
    }

    fn with_sign(&self, sign: Sign) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, s)| *s == sign)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn positive(&self) -> Vec<String> {
        self.with_sign(Sign::Positive)
    }

    pub fn negative(&self) -> Vec<String> {
        self.with_sign(Sign::Negative)
    }

    /// Names with a nonzero sign, in order.
    pub fn active_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, s)| *s != Sign::Excluded)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Swaps the positive and negative groups.
    pub fn negated(&self) -> Self {
        Self {
            entries: self.entries.iter().map(|(n, s)| (n.clone(), s.flipped())).collect(),
        }
    }

    /// Balance of `x` after aligning its columns to this sign vector by name.
    pub fn balance(&self, x: &Composition) -> Result<Array1<f64>> {
        let aligned = x.select(&self.names())?;
        balance(aligned.values(), &self.codes())
    }
}

/// Row-wise mean log over the `+1` columns minus mean log over the `-1` columns.
///
/// # Errors
/// `InvalidContrast` when `contrast` does not have one entry per column, contains a
/// code outside {-1, 0, 1}, or leaves either group empty.
pub fn balance(x: ArrayView2<'_, f64>, contrast: &[i8]) -> Result<Array1<f64>> {
    if contrast.len() != x.ncols() {
        return Err(SlrError::InvalidContrast(format!(
            "Contrast length {} does not match the {} columns of the data.",
            contrast.len(),
            x.ncols()
        )));
    }
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for (j, &code) in contrast.iter().enumerate() {
        match Sign::from_code(code)? {
            Sign::Positive => positive.push(j),
            Sign::Negative => negative.push(j),
            Sign::Excluded => {}
        }
    }
    if positive.is_empty() || negative.is_empty() {
        return Err(SlrError::InvalidContrast(format!(
            "A balance needs at least one positive and one negative component (got {} positive, {} negative).",
            positive.len(),
            negative.len()
        )));
    }
    let n_pos = positive.len() as f64;
    let n_neg = negative.len() as f64;
    Ok(x
        .rows()
        .into_iter()
        .map(|row| {
            let pos = positive.iter().map(|&j| row[j].ln()).sum::<f64>() / n_pos;
            let neg = negative.iter().map(|&j| row[j].ln()).sum::<f64>() / n_neg;
            pos - neg
        })
        .collect())
}
