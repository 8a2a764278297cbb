// Enumerated options accepted at the library boundary.

use crate::error::SlrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-component association statistic used for screening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenMethod {
    /// Pearson correlation of each clr column with the response.
    Correlation,
    /// Univariate regression Wald statistic mapped through its reference CDF.
    Wald,
}

/// How the screened components are split into the two balance groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMethod {
    Spectral,
    Hierarchical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    Continuous,
    Binary,
    /// Accepted for parsing; every code path that reaches it fails with `NotImplemented`.
    Survival,
}

/// Held-out error measure used by cross-validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeMeasure {
    /// Mean squared error (continuous responses).
    Mse,
    /// Misclassification rate at a 0.5 cutoff (binary responses).
    Accuracy,
    /// `1 - AUC` (binary responses).
    Auc,
}

/// Fudge term added to every standard error in the continuous Wald screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum S0Percentile {
    /// Median of the per-component standard errors.
    #[default]
    Median,
    /// The given quantile (in `[0, 1]`) of the per-component standard errors.
    Quantile(f64),
    /// No fudge term.
    Disabled,
}

impl S0Percentile {
    /// Maps an optional numeric percentile: unset is the median, negative disables the term.
    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            None => S0Percentile::Median,
            Some(q) if q < 0.0 => S0Percentile::Disabled,
            Some(q) => S0Percentile::Quantile(q),
        }
    }
}

impl ResponseType {
    pub fn is_binary(self) -> bool {
        matches!(self, ResponseType::Binary)
    }
}

impl TypeMeasure {
    /// The default measure for a response type (`Mse` for continuous, `Auc` for binary).
    pub fn default_for(response: ResponseType) -> Self {
        match response {
            ResponseType::Binary => TypeMeasure::Auc,
            _ => TypeMeasure::Mse,
        }
    }
}

fn unknown(kind: &str, value: &str, allowed: &[&str]) -> SlrError {
    SlrError::InvalidOption(format!("Unknown {} '{}'; expected one of {:?}.", kind, value, allowed))
}

impl FromStr for ScreenMethod {
    type Err = SlrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "correlation" | "cor" => Ok(ScreenMethod::Correlation),
            "wald" => Ok(ScreenMethod::Wald),
            _ => Err(unknown("screen method", s, &["correlation", "wald"])),
        }
    }
}

impl FromStr for ClusterMethod {
    type Err = SlrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spectral" => Ok(ClusterMethod::Spectral),
            "hierarchical" => Ok(ClusterMethod::Hierarchical),
            _ => Err(unknown("cluster method", s, &["spectral", "hierarchical"])),
        }
    }
}

impl FromStr for ResponseType {
    type Err = SlrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continuous" => Ok(ResponseType::Continuous),
            "binary" => Ok(ResponseType::Binary),
            "survival" => Ok(ResponseType::Survival),
            _ => Err(unknown("response type", s, &["continuous", "binary", "survival"])),
        }
    }
}

impl FromStr for TypeMeasure {
    type Err = SlrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mse" => Ok(TypeMeasure::Mse),
            "accuracy" => Ok(TypeMeasure::Accuracy),
            "auc" => Ok(TypeMeasure::Auc),
            _ => Err(unknown("type measure", s, &["mse", "accuracy", "auc"])),
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseType::Continuous => "continuous",
            ResponseType::Binary => "binary",
            ResponseType::Survival => "survival",
        };
        f.write_str(name)
    }
}

impl fmt::Display for TypeMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeMeasure::Mse => "mse",
            TypeMeasure::Accuracy => "accuracy",
            TypeMeasure::Auc => "auc",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_options_case_insensitively() {
        assert_eq!("Wald".parse::<ScreenMethod>().unwrap(), ScreenMethod::Wald);
        assert_eq!("spectral".parse::<ClusterMethod>().unwrap(), ClusterMethod::Spectral);
        assert_eq!("BINARY".parse::<ResponseType>().unwrap(), ResponseType::Binary);
        assert_eq!("auc".parse::<TypeMeasure>().unwrap(), TypeMeasure::Auc);
    }

    #[test]
    fn rejects_unknown_options() {
        assert!(matches!("kmeans".parse::<ClusterMethod>(), Err(SlrError::InvalidOption(_))));
        assert!(matches!("deviance".parse::<TypeMeasure>(), Err(SlrError::InvalidOption(_))));
    }

    #[test]
    fn s0_percentile_mapping() {
        assert_eq!(S0Percentile::from_option(None), S0Percentile::Median);
        assert_eq!(S0Percentile::from_option(Some(-1.0)), S0Percentile::Disabled);
        assert_eq!(S0Percentile::from_option(Some(0.25)), S0Percentile::Quantile(0.25));
        assert_eq!(S0Percentile::default(), S0Percentile::Median);
    }

    #[test]
    fn default_measure_follows_response_type() {
        assert_eq!(TypeMeasure::default_for(ResponseType::Continuous), TypeMeasure::Mse);
        assert_eq!(TypeMeasure::default_for(ResponseType::Binary), TypeMeasure::Auc);
    }
}
