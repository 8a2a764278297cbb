// Supervised log-ratio (balance) regression for compositional data

#![doc = include_str!("../README.md")]

pub mod composition;
pub mod contrast;
pub mod cv;
pub mod error;
pub mod hierarchical;
pub mod linalg_backends;
pub mod model;
pub mod options;
pub mod regression;
pub mod screening;
pub mod spectral;

pub use composition::{aitchison_variation, Composition, VariationMatrix};
pub use contrast::{balance, Sign, SignVector};
pub use cv::{cross_validate, select_thresholds, CvConfig, CvResult, Selection, ThresholdSelection};
pub use error::{Result, SlrError};
pub use model::{fit, predict, BalanceModel, FittedModel, InterceptModel, SlrConfig};
pub use options::{ClusterMethod, ResponseType, S0Percentile, ScreenMethod, TypeMeasure};
pub use screening::feature_scores;
