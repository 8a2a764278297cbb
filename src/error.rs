use thiserror::Error;

/// Errors raised while screening, partitioning, fitting or cross-validating.
#[derive(Error, Debug)]
pub enum SlrError {
    /// Dimension mismatches, non-positive compositions, malformed responses.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An enumerated option that is unknown or not valid for the response type.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A contrast with the wrong length, a code outside {-1, 0, 1}, or an empty group.
    #[error("Invalid contrast: {0}")]
    InvalidContrast(String),

    /// Data required by the requested configuration was not supplied.
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Two-way clustering collapsed every component into a single group.
    #[error("Partitioning produced a single group of {0} components; a balance needs two non-empty groups")]
    DegeneratePartition(usize),

    /// A quantity was undefined for the data at hand (e.g. AUC with a single class).
    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Linear algebra backend failed: {0}")]
    LinAlg(String),

    #[error("Model persistence failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, SlrError>;
