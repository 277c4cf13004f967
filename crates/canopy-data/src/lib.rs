//! On-disk formats for canopy: the plain-text classifier format, CSV
//! datasets, tier vectors, region streams, and the counterexample log.

use thiserror::Error;

pub mod classifier_format;
pub mod dataset;
pub mod regions;
pub mod tiers;

pub use classifier_format::{read_classifier, read_classifier_from_path, write_classifier};
pub use dataset::Dataset;
pub use regions::{write_counterexample, RegionStream};
pub use tiers::{read_tiers, read_tiers_from_path};

/// Errors raised while reading or writing canopy's file formats.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Invalid(#[from] canopy_core::CanopyError),
}

impl DataError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        DataError::Parse {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
