//! Error types for the merge engine.
//!
//! Only whole-run contract violations surface here. Per-feature defects are
//! repaired or dropped and counted, and a failed stitch degrades instead of
//! failing.

use thiserror::Error;

use crate::feature::{Crs, FeatureId};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unrecognized CRS tag `{0}`")]
    InvalidCrs(String),

    /// Mixed-CRS input. Nothing is merged and nothing is written.
    #[error("feature {feature} is in {found}, expected {expected}")]
    CrsMismatch {
        expected: Crs,
        found: Crs,
        feature: FeatureId,
    },

    #[error("output error: {0}")]
    Output(#[from] gpq::GpqError),
}

pub type Result<T> = std::result::Result<T, MergeError>;
