//! Cross-partition stitching.
//!
//! Partitions overlap on their borders, so one region can come out of two
//! partitions as two partial merges. Re-running contiguity + dissolve over
//! the concatenated partials closes those merges. If that global pass fails
//! the partials are returned as they are and the outcome is marked degraded.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use log::warn;
use thiserror::Error;

use crate::feature::{FeatureId, MergedFeature};
use crate::merge::dissolve;

#[derive(Error, Debug)]
pub enum StitchError {
    #[error("stitch pass panicked: {0}")]
    Panicked(String),

    #[error("stitch pass lost track of sources: {input} distinct in, {output} out")]
    SourceMismatch { input: usize, output: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StitchOutcome {
    pub features: Vec<MergedFeature>,
    /// The global pass failed and `features` are the unstitched partials.
    pub degraded: bool,
}

/// Stitch the per-partition results of one category.
pub fn stitch(partials: Vec<MergedFeature>) -> StitchOutcome {
    stitch_with(partials, restitch)
}

/// The global pass: dissolve the partials, then check that every distinct
/// source ended up in exactly one output feature.
pub fn restitch(partials: &[MergedFeature]) -> Result<Vec<MergedFeature>, StitchError> {
    let stitched = dissolve(partials);

    let input: BTreeSet<FeatureId> = partials
        .iter()
        .flat_map(|f| f.sources().iter().map(|s| s.id))
        .collect();
    let output: usize = stitched.iter().map(|f| f.sources().len()).sum();

    if input.len() != output {
        return Err(StitchError::SourceMismatch {
            input: input.len(),
            output,
        });
    }

    Ok(stitched)
}

/// Run `pass` over the partials, degrading to the partials themselves when
/// it errors or panics.
pub fn stitch_with<F>(partials: Vec<MergedFeature>, pass: F) -> StitchOutcome
where
    F: FnOnce(&[MergedFeature]) -> Result<Vec<MergedFeature>, StitchError>,
{
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| pass(&partials)))
        .unwrap_or_else(|payload| Err(StitchError::Panicked(panic_message(payload.as_ref()))));

    match attempt {
        Ok(features) => StitchOutcome {
            features,
            degraded: false,
        },
        Err(err) => {
            warn!("stitch failed, keeping {} partition results: {err}", partials.len());
            StitchOutcome {
                features: drop_exact_duplicates(partials),
                degraded: true,
            }
        }
    }
}

/// A partial that is a complete component inside several partitions comes
/// out identical from each of them; keep the first copy.
fn drop_exact_duplicates(partials: Vec<MergedFeature>) -> Vec<MergedFeature> {
    let mut seen: BTreeSet<Vec<FeatureId>> = BTreeSet::new();

    partials
        .into_iter()
        .filter(|f| seen.insert(f.sources().iter().map(|s| s.id).collect()))
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
