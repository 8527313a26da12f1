//! Dissolve: merge touching same-category polygons, partition by partition.
//!
//! ```text
//! InputFeature ──▶ guard (one CRS) ──▶ repair ──▶ partition (s × s grid)
//!                                                      │
//!                          per partition, per category ▼
//!                        adjacency graph ──▶ components ──▶ union
//!                                                      │
//!                                  per category        ▼
//!                                  stitch (same graph + union over partials)
//!                                                      │
//!                                                      ▼
//!                              retain_valid ──▶ MergeOutput ──▶ GeoParquet
//! ```
//!
//! Two polygons are contiguous when they share any point, so corner contact
//! merges. A feature crossing a cell border is a member of every cell it
//! touches; the stitch pass closes the merge groups this splits, and
//! per-source bookkeeping keeps `merged_count` from counting a feature twice.

pub mod adjacency;
pub mod engine;
pub mod error;
pub mod feature;
pub mod guard;
pub(crate) mod index;
pub mod merge;
pub mod output;
pub mod partition;
pub mod repair;
pub mod stitch;

pub use engine::{merge_features, run, CategoryStats, MergeConfig, MergeOutput, MergeStats, Summary};
pub use error::{MergeError, Result};
pub use feature::{Category, Crs, Feature, FeatureId, InputFeature, MergedFeature, Polygonal, Source};
pub use guard::{enforce_crs, retain_valid, CrsReport};
pub use output::{to_table, write_geoparquet};
pub use repair::{repair, DropReason, RepairRules, RepairStats, Repaired};
pub use stitch::{stitch, StitchOutcome};

pub use gpq::TableLayout;
