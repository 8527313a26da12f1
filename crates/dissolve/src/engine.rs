//! The merge pipeline: guard, repair, partition, per-partition dissolve,
//! stitch, output check.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

use gpq::TableLayout;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{MergeError, Result};
use crate::feature::{Category, Crs, Feature, InputFeature, MergedFeature};
use crate::guard::{enforce_crs, retain_valid};
use crate::merge::dissolve;
use crate::output::write_geoparquet;
use crate::partition::{partition, Partition};
use crate::repair::{repair, RepairRules, RepairStats};
use crate::stitch::stitch;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    /// Target partition count; the grid is `ceil(sqrt(k))` cells per side.
    pub partitions: usize,
    /// Category codes to process. `None` processes every code present.
    pub categories: Option<BTreeSet<Category>>,
    pub expected_crs: Crs,
    pub repair: RepairRules,
    /// Merge partitions on the rayon pool.
    pub parallel: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            categories: None,
            expected_crs: Crs::default(),
            repair: RepairRules::default(),
            parallel: true,
        }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(MergeError::Config("partition count must be positive".into()));
        }

        if self.categories.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err(MergeError::Config("category set is empty".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    /// Features of this category that survived repair.
    pub original_feature_count: usize,
    pub merged_feature_count: usize,
    pub stitch_degraded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeStats {
    pub per_category: BTreeMap<Category, CategoryStats>,
    /// Set when any category fell back to unstitched partition results.
    pub stitch_degraded: bool,
    pub partitions_used: usize,
    pub repair: RepairStats,
    pub crs_assigned: usize,
    pub dropped_after_union: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub original_features: usize,
    pub merged_features: usize,
    pub reduction_percent: f64,
    pub compression_ratio: f64,
    pub features_per_second: f64,
}

impl MergeStats {
    pub fn summary(&self) -> Summary {
        let original: usize = self.per_category.values().map(|c| c.original_feature_count).sum();
        let merged: usize = self.per_category.values().map(|c| c.merged_feature_count).sum();

        let reduction_percent = if original > 0 {
            (1.0 - merged as f64 / original as f64) * 100.0
        } else {
            0.0
        };
        let compression_ratio = if merged > 0 {
            original as f64 / merged as f64
        } else {
            1.0
        };
        let seconds = self.elapsed_ms.max(1) as f64 / 1000.0;

        Summary {
            original_features: original,
            merged_features: merged,
            reduction_percent,
            compression_ratio,
            features_per_second: original as f64 / seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutput {
    pub crs: Crs,
    /// Ordered by category, then by first source within the category.
    pub features: Vec<MergedFeature>,
    pub stats: MergeStats,
}

/// Merge every group of touching same-category features.
///
/// Fails only on a bad configuration or mixed-CRS input, both before any
/// geometry is touched. Empty input is not an error.
pub fn merge_features(mut input: Vec<InputFeature>, config: &MergeConfig) -> Result<MergeOutput> {
    let started = Instant::now();
    config.validate()?;

    let crs_report = enforce_crs(&mut input, &config.expected_crs)?;

    let wanted: BTreeSet<Category> = match &config.categories {
        Some(set) => set.clone(),
        None => input.iter().map(|f| f.category).collect(),
    };

    let mut stats = MergeStats {
        per_category: wanted.iter().map(|&c| (c, CategoryStats::default())).collect(),
        crs_assigned: crs_report.assigned,
        ..MergeStats::default()
    };

    let features = repair_all(input, &wanted, &config.repair, &mut stats);
    for f in &features {
        if let Some(c) = stats.per_category.get_mut(&f.category) {
            c.original_feature_count += 1;
        }
    }

    let partitions = partition(&features, config.partitions);
    stats.partitions_used = partitions.len();
    info!(
        "{} features in {} partitions (target {})",
        features.len(),
        partitions.len(),
        config.partitions
    );

    let mut merged = Vec::new();

    for &category in &wanted {
        let partials = merge_partitions(&features, &partitions, category, config.parallel);
        if partials.is_empty() {
            continue;
        }

        let (result, degraded) = if partitions.len() > 1 {
            let outcome = stitch(partials);
            (outcome.features, outcome.degraded)
        } else {
            (partials, false)
        };

        let (result, dropped) = retain_valid(result);
        stats.dropped_after_union += dropped;
        stats.stitch_degraded |= degraded;

        if let Some(c) = stats.per_category.get_mut(&category) {
            c.merged_feature_count = result.len();
            c.stitch_degraded = degraded;
            info!(
                "category {category}: {} -> {} features{}",
                c.original_feature_count,
                c.merged_feature_count,
                if degraded { " (stitch degraded)" } else { "" }
            );
        }

        merged.extend(result);
    }

    stats.elapsed_ms = started.elapsed().as_millis() as u64;

    Ok(MergeOutput {
        crs: config.expected_crs.clone(),
        features: merged,
        stats,
    })
}

/// [`merge_features`], then write the result to `path` as GeoParquet.
/// Nothing is written when the merge fails.
pub fn run<P: AsRef<Path>>(
    input: Vec<InputFeature>,
    config: &MergeConfig,
    path: P,
    layout: &TableLayout,
) -> Result<MergeOutput> {
    let output = merge_features(input, config)?;
    write_geoparquet(path, &output, layout)?;
    Ok(output)
}

fn repair_all(
    input: Vec<InputFeature>,
    wanted: &BTreeSet<Category>,
    rules: &RepairRules,
    stats: &mut MergeStats,
) -> Vec<Feature> {
    let mut skipped = 0usize;
    let mut features = Vec::with_capacity(input.len());

    for f in input {
        if !wanted.contains(&f.category) {
            skipped += 1;
            continue;
        }

        let outcome = repair(f.geometry, rules);
        stats.repair.record(&outcome);

        if let Some(geometry) = outcome.into_geometry() {
            features.push(Feature {
                id: f.id,
                category: f.category,
                geometry,
                weight: f.weight,
            });
        }
    }

    if skipped > 0 {
        debug!("{skipped} features outside the selected categories");
    }

    let r = &stats.repair;
    info!(
        "repair: {} inspected, {} valid, {} repaired, {} dropped",
        r.inspected,
        r.valid,
        r.repaired,
        r.dropped()
    );

    features
}

/// Dissolve `category` inside every partition. Results come back in
/// partition order whichever way they were computed.
fn merge_partitions(
    features: &[Feature],
    partitions: &[Partition],
    category: Category,
    parallel: bool,
) -> Vec<MergedFeature> {
    let task = |part: &Partition| -> Vec<MergedFeature> {
        let subset: Vec<&Feature> = part
            .members
            .iter()
            .map(|&i| &features[i])
            .filter(|f| f.category == category)
            .collect();

        if subset.is_empty() {
            Vec::new()
        } else {
            dissolve(&subset)
        }
    };

    let per_partition: Vec<Vec<MergedFeature>> = if parallel {
        partitions.par_iter().map(task).collect()
    } else {
        partitions.iter().map(task).collect()
    };

    per_partition.into_iter().flatten().collect()
}
