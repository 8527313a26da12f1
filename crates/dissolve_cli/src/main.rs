mod config;
mod input;

use std::fs::{self, File};
use std::io::BufWriter;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dissolve::{Crs, MergeConfig, RepairRules};
use log::info;

use crate::config::Args;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    if args.output.exists() && !args.overwrite {
        bail!(
            "{} exists; pass --overwrite to replace it",
            args.output.display()
        );
    }

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("configuring the worker pool")?;
    }

    let config = MergeConfig {
        partitions: args.partitions,
        categories: (!args.categories.is_empty())
            .then(|| args.categories.iter().copied().collect()),
        expected_crs: args.crs.parse::<Crs>()?,
        repair: RepairRules {
            min_ring_points: args.min_ring_points,
        },
        parallel: !args.sequential,
    };
    config.validate()?;

    let layout = args.layout();
    let features = input::load(&args.input, &layout)?;

    let output = dissolve::run(features, &config, &args.output, &layout)
        .with_context(|| format!("merging {}", args.input.display()))?;

    let summary = output.stats.summary();
    info!(
        "{} -> {} features ({:.1}% reduction, {:.2}x, {:.0} features/s){}",
        summary.original_features,
        summary.merged_features,
        summary.reduction_percent,
        summary.compression_ratio,
        summary.features_per_second,
        if output.stats.stitch_degraded {
            ", stitch degraded"
        } else {
            ""
        }
    );

    if let Some(path) = &args.stats {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let report = serde_json::json!({
            "stats": output.stats,
            "summary": summary,
        });
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &report)?;
        info!("Stats written to {}", path.display());
    }

    Ok(())
}
