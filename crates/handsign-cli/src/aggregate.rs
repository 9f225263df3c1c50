//! Aggregation pipeline: walk the image corpus, extract landmarks, write the table.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use handsign_ai::{AggregateOptions, AggregateReport, HandLandmarker, build_dataset, list_classes};

pub struct AggregateStats {
    pub report: AggregateReport,
    pub elapsed_secs: f64,
}

/// Make sure `data_dir` is a readable corpus root; returns its class count.
pub fn check_data_dir(data_dir: &Path) -> anyhow::Result<usize> {
    let classes =
        list_classes(data_dir).with_context(|| format!("reading {}", data_dir.display()))?;
    Ok(classes.len())
}

/// Run the full pipeline: list classes → extract landmarks → write CSV.
pub fn run_aggregate<L>(
    data_dir: &Path,
    output: &Path,
    options: &AggregateOptions,
    landmarker: &mut L,
) -> anyhow::Result<AggregateStats>
where
    L: HandLandmarker + ?Sized,
{
    let start = Instant::now();

    eprintln!("  Reading images from {}", data_dir.display());
    if let Some(limit) = options.limit {
        eprintln!("  Limiting to {limit} rows per class");
    }

    let report = build_dataset(data_dir, output, options, landmarker)
        .with_context(|| format!("aggregating {}", data_dir.display()))?;

    Ok(AggregateStats {
        report,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}
