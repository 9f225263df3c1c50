//! Corpus aggregation: walk `<root>/<label>/<image>` and turn every image with
//! a detectable hand into one labeled row.
//!
//! Classes and files are visited in sorted name order, so the optional
//! per-class cap selects the same files on every platform. Per-image failures
//! are counted and skipped; only directory-level failures abort.

use std::fs;
use std::path::{Path, PathBuf};

use handsign_core::{FeatureTable, LabeledRecord, RawSample};
use handsign_store::write_table;
use tracing::{info, warn};

use crate::landmarks::{HandLandmarker, load_image};
use crate::DatasetError;

/// Accepted image file extensions, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    /// Stop a class after this many rows have been extracted from it.
    pub limit: Option<usize>,
}

/// Outcome for one class directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCount {
    pub label: String,
    pub rows: usize,
    pub skipped_decode: usize,
    pub skipped_no_hand: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub classes: Vec<ClassCount>,
}

impl AggregateReport {
    pub fn total_rows(&self) -> usize {
        self.classes.iter().map(|c| c.rows).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.classes
            .iter()
            .map(|c| c.skipped_decode + c.skipped_no_hand)
            .sum()
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Class directories under `root` as `(label, path)`, sorted by name.
///
/// Plain files at the root are ignored, as are directories whose names are
/// not valid UTF-8 (with a warning).
pub fn list_classes(root: &Path) -> Result<Vec<(String, PathBuf)>, DatasetError> {
    if !root.exists() {
        return Err(DatasetError::RootMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DatasetError::NotADirectory(root.to_path_buf()));
    }

    let mut classes = Vec::new();
    for path in read_dir_sorted(root)? {
        if !path.is_dir() {
            continue;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(label) => classes.push((label.to_string(), path.clone())),
            None => warn!(path = %path.display(), "skipping class directory with non UTF-8 name"),
        }
    }
    Ok(classes)
}

/// Image files in one class directory, sorted by file name.
pub fn list_samples(class_dir: &Path, label: &str) -> Result<Vec<RawSample>, DatasetError> {
    Ok(read_dir_sorted(class_dir)?
        .into_iter()
        .filter(|p| p.is_file() && is_image_file(p))
        .map(|path| RawSample {
            path,
            label: label.to_string(),
        })
        .collect())
}

/// Extract one row per detected hand across every class under `root`.
///
/// Rows come out grouped by class, in enumeration order. Decode failures and
/// images without a hand are skipped and counted in the report.
pub fn aggregate<L>(
    root: &Path,
    options: &AggregateOptions,
    landmarker: &mut L,
) -> Result<(FeatureTable, AggregateReport), DatasetError>
where
    L: HandLandmarker + ?Sized,
{
    let classes = list_classes(root)?;
    let labels: Vec<&str> = classes.iter().map(|(l, _)| l.as_str()).collect();
    info!(?labels, "Found classes");

    let mut table = FeatureTable::new();
    let mut report = AggregateReport::default();

    for (label, dir) in &classes {
        info!(class = %label, "Processing class");
        let mut count = ClassCount {
            label: label.clone(),
            rows: 0,
            skipped_decode: 0,
            skipped_no_hand: 0,
        };

        for sample in list_samples(dir, label)? {
            if options.limit.is_some_and(|limit| count.rows >= limit) {
                break;
            }
            let image = match load_image(&sample.path) {
                Ok(image) => image,
                Err(e) => {
                    warn!(error = %e, "skipping image");
                    count.skipped_decode += 1;
                    continue;
                }
            };
            match landmarker.landmarks(&image) {
                Some(features) => {
                    table.push(LabeledRecord::new(features, sample.label));
                    count.rows += 1;
                }
                None => count.skipped_no_hand += 1,
            }
        }

        info!(
            class = %label,
            rows = count.rows,
            skipped_decode = count.skipped_decode,
            skipped_no_hand = count.skipped_no_hand,
            "Processed {} images for class {}",
            count.rows,
            label
        );
        report.classes.push(count);
    }

    info!(total = table.len(), "Total samples");
    Ok((table, report))
}

/// Aggregate `root` and persist the table to `output`.
///
/// Nothing is written if the corpus yields no rows.
pub fn build_dataset<L>(
    root: &Path,
    output: &Path,
    options: &AggregateOptions,
    landmarker: &mut L,
) -> Result<AggregateReport, DatasetError>
where
    L: HandLandmarker + ?Sized,
{
    let (table, report) = aggregate(root, options, landmarker)?;
    if table.is_empty() {
        return Err(DatasetError::EmptyCorpus(root.to_path_buf()));
    }
    write_table(output, &table)?;
    Ok(report)
}
