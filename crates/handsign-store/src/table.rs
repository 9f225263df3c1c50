//! Feature table persistence as comma-delimited text.
//!
//! The file starts with the header `x_0,y_0,z_0,…,x_20,y_20,z_20,label` and
//! holds one row per sample. Reading checks the header line verbatim before
//! handing the remaining lines to Arrow's CSV reader.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;
use handsign_core::{FeatureTable, feature_table_schema, table_header};
use tracing::info;

use crate::StoreError;

const READ_BATCH_SIZE: usize = 4096;

/// Write `table` to `path`, replacing any existing file.
///
/// Parent directories are created as needed. An empty table produces a
/// header-only file.
pub fn write_table(path: &Path, table: &FeatureTable) -> Result<(), StoreError> {
    let batch = table.to_record_batch()?;

    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let file = File::create(path).map_err(write_err)?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .build(BufWriter::new(file));
    writer.write(&batch)?;
    writer.into_inner().flush().map_err(write_err)?;

    info!(path = %path.display(), rows = table.len(), "wrote feature table");
    Ok(())
}

/// Read a feature table written by [`write_table`] (or any tool producing the
/// same header and column order).
pub fn read_table(path: &Path) -> Result<FeatureTable, StoreError> {
    if !path.exists() {
        return Err(StoreError::InputMissing(path.to_path_buf()));
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let header = header
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n']);
    if header != table_header() {
        return Err(StoreError::HeaderMismatch {
            path: path.to_path_buf(),
            found: header.chars().take(80).collect(),
        });
    }

    let csv = ReaderBuilder::new(Arc::new(feature_table_schema()))
        .with_header(false)
        .with_batch_size(READ_BATCH_SIZE)
        .build_buffered(reader)?;
    let batches = csv.collect::<Result<Vec<RecordBatch>, _>>()?;
    let table = FeatureTable::from_record_batches(&batches)?;

    info!(path = %path.display(), rows = table.len(), "read feature table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use handsign_core::{FEATURE_LEN, FeatureVector, LabeledRecord};
    use tempfile::TempDir;

    fn sample_table() -> FeatureTable {
        let mut table = FeatureTable::new();
        for (n, label) in ["B", "A", "thumbs, up", "A"].iter().enumerate() {
            let values: Vec<f32> = (0..FEATURE_LEN)
                .map(|i| (n * FEATURE_LEN + i) as f32 / 257.0 - 0.1)
                .collect();
            table.push(LabeledRecord::new(
                FeatureVector::try_from(values).unwrap(),
                *label,
            ));
        }
        table
    }

    #[test]
    fn round_trip_preserves_rows_and_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("landmarks.csv");
        let table = sample_table();

        write_table(&path, &table).unwrap();
        let back = read_table(&path).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn written_header_is_canonical() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("landmarks.csv");
        write_table(&path, &sample_table()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first, table_header());
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn empty_table_writes_header_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.csv");
        write_table(&path, &FeatureTable::new()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), table_header());
        assert!(read_table(&path).unwrap().is_empty());
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("nested").join("landmarks.csv");
        write_table(&path, &sample_table()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn missing_file_errors() {
        let result = read_table(Path::new("/nonexistent/landmarks.csv"));
        assert!(matches!(result, Err(StoreError::InputMissing(_))));
    }

    #[test]
    fn wrong_header_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.csv");
        std::fs::write(&path, "a,b,c,label\n1,2,3,A\n").unwrap();

        let result = read_table(&path);
        assert!(matches!(result, Err(StoreError::HeaderMismatch { .. })));
    }

    #[test]
    fn reads_double_precision_text() {
        // Tables produced by other tools may carry more digits than f32 holds.
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wide.csv");
        let row: Vec<String> = (0..FEATURE_LEN)
            .map(|i| format!("{:.17}", 0.123456789012345 + i as f64))
            .collect();
        std::fs::write(
            &path,
            format!("{}\n{},A\n{},B\n", table_header(), row.join(","), row.join(",")),
        )
        .unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert!((table.records()[0].features().as_slice()[0] - 0.123_456_79).abs() < 1e-6);
        assert_eq!(table.records()[1].label(), "B");
    }

    #[test]
    fn nan_cell_is_rejected_on_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nan.csv");
        let finite = vec!["0.5"; FEATURE_LEN].join(",");
        let mut with_nan = vec!["0.5"; FEATURE_LEN];
        with_nan[0] = "NaN";
        std::fs::write(
            &path,
            format!("{}\n{finite},A\n{},B\n", table_header(), with_nan.join(",")),
        )
        .unwrap();

        let err = read_table(&path).unwrap_err();
        assert!(
            matches!(
                err,
                StoreError::Core(handsign_core::CoreError::NonFinite { ref column, row: 1, .. })
                    if column == "x_0"
            ),
            "got {err:?}"
        );
    }
}
