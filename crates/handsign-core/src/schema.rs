//! Arrow schema for the landmark feature table.
//!
//! Column order is fixed: `x_0, y_0, z_0, …, x_20, y_20, z_20, label`. The
//! persisted CSV header and every in-memory `RecordBatch` use this order.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float32Array, LargeStringArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::record::{FEATURE_LEN, FeatureTable, FeatureVector, LabeledRecord, NUM_LANDMARKS};
use crate::CoreError;

/// Name of the class label column (always last).
pub const LABEL_COLUMN: &str = "label";

const AXES: [&str; 3] = ["x", "y", "z"];

/// Feature column names in table order.
pub fn feature_column_names() -> Vec<String> {
    (0..NUM_LANDMARKS)
        .flat_map(|i| AXES.iter().map(move |axis| format!("{axis}_{i}")))
        .collect()
}

/// Schema of the feature table: 63 non-null `Float32` columns, then `label`.
pub fn feature_table_schema() -> Schema {
    let mut fields: Vec<Field> = feature_column_names()
        .into_iter()
        .map(|name| Field::new(name, DataType::Float32, false))
        .collect();
    fields.push(Field::new(LABEL_COLUMN, DataType::Utf8, false));
    Schema::new(fields)
}

/// The delimited-text header line, without a trailing newline.
pub fn table_header() -> String {
    let mut names = feature_column_names();
    names.push(LABEL_COLUMN.to_string());
    names.join(",")
}

impl FeatureTable {
    /// Convert the table into a single `RecordBatch` with [`feature_table_schema`].
    pub fn to_record_batch(&self) -> Result<RecordBatch, CoreError> {
        let schema = Arc::new(feature_table_schema());

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(FEATURE_LEN + 1);
        for col in 0..FEATURE_LEN {
            let values: Vec<f32> = self.iter().map(|r| r.features().as_slice()[col]).collect();
            columns.push(Arc::new(Float32Array::from(values)));
        }
        columns.push(Arc::new(StringArray::from_iter_values(self.labels())));

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    /// Rebuild a table from Arrow batches, validating column names and order.
    ///
    /// Accepts `Utf8` or `LargeUtf8` labels. Any null cell or non-finite
    /// feature value is an error.
    pub fn from_record_batches(batches: &[RecordBatch]) -> Result<Self, CoreError> {
        let expected = feature_table_schema();
        let mut table = FeatureTable::new();
        let mut row_offset = 0usize;

        for batch in batches {
            check_column_names(&batch.schema(), &expected)?;

            let feature_cols = (0..FEATURE_LEN)
                .map(|i| {
                    batch
                        .column(i)
                        .as_any()
                        .downcast_ref::<Float32Array>()
                        .ok_or_else(|| {
                            CoreError::Schema(format!(
                                "column {} is {}, expected Float32",
                                expected.field(i).name(),
                                batch.column(i).data_type()
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let label_col = batch.column(FEATURE_LEN);

            for row in 0..batch.num_rows() {
                let mut values = [0.0f32; FEATURE_LEN];
                for (i, (value, col)) in values.iter_mut().zip(&feature_cols).enumerate() {
                    if col.is_null(row) {
                        return Err(CoreError::NullValue {
                            column: expected.field(i).name().clone(),
                            row: row_offset + row,
                        });
                    }
                    let v = col.value(row);
                    if !v.is_finite() {
                        return Err(CoreError::NonFinite {
                            column: expected.field(i).name().clone(),
                            row: row_offset + row,
                            value: v,
                        });
                    }
                    *value = v;
                }

                let label = get_string(label_col.as_ref(), row).ok_or_else(|| {
                    CoreError::NullValue {
                        column: LABEL_COLUMN.to_string(),
                        row: row_offset + row,
                    }
                })?;

                table.push(LabeledRecord::new(FeatureVector::new(values), label));
            }
            row_offset += batch.num_rows();
        }

        Ok(table)
    }
}

fn check_column_names(actual: &Schema, expected: &Schema) -> Result<(), CoreError> {
    if actual.fields().len() != expected.fields().len() {
        return Err(CoreError::Schema(format!(
            "expected {} columns, found {}",
            expected.fields().len(),
            actual.fields().len()
        )));
    }
    for (a, e) in actual.fields().iter().zip(expected.fields()) {
        if a.name() != e.name() {
            return Err(CoreError::Schema(format!(
                "expected column {:?}, found {:?}",
                e.name(),
                a.name()
            )));
        }
    }
    Ok(())
}

/// Extract a string value from an Arrow array (handles Utf8 and LargeUtf8).
fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> FeatureTable {
        let mut table = FeatureTable::new();
        for (n, label) in ["A", "B", "A"].iter().enumerate() {
            let values: Vec<f32> = (0..FEATURE_LEN).map(|i| n as f32 + i as f32 * 0.01).collect();
            table.push(LabeledRecord::new(
                FeatureVector::try_from(values).unwrap(),
                *label,
            ));
        }
        table
    }

    #[test]
    fn schema_has_expected_fields() {
        let schema = feature_table_schema();
        assert_eq!(schema.fields().len(), 64);
        assert_eq!(schema.field(0).name(), "x_0");
        assert_eq!(schema.field(1).name(), "y_0");
        assert_eq!(schema.field(2).name(), "z_0");
        assert_eq!(schema.field(62).name(), "z_20");
        assert_eq!(schema.field(63).name(), "label");
        assert!(schema.field_with_name("y_13").is_ok());
    }

    #[test]
    fn header_matches_schema_order() {
        let header = table_header();
        assert!(header.starts_with("x_0,y_0,z_0,x_1,"));
        assert!(header.ends_with(",x_20,y_20,z_20,label"));
        assert_eq!(header.split(',').count(), 64);
    }

    #[test]
    fn record_batch_round_trip_preserves_rows() {
        let table = sample_table();
        let batch = table.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 64);

        let back = FeatureTable::from_record_batches(&[batch]).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn empty_table_converts() {
        let batch = FeatureTable::new().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 0);
        let back = FeatureTable::from_record_batches(&[batch]).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn rejects_renamed_column() {
        let batch = sample_table().to_record_batch().unwrap();
        let mut fields: Vec<Field> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields[5] = Field::new("bogus", DataType::Float32, false);
        let renamed =
            RecordBatch::try_new(Arc::new(Schema::new(fields)), batch.columns().to_vec()).unwrap();

        let err = FeatureTable::from_record_batches(&[renamed]).unwrap_err();
        assert!(matches!(err, CoreError::Schema(_)), "got {err:?}");
    }

    #[test]
    fn rejects_null_feature() {
        let batch = sample_table().to_record_batch().unwrap();
        let mut fields: Vec<Field> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields[0] = Field::new("x_0", DataType::Float32, true);
        let mut columns = batch.columns().to_vec();
        columns[0] = Arc::new(Float32Array::from(vec![Some(0.1), None, Some(0.3)]));
        let with_null = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap();

        let err = FeatureTable::from_record_batches(&[with_null]).unwrap_err();
        assert!(
            matches!(err, CoreError::NullValue { ref column, row: 1 } if column == "x_0"),
            "got {err:?}"
        );
    }

    #[test]
    fn rejects_non_finite_feature() {
        let mut table = FeatureTable::new();
        for value in [0.5, f32::NAN, f32::INFINITY] {
            let mut values = [0.25f32; FEATURE_LEN];
            values[4] = value;
            table.push(LabeledRecord::new(FeatureVector::new(values), "A"));
        }
        let batch = table.to_record_batch().unwrap();

        let err = FeatureTable::from_record_batches(&[batch]).unwrap_err();
        assert!(
            matches!(err, CoreError::NonFinite { ref column, row: 1, .. } if column == "y_1"),
            "got {err:?}"
        );
    }
}
