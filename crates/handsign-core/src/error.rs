use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("feature vector has {actual} values, expected {expected}")]
    WrongWidth { expected: usize, actual: usize },

    #[error("label {0:?} is not part of the encoding")]
    UnknownLabel(String),

    #[error("class list must be sorted and distinct, {0:?} is out of order")]
    UnsortedClasses(String),

    #[error("unexpected table schema: {0}")]
    Schema(String),

    #[error("null value in column {column} at row {row}")]
    NullValue { column: String, row: usize },

    #[error("non-finite value {value} in column {column} at row {row}")]
    NonFinite {
        column: String,
        row: usize,
        value: f32,
    },

    #[error("cannot split {rows} rows with test fraction {test_fraction}")]
    InvalidSplit { rows: usize, test_fraction: f64 },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
