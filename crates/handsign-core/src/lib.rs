pub mod error;
pub mod labels;
pub mod record;
pub mod schema;
pub mod split;

pub use error::CoreError;
pub use labels::LabelEncoding;
pub use record::{
    COORDS_PER_LANDMARK, FEATURE_LEN, FeatureTable, FeatureVector, LabeledRecord, NUM_LANDMARKS,
    RawSample,
};
pub use schema::{LABEL_COLUMN, feature_column_names, feature_table_schema, table_header};
pub use split::{DEFAULT_SEED, DEFAULT_TEST_FRACTION, Split, train_test_split};
