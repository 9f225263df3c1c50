//! Storage layer: delimited-text feature tables and single-file JSON model artifacts.

mod artifact;
mod error;
mod table;

pub use artifact::{read_artifact, write_artifact};
pub use error::StoreError;
pub use table::{read_table, write_table};
