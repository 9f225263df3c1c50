//! Single-file JSON persistence for trained model artifacts.
//!
//! The artifact type itself lives with the training code; this module only
//! moves it to and from disk.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::StoreError;

/// Serialize `artifact` as JSON to `path`, creating parent directories.
pub fn write_artifact<T: Serialize>(path: &Path, artifact: &T) -> Result<(), StoreError> {
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
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, artifact)?;
    writer.flush().map_err(write_err)?;

    info!(path = %path.display(), "wrote model artifact");
    Ok(())
}

/// Load an artifact previously written with [`write_artifact`].
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Err(StoreError::InputMissing(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    let artifact = serde_json::from_reader(reader)?;
    info!(path = %path.display(), "loaded model artifact");
    Ok(artifact)
}
