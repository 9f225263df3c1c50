//! Training harnesses. Both share the same preparation: fit the label
//! encoding, encode the label column, and split rows with the configured
//! seed, so the network and the forest always see the same partition.

use std::path::{Path, PathBuf};

use handsign_core::{FEATURE_LEN, FeatureTable, LabelEncoding, Split, train_test_split};
use handsign_store::{read_table, write_artifact};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::artifact::{Classifier, Metrics, ModelArtifact};
use crate::forest::{ForestConfig, RandomForest};
use crate::network::{FeedForwardNetwork, NetworkConfig};
use crate::TrainError;

/// Encoded, split training data.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub encoding: LabelEncoding,
    pub split: Split,
    pub x_train: Array2<f32>,
    pub y_train: Vec<usize>,
    pub x_test: Array2<f32>,
    pub y_test: Vec<usize>,
}

fn feature_matrix(table: &FeatureTable, rows: &[usize]) -> Array2<f32> {
    let records = table.records();
    Array2::from_shape_fn((rows.len(), FEATURE_LEN), |(i, j)| {
        records[rows[i]].features().as_slice()[j]
    })
}

/// Fit the encoding and split `table` into train and validation matrices.
pub fn prepare(
    table: &FeatureTable,
    test_fraction: f64,
    seed: u64,
) -> Result<PreparedData, TrainError> {
    if table.is_empty() {
        return Err(TrainError::EmptyTable);
    }
    let encoding = LabelEncoding::from_table(table);
    let codes = encoding.encode_table(table)?;
    let split = train_test_split(table.len(), test_fraction, seed)?;

    info!(
        rows = table.len(),
        features = FEATURE_LEN,
        classes = ?encoding.classes(),
        "Data shape and classes"
    );

    Ok(PreparedData {
        x_train: feature_matrix(table, &split.train),
        y_train: split.train.iter().map(|&i| codes[i]).collect(),
        x_test: feature_matrix(table, &split.test),
        y_test: split.test.iter().map(|&i| codes[i]).collect(),
        encoding,
        split,
    })
}

/// Train the feed-forward network and evaluate it on the held-out rows.
pub fn train_network(
    table: &FeatureTable,
    config: &NetworkConfig,
) -> Result<ModelArtifact, TrainError> {
    let data = prepare(table, config.test_fraction, config.seed)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut network = FeedForwardNetwork::new(
        FEATURE_LEN,
        &config.hidden,
        data.encoding.len(),
        config.dropout,
        &mut rng,
    );

    let history = network.fit(
        data.x_train.view(),
        &data.y_train,
        data.x_test.view(),
        &data.y_test,
        config,
        &mut rng,
    );
    let (loss, accuracy) = network.evaluate(data.x_test.view(), &data.y_test);
    info!(accuracy, loss, "Validation accuracy");

    let metrics = Metrics {
        train_rows: data.y_train.len(),
        validation_rows: data.y_test.len(),
        accuracy,
        loss: Some(loss),
        history,
    };
    Ok(ModelArtifact::new(
        data.encoding,
        metrics,
        Classifier::Network(network),
    ))
}

/// Train the random forest and score it on the held-out rows.
pub fn train_forest(
    table: &FeatureTable,
    config: &ForestConfig,
) -> Result<ModelArtifact, TrainError> {
    let data = prepare(table, config.test_fraction, config.seed)?;
    info!(trees = config.n_trees, "Training random forest");

    let forest = RandomForest::fit(
        data.x_train.view(),
        &data.y_train,
        data.encoding.len(),
        config,
    );
    let accuracy = forest.score(data.x_test.view(), &data.y_test);
    info!(accuracy, "Model accuracy");

    let metrics = Metrics {
        train_rows: data.y_train.len(),
        validation_rows: data.y_test.len(),
        accuracy,
        loss: None,
        history: Vec::new(),
    };
    Ok(ModelArtifact::new(
        data.encoding,
        metrics,
        Classifier::Forest(forest),
    ))
}

/// File name of the class list written beside a network artifact.
pub const CLASSES_FILE: &str = "classes.json";

/// `classes.json` in the directory of `model_output`.
pub fn classes_path(model_output: &Path) -> PathBuf {
    model_output.with_file_name(CLASSES_FILE)
}

/// Read the table at `data_file`, train the network, write the artifact and
/// its class list (as a JSON array in code order) beside it.
pub fn run_network_harness(
    data_file: &Path,
    model_output: &Path,
    config: &NetworkConfig,
) -> Result<ModelArtifact, TrainError> {
    let table = read_table(data_file)?;
    let artifact = train_network(&table, config)?;
    artifact.save(model_output)?;

    let classes = classes_path(model_output);
    write_artifact(&classes, &artifact.encoding)?;
    info!(path = %classes.display(), classes = artifact.encoding.len(), "saved class list");
    Ok(artifact)
}

/// Read the table at `data_file`, train the forest, write the artifact.
pub fn run_forest_harness(
    data_file: &Path,
    model_output: &Path,
    config: &ForestConfig,
) -> Result<ModelArtifact, TrainError> {
    let table = read_table(data_file)?;
    let artifact = train_forest(&table, config)?;
    artifact.save(model_output)?;
    Ok(artifact)
}
