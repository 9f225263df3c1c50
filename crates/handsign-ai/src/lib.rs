//! Perception and learning layer: hand landmark extraction, corpus aggregation,
//! and the two training harnesses (feed-forward network, random forest).

mod artifact;
mod dataset;
mod error;
mod forest;
mod landmarks;
mod network;
mod palm;
mod roi;
mod train;

#[cfg(feature = "onnx")]
mod detector;
#[cfg(feature = "onnx")]
pub use detector::{LANDMARK_MODEL_FILE, OnnxHandLandmarker, PALM_MODEL_FILE};

pub use artifact::{ARTIFACT_FORMAT_VERSION, Classifier, Metrics, ModelArtifact, Prediction};
pub use dataset::{
    AggregateOptions, AggregateReport, ClassCount, IMAGE_EXTENSIONS, aggregate, build_dataset,
    is_image_file, list_classes, list_samples,
};
pub use error::{DatasetError, ExtractError, TrainError};
pub use forest::{DecisionTree, ForestConfig, Node, RandomForest};
pub use landmarks::{HandLandmarker, MIN_DETECTION_CONFIDENCE, load_image};
pub use network::{EpochMetrics, FeedForwardNetwork, NetworkConfig};
pub use palm::{
    Anchor, BOX_REGRESSORS, NMS_IOU_THRESHOLD, NUM_PALM_KEYPOINTS, PALM_INPUT_SIZE, PalmDetection,
    decode_palms, non_maximum_averaging, palm_anchors, select_hand,
};
pub use roi::Roi;
pub use train::{
    CLASSES_FILE, PreparedData, classes_path, prepare, run_forest_harness, run_network_harness,
    train_forest, train_network,
};
