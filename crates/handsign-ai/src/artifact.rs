//! The trained-model artifact: one JSON document bundling the classifier with
//! the label encoding it was trained against.

use std::path::Path;

use chrono::Utc;
use handsign_core::{FEATURE_LEN, FeatureVector, LabelEncoding};
use handsign_store::{read_artifact, write_artifact};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::forest::RandomForest;
use crate::network::{EpochMetrics, FeedForwardNetwork, argmax};
use crate::TrainError;

/// Bumped whenever the artifact layout changes incompatibly.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    Network(FeedForwardNetwork),
    Forest(RandomForest),
}

impl Classifier {
    pub fn kind(&self) -> &'static str {
        match self {
            Classifier::Network(_) => "network",
            Classifier::Forest(_) => "forest",
        }
    }

    pub fn predict_proba(&self, features: &FeatureVector) -> Vec<f32> {
        match self {
            Classifier::Network(net) => net.predict_one(features.as_slice()),
            Classifier::Forest(forest) => forest.predict_proba(features.as_slice()),
        }
    }

    fn input_width(&self) -> usize {
        match self {
            Classifier::Network(net) => net.input_width(),
            Classifier::Forest(forest) => forest.n_features(),
        }
    }

    fn num_classes(&self) -> usize {
        match self {
            Classifier::Network(net) => net.num_classes(),
            Classifier::Forest(forest) => forest.num_classes(),
        }
    }
}

/// Held-out evaluation recorded at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub train_rows: usize,
    pub validation_rows: usize,
    pub accuracy: f32,
    /// Cross-entropy on the validation rows (network only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f32>,
    /// Per-epoch history (network only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<EpochMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub code: usize,
    pub label: String,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// RFC 3339 timestamp of when training finished.
    pub trained_at: String,
    pub encoding: LabelEncoding,
    pub metrics: Metrics,
    pub classifier: Classifier,
}

impl ModelArtifact {
    pub fn new(encoding: LabelEncoding, metrics: Metrics, classifier: Classifier) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            trained_at: Utc::now().to_rfc3339(),
            encoding,
            metrics,
            classifier,
        }
    }

    /// Classify one feature vector. Ties go to the lower code.
    pub fn predict(&self, features: &FeatureVector) -> Prediction {
        let probabilities = self.classifier.predict_proba(features);
        let code = argmax(probabilities.iter().copied());
        Prediction {
            code,
            label: self.encoding.decode(code).unwrap_or_default().to_string(),
            confidence: probabilities.get(code).copied().unwrap_or(0.0),
            probabilities,
        }
    }

    /// Check that the classifier and encoding agree with each other and with
    /// the feature width.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(TrainError::UnsupportedFormat(self.format_version));
        }
        if self.encoding.is_empty() {
            return Err(TrainError::InconsistentArtifact("no classes".into()));
        }
        let classes = self.classifier.num_classes();
        if classes != self.encoding.len() {
            return Err(TrainError::InconsistentArtifact(format!(
                "classifier has {classes} outputs but encoding has {} classes",
                self.encoding.len()
            )));
        }
        let width = self.classifier.input_width();
        if width != FEATURE_LEN {
            return Err(TrainError::InconsistentArtifact(format!(
                "classifier expects {width} features, not {FEATURE_LEN}"
            )));
        }
        match &self.classifier {
            Classifier::Forest(forest) if !forest.is_well_formed() => {
                Err(TrainError::InconsistentArtifact(
                    "forest contains malformed trees".into(),
                ))
            }
            Classifier::Network(net) if !net.is_well_formed() => {
                Err(TrainError::InconsistentArtifact(
                    "network layer shapes do not chain".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TrainError> {
        write_artifact(path, self)?;
        info!(
            kind = self.classifier.kind(),
            classes = self.encoding.len(),
            path = %path.display(),
            "saved model artifact"
        );
        Ok(())
    }

    /// Read and validate an artifact.
    pub fn load(path: &Path) -> Result<Self, TrainError> {
        let artifact: ModelArtifact = read_artifact(path)?;
        artifact.validate()?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::ForestConfig;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn encoding() -> LabelEncoding {
        LabelEncoding::fit(["A", "B"])
    }

    fn tiny_forest() -> RandomForest {
        let x = Array2::from_shape_fn((4, FEATURE_LEN), |(i, _)| if i < 2 { 0.0 } else { 1.0 });
        let config = ForestConfig {
            n_trees: 3,
            bootstrap: false,
            ..ForestConfig::default()
        };
        RandomForest::fit(x.view(), &[0, 0, 1, 1], 2, &config)
    }

    fn metrics() -> Metrics {
        Metrics {
            train_rows: 4,
            validation_rows: 1,
            accuracy: 1.0,
            loss: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn predict_decodes_label() {
        let artifact = ModelArtifact::new(encoding(), metrics(), Classifier::Forest(tiny_forest()));
        let prediction = artifact.predict(&FeatureVector::new([1.0; FEATURE_LEN]));
        assert_eq!(prediction.code, 1);
        assert_eq!(prediction.label, "B");
        assert_eq!(prediction.confidence, 1.0);
        assert_eq!(prediction.probabilities.len(), 2);
    }

    #[test]
    fn json_is_tagged_by_kind() {
        let artifact = ModelArtifact::new(encoding(), metrics(), Classifier::Forest(tiny_forest()));
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["classifier"]["kind"], "forest");
        assert_eq!(json["encoding"], serde_json::json!(["A", "B"]));
        assert_eq!(json["format_version"], 1);
        assert!(json["metrics"].get("loss").is_none());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut rng = StdRng::seed_from_u64(1);
        let net = FeedForwardNetwork::new(FEATURE_LEN, &[4], 2, 0.2, &mut rng);
        let artifact = ModelArtifact::new(encoding(), metrics(), Classifier::Network(net));

        artifact.save(&path).unwrap();
        let back = ModelArtifact::load(&path).unwrap();
        assert_eq!(back, artifact);
        assert_eq!(back.classifier.kind(), "network");
    }

    #[test]
    fn load_rejects_class_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = ModelArtifact::new(
            LabelEncoding::fit(["A", "B", "C"]),
            metrics(),
            Classifier::Forest(tiny_forest()),
        );
        write_artifact(&path, &artifact).unwrap();

        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(matches!(err, TrainError::InconsistentArtifact(_)), "got {err:?}");
    }

    #[test]
    fn load_rejects_future_format() {
        let mut artifact =
            ModelArtifact::new(encoding(), metrics(), Classifier::Forest(tiny_forest()));
        artifact.format_version = 99;
        assert!(matches!(
            artifact.validate(),
            Err(TrainError::UnsupportedFormat(99))
        ));
    }

    #[test]
    fn load_missing_file_is_input_missing() {
        let err = ModelArtifact::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(
            matches!(err, TrainError::Store(handsign_store::StoreError::InputMissing(_))),
            "got {err:?}"
        );
    }

    #[test]
    fn load_rejects_inner_layer_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut rng = StdRng::seed_from_u64(1);
        let net = FeedForwardNetwork::new(FEATURE_LEN, &[4, 3], 2, 0.2, &mut rng);
        let artifact = ModelArtifact::new(encoding(), metrics(), Classifier::Network(net));

        // Outer widths stay 63 and 2, the middle layer no longer takes 4 inputs.
        let mut json = serde_json::to_value(&artifact).unwrap();
        let first = json["classifier"]["layers"][0].clone();
        json["classifier"]["layers"][1] = first;
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(matches!(err, TrainError::InconsistentArtifact(_)), "got {err:?}");
    }
}
