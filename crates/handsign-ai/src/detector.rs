//! ONNX Runtime hand landmark pipeline using the MediaPipe hand models.
//!
//! Two stages: a palm detector over the letterboxed image picks one hand and
//! a rotated region around it, then the landmark model regresses 21 points
//! inside that region. The model directory must contain
//! `palm_detection_full.onnx` and `hand_landmark_full.onnx`.

use std::path::Path;

use handsign_core::{COORDS_PER_LANDMARK, FEATURE_LEN, FeatureVector, NUM_LANDMARKS};
use image::RgbImage;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use tracing::{info, warn};

use crate::landmarks::{HandLandmarker, MIN_DETECTION_CONFIDENCE};
use crate::palm::{
    Anchor, BOX_REGRESSORS, NMS_IOU_THRESHOLD, PALM_INPUT_SIZE, PalmDetection, decode_palms,
    non_maximum_averaging, palm_anchors, select_hand,
};
use crate::roi::{Roi, hwc_to_chw};

pub const PALM_MODEL_FILE: &str = "palm_detection_full.onnx";
pub const LANDMARK_MODEL_FILE: &str = "hand_landmark_full.onnx";

/// Side length of the square landmark model input.
const LANDMARK_INPUT_SIZE: usize = 224;

/// Channel order a model expects for its image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Nchw,
    Nhwc,
}

impl Layout {
    /// Infer the layout from a `[1, 3, H, W]` or `[1, H, W, 3]` input shape.
    fn infer(input_type: &ValueType) -> Self {
        match input_type {
            ValueType::Tensor { shape, .. } if shape.len() == 4 && shape[1] == 3 => Layout::Nchw,
            _ => Layout::Nhwc,
        }
    }

    fn tensor(self, hwc: Vec<f32>, size: usize) -> ort::Result<Tensor<f32>> {
        let s = size as i64;
        match self {
            Layout::Nchw => {
                Tensor::from_array(([1, 3, s, s], hwc_to_chw(&hwc, size).into_boxed_slice()))
            }
            Layout::Nhwc => Tensor::from_array(([1, s, s, 3], hwc.into_boxed_slice())),
        }
    }
}

/// Single-hand landmark detector backed by two ONNX Runtime sessions.
pub struct OnnxHandLandmarker {
    palm: Session,
    landmark: Session,
    palm_layout: Layout,
    landmark_layout: Layout,
    anchors: Vec<Anchor>,
}

impl OnnxHandLandmarker {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let palm_path = model_dir.join(PALM_MODEL_FILE);
        let landmark_path = model_dir.join(LANDMARK_MODEL_FILE);

        anyhow::ensure!(palm_path.exists(), "{PALM_MODEL_FILE} not found in {model_dir:?}");
        anyhow::ensure!(
            landmark_path.exists(),
            "{LANDMARK_MODEL_FILE} not found in {model_dir:?}"
        );

        let palm = Session::builder()?.commit_from_file(&palm_path)?;
        let landmark = Session::builder()?.commit_from_file(&landmark_path)?;

        let palm_layout = Layout::infer(palm.inputs()[0].dtype());
        let landmark_layout = Layout::infer(landmark.inputs()[0].dtype());

        info!(
            palm = %palm_path.display(),
            landmark = %landmark_path.display(),
            ?palm_layout,
            ?landmark_layout,
            "loaded hand models"
        );
        Ok(Self {
            palm,
            landmark,
            palm_layout,
            landmark_layout,
            anchors: palm_anchors(),
        })
    }

    /// Run both stages on `image`.
    pub fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Option<FeatureVector>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(None);
        }
        let palms = self.detect_palms(image)?;
        let Some(palm) = select_hand(&palms) else {
            return Ok(None);
        };
        let roi = Roi::from_palm(palm);
        self.estimate_landmarks(image, &roi)
    }

    /// Palm detections in source image pixels, after non-maximum averaging.
    fn detect_palms(&mut self, image: &RgbImage) -> anyhow::Result<Vec<PalmDetection>> {
        let letterbox = Roi::enclosing(image.width(), image.height());
        let input = letterbox.sample(image, PALM_INPUT_SIZE);
        let tensor = self.palm_layout.tensor(input, PALM_INPUT_SIZE)?;

        let outputs = self.palm.run(ort::inputs![tensor])?;
        let mut boxes = None;
        let mut scores = None;
        for i in 0..outputs.len() {
            let (_, data) = outputs[i].try_extract_tensor::<f32>()?;
            if data.len() == self.anchors.len() * BOX_REGRESSORS {
                boxes = Some(data.to_vec());
            } else if data.len() == self.anchors.len() {
                scores = Some(data.to_vec());
            }
        }
        let (Some(boxes), Some(scores)) = (boxes, scores) else {
            anyhow::bail!(
                "palm model outputs do not match {} anchors",
                self.anchors.len()
            );
        };

        let input_size = PALM_INPUT_SIZE as f32;
        let detections = decode_palms(
            &boxes,
            &scores,
            &self.anchors,
            input_size,
            MIN_DETECTION_CONFIDENCE,
        );
        let to_image = |[x, y]: [f32; 2]| letterbox.to_image(x / input_size, y / input_size);
        let scale = letterbox.size / input_size;
        Ok(non_maximum_averaging(detections, NMS_IOU_THRESHOLD)
            .iter()
            .map(|d| d.transform(to_image, scale))
            .collect())
    }

    /// Landmarks inside `roi`, projected back and normalized to the image.
    fn estimate_landmarks(
        &mut self,
        image: &RgbImage,
        roi: &Roi,
    ) -> anyhow::Result<Option<FeatureVector>> {
        let input = roi.sample(image, LANDMARK_INPUT_SIZE);
        let tensor = self.landmark_layout.tensor(input, LANDMARK_INPUT_SIZE)?;

        let outputs = self.landmark.run(ort::inputs![tensor])?;
        anyhow::ensure!(
            outputs.len() >= 2,
            "landmark model returned {} outputs, expected at least 2",
            outputs.len()
        );
        let (_, screen) = outputs[0].try_extract_tensor::<f32>()?;
        let (_, presence) = outputs[1].try_extract_tensor::<f32>()?;
        anyhow::ensure!(
            screen.len() == FEATURE_LEN && presence.len() == 1,
            "unexpected landmark output sizes: {} and {}",
            screen.len(),
            presence.len()
        );

        if presence[0] < MIN_DETECTION_CONFIDENCE {
            return Ok(None);
        }

        let size = LANDMARK_INPUT_SIZE as f32;
        let (width, height) = (image.width() as f32, image.height() as f32);
        let mut landmarks = [[0.0f32; COORDS_PER_LANDMARK]; NUM_LANDMARKS];
        for (lm, raw) in landmarks.iter_mut().zip(screen.chunks_exact(COORDS_PER_LANDMARK)) {
            let [x, y] = roi.to_image(raw[0] / size, raw[1] / size);
            *lm = [x / width, y / height, raw[2] / size * roi.size / width];
        }
        Ok(Some(FeatureVector::from_landmarks(&landmarks)))
    }
}

impl HandLandmarker for OnnxHandLandmarker {
    fn landmarks(&mut self, image: &RgbImage) -> Option<FeatureVector> {
        match self.detect(image) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "hand landmark inference failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn model_dir() -> PathBuf {
        std::env::var_os("HANDSIGN_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                    .join("..")
                    .join("..")
                    .join("models")
                    .join("mediapipe-hands")
            })
    }

    fn require_models() -> PathBuf {
        let dir = model_dir();
        if !dir.join(PALM_MODEL_FILE).exists() || !dir.join(LANDMARK_MODEL_FILE).exists() {
            panic!(
                "Hand models not found in {dir:?}. Convert the MediaPipe hand \
                 models to ONNX and place {PALM_MODEL_FILE} and \
                 {LANDMARK_MODEL_FILE} there, or set HANDSIGN_MODEL_DIR."
            );
        }
        dir
    }

    #[test]
    fn load_fails_without_models() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxHandLandmarker::load(dir.path()).err().unwrap();
        assert!(err.to_string().contains(PALM_MODEL_FILE));
    }

    #[test]
    #[ignore = "needs MediaPipe hand models in models/mediapipe-hands"]
    fn load_models() {
        let dir = require_models();
        OnnxHandLandmarker::load(&dir).unwrap();
    }

    #[test]
    #[ignore = "needs MediaPipe hand models in models/mediapipe-hands"]
    fn blank_image_has_no_hand() {
        let dir = require_models();
        let mut landmarker = OnnxHandLandmarker::load(&dir).unwrap();
        let image = RgbImage::from_pixel(320, 240, image::Rgb([0, 0, 0]));
        assert!(landmarker.landmarks(&image).is_none());
    }

    #[test]
    #[ignore = "needs MediaPipe hand models and HANDSIGN_HAND_IMAGE"]
    fn hand_photo_yields_normalized_landmarks() {
        let dir = require_models();
        let photo = PathBuf::from(
            std::env::var_os("HANDSIGN_HAND_IMAGE").expect("set HANDSIGN_HAND_IMAGE"),
        );
        let mut landmarker = OnnxHandLandmarker::load(&dir).unwrap();
        let features = landmarker.extract_file(&photo).expect("hand detected");
        assert_eq!(features.as_slice().len(), FEATURE_LEN);
        for [x, y, _] in features.landmarks() {
            assert!((-0.5..1.5).contains(&x) && (-0.5..1.5).contains(&y));
        }
    }
}
