//! The extraction seam between the aggregator and a hand landmark detector.

use std::path::Path;

use handsign_core::FeatureVector;
use image::{ImageError, ImageReader, RgbImage};
use tracing::{debug, warn};

use crate::ExtractError;

/// Minimum palm score and hand presence for a detection to count.
pub const MIN_DETECTION_CONFIDENCE: f32 = 0.5;

/// Single-hand, single-frame landmark detection.
///
/// Implementations take `&mut self` because inference sessions are stateful;
/// results must depend only on the image.
pub trait HandLandmarker {
    /// Landmarks of the one selected hand in `image`, or `None` if no hand is found.
    fn landmarks(&mut self, image: &RgbImage) -> Option<FeatureVector>;

    /// Decode the file at `path` and extract landmarks from it.
    ///
    /// Never fails: an undecodable file is logged and reported as absent.
    fn extract_file(&mut self, path: &Path) -> Option<FeatureVector> {
        match load_image(path) {
            Ok(image) => {
                let found = self.landmarks(&image);
                if found.is_none() {
                    debug!(path = %path.display(), "no hand detected");
                }
                found
            }
            Err(e) => {
                warn!(error = %e, "skipping image");
                None
            }
        }
    }
}

impl<L: HandLandmarker + ?Sized> HandLandmarker for &mut L {
    fn landmarks(&mut self, image: &RgbImage) -> Option<FeatureVector> {
        (**self).landmarks(image)
    }
}

/// Decode a PNG or JPEG file into 8-bit RGB.
///
/// The format is sniffed from the file contents, falling back to the extension.
pub fn load_image(path: &Path) -> Result<RgbImage, ExtractError> {
    let decode = || -> Result<RgbImage, ImageError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(image.to_rgb8())
    };
    decode().map_err(|source| ExtractError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
