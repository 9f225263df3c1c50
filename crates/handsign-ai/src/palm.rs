//! Palm detector post-processing: SSD anchors, box decoding, non-maximum
//! averaging and single-hand selection.
//!
//! Everything here is pure arithmetic on the raw model outputs, so it is
//! compiled and tested without ONNX Runtime.

use std::cmp::Ordering;

/// Side length of the square palm detector input.
pub const PALM_INPUT_SIZE: usize = 192;
/// Keypoints regressed per palm (wrist first, middle-finger MCP third).
pub const NUM_PALM_KEYPOINTS: usize = 7;
/// Values regressed per anchor: box center/size plus `(x, y)` per keypoint.
pub const BOX_REGRESSORS: usize = 4 + 2 * NUM_PALM_KEYPOINTS;
/// IoU above which overlapping detections are merged.
pub const NMS_IOU_THRESHOLD: f32 = 0.3;

const RAW_SCORE_CLIP: f32 = 100.0;

/// `(grid size, anchors per cell)` for each SSD output layer.
const ANCHOR_LAYERS: [(usize, usize); 2] = [(24, 2), (12, 6)];

/// Anchor center, normalized to the detector input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x_center: f32,
    pub y_center: f32,
}

/// The 2016 anchors of the full-range palm model, in output order.
pub fn palm_anchors() -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for (grid, per_cell) in ANCHOR_LAYERS {
        for y in 0..grid {
            for x in 0..grid {
                for _ in 0..per_cell {
                    anchors.push(Anchor {
                        x_center: (x as f32 + 0.5) / grid as f32,
                        y_center: (y as f32 + 0.5) / grid as f32,
                    });
                }
            }
        }
    }
    anchors
}

/// A palm found by the detector. Coordinates are pixels of whatever space the
/// detection was decoded in (detector input, or source image after mapping).
#[derive(Debug, Clone, PartialEq)]
pub struct PalmDetection {
    pub score: f32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    pub keypoints: [[f32; 2]; NUM_PALM_KEYPOINTS],
}

impl PalmDetection {
    pub fn x_min(&self) -> f32 {
        self.x_center - self.width / 2.0
    }

    pub fn y_min(&self) -> f32 {
        self.y_center - self.height / 2.0
    }

    fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union of the two bounding boxes.
    pub fn iou(&self, other: &PalmDetection) -> f32 {
        let x0 = self.x_min().max(other.x_min());
        let y0 = self.y_min().max(other.y_min());
        let x1 = (self.x_min() + self.width).min(other.x_min() + other.width);
        let y1 = (self.y_min() + self.height).min(other.y_min() + other.height);

        let intersection = (x1 - x0).max(0.0) * (y1 - y0).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Map every point through `point` and scale the box size by `scale`.
    pub fn transform(&self, point: impl Fn([f32; 2]) -> [f32; 2], scale: f32) -> PalmDetection {
        let [x_center, y_center] = point([self.x_center, self.y_center]);
        PalmDetection {
            score: self.score,
            x_center,
            y_center,
            width: self.width * scale,
            height: self.height * scale,
            keypoints: self.keypoints.map(&point),
        }
    }
}

fn sigmoid(raw: f32) -> f32 {
    let raw = raw.clamp(-RAW_SCORE_CLIP, RAW_SCORE_CLIP);
    1.0 / (1.0 + (-raw).exp())
}

/// Decode raw detector outputs into detections scoring at least `threshold`.
///
/// `boxes` holds [`BOX_REGRESSORS`] values per anchor and `scores` one raw
/// logit per anchor. Offsets are in input pixels relative to the anchor center.
pub fn decode_palms(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[Anchor],
    input_size: f32,
    threshold: f32,
) -> Vec<PalmDetection> {
    anchors
        .iter()
        .zip(scores)
        .zip(boxes.chunks_exact(BOX_REGRESSORS))
        .filter_map(|((anchor, &raw), regs)| {
            let score = sigmoid(raw);
            if score < threshold {
                return None;
            }
            let ax = anchor.x_center * input_size;
            let ay = anchor.y_center * input_size;
            let mut keypoints = [[0.0f32; 2]; NUM_PALM_KEYPOINTS];
            for (k, kp) in keypoints.iter_mut().enumerate() {
                *kp = [regs[4 + 2 * k] + ax, regs[5 + 2 * k] + ay];
            }
            Some(PalmDetection {
                score,
                x_center: regs[0] + ax,
                y_center: regs[1] + ay,
                width: regs[2],
                height: regs[3],
                keypoints,
            })
        })
        .collect()
}

/// Merge overlapping detections by score-weighted averaging.
///
/// Detections are visited from highest score down; each seed absorbs every
/// remaining detection whose IoU with it exceeds `iou_threshold`. The merged
/// detection keeps the seed's score.
pub fn non_maximum_averaging(
    mut detections: Vec<PalmDetection>,
    iou_threshold: f32,
) -> Vec<PalmDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut merged = Vec::new();
    while !detections.is_empty() {
        let seed = detections[0].clone();
        let (overlapping, rest): (Vec<_>, Vec<_>) = detections
            .into_iter()
            .partition(|d| seed.iou(d) > iou_threshold || *d == seed);
        detections = rest;

        let total: f32 = overlapping.iter().map(|d| d.score).sum();
        if total <= 0.0 {
            merged.push(seed);
            continue;
        }

        let mut avg = PalmDetection {
            score: seed.score,
            x_center: 0.0,
            y_center: 0.0,
            width: 0.0,
            height: 0.0,
            keypoints: [[0.0; 2]; NUM_PALM_KEYPOINTS],
        };
        for d in &overlapping {
            let w = d.score / total;
            avg.x_center += d.x_center * w;
            avg.y_center += d.y_center * w;
            avg.width += d.width * w;
            avg.height += d.height * w;
            for (acc, kp) in avg.keypoints.iter_mut().zip(&d.keypoints) {
                acc[0] += kp[0] * w;
                acc[1] += kp[1] * w;
            }
        }
        merged.push(avg);
    }
    merged
}

/// The single hand to report: highest score, ties broken by the leftmost box.
pub fn select_hand(detections: &[PalmDetection]) -> Option<&PalmDetection> {
    detections.iter().min_by(|a, b| {
        match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.x_min().total_cmp(&b.x_min()),
            other => other,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palm(score: f32, x: f32, y: f32, size: f32) -> PalmDetection {
        PalmDetection {
            score,
            x_center: x,
            y_center: y,
            width: size,
            height: size,
            keypoints: [[x, y]; NUM_PALM_KEYPOINTS],
        }
    }

    #[test]
    fn anchor_count_and_layout() {
        let anchors = palm_anchors();
        assert_eq!(anchors.len(), 2016);
        // First layer: two anchors per cell of a 24x24 grid.
        assert_eq!(anchors[0], anchors[1]);
        assert!((anchors[0].x_center - 0.5 / 24.0).abs() < 1e-6);
        assert!((anchors[2].x_center - 1.5 / 24.0).abs() < 1e-6);
        // Second layer starts after 24*24*2 anchors.
        assert!((anchors[1152].x_center - 0.5 / 12.0).abs() < 1e-6);
        assert!((anchors[2015].y_center - 11.5 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn decode_offsets_from_anchor_and_thresholds() {
        let anchors = vec![
            Anchor { x_center: 0.5, y_center: 0.5 },
            Anchor { x_center: 0.25, y_center: 0.25 },
        ];
        let mut boxes = vec![0.0f32; 2 * BOX_REGRESSORS];
        boxes[0] = 4.0;
        boxes[1] = -2.0;
        boxes[2] = 30.0;
        boxes[3] = 20.0;
        boxes[4] = 1.0; // wrist x offset
        let scores = [3.0, -3.0];

        let found = decode_palms(&boxes, &scores, &anchors, 192.0, 0.5);
        assert_eq!(found.len(), 1);
        let p = &found[0];
        assert!((p.x_center - 100.0).abs() < 1e-4);
        assert!((p.y_center - 94.0).abs() < 1e-4);
        assert_eq!((p.width, p.height), (30.0, 20.0));
        assert_eq!(p.keypoints[0], [97.0, 96.0]);
        assert!(p.score > 0.95);
    }

    #[test]
    fn sigmoid_clips_extreme_logits() {
        assert_eq!(sigmoid(1e9), sigmoid(RAW_SCORE_CLIP));
        assert!(sigmoid(-1e9) >= 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = palm(0.9, 10.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        let b = palm(0.9, 100.0, 100.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn averaging_merges_overlaps_weighted_by_score() {
        let merged = non_maximum_averaging(
            vec![
                palm(0.6, 12.0, 10.0, 10.0),
                palm(0.9, 10.0, 10.0, 10.0),
                palm(0.8, 80.0, 80.0, 10.0),
            ],
            NMS_IOU_THRESHOLD,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].score, 0.9);
        let expected_x = (0.9 * 10.0 + 0.6 * 12.0) / 1.5;
        assert!((merged[0].x_center - expected_x).abs() < 1e-4);
        assert_eq!(merged[1].x_center, 80.0);
    }

    #[test]
    fn select_prefers_score_then_leftmost() {
        let dets = vec![
            palm(0.7, 50.0, 10.0, 10.0),
            palm(0.9, 80.0, 10.0, 10.0),
            palm(0.9, 20.0, 10.0, 10.0),
        ];
        let chosen = select_hand(&dets).unwrap();
        assert_eq!(chosen.x_center, 20.0);
        assert!(select_hand(&[]).is_none());
    }
}
