//! services/api/src/adapters/yolo/postprocess.rs
//!
//! Pre- and post-processing around the YOLO network: letterboxing the input,
//! decoding the raw output head, and non-maximum suppression.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array4, ArrayView2};
use oloy_core::domain::BoundingBox;
use std::cmp::Ordering;

/// Grey used by YOLO training pipelines for letterbox padding.
const PAD_VALUE: u8 = 114;

/// How a source image was placed onto the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Maps a box from network-input space back to source pixels, clamped to the image.
    pub fn unmap(&self, bbox: BoundingBox, width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f32, height as f32);
        BoundingBox {
            x1: ((bbox.x1 - self.pad_x) / self.scale).clamp(0.0, w),
            y1: ((bbox.y1 - self.pad_y) / self.scale).clamp(0.0, h),
            x2: ((bbox.x2 - self.pad_x) / self.scale).clamp(0.0, w),
            y2: ((bbox.y2 - self.pad_y) / self.scale).clamp(0.0, h),
        }
    }
}

/// Resizes `image` to fit a `size`x`size` square, keeping aspect ratio, centred on grey.
pub fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Converts an RGB image into a `[1, 3, H, W]` tensor scaled to [0, 1].
pub fn to_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// A scored box before suppression, in network-input coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub class: usize,
    pub score: f32,
}

/// Decodes a `[4 + classes, anchors]` head into candidates scoring at least `conf`.
///
/// Rows 0..4 hold `cx, cy, w, h`; the remaining rows hold per-class scores.
pub fn decode(output: ArrayView2<'_, f32>, conf: f32) -> Vec<Candidate> {
    let channels = output.nrows();
    if channels <= 4 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for anchor in output.columns() {
        let (class, score) = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (class, score)| {
                if score > best.1 {
                    (class, score)
                } else {
                    best
                }
            });
        if score < conf {
            continue;
        }

        let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
        candidates.push(Candidate {
            bbox: BoundingBox {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
            },
            class,
            score,
        });
    }
    candidates
}

/// Greedy NMS: keeps the best box, drops any later box overlapping it by more
/// than `iou` (same class only unless `agnostic`), stops at `max_det`.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou: f32,
    agnostic: bool,
    max_det: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_det {
            break;
        }
        let suppressed = kept.iter().any(|existing| {
            (agnostic || existing.class == candidate.class)
                && existing.bbox.iou(&candidate.bbox) > iou
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn candidate(x1: f32, class: usize, score: f32) -> Candidate {
        Candidate {
            bbox: BoundingBox { x1, y1: 0.0, x2: x1 + 10.0, y2: 10.0 },
            class,
            score,
        }
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
        let (canvas, placement) = letterbox(&image, 100);

        assert_eq!(canvas.dimensions(), (100, 100));
        assert_eq!(placement.scale, 0.5);
        assert_eq!(placement.pad_x, 0.0);
        assert_eq!(placement.pad_y, 25.0);
        assert_eq!(canvas.get_pixel(50, 0), &Rgb([PAD_VALUE; 3]));
        assert_eq!(canvas.get_pixel(50, 50), &Rgb([255, 0, 0]));
    }

    #[test]
    fn unmap_inverts_the_letterbox_and_clamps() {
        let placement = Letterbox { scale: 0.5, pad_x: 0.0, pad_y: 25.0 };
        let mapped = placement.unmap(
            BoundingBox { x1: 10.0, y1: 35.0, x2: 110.0, y2: 45.0 },
            200,
            100,
        );
        assert_eq!(mapped, BoundingBox { x1: 20.0, y1: 20.0, x2: 200.0, y2: 40.0 });
    }

    #[test]
    fn tensor_is_channel_first_and_normalised() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([255, 0, 51]));
        let tensor = to_tensor(&image);

        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor[[0, 0, 0, 1]], 1.0);
        assert_eq!(tensor[[0, 1, 0, 1]], 0.0);
        assert!((tensor[[0, 2, 0, 1]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn decode_picks_the_best_class_and_applies_the_threshold() {
        // Two anchors, two classes: rows are cx, cy, w, h, class0, class1.
        let output = Array2::from_shape_vec(
            (6, 2),
            vec![
                50.0, 10.0, // cx
                50.0, 10.0, // cy
                20.0, 4.0, // w
                10.0, 4.0, // h
                0.1, 0.1, // class 0
                0.9, 0.2, // class 1
            ],
        )
        .unwrap();

        let candidates = decode(output.view(), 0.25);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].class, 1);
        assert_eq!(candidates[0].score, 0.9);
        assert_eq!(
            candidates[0].bbox,
            BoundingBox { x1: 40.0, y1: 45.0, x2: 60.0, y2: 55.0 }
        );
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let candidates = vec![
            candidate(0.0, 0, 0.9),
            candidate(1.0, 0, 0.8),
            candidate(1.0, 1, 0.7),
            candidate(50.0, 0, 0.6),
        ];
        let kept = non_max_suppression(candidates, 0.5, false, 300);
        let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.6]);
    }

    #[test]
    fn agnostic_nms_suppresses_across_classes() {
        let candidates = vec![
            candidate(1.0, 1, 0.7),
            candidate(0.0, 0, 0.9),
            candidate(50.0, 0, 0.6),
        ];
        let kept = non_max_suppression(candidates, 0.5, true, 300);
        let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.6]);
    }

    #[test]
    fn nms_respects_max_det() {
        let candidates = (0..10)
            .map(|i| candidate(i as f32 * 100.0, 0, 0.5 + i as f32 / 100.0))
            .collect();
        let kept = non_max_suppression(candidates, 0.5, false, 3);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].bbox.x1, 900.0);
    }
}
