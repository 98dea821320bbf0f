//! YOLO object detection on top of `tract-onnx`.
//!
//! Works with detection models exported by Ultralytics to ONNX. Such a model takes a
//! `1x3xSxS` RGB tensor in `[0, 1]` and produces a `1x(4+nc)xN` tensor: for each of the `N`
//! candidates the box center, width and height in input pixels followed by one score per class.
use std::{
    fs,
    path::Path,
    sync::{Arc, OnceLock},
};

use anyhow::{bail, Context, Result};
use image::{imageops, Rgb, RgbImage};
use ndarray::{s, ArrayView2, Axis, Ix3};
use regex::Regex;
use tract_onnx::prelude::*;

use crate::{
    error::PipelineError,
    models::{ClassNames, Detector, RawBox, RawResult},
};

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Gray value of the padding around a letterboxed frame.
const LETTERBOX_FILL: u8 = 114;

/// Number of leading rows of the output holding the box geometry.
const CXYWH_ROWS: usize = 4;

/// Metadata key under which Ultralytics stores the class names.
const NAMES_METADATA_KEY: &str = "names";

/// Fixed inference settings of a model.
#[derive(Clone, Copy, Debug)]
pub struct ModelParams {
    /// Side length of the square network input
    pub input_size: u32,
    pub min_confidence: f32,
    pub max_iou: f32,
    pub max_detections: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            min_confidence: 0.25,
            max_iou: 0.7,
            max_detections: 300,
        }
    }
}

/// A loaded YOLO detection model with its class names.
pub struct YoloModel {
    model: NnModel,
    names: Arc<ClassNames>,
    params: ModelParams,
}

impl YoloModel {
    /// Load a model from an `.onnx` file.
    ///
    /// Class names are read from `labels` (one per line) if given, otherwise from the model
    /// metadata.
    pub fn new(path: &Path, labels: Option<&Path>, params: ModelParams) -> Result<Self> {
        let names = match labels {
            Some(labels) => read_labels(labels)?,
            None => {
                let proto = tract_onnx::onnx()
                    .proto_model_for_path(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let names = proto
                    .metadata_props
                    .iter()
                    .find(|prop| prop.key == NAMES_METADATA_KEY)
                    .map(|prop| parse_names(&prop.value))
                    .unwrap_or_default();
                if names.is_empty() {
                    log::warn!("No class names found for {}", path.display());
                }
                names
            }
        };

        let size = params.input_size as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size));
        let model = tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;

        log::info!(
            "Model {} ready with {} class names",
            path.display(),
            names.len()
        );

        Ok(Self {
            model,
            names: Arc::new(names),
            params,
        })
    }

    fn preproc(&self, frame: &RgbImage) -> (Tensor, Letterbox) {
        let (canvas, letterbox) = letterbox(frame, self.params.input_size);
        let size = self.params.input_size as usize;

        let tensor: Tensor =
            tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
                canvas[(x as _, y as _)][c] as f32 / 255.0
            })
            .into();

        (tensor, letterbox)
    }

    fn postproc(&self, raw_nn_out: &Tensor, letterbox: &Letterbox) -> Result<Vec<RawBox>> {
        let output = raw_nn_out.to_array_view::<f32>()?;
        let output = output
            .into_dimensionality::<Ix3>()
            .context("expected a 3-dimensional model output")?;

        decode_output(output.index_axis(Axis(0), 0), letterbox, &self.params)
    }
}

impl Detector for YoloModel {
    fn detect(&self, frame: &RgbImage) -> Result<RawResult, PipelineError> {
        let (input, letterbox) = self.preproc(frame);

        let raw_nn_out = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PipelineError::Inference(format!("{e:#}")))?;
        let boxes = self
            .postproc(&raw_nn_out[0], &letterbox)
            .map_err(|e| PipelineError::Inference(format!("{e:#}")))?;
        log::debug!("Model returned {} boxes", boxes.len());

        Ok(RawResult {
            boxes,
            names: Arc::clone(&self.names),
        })
    }
}

/// Placement of a frame inside the square network input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    ratio: f32,
    pad_x: f32,
    pad_y: f32,
    width: f32,
    height: f32,
}

impl Letterbox {
    /// Map a `[cx, cy, w, h]` box of the network input back to `[x1, y1, x2, y2]` of the frame.
    fn restore(&self, cxcywh: [f32; 4]) -> [f32; 4] {
        let [cx, cy, w, h] = cxcywh;
        let x1 = (cx - w / 2.0 - self.pad_x) / self.ratio;
        let y1 = (cy - h / 2.0 - self.pad_y) / self.ratio;
        let x2 = (cx + w / 2.0 - self.pad_x) / self.ratio;
        let y2 = (cy + h / 2.0 - self.pad_y) / self.ratio;

        [
            x1.clamp(0.0, self.width),
            y1.clamp(0.0, self.height),
            x2.clamp(0.0, self.width),
            y2.clamp(0.0, self.height),
        ]
    }
}

/// Scale a frame to fit into a `size`x`size` square, keeping its aspect ratio, and center it
/// on a gray canvas.
fn letterbox(frame: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let (width, height) = frame.dimensions();
    let ratio = f32::min(size as f32 / width as f32, size as f32 / height as f32);
    let new_width = ((width as f32 * ratio).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * ratio).round() as u32).clamp(1, size);
    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;

    let resized = imageops::resize(
        frame,
        new_width,
        new_height,
        imageops::FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let letterbox = Letterbox {
        ratio,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        width: width as f32,
        height: height as f32,
    };

    (canvas, letterbox)
}

/// Turn the `(4+nc)xN` output of a single image into boxes of the original frame.
///
/// Each candidate is assigned its best scoring class. Candidates not exceeding the minimum
/// confidence are dropped before non-maximum suppression.
fn decode_output(
    output: ArrayView2<f32>,
    letterbox: &Letterbox,
    params: &ModelParams,
) -> Result<Vec<RawBox>> {
    if output.nrows() <= CXYWH_ROWS {
        bail!(
            "model output has {} rows, expected box geometry and class scores",
            output.nrows()
        );
    }

    let mut candidates: Vec<RawBox> = output
        .columns()
        .into_iter()
        .filter_map(|candidate| {
            let (class_id, confidence) = candidate
                .slice(s![CXYWH_ROWS..])
                .iter()
                .cloned()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (id, score)| {
                    if score > best.1 {
                        (id, score)
                    } else {
                        best
                    }
                });

            if confidence <= params.min_confidence {
                return None;
            }

            let cxcywh = [candidate[0], candidate[1], candidate[2], candidate[3]];
            Some(RawBox {
                class_id,
                confidence: confidence.clamp(0.0, 1.0),
                xyxy: letterbox.restore(cxcywh),
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

    let mut selected = non_maximum_suppression(candidates, params.max_iou);
    selected.truncate(params.max_detections);

    Ok(selected)
}

/// Run non-maximum-suppression on candidate bounding boxes.
///
/// `sorted_bboxes` must be sorted by ascending confidence. Starting with the most confident
/// box, a candidate is kept unless it overlaps an already kept box of the same class by more
/// than `max_iou`. The result is ordered by descending confidence.
fn non_maximum_suppression(mut sorted_bboxes: Vec<RawBox>, max_iou: f32) -> Vec<RawBox> {
    let mut selected: Vec<RawBox> = vec![];
    'candidates: loop {
        // Get next most confident bbox from the back of ascending-sorted vector.
        match sorted_bboxes.pop() {
            Some(candidate) => {
                for kept in selected.iter() {
                    if kept.class_id == candidate.class_id && iou(&candidate.xyxy, &kept.xyxy) > max_iou
                    {
                        continue 'candidates;
                    }
                }

                selected.push(candidate)
            }
            None => break 'candidates,
        }
    }

    selected
}

/// Calculate the intersection-over-union metric for two bounding boxes.
fn iou(bbox_a: &[f32; 4], bbox_b: &[f32; 4]) -> f32 {
    // If the boxes do not overlap, the top left corner of the overlap box ends up below and to
    // the right of its bottom right corner and the area is zero.
    let overlap_box: [f32; 4] = [
        f32::max(bbox_a[0], bbox_b[0]),
        f32::max(bbox_a[1], bbox_b[1]),
        f32::min(bbox_a[2], bbox_b[2]),
        f32::min(bbox_a[3], bbox_b[3]),
    ];

    let overlap_area = bbox_area(&overlap_box);

    overlap_area / (bbox_area(bbox_a) + bbox_area(bbox_b) - overlap_area + EPS)
}

/// Calculate the area enclosed by a `[x1, y1, x2, y2]` bounding box.
///
/// An ill-defined box with the bottom-right point above/left of the top-left point has area
/// zero.
fn bbox_area(bbox: &[f32; 4]) -> f32 {
    let width = bbox[2] - bbox[0];
    let height = bbox[3] - bbox[1];
    if width < 0.0 || height < 0.0 {
        return 0.0;
    }

    width * height
}

/// Read class names from a text file, one label per line.
fn read_labels(path: &Path) -> Result<ClassNames> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read labels from {}", path.display()))?;

    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx, line.trim().to_owned()))
        .collect())
}

/// Parse the `names` metadata entry of an Ultralytics export, e.g. `{0: 'helmet', 1: 'head'}`.
fn parse_names(raw: &str) -> ClassNames {
    static NAME_ENTRY: OnceLock<Regex> = OnceLock::new();
    let entry = NAME_ENTRY.get_or_init(|| {
        Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).expect("valid class name pattern")
    });

    entry
        .captures_iter(raw)
        .filter_map(|caps| {
            let idx = caps[1].parse().ok()?;
            let name = caps.get(2).or_else(|| caps.get(3))?;
            Some((idx, name.as_str().to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use ndarray::Array2;

    use super::*;

    fn raw_box(class_id: usize, confidence: f32, xyxy: [f32; 4]) -> RawBox {
        RawBox {
            class_id,
            confidence,
            xyxy,
        }
    }

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-4);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);

        // Half of `a` overlaps with a box of the same size
        let shifted = [5.0, 0.0, 15.0, 10.0];
        assert!((iou(&a, &shifted) - 50.0 / 150.0).abs() < 1e-4);
    }

    #[test]
    fn test_nms_is_class_aware() {
        let candidates = vec![
            raw_box(1, 0.3, [0.0, 0.0, 10.0, 10.0]),
            raw_box(0, 0.6, [1.0, 0.0, 11.0, 10.0]),
            raw_box(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        ];

        let selected = non_maximum_suppression(candidates, 0.5);
        assert_eq!(
            selected,
            vec![
                raw_box(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
                raw_box(1, 0.3, [0.0, 0.0, 10.0, 10.0]),
            ]
        );
    }

    #[test]
    fn test_letterbox_geometry() {
        let frame = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
        let (canvas, letterbox) = letterbox(&frame, 64);

        assert_eq!(canvas.dimensions(), (64, 64));
        // 200x100 becomes 64x32 centered vertically
        assert_eq!(canvas[(0, 0)], Rgb([LETTERBOX_FILL; 3]));
        assert!(canvas[(32, 32)].0.iter().all(|&c| c > 250));
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 16.0);

        // Full frame in network coordinates maps back onto the full frame
        let restored = letterbox.restore([32.0, 32.0, 64.0, 32.0]);
        for (value, expected) in restored.iter().zip([0.0, 0.0, 200.0, 100.0]) {
            assert!((value - expected).abs() < 1e-3, "{restored:?}");
        }

        // Boxes reaching into the padding are clipped to the frame
        let clipped = letterbox.restore([32.0, 32.0, 64.0, 64.0]);
        assert_eq!(clipped[1], 0.0);
        assert_eq!(clipped[3], 100.0);
    }

    #[test]
    fn test_decode_output() {
        let letterbox = Letterbox {
            ratio: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        let params = ModelParams::default();

        // Rows: cx, cy, w, h, score class 0, score class 1. One column per candidate.
        let output = Array2::from_shape_vec(
            (6, 3),
            vec![
                20.0, 50.0, 21.0, //
                20.0, 50.0, 20.0, //
                10.0, 10.0, 10.0, //
                10.0, 10.0, 10.0, //
                0.1, 0.2, 0.8, //
                0.9, 0.1, 0.05, //
            ],
        )
        .unwrap();

        let boxes = decode_output(output.view(), &letterbox, &params).unwrap();

        // The second candidate is below the confidence threshold, the third overlaps the
        // first one but has a different class.
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].class_id, 1);
        assert_eq!(boxes[0].confidence, 0.9);
        assert_eq!(boxes[0].xyxy, [15.0, 15.0, 25.0, 25.0]);
        assert_eq!(boxes[1].class_id, 0);
        assert_eq!(boxes[1].confidence, 0.8);
        for b in boxes.iter() {
            assert!((0.0..=1.0).contains(&b.confidence));
        }
    }

    #[test]
    fn test_decode_output_without_scores() {
        let letterbox = Letterbox {
            ratio: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        let output = Array2::<f32>::zeros((4, 8));

        assert!(decode_output(output.view(), &letterbox, &ModelParams::default()).is_err());
    }

    #[test]
    fn test_parse_names() {
        let names = parse_names(r#"{0: 'helmet', 1: "no, helmet", 2: 'seatbelt'}"#);

        assert_eq!(names.len(), 3);
        assert_eq!(names[&0], "helmet");
        assert_eq!(names[&1], "no, helmet");
        assert_eq!(names[&2], "seatbelt");

        assert!(parse_names("").is_empty());
        assert!(parse_names("{0: helmet}").is_empty());

        // Quotes of the other kind are part of the label
        let names = parse_names(r#"{0: "driver's belt", 1: 'say "hi"', 12:'x'}"#);
        assert_eq!(names[&0], "driver's belt");
        assert_eq!(names[&1], r#"say "hi""#);
        assert_eq!(names[&12], "x");
    }

    #[test]
    fn test_read_labels() -> Result<()> {
        let path = std::env::temp_dir().join(format!("labels-{}.txt", std::process::id()));
        fs::write(&path, "helmet\n\nseatbelt \n")?;

        let names = read_labels(&path)?;
        fs::remove_file(&path)?;

        assert_eq!(names.len(), 2);
        assert_eq!(names[&0], "helmet");
        assert_eq!(names[&2], "seatbelt");

        Ok(())
    }
}
