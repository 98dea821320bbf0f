//! Convert raw model output into response records.
//!
use image::RgbImage;
use imageproc::map::map_colors2;

use crate::models::{ClassNames, RawBox, RawResult};
use common::protocol::Detection;

/// Label used for class indices missing from the class map.
pub fn fallback_label(class_id: usize) -> String {
    format!("class_{}", class_id)
}

/// Convert a single raw box.
///
/// Corner coordinates are truncated towards zero before width and height are derived from them.
pub fn to_detection(raw_box: &RawBox, names: &ClassNames) -> Detection {
    let label = names
        .get(&raw_box.class_id)
        .cloned()
        .unwrap_or_else(|| fallback_label(raw_box.class_id));
    let [x1, y1, x2, y2] = raw_box.xyxy.map(|v| v as i32);

    Detection {
        label,
        confidence: raw_box.confidence,
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    }
}

/// Convert all boxes of a model result, keeping the model's order.
pub fn normalize(result: &RawResult) -> Vec<Detection> {
    result
        .boxes
        .iter()
        .map(|raw_box| to_detection(raw_box, &result.names))
        .collect()
}

/// Combine two annotated versions of the same frame by taking the brighter value of every channel.
///
/// Both images must have the same dimensions.
pub fn composite_max(a: &RgbImage, b: &RgbImage) -> RgbImage {
    map_colors2(a, b, |p, q| {
        image::Rgb([p[0].max(q[0]), p[1].max(q[1]), p[2].max(q[2])])
    })
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use image::Rgb;

    use super::*;

    fn raw_box(class_id: usize, confidence: f32, xyxy: [f32; 4]) -> RawBox {
        RawBox {
            class_id,
            confidence,
            xyxy,
        }
    }

    #[test]
    fn test_unknown_class_label() {
        let names: ClassNames = [(0, "helmet".to_owned())].into_iter().collect();

        let detection = to_detection(&raw_box(7, 0.5, [0.0, 0.0, 1.0, 1.0]), &names);
        assert_eq!(detection.label, "class_7");

        let detection = to_detection(&raw_box(0, 0.5, [0.0, 0.0, 1.0, 1.0]), &names);
        assert_eq!(detection.label, "helmet");
    }

    #[test]
    fn test_box_truncation() {
        let detection = to_detection(
            &raw_box(0, 0.8765, [10.9, 20.2, 30.99, 40.5]),
            &ClassNames::new(),
        );

        assert_eq!(
            detection,
            Detection {
                label: "class_0".into(),
                confidence: 0.8765,
                x: 10,
                y: 20,
                width: 20,
                height: 20,
            }
        );
    }

    #[test]
    fn test_non_negative_sizes() {
        let names = ClassNames::new();
        for xyxy in [
            [0.0, 0.0, 0.0, 0.0],
            [3.7, 3.2, 3.9, 3.4],
            [0.5, 0.1, 639.9, 479.99],
        ] {
            let detection = to_detection(&raw_box(1, 0.3, xyxy), &names);
            assert!(detection.width >= 0 && detection.height >= 0, "{detection:?}");
        }
    }

    #[test]
    fn test_normalize_keeps_order() {
        let result = RawResult {
            boxes: vec![
                raw_box(1, 0.3, [0.0, 0.0, 5.0, 5.0]),
                raw_box(0, 0.9, [1.0, 1.0, 2.0, 2.0]),
            ],
            names: Arc::new(ClassNames::new()),
        };

        let detections = normalize(&result);
        let labels: Vec<_> = detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["class_1", "class_0"]);
        assert_eq!(detections[0].confidence, 0.3);
    }

    #[test]
    fn test_composite_max() {
        let mut a = RgbImage::from_pixel(2, 1, Rgb([10, 10, 10]));
        let mut b = RgbImage::from_pixel(2, 1, Rgb([10, 10, 10]));
        a.put_pixel(0, 0, Rgb([0, 255, 0]));
        b.put_pixel(0, 0, Rgb([255, 0, 0]));
        b.put_pixel(1, 0, Rgb([5, 20, 5]));

        let composite = composite_max(&a, &b);
        assert_eq!(composite[(0, 0)], Rgb([255, 255, 0]));
        assert_eq!(composite[(1, 0)], Rgb([10, 20, 10]));
    }
}
