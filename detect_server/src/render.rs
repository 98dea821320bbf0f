//! Draw detections onto frames.
//!
use std::{fs, path::Path};

use ab_glyph::{FontVec, PxScale};
use clap::ValueEnum;
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};

use crate::{models::RawResult, normalize::to_detection};
use common::protocol::Detection;

/// Line width of the drawn boxes in pixels.
const BOX_THICKNESS: i32 = 2;

/// Distance between the caption baseline and the top edge of its box.
const CAPTION_OFFSET: i32 = 10;

const CAPTION_SCALE: f32 = 16.0;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

const PALETTE: [Rgb<u8>; 12] = [
    Rgb([255, 0, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
    Rgb([255, 128, 0]),
    Rgb([255, 0, 128]),
    Rgb([128, 255, 0]),
    Rgb([0, 128, 255]),
    Rgb([255, 255, 255]),
    Rgb([128, 0, 255]),
];

/// How boxes are colored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ColorScheme {
    /// Green for labels mentioning a helmet, red for everything else
    Keyword,
    /// One color per class index
    Palette,
}

impl ColorScheme {
    pub fn color(&self, class_id: usize, label: &str) -> Rgb<u8> {
        match self {
            ColorScheme::Keyword => {
                if label.to_lowercase().contains("helmet") {
                    GREEN
                } else {
                    RED
                }
            }
            ColorScheme::Palette => PALETTE[class_id % PALETTE.len()],
        }
    }
}

/// Draws boxes and captions of model results.
pub struct Annotator {
    font: Option<FontVec>,
    scheme: ColorScheme,
}

impl Annotator {
    pub fn new(font: Option<FontVec>, scheme: ColorScheme) -> Self {
        Self { font, scheme }
    }

    /// Create an annotator with the font at `font_path`.
    ///
    /// Captions are left out if the font cannot be loaded.
    pub fn with_font_file(font_path: &Path, scheme: ColorScheme) -> Self {
        let font = fs::read(font_path)
            .ok()
            .and_then(|data| FontVec::try_from_vec(data).ok());
        if font.is_none() {
            log::warn!(
                "Failed to load font {}, drawing boxes without captions",
                font_path.display()
            );
        }

        Self::new(font, scheme)
    }

    /// Draw all boxes of a model result on a copy of `frame`.
    pub fn plot(&self, frame: &RgbImage, result: &RawResult) -> RgbImage {
        let mut canvas = frame.clone();

        for raw_box in result.boxes.iter() {
            let detection = to_detection(raw_box, &result.names);
            let color = self.scheme.color(raw_box.class_id, &detection.label);
            self.draw_detection(&mut canvas, &detection, color);
        }

        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let (width, height) = (detection.width.max(0), detection.height.max(0));

        // Grow the box outwards to get thicker lines. `of_size` excludes the far edge, so add one
        // pixel to reach `(x + width, y + height)`.
        for i in 0..BOX_THICKNESS {
            let rect = Rect::at(detection.x - i, detection.y - i)
                .of_size((width + 1 + 2 * i) as u32, (height + 1 + 2 * i) as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        if let Some(font) = &self.font {
            let caption = format!("{} {:.1}%", detection.label, detection.confidence * 100.0);
            draw_text_mut(
                canvas,
                color,
                detection.x,
                detection.y - CAPTION_OFFSET - CAPTION_SCALE as i32,
                PxScale::from(CAPTION_SCALE),
                font,
                &caption,
            );
        }
    }
}
