use ab_glyph::{FontRef, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::warn;

use crate::models::LabeledDetection;

const BOX_COLOR: [u8; 3] = [0, 255, 0];
const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
// Gap between the label baseline and the box top edge.
const LABEL_OFFSET: i32 = 5;

/// Draws detection boxes and labels onto a copy of an image.
pub struct Annotator {
    font: Option<FontRef<'static>>,
    color: Rgb<u8>,
    thickness: i32,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        let font = match FontRef::try_from_slice(epaint_default_fonts::UBUNTU_LIGHT) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("label font unavailable, drawing boxes only: {}", e);
                None
            }
        };
        Self {
            font,
            color: Rgb(BOX_COLOR),
            thickness: BOX_THICKNESS,
            scale: PxScale::from(LABEL_FONT_SIZE),
        }
    }
}

impl Annotator {
    /// Returns the input unchanged when there is nothing to draw.
    pub fn annotate(&self, image: &DynamicImage, detections: &[LabeledDetection]) -> DynamicImage {
        if detections.is_empty() {
            return image.clone();
        }

        let mut canvas = image.to_rgb8();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        DynamicImage::ImageRgb8(canvas)
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &LabeledDetection) {
        let (w, h) = canvas.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let bbox = detection.bbox.clamp_to(w, h);
        let x1 = bbox.x1 as i32;
        let y1 = bbox.y1 as i32;
        let x2 = (bbox.x2 as i32).min(w as i32 - 1);
        let y2 = (bbox.y2 as i32).min(h as i32 - 1);

        // thicken inwards
        for t in 0..self.thickness {
            let width = x2 - x1 - 2 * t;
            let height = y2 - y1 - 2 * t;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(width as u32 + 1, height as u32 + 1);
            draw_hollow_rect_mut(canvas, rect, self.color);
        }

        if let Some(font) = &self.font {
            let (_, text_height) = text_size(self.scale, font, &detection.label);
            let text_y = (y1 - LABEL_OFFSET - text_height as i32).max(0);
            draw_text_mut(
                canvas,
                self.color,
                x1,
                text_y,
                self.scale,
                font,
                &detection.label,
            );
        }
    }
}
