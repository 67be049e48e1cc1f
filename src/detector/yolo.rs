use std::collections::HashMap;

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{Array4, ArrayViewD};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor, ValueType};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::DetectError;
use crate::models::{BoundingBox, Detection};

use super::ObjectDetector;

const PAD_VALUE: u8 = 114;
const MAX_DETECTIONS: usize = 300;

/// Ultralytics YOLO detector exported to ONNX, run through ONNX Runtime.
pub struct OnnxYolo {
    session: Session,
    input_name: String,
    output_name: String,
    input_size: u32,
    class_names: Vec<String>,
    iou_threshold: f32,
}

impl OnnxYolo {
    pub fn load(config: &AppConfig) -> Result<Self, DetectError> {
        let path = &config.model_path;
        if !path.is_file() {
            return Err(DetectError::ModelMissing(path.clone()));
        }

        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| DetectError::ModelLoad {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| DetectError::ModelLoad {
                path: path.clone(),
                message: "model has no inputs".to_string(),
            })?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| DetectError::ModelLoad {
                path: path.clone(),
                message: "model has no outputs".to_string(),
            })?;

        let input_size = match &input.input_type {
            ValueType::Tensor { shape, .. } => {
                let dims = shape.to_vec();
                debug!("input {}: {:?}", input.name, dims);
                match dims.get(3) {
                    Some(&side) if side > 0 => side as u32,
                    _ => config.input_size,
                }
            }
            other => {
                warn!("unexpected input type {:?}, assuming {}", other, config.input_size);
                config.input_size
            }
        };
        let input_name = input.name.clone();
        let output_name = output.name.clone();

        let class_names = match names_from_metadata(&session) {
            Some(names) => names,
            None => {
                debug!("model carries no class names, using configured list");
                config.class_names.clone()
            }
        };

        info!(
            "loaded model {} (input {}x{}, {} classes)",
            path.display(),
            input_size,
            input_size,
            class_names.len()
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            input_size,
            class_names,
            iou_threshold: config.iou_threshold,
        })
    }
}

impl ObjectDetector for OnnxYolo {
    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
    ) -> Result<Vec<Detection>, DetectError> {
        let (input, letterbox) = preprocess(image, self.input_size)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])?;
        let output = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;
        debug!("output shape {:?}", output.shape());

        postprocess(
            output.view(),
            &letterbox,
            confidence,
            self.iou_threshold,
            self.class_names.len(),
            image.width(),
            image.height(),
        )
    }
}

/// Placement of the source image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, bbox: BoundingBox) -> BoundingBox {
        BoundingBox::new(
            (bbox.x1 - self.pad_x) / self.scale,
            (bbox.y1 - self.pad_y) / self.scale,
            (bbox.x2 - self.pad_x) / self.scale,
            (bbox.y2 - self.pad_y) / self.scale,
        )
    }
}

/// Letterbox `image` into a `size` x `size` NCHW tensor scaled to [0, 1].
pub fn preprocess(image: &DynamicImage, size: u32) -> Result<(Array4<f32>, Letterbox), DetectError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let scale = size as f32 / width.max(height).max(1) as f32;
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(
        &rgb,
        new_width,
        new_height,
        image::imageops::FilterType::Triangle,
    );

    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;
    let mut letterboxed = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    image::imageops::replace(&mut letterboxed, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let plane = side * side;
    let mut data = vec![0f32; 3 * plane];
    for (i, pixel) in letterboxed.pixels().enumerate() {
        data[i] = pixel[0] as f32 / 255.0;
        data[plane + i] = pixel[1] as f32 / 255.0;
        data[2 * plane + i] = pixel[2] as f32 / 255.0;
    }
    let input = Array4::from_shape_vec((1, 3, side, side), data)?;

    Ok((
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    ))
}

/// Decode a `[1, 4 + classes, proposals]` YOLO head into pixel-space detections.
/// A transposed `[1, proposals, 4 + classes]` head is accepted too. The layout
/// is read from whichever axis has `4 + num_classes` entries; with an unknown
/// class count (0) the shorter axis is taken as the channel axis.
pub fn postprocess(
    output: ArrayViewD<'_, f32>,
    letterbox: &Letterbox,
    confidence: f32,
    iou_threshold: f32,
    num_classes: usize,
    img_width: u32,
    img_height: u32,
) -> Result<Vec<Detection>, DetectError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(DetectError::OutputShape(shape));
    }

    let expected = 4 + num_classes;
    let transposed = if num_classes > 0 && shape[1] == expected {
        false
    } else if num_classes > 0 && shape[2] == expected {
        true
    } else {
        shape[1] > shape[2]
    };
    let (channels, proposals) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if channels <= 4 {
        return Err(DetectError::OutputShape(shape));
    }
    let at = |channel: usize, proposal: usize| {
        if transposed {
            output[[0, proposal, channel]]
        } else {
            output[[0, channel, proposal]]
        }
    };

    let mut detections = Vec::new();
    for i in 0..proposals {
        let (class_id, score) = (4..channels)
            .map(|c| (c - 4, at(c, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < confidence {
            continue;
        }

        let bbox = BoundingBox::from_center(at(0, i), at(1, i), at(2, i), at(3, i));
        detections.push(Detection {
            class_id,
            confidence: score,
            bbox: letterbox.unmap(bbox).clamp_to(img_width, img_height),
        });
    }

    let mut kept = nms(detections, iou_threshold);
    kept.truncate(MAX_DETECTIONS);
    Ok(kept)
}

/// Per-class non-maximum suppression; result sorted by descending confidence.
pub fn nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut by_class: HashMap<usize, Vec<Detection>> = HashMap::new();
    for detection in detections {
        by_class.entry(detection.class_id).or_default().push(detection);
    }

    let mut kept = Vec::new();
    for (_, mut group) in by_class {
        group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let mut suppressed = vec![false; group.len()];
        for i in 0..group.len() {
            if suppressed[i] {
                continue;
            }
            for j in (i + 1)..group.len() {
                if !suppressed[j] && group[i].bbox.iou(&group[j].bbox) > iou_threshold {
                    suppressed[j] = true;
                }
            }
            kept.push(group[i].clone());
        }
    }

    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept
}

fn names_from_metadata(session: &Session) -> Option<Vec<String>> {
    let metadata = session.metadata().ok()?;
    let raw = metadata.custom("names").ok()??;
    parse_names_metadata(&raw)
}

/// Parse the Ultralytics `names` metadata, e.g. `{0: 'missing_hole', 1: 'mouse_bite'}`.
pub fn parse_names_metadata(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut entries = Vec::new();
    for entry in body.split(',').filter(|e| !e.trim().is_empty()) {
        let (index, name) = entry.split_once(':')?;
        let index: usize = index.trim().parse().ok()?;
        let name = name.trim().trim_matches(|c| c == '\'' || c == '"');
        entries.push((index, name.to_string()));
    }
    if entries.is_empty() {
        return None;
    }

    entries.sort_by_key(|(index, _)| *index);
    if entries.iter().enumerate().any(|(i, (index, _))| i != *index) {
        return None;
    }
    Some(entries.into_iter().map(|(_, name)| name).collect())
}
