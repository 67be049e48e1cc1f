//! Dataset evaluation: YOLO text ground truth, IoU matching and the
//! mAP / precision / recall summary printed by `pcb-evaluate`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, de};
use tracing::{debug, info, warn};

use crate::detector::ObjectDetector;
use crate::error::EvaluationError;
use crate::models::{BoundingBox, Detection};
use crate::utils::list_images;

/// IoU thresholds 0.50, 0.55, ..., 0.95.
pub const IOU_STEPS: usize = 10;
const CURVE_POINTS: usize = 1000;
const AP_POINTS: usize = 101;
const EPS: f64 = 1e-16;

pub fn iou_threshold(step: usize) -> f32 {
    0.5 + 0.05 * step as f32
}

/// Ultralytics dataset description (`data.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    /// Root directory. Relative roots are taken from the description's directory.
    pub path: Option<PathBuf>,
    /// Image directory, relative to the root.
    pub val: PathBuf,
    /// Label directory, relative to the root.
    pub labels: Option<PathBuf>,
    /// Either a list or an `{id: name}` map.
    #[serde(default, deserialize_with = "deserialize_names")]
    pub names: Vec<String>,
    #[serde(skip)]
    base: PathBuf,
}

impl Dataset {
    pub fn from_file(path: &Path) -> Result<Self, EvaluationError> {
        let text = fs::read_to_string(path).map_err(|source| EvaluationError::DatasetRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut dataset: Dataset =
            serde_yaml::from_str(&text).map_err(|source| EvaluationError::DatasetParse {
                path: path.to_path_buf(),
                source,
            })?;
        dataset.base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(dataset)
    }

    pub fn root(&self) -> PathBuf {
        match &self.path {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => self.base.join(root),
            None => self.base.clone(),
        }
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root().join(&self.val)
    }

    pub fn label_dir(&self) -> PathBuf {
        match &self.labels {
            Some(labels) => self.root().join(labels),
            None => label_dir_for(&self.image_dir()),
        }
    }
}

fn deserialize_names<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Names {
        List(Vec<String>),
        Map(BTreeMap<usize, String>),
    }

    match Names::deserialize(deserializer)? {
        Names::List(names) => Ok(names),
        Names::Map(map) => {
            if map.keys().enumerate().any(|(i, &id)| i != id) {
                return Err(de::Error::custom("class ids must run from 0 without gaps"));
            }
            Ok(map.into_values().collect())
        }
    }
}

/// Label file for an image: the image's file name with its last extension
/// replaced by `.txt`. Earlier dots are kept (`a.rf.123.png` -> `a.rf.123.txt`).
pub fn label_path_for(label_dir: &Path, image_path: &Path) -> Option<PathBuf> {
    let mut name = image_path.file_stem()?.to_os_string();
    name.push(".txt");
    Some(label_dir.join(name))
}

/// `.../images/val` becomes `.../labels/val`. Without an `images`
/// component the labels are expected next to the images.
pub fn label_dir_for(image_dir: &Path) -> PathBuf {
    let components: Vec<Component> = image_dir.components().collect();
    match components
        .iter()
        .rposition(|c| c.as_os_str() == "images")
    {
        Some(index) => components
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == index {
                    Path::new("labels")
                } else {
                    Path::new(c.as_os_str())
                }
            })
            .collect(),
        None => image_dir.to_path_buf(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruth {
    pub class_id: usize,
    pub bbox: BoundingBox,
}

/// Parse `class cx cy w h` lines, normalised to the image size.
/// Lines that do not have exactly five numeric fields are skipped.
pub fn parse_labels(text: &str, width: u32, height: u32) -> Vec<GroundTruth> {
    let (w, h) = (width as f32, height as f32);
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 5 {
                return None;
            }
            let class_id: usize = parts[0].parse().ok()?;
            let values: Vec<f32> = parts[1..]
                .iter()
                .map(|s| s.parse::<f32>())
                .collect::<Result<_, _>>()
                .ok()?;
            Some(GroundTruth {
                class_id,
                bbox: BoundingBox::from_center(
                    values[0] * w,
                    values[1] * h,
                    values[2] * w,
                    values[3] * h,
                ),
            })
        })
        .collect()
}

/// A missing label file means the image has no objects.
pub fn load_labels(path: &Path, width: u32, height: u32) -> Vec<GroundTruth> {
    match fs::read_to_string(path) {
        Ok(text) => parse_labels(&text, width, height),
        Err(_) => {
            debug!("no labels at {}", path.display());
            Vec::new()
        }
    }
}

/// For each prediction, whether it is a true positive at each IoU threshold.
/// Pairs of the same class are taken greedily by descending IoU, every
/// prediction and ground truth at most once.
pub fn match_predictions(
    predictions: &[Detection],
    truths: &[GroundTruth],
) -> Vec<[bool; IOU_STEPS]> {
    let mut hits = vec![[false; IOU_STEPS]; predictions.len()];

    let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
    for (pi, pred) in predictions.iter().enumerate() {
        for (gi, truth) in truths.iter().enumerate() {
            if pred.class_id != truth.class_id {
                continue;
            }
            let iou = pred.bbox.iou(&truth.bbox);
            if iou >= iou_threshold(0) {
                pairs.push((pi, gi, iou));
            }
        }
    }
    pairs.sort_by(|a, b| b.2.total_cmp(&a.2));

    for step in 0..IOU_STEPS {
        let threshold = iou_threshold(step);
        let mut used_pred = vec![false; predictions.len()];
        let mut used_truth = vec![false; truths.len()];
        for &(pi, gi, iou) in &pairs {
            if iou < threshold {
                break;
            }
            if used_pred[pi] || used_truth[gi] {
                continue;
            }
            used_pred[pi] = true;
            used_truth[gi] = true;
            hits[pi][step] = true;
        }
    }
    hits
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub map50_95: f64,
    pub map50: f64,
    pub precision: f64,
    pub recall: f64,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mAP@0.5:0.95: {:.4}", self.map50_95)?;
        writeln!(f, "mAP@0.5: {:.4}", self.map50)?;
        writeln!(f, "Precision: {:.4}", self.precision)?;
        write!(f, "Recall: {:.4}", self.recall)
    }
}

struct Record {
    class_id: usize,
    confidence: f32,
    hits: [bool; IOU_STEPS],
}

/// Collects matched predictions image by image.
#[derive(Default)]
pub struct MetricsAccumulator {
    records: Vec<Record>,
    truth_counts: BTreeMap<usize, usize>,
    images: usize,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> usize {
        self.images
    }

    pub fn add_image(&mut self, predictions: &[Detection], truths: &[GroundTruth]) {
        self.images += 1;
        for truth in truths {
            *self.truth_counts.entry(truth.class_id).or_default() += 1;
        }
        let hits = match_predictions(predictions, truths);
        self.records
            .extend(predictions.iter().zip(hits).map(|(pred, hits)| Record {
                class_id: pred.class_id,
                confidence: pred.confidence,
                hits,
            }));
    }

    pub fn finish(&self) -> Metrics {
        if self.truth_counts.is_empty() {
            return Metrics::default();
        }

        let mut records: Vec<&Record> = self.records.iter().collect();
        records.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let grid: Vec<f64> = (0..CURVE_POINTS)
            .map(|i| i as f64 / (CURVE_POINTS - 1) as f64)
            .collect();
        let class_count = self.truth_counts.len();
        let mut ap = vec![[0.0f64; IOU_STEPS]; class_count];
        let mut precision_curves = vec![vec![0.0f64; CURVE_POINTS]; class_count];
        let mut recall_curves = vec![vec![0.0f64; CURVE_POINTS]; class_count];

        for (ci, (&class_id, &truth_count)) in self.truth_counts.iter().enumerate() {
            let class_records: Vec<&Record> = records
                .iter()
                .copied()
                .filter(|r| r.class_id == class_id)
                .collect();
            if class_records.is_empty() {
                continue;
            }
            // ascending, for interpolation over confidence
            let neg_conf: Vec<f64> = class_records
                .iter()
                .map(|r| -(r.confidence as f64))
                .collect();

            for step in 0..IOU_STEPS {
                let (recall, precision) = cumulative_curve(&class_records, step, truth_count);
                ap[ci][step] = average_precision(&recall, &precision);

                if step == 0 {
                    for (k, &x) in grid.iter().enumerate() {
                        recall_curves[ci][k] = interp(-x, &neg_conf, &recall, 0.0);
                        precision_curves[ci][k] = interp(-x, &neg_conf, &precision, 1.0);
                    }
                }
            }
        }

        let best = best_f1_index(&precision_curves, &recall_curves);
        let n = class_count as f64;
        Metrics {
            map50_95: ap.iter().flatten().sum::<f64>() / (n * IOU_STEPS as f64),
            map50: ap.iter().map(|row| row[0]).sum::<f64>() / n,
            precision: precision_curves.iter().map(|c| c[best]).sum::<f64>() / n,
            recall: recall_curves.iter().map(|c| c[best]).sum::<f64>() / n,
        }
    }
}

fn cumulative_curve(records: &[&Record], step: usize, truth_count: usize) -> (Vec<f64>, Vec<f64>) {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut recall = Vec::with_capacity(records.len());
    let mut precision = Vec::with_capacity(records.len());
    for record in records {
        if record.hits[step] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        recall.push(tp / (truth_count as f64 + EPS));
        precision.push(tp / (tp + fp));
    }
    (recall, precision)
}

fn best_f1_index(precision: &[Vec<f64>], recall: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_f1 = f64::MIN;
    for k in 0..CURVE_POINTS {
        let f1 = precision
            .iter()
            .zip(recall)
            .map(|(p, r)| 2.0 * p[k] * r[k] / (p[k] + r[k] + EPS))
            .sum::<f64>()
            / precision.len() as f64;
        if f1 > best_f1 {
            best_f1 = f1;
            best = k;
        }
    }
    best
}

/// Area under the precision envelope, sampled at 101 recall points.
pub fn average_precision(recall: &[f64], precision: &[f64]) -> f64 {
    let mut mrec = Vec::with_capacity(recall.len() + 2);
    mrec.push(0.0);
    mrec.extend_from_slice(recall);
    mrec.push(1.0);

    let mut mpre = Vec::with_capacity(precision.len() + 2);
    mpre.push(1.0);
    mpre.extend_from_slice(precision);
    mpre.push(0.0);
    for i in (0..mpre.len() - 1).rev() {
        mpre[i] = mpre[i].max(mpre[i + 1]);
    }

    let xs: Vec<f64> = (0..AP_POINTS)
        .map(|i| i as f64 / (AP_POINTS - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs.iter().map(|&x| interp(x, &mrec, &mpre, 1.0)).collect();
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

/// Piecewise-linear interpolation over ascending `xp`. Below the range
/// gives `left`, above it the last value.
fn interp(x: f64, xp: &[f64], fp: &[f64], left: f64) -> f64 {
    let Some(last) = xp.len().checked_sub(1) else {
        return left;
    };
    if x < xp[0] {
        return left;
    }
    if x >= xp[last] {
        return fp[last];
    }
    let j = xp.partition_point(|&v| v <= x);
    let (x0, x1, y0, y1) = (xp[j - 1], xp[j], fp[j - 1], fp[j]);
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Run `detector` over every image of `dataset`.
pub fn evaluate(
    detector: &mut dyn ObjectDetector,
    dataset: &Dataset,
    confidence: f32,
) -> Result<Metrics, EvaluationError> {
    let image_dir = dataset.image_dir();
    if !image_dir.is_dir() {
        return Err(EvaluationError::MissingImageDir(image_dir));
    }
    let images = list_images(&image_dir).map_err(|source| EvaluationError::DatasetRead {
        path: image_dir.clone(),
        source,
    })?;
    if images.is_empty() {
        return Err(EvaluationError::NoImages(image_dir));
    }

    let label_dir = dataset.label_dir();
    info!(
        "evaluating {} images from {} (labels in {})",
        images.len(),
        image_dir.display(),
        label_dir.display()
    );

    let mut accumulator = MetricsAccumulator::new();
    for path in &images {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let predictions = detector.detect(&img, confidence)?;
        let Some(label_path) = label_path_for(&label_dir, path) else {
            continue;
        };
        let truths = load_labels(&label_path, img.width(), img.height());
        debug!(
            "{}: {} predictions, {} labels",
            path.display(),
            predictions.len(),
            truths.len()
        );
        accumulator.add_image(&predictions, &truths);
    }

    let metrics = accumulator.finish();
    info!("evaluated {} images", accumulator.images());
    Ok(metrics)
}
