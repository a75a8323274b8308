#![cfg(feature = "backend-tract")]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::Classifier;
use crate::detect::result::{Label, LabelSet};
use crate::frame::{expected_len, Frame};

/// COCO class names in model output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Square input of the stock YOLOv8 exports.
pub const DEFAULT_MODEL_SIZE: u32 = 640;

/// Padding value used by the Ultralytics letterbox.
const LETTERBOX_FILL: u8 = 114;

/// Tract-based classifier for YOLOv8-style ONNX detectors.
///
/// Frames of any size are letterboxed into the model input. The output is
/// expected as `[1, 4 + classes, anchors]`. Boxes are ignored; each class
/// keeps its best anchor score, and classes above the threshold are
/// returned highest score first. The model file is read in `load`.
pub struct TractClassifier {
    model_path: PathBuf,
    model: Option<TypedRunnableModel<TypedModel>>,
    model_width: u32,
    model_height: u32,
    confidence_threshold: f32,
}

impl TractClassifier {
    /// `model_width` x `model_height` is the network input, not the camera size.
    pub fn new<P: AsRef<Path>>(model_path: P, model_width: u32, model_height: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            model_width,
            model_height,
            confidence_threshold: 0.35,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let pixels = frame.pixels();
        if pixels.len() != expected_len(frame.width, frame.height)? {
            return Err(anyhow!("frame buffer does not match its dimensions"));
        }
        let image = RgbImage::from_raw(frame.width, frame.height, pixels.to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let boxed = letterbox(&image, self.model_width, self.model_height);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.model_height as usize, self.model_width as usize),
            |(_, channel, y, x)| boxed.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<LabelSet> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not [batch, attributes, anchors]")?;

        let (_, attributes, anchors) = scores.dim();
        if attributes <= 4 {
            return Err(anyhow!("model output has no class scores"));
        }

        let mut best: HashMap<usize, f32> = HashMap::new();
        for anchor in 0..anchors {
            let mut top_class = 0;
            let mut top_score = f32::NEG_INFINITY;
            for class in 0..attributes - 4 {
                let score = scores[[0, 4 + class, anchor]];
                if score > top_score {
                    top_class = class;
                    top_score = score;
                }
            }
            if top_score >= self.confidence_threshold {
                let entry = best.entry(top_class).or_insert(top_score);
                *entry = entry.max(top_score);
            }
        }

        let mut labels: Vec<Label> = best
            .into_iter()
            .map(|(class, score)| {
                let name = COCO_CLASSES
                    .get(class)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("class_{}", class));
                Label::new(name, score)
            })
            .collect();
        labels.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(LabelSet::new(labels))
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self) -> Result<()> {
        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!(
                    "failed to load ONNX model from {}",
                    self.model_path.display()
                )
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, self.model_height as usize, self.model_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        self.model = Some(model);
        Ok(())
    }

    fn classify(&mut self, frame: &Frame) -> Result<LabelSet> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract classifier used before load"))?;
        let input = self.build_input(frame)?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}

/// Scale `source` to fit `target_w` x `target_h` keeping its aspect ratio,
/// centred on a gray canvas.
fn letterbox(source: &RgbImage, target_w: u32, target_h: u32) -> RgbImage {
    let (w, h) = source.dimensions();
    if (w, h) == (target_w, target_h) {
        return source.clone();
    }
    let scale = f32::min(target_w as f32 / w as f32, target_h as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, target_w);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, target_h);
    let resized = image::imageops::resize(source, new_w, new_h, FilterType::Triangle);

    let pad_w = (target_w - new_w) / 2;
    let pad_h = (target_h - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(target_w, target_h, image::Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(&mut canvas, &resized, pad_w.into(), pad_h.into());
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> TractClassifier {
        TractClassifier::new("unused.onnx", DEFAULT_MODEL_SIZE, DEFAULT_MODEL_SIZE)
            .with_threshold(0.5)
    }

    /// `[1, 84, anchors]` output with `hits` as (anchor, class, score).
    fn output(anchors: usize, hits: &[(usize, usize, f32)]) -> TVec<TValue> {
        let mut scores = tract_ndarray::Array3::<f32>::zeros((1, 84, anchors));
        for &(anchor, class, score) in hits {
            scores[[0, 4 + class, anchor]] = score;
        }
        tvec!(scores.into_tensor().into())
    }

    #[test]
    fn decode_keeps_best_score_per_class() {
        // person=0, bottle=39, cup=41
        let outputs = output(
            6,
            &[
                (0, 0, 0.9),
                (1, 0, 0.6),
                (2, 39, 0.7),
                (3, 41, 0.2),
                (4, 39, 0.55),
            ],
        );
        let labels = classifier().decode(outputs).unwrap();
        let classes: Vec<&str> = labels.classes().collect();
        assert_eq!(classes, vec!["person", "bottle"]);
        let confidences: Vec<f32> = labels.iter().map(|label| label.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn decode_rejects_outputs_without_class_rows() {
        let scores = tract_ndarray::Array3::<f32>::zeros((1, 4, 8));
        let outputs: TVec<TValue> = tvec!(scores.into_tensor().into());
        assert!(classifier().decode(outputs).is_err());
    }

    #[test]
    fn letterbox_pads_to_model_input() {
        let frame = Frame::new(vec![200u8; 64 * 48 * 3], 64, 48, 1).unwrap();
        let tensor = TractClassifier::new("unused.onnx", 32, 32)
            .build_input(&frame)
            .unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);

        let view = tensor
            .to_array_view::<f32>()
            .unwrap()
            .into_dimensionality::<tract_ndarray::Ix4>()
            .unwrap();
        // 64x48 scales to 32x24, leaving 4 gray rows above and below
        assert!((view[[0, 0, 0, 16]] - LETTERBOX_FILL as f32 / 255.0).abs() < 1e-6);
        assert!((view[[0, 0, 16, 16]] - 200.0 / 255.0).abs() < 1e-2);
    }
}
