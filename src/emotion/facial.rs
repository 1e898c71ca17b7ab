//! Facial expression classification with an ONNX network over 48x48
//! grayscale crops.

use super::EmotionError;
use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::info;

pub const FACE_SIZE: usize = 48;

pub const DEFAULT_FACIAL_LABELS: &[&str] =
    &["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];

/// Grayscale face crop scaled to [0, 1], row major.
#[derive(Debug, Clone)]
pub struct FaceInput {
    pub pixels: Vec<f32>,
}

impl FaceInput {
    pub fn from_image_bytes(bytes: &[u8]) -> Result<FaceInput, EmotionError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| EmotionError::Decode(format!("invalid image: {}", e)))?;
        if img.width() == 0 || img.height() == 0 {
            return Err(EmotionError::Decode("empty image".to_string()));
        }
        let gray = img.to_luma8();
        let resized = imageops::resize(
            &gray,
            FACE_SIZE as u32,
            FACE_SIZE as u32,
            FilterType::Triangle,
        );
        Ok(FaceInput {
            pixels: resized.pixels().map(|p| p.0[0] as f32 / 255.0).collect(),
        })
    }
}

pub trait FacialEmotionModel: Send + Sync {
    /// Most likely expression with its probability, `None` when nothing
    /// scored high enough to count as a detection.
    fn top_emotion(&self, input: &FaceInput) -> Result<Option<(String, f32)>, EmotionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 1, 48, 48]`
    Nchw,
    /// `[1, 48, 48, 1]`
    Nhwc,
}

impl FromStr for TensorLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nchw" => Ok(TensorLayout::Nchw),
            "nhwc" => Ok(TensorLayout::Nhwc),
            other => Err(anyhow!("Unknown tensor layout {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FacialModelSettings {
    pub labels: Vec<String>,
    pub input_name: String,
    pub layout: TensorLayout,
    pub min_confidence: f32,
}

impl Default for FacialModelSettings {
    fn default() -> Self {
        Self {
            labels: DEFAULT_FACIAL_LABELS.iter().map(|s| s.to_string()).collect(),
            input_name: "input".to_string(),
            layout: TensorLayout::Nchw,
            min_confidence: 0.0,
        }
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|v| v / sum).collect()
}

/// Turns raw network output into the top label. Outputs that already sum
/// to one are taken as probabilities.
pub fn top_label(
    output: &[f32],
    labels: &[String],
    min_confidence: f32,
) -> Option<(String, f32)> {
    if output.is_empty() || output.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let sum: f32 = output.iter().sum();
    let is_distribution = output.iter().all(|v| *v >= 0.0) && (sum - 1.0).abs() < 1e-3;
    let probs = if is_distribution {
        output.to_vec()
    } else {
        softmax(output)
    };

    let (index, score) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
    if score < min_confidence {
        return None;
    }
    let label = labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("emotion_{}", index));
    Some((label.to_lowercase(), score))
}

pub struct OnnxFacialModel {
    session: Mutex<Session>,
    settings: FacialModelSettings,
}

// Safety: the session is only reached through the mutex
unsafe impl Send for OnnxFacialModel {}
unsafe impl Sync for OnnxFacialModel {}

impl OnnxFacialModel {
    pub fn load<P: AsRef<Path>>(path: P, settings: FacialModelSettings) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(anyhow!("Facial model not found: {:?}", path));
        }
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .with_context(|| format!("Failed to load facial model {:?}", path))?;
        info!(
            "Loaded facial model {:?} with {} labels",
            path,
            settings.labels.len()
        );
        Ok(Self {
            session: Mutex::new(session),
            settings,
        })
    }

    fn input_array(&self, input: &FaceInput) -> Result<Array4<f32>, EmotionError> {
        let shape = match self.settings.layout {
            TensorLayout::Nchw => (1, 1, FACE_SIZE, FACE_SIZE),
            TensorLayout::Nhwc => (1, FACE_SIZE, FACE_SIZE, 1),
        };
        Array4::from_shape_vec(shape, input.pixels.clone())
            .map_err(|e| EmotionError::InvalidInput(format!("face input shape: {}", e)))
    }
}

impl FacialEmotionModel for OnnxFacialModel {
    fn top_emotion(&self, input: &FaceInput) -> Result<Option<(String, f32)>, EmotionError> {
        let tensor = Tensor::from_array(self.input_array(input)?)
            .map_err(|e| EmotionError::Inference(format!("tensor creation: {}", e)))?;

        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![self.settings.input_name.as_str() => tensor])
            .map_err(|e| EmotionError::Inference(e.to_string()))?;
        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| EmotionError::Inference("model produced no output".to_string()))?;
        let (_shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| EmotionError::Inference(format!("output extraction: {}", e)))?;

        Ok(top_label(
            data,
            &self.settings.labels,
            self.settings.min_confidence,
        ))
    }
}
