//! Emotion inference from text, speech and facial images.
//!
//! Every modality sits behind a trait so the HTTP layer only deals with an
//! [`EmotionService`]. Speech and facial detection never fail outright:
//! when the model cannot produce a label a random one is picked from the
//! modality's vocabulary, mirroring how the models were used in the app.

mod audio;
pub mod facial;
pub mod mfcc;
pub mod speech;
pub mod text;

pub use audio::{decode_audio, DecodedAudio};
pub use facial::{FaceInput, FacialEmotionModel, OnnxFacialModel};
pub use speech::{SpeechEmotionModel, SvmSpeechModel};
pub use text::{RemoteTextClassifier, TextEmotionModel};

use crate::server::metrics::{record_emotion_detection, record_inference};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Label set of the fine-tuned text classifier, in logit order.
pub const TEXT_LABELS: &[&str] = &["sadness", "joy", "love", "anger", "fear"];

/// Labels a speech detection may fall back to.
pub const SPEECH_FALLBACK_LABELS: &[&str] = &[
    "joy",
    "happy",
    "sadness",
    "anger",
    "love",
    "fear",
    "neutral",
    "calm",
    "disgust",
    "surprised",
    "surprise",
    "excited",
    "bored",
    "tired",
    "relaxed",
    "stressed",
    "anxious",
    "depressed",
    "lonely",
    "energetic",
    "nostalgic",
    "confused",
    "frustrated",
    "hopeful",
    "proud",
    "guilty",
    "jealous",
    "ashamed",
    "disappointed",
    "content",
    "insecure",
    "embarrassed",
    "overwhelmed",
    "amused",
];

/// Labels a facial detection may fall back to.
pub const FACIAL_FALLBACK_LABELS: &[&str] = &[
    "joy",
    "sadness",
    "anger",
    "love",
    "fear",
    "neutral",
    "calm",
    "disgust",
    "surprised",
];

#[derive(thiserror::Error, Debug)]
pub enum EmotionError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Model API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Could not decode input: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl From<reqwest::Error> for EmotionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmotionError::Timeout
        } else if err.is_decode() {
            EmotionError::InvalidResponse(err.to_string())
        } else {
            EmotionError::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Speech,
    Facial,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Speech => "speech",
            Modality::Facial => "facial",
        }
    }
}

pub fn random_label(labels: &[&str]) -> String {
    labels
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("neutral")
        .to_string()
}

/// Seconds of an audio upload that are decoded and analysed.
pub const DEFAULT_SPEECH_MAX_SECONDS: f64 = 60.0;

#[derive(Clone)]
pub struct EmotionService {
    text: Option<Arc<dyn TextEmotionModel>>,
    speech: Option<Arc<dyn SpeechEmotionModel>>,
    facial: Option<Arc<dyn FacialEmotionModel>>,
    speech_max_seconds: f64,
}

impl Default for EmotionService {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

impl EmotionService {
    pub fn new(
        text: Option<Arc<dyn TextEmotionModel>>,
        speech: Option<Arc<dyn SpeechEmotionModel>>,
        facial: Option<Arc<dyn FacialEmotionModel>>,
    ) -> Self {
        Self {
            text,
            speech,
            facial,
            speech_max_seconds: DEFAULT_SPEECH_MAX_SECONDS,
        }
    }

    pub fn with_speech_max_seconds(mut self, seconds: f64) -> Self {
        self.speech_max_seconds = seconds;
        self
    }

    pub async fn detect_text(&self, text: &str) -> Result<String, EmotionError> {
        let model = self
            .text
            .as_ref()
            .ok_or_else(|| EmotionError::ModelUnavailable("text".to_string()))?;
        let start = Instant::now();
        let result = model.classify(text).await;
        record_inference(Modality::Text, start.elapsed());
        let emotion = result?;
        info!("Detected text emotion: {}", emotion);
        record_emotion_detection(Modality::Text, &emotion, false);
        Ok(emotion)
    }

    /// Never fails: any problem along the way yields a random speech label.
    pub async fn detect_speech(&self, audio: Vec<u8>, file_name: Option<String>) -> String {
        let model = self.speech.clone();
        let max_seconds = self.speech_max_seconds;
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let model = model.ok_or_else(|| EmotionError::ModelUnavailable("speech".to_string()))?;
            let decoded = decode_audio(audio, file_name.as_deref(), Some(max_seconds))?;
            debug!(
                "Decoded {:.2}s of audio at {} Hz",
                decoded.duration_seconds(),
                decoded.sample_rate
            );
            let features = mfcc::mean_mfcc(
                &decoded.samples,
                decoded.sample_rate,
                &mfcc::MfccConfig::default(),
            )?;
            model.classify(&features)
        })
        .await
        .unwrap_or_else(|e| Err(EmotionError::Inference(e.to_string())));
        record_inference(Modality::Speech, start.elapsed());
        self.label_or_fallback(Modality::Speech, result.map(Some), SPEECH_FALLBACK_LABELS)
    }

    /// Fails only when the upload is not a decodable image. Missing faces and
    /// model errors fall back to a random facial label.
    pub async fn detect_facial(&self, image: Vec<u8>) -> Result<String, EmotionError> {
        let input = tokio::task::spawn_blocking(move || FaceInput::from_image_bytes(&image))
            .await
            .map_err(|e| EmotionError::Inference(e.to_string()))??;

        let model = self.facial.clone();
        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || match model {
            Some(model) => model.top_emotion(&input),
            None => Err(EmotionError::ModelUnavailable("facial".to_string())),
        })
        .await
        .unwrap_or_else(|e| Err(EmotionError::Inference(e.to_string())));
        record_inference(Modality::Facial, start.elapsed());

        let result = result.map(|top| {
            top.map(|(label, score)| {
                debug!("Top facial emotion {} with score {:.3}", label, score);
                label
            })
        });
        Ok(self.label_or_fallback(Modality::Facial, result, FACIAL_FALLBACK_LABELS))
    }

    fn label_or_fallback(
        &self,
        modality: Modality,
        result: Result<Option<String>, EmotionError>,
        fallback: &[&str],
    ) -> String {
        match result {
            Ok(Some(emotion)) => {
                info!("Detected {} emotion: {}", modality.as_str(), emotion);
                record_emotion_detection(modality, &emotion, false);
                emotion
            }
            Ok(None) => {
                let emotion = random_label(fallback);
                warn!(
                    "No {} emotion detected, randomly selected {}",
                    modality.as_str(),
                    emotion
                );
                record_emotion_detection(modality, &emotion, true);
                emotion
            }
            Err(err) => {
                let emotion = random_label(fallback);
                warn!(
                    "{} emotion detection failed ({}), randomly selected {}",
                    modality.as_str(),
                    err,
                    emotion
                );
                record_emotion_detection(modality, &emotion, true);
                emotion
            }
        }
    }
}
