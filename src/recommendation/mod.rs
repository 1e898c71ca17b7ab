//! Mood-driven music recommendations.
//!
//! An emotion label is turned into a genre seed, a search keyword and a
//! set of audio-feature targets. A [`MusicRecommender`] uses them to pick
//! tracks from an external catalog.

mod spotify;

pub use spotify::{SpotifyClient, SpotifySettings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Recommendation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum RecommendationError {
    #[error("Recommendation service is not configured")]
    NotConfigured,

    #[error("Access token rejected or expired")]
    TokenExpired,

    #[error("Failed to obtain access token: {0}")]
    Auth(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RecommendationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RecommendationError::Timeout
        } else if err.is_decode() {
            RecommendationError::InvalidResponse(err.to_string())
        } else {
            RecommendationError::Connection(err.to_string())
        }
    }
}

#[async_trait]
pub trait MusicRecommender: Send + Sync {
    async fn recommend(&self, emotion: &str) -> Result<Vec<Recommendation>, RecommendationError>;
}

pub const DEFAULT_GENRE: &str = "pop";

/// Emotion label to catalog genre seed. Covers the text labels, the speech
/// vocabulary and the facial classifier's own label names.
const GENRE_TABLE: &[(&str, &str)] = &[
    ("joy", "happy"),
    ("sadness", "sad"),
    ("anger", "metal"),
    ("love", "romance"),
    ("fear", "sad"),
    ("neutral", "pop"),
    ("calm", "chill"),
    ("disgust", "blues"),
    ("surprised", "party"),
    ("happy", "happy"),
    ("sad", "sad"),
    ("angry", "metal"),
    ("surprise", "party"),
    ("excited", "party"),
    ("amused", "party"),
    ("bored", "pop"),
    ("tired", "chill"),
    ("relaxed", "chill"),
    ("stressed", "chill"),
    ("anxious", "chill"),
    ("content", "chill"),
    ("overwhelmed", "chill"),
    ("depressed", "sad"),
    ("lonely", "sad"),
    ("energetic", "hip-hop"),
    ("proud", "hip-hop"),
    ("nostalgic", "pop"),
    ("confused", "pop"),
    ("jealous", "pop"),
    ("disappointed", "pop"),
    ("insecure", "pop"),
    ("frustrated", "metal"),
    ("hopeful", "romance"),
    ("guilty", "blues"),
    ("ashamed", "blues"),
    ("embarrassed", "blues"),
];

/// Genre seed to free-text search keyword, used when the recommendations
/// endpoint is not available.
const KEYWORD_TABLE: &[(&str, &str)] = &[
    ("happy", "happy upbeat"),
    ("sad", "sad songs"),
    ("metal", "angry metal"),
    ("romance", "love songs"),
    ("chill", "chill relax"),
    ("blues", "blues"),
    ("party", "party hits"),
    ("hip-hop", "hip-hop energy"),
    ("pop", "pop hits"),
];

pub fn genre_for_emotion(emotion: &str) -> &'static str {
    let emotion = emotion.trim().to_lowercase();
    GENRE_TABLE
        .iter()
        .find(|(label, _)| *label == emotion)
        .map(|(_, genre)| *genre)
        .unwrap_or(DEFAULT_GENRE)
}

pub fn keyword_for_genre(genre: &str) -> &'static str {
    KEYWORD_TABLE
        .iter()
        .find(|(g, _)| *g == genre)
        .map(|(_, keyword)| *keyword)
        .unwrap_or("pop hits")
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioTargets {
    pub valence: Option<f32>,
    pub energy: Option<f32>,
}

pub fn targets_for_emotion(emotion: &str) -> AudioTargets {
    match emotion.trim().to_lowercase().as_str() {
        "joy" | "love" => AudioTargets {
            valence: Some(0.8),
            energy: Some(0.7),
        },
        "sadness" => AudioTargets {
            valence: Some(0.2),
            energy: Some(0.3),
        },
        "anger" => AudioTargets {
            valence: Some(0.4),
            energy: Some(0.9),
        },
        _ => AudioTargets::default(),
    }
}

/// Recommender used when no catalog credentials are configured.
pub struct NoRecommender;

#[async_trait]
impl MusicRecommender for NoRecommender {
    async fn recommend(&self, _emotion: &str) -> Result<Vec<Recommendation>, RecommendationError> {
        Err(RecommendationError::NotConfigured)
    }
}
