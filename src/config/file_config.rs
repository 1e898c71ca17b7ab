use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub max_upload_mb: Option<usize>,
    pub permissive_cors: Option<bool>,

    pub jwt: Option<JwtConfig>,
    pub spotify: Option<SpotifyConfig>,
    pub models: Option<ModelsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub access_token_lifetime_sec: Option<u64>,
    pub refresh_token_lifetime_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub market: Option<String>,
    pub limit: Option<usize>,
    pub accounts_url: Option<String>,
    pub api_url: Option<String>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ModelsConfig {
    /// Inference endpoint of the text classifier.
    pub text_model_url: Option<String>,
    pub text_model_api_token: Option<String>,
    /// Maps `LABEL_<n>` outputs to emotion names.
    pub text_labels: Option<Vec<String>>,
    pub text_timeout_sec: Option<u64>,

    /// JSON export of the scaler and SVM.
    pub speech_model_path: Option<String>,
    /// Longer audio uploads are cut to this many seconds.
    pub speech_max_seconds: Option<f64>,

    /// ONNX face classifier.
    pub facial_model_path: Option<String>,
    pub facial_labels: Option<Vec<String>>,
    pub facial_input_name: Option<String>,
    /// "nchw" or "nhwc"
    pub facial_layout: Option<String>,
    pub facial_min_confidence: Option<f32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
