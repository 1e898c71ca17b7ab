//! Text emotion classification through a hosted transformer endpoint.

use super::{EmotionError, TEXT_LABELS};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Tokens the classifier sees before the input is truncated.
pub const MAX_TEXT_TOKENS: usize = 128;

#[async_trait]
pub trait TextEmotionModel: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String, EmotionError>;
}

#[derive(Debug, Clone)]
pub struct TextModelSettings {
    pub url: String,
    pub api_token: Option<String>,
    pub labels: Vec<String>,
    pub timeout_sec: u64,
}

impl TextModelSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_token: None,
            labels: TEXT_LABELS.iter().map(|s| s.to_string()).collect(),
            timeout_sec: 30,
        }
    }
}

pub struct RemoteTextClassifier {
    client: Client,
    settings: TextModelSettings,
}

#[derive(Deserialize, Debug)]
struct LabelScore {
    label: String,
    score: f32,
}

impl RemoteTextClassifier {
    pub fn new(settings: TextModelSettings) -> Result<Self> {
        if settings.url.trim().is_empty() {
            return Err(anyhow!("Text model url is empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_sec))
            .build()?;
        Ok(Self { client, settings })
    }

    fn resolve_label(&self, label: &str) -> String {
        label
            .strip_prefix("LABEL_")
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(|index| self.settings.labels.get(index).cloned())
            .unwrap_or_else(|| label.to_string())
            .to_lowercase()
    }

    fn label_for_index(&self, index: usize) -> String {
        self.settings
            .labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("label_{}", index))
            .to_lowercase()
    }

    fn parse_response(&self, body: Value) -> Result<String, EmotionError> {
        let invalid = |what: &str| EmotionError::InvalidResponse(what.to_string());

        if let Some(logits) = body.get("logits") {
            let logits: Vec<f32> = match logits {
                Value::Array(rows) if rows.first().is_some_and(Value::is_array) => {
                    serde_json::from_value(rows[0].clone())
                }
                other => serde_json::from_value(other.clone()),
            }
            .map_err(|_| invalid("logits are not numbers"))?;
            return argmax(&logits)
                .map(|index| self.label_for_index(index))
                .ok_or_else(|| invalid("empty logits"));
        }

        let scores = match body {
            Value::Array(mut items) if items.first().is_some_and(Value::is_array) => {
                items.swap_remove(0)
            }
            other => other,
        };
        let scores: Vec<LabelScore> =
            serde_json::from_value(scores).map_err(|_| invalid("expected label scores"))?;
        debug!("Text classifier scores: {:?}", scores);

        scores
            .iter()
            .filter(|s| s.score.is_finite())
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|best| self.resolve_label(&best.label))
            .ok_or_else(|| invalid("no label scores"))
    }
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

#[async_trait]
impl TextEmotionModel for RemoteTextClassifier {
    async fn classify(&self, text: &str) -> Result<String, EmotionError> {
        let payload = json!({
            "inputs": text,
            "parameters": { "truncation": true, "max_length": MAX_TEXT_TOKENS },
        });
        let mut request = self.client.post(&self.settings.url).json(&payload);
        if let Some(token) = &self.settings.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmotionError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let body: Value = response.json().await?;
        self.parse_response(body)
    }
}
