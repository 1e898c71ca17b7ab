//! Public emotion detection endpoints. Every successful detection is
//! answered together with mood-matched recommendations.

use super::metrics::{record_error, record_recommendation};
use super::responses::error_response;
use super::state::{GuardedRecommender, ServerState};
use crate::emotion::{EmotionError, EmotionService};
use crate::recommendation::{MusicRecommender, Recommendation, RecommendationError};

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, warn};

#[derive(Serialize, Deserialize, Debug)]
pub struct EmotionResponse {
    pub emotion: String,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Deserialize, Debug)]
struct TextEmotionBody {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct MusicRecommendationBody {
    emotion: Option<String>,
}

/// Recommender failures never fail the request, they yield no songs.
pub async fn recommendations_for(
    recommender: &dyn MusicRecommender,
    emotion: &str,
) -> Vec<Recommendation> {
    let start = Instant::now();
    match recommender.recommend(emotion).await {
        Ok(recommendations) => {
            debug!(
                "Got {} recommendations for {}",
                recommendations.len(),
                emotion
            );
            record_recommendation("ok", start.elapsed());
            recommendations
        }
        Err(RecommendationError::NotConfigured) => {
            debug!("No music recommender configured");
            record_recommendation("not_configured", start.elapsed());
            Vec::new()
        }
        Err(err) => {
            warn!("Failed to fetch recommendations for {}: {}", emotion, err);
            record_recommendation("error", start.elapsed());
            Vec::new()
        }
    }
}

async fn respond_with_recommendations(recommender: &GuardedRecommender, emotion: String) -> Response {
    let recommendations = recommendations_for(recommender.as_ref(), &emotion).await;
    Json(EmotionResponse {
        emotion,
        recommendations,
    })
    .into_response()
}

struct Upload {
    bytes: Vec<u8>,
    file_name: Option<String>,
}

enum UploadError {
    Missing,
    Rejected(StatusCode, String),
}

/// Reads the `file` field of a multipart body.
async fn read_upload(multipart: Result<Multipart, MultipartRejection>) -> Result<Upload, UploadError> {
    let mut multipart = multipart.map_err(|e| {
        debug!("Not a multipart body: {}", e);
        UploadError::Missing
    })?;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(UploadError::Missing),
            Err(e) => return Err(UploadError::Rejected(e.status(), e.body_text())),
        };
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| UploadError::Rejected(e.status(), e.body_text()))?;
        if bytes.is_empty() {
            return Err(UploadError::Missing);
        }
        return Ok(Upload {
            bytes: bytes.to_vec(),
            file_name,
        });
    }
}

fn upload_error_response(err: UploadError, missing_message: &str) -> Response {
    match err {
        UploadError::Missing => error_response(StatusCode::BAD_REQUEST, missing_message),
        UploadError::Rejected(status, message) => {
            warn!("Rejected upload: {}", message);
            error_response(status, message)
        }
    }
}

async fn text_emotion(
    State(emotion): State<EmotionService>,
    State(recommender): State<GuardedRecommender>,
    body: Result<Json<TextEmotionBody>, JsonRejection>,
) -> Response {
    let text = match body {
        Ok(Json(TextEmotionBody { text: Some(text) })) if !text.trim().is_empty() => text,
        _ => return error_response(StatusCode::BAD_REQUEST, "No text provided"),
    };

    match emotion.detect_text(&text).await {
        Ok(detected) => respond_with_recommendations(&recommender, detected).await,
        Err(err) => {
            error!("Text emotion detection failed: {}", err);
            record_error("text_model", "/api/text_emotion/");
            let message = match err {
                EmotionError::ModelUnavailable(_) => "Text emotion model is not available".to_string(),
                other => format!("Text emotion model error: {}", other),
            };
            error_response(StatusCode::SERVICE_UNAVAILABLE, message)
        }
    }
}

async fn speech_emotion(
    State(emotion): State<EmotionService>,
    State(recommender): State<GuardedRecommender>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(err) => return upload_error_response(err, "No audio file provided"),
    };
    debug!(
        "Received audio {:?} ({} bytes)",
        upload.file_name,
        upload.bytes.len()
    );

    let detected = emotion.detect_speech(upload.bytes, upload.file_name).await;
    respond_with_recommendations(&recommender, detected).await
}

async fn facial_emotion(
    State(emotion): State<EmotionService>,
    State(recommender): State<GuardedRecommender>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(err) => return upload_error_response(err, "No image file provided"),
    };

    match emotion.detect_facial(upload.bytes).await {
        Ok(detected) => respond_with_recommendations(&recommender, detected).await,
        Err(EmotionError::Decode(reason)) => {
            debug!("Undecodable image upload: {}", reason);
            error_response(StatusCode::BAD_REQUEST, "Invalid image file")
        }
        Err(err) => {
            error!("Facial emotion detection failed: {}", err);
            record_error("facial_model", "/api/facial_emotion/");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn music_recommendation(
    State(recommender): State<GuardedRecommender>,
    body: Result<Json<MusicRecommendationBody>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(MusicRecommendationBody {
            emotion: Some(emotion),
        })) if !emotion.trim().is_empty() => {
            respond_with_recommendations(&recommender, emotion.trim().to_string()).await
        }
        _ => error_response(StatusCode::BAD_REQUEST, "No emotion provided"),
    }
}

pub fn make_emotion_routes(state: ServerState) -> Router {
    Router::new()
        .route("/text_emotion/", post(text_emotion))
        .route("/speech_emotion/", post(speech_emotion))
        .route("/facial_emotion/", post(facial_emotion))
        .route("/music_recommendation/", post(music_recommendation))
        .with_state(state)
}
