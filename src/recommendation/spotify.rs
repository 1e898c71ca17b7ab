//! Spotify Web API client using the client-credentials flow.

use super::{
    genre_for_emotion, keyword_for_genre, targets_for_emotion, MusicRecommender, Recommendation,
    RecommendationError,
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh the token this long before Spotify says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub market: String,
    pub limit: usize,
    /// Full URL of the token endpoint.
    pub accounts_url: String,
    /// Base URL of the Web API, without trailing slash.
    pub api_url: String,
    pub timeout_sec: u64,
}

impl Default for SpotifySettings {
    fn default() -> Self {
        SpotifySettings {
            client_id: String::new(),
            client_secret: String::new(),
            market: "US".to_string(),
            limit: 10,
            accounts_url: "https://accounts.spotify.com/api/token".to_string(),
            api_url: "https://api.spotify.com/v1".to_string(),
            timeout_sec: 10,
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    client: reqwest::Client,
    settings: SpotifySettings,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    tracks: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<SearchTracks>,
}

#[derive(Deserialize)]
struct SearchTracks {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    preview_url: Option<String>,
    external_urls: Option<ExternalUrls>,
    album: Option<SpotifyAlbum>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: Option<String>,
}

#[derive(Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Deserialize)]
struct SpotifyImage {
    url: Option<String>,
}

impl From<SpotifyTrack> for Recommendation {
    fn from(track: SpotifyTrack) -> Self {
        Recommendation {
            name: track.name.unwrap_or_default(),
            artist: track
                .artists
                .into_iter()
                .filter_map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
            preview_url: track.preview_url,
            external_url: track.external_urls.and_then(|u| u.spotify),
            image_url: track
                .album
                .and_then(|a| a.images.into_iter().next())
                .and_then(|i| i.url),
        }
    }
}

impl SpotifyClient {
    pub fn new(settings: SpotifySettings) -> Result<Self, RecommendationError> {
        if settings.client_id.is_empty() || settings.client_secret.is_empty() {
            return Err(RecommendationError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_sec))
            .build()
            .map_err(|e| RecommendationError::Connection(e.to_string()))?;
        let settings = SpotifySettings {
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            ..settings
        };
        Ok(Self {
            client,
            settings,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, RecommendationError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting Spotify access token");
        let credentials = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.settings.client_id, self.settings.client_secret
        ));
        let response = self
            .client
            .post(&self.settings.accounts_url)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RecommendationError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RecommendationError::Auth(e.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, RecommendationError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}{}", self.settings.api_url, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Spotify rejected the access token");
            self.invalidate_token().await;
            return Err(RecommendationError::TokenExpired);
        }
        Ok(response)
    }

    async fn fetch_recommendations(
        &self,
        genre: &str,
        emotion: &str,
    ) -> Result<Option<Vec<Recommendation>>, RecommendationError> {
        let mut query = vec![
            ("seed_genres", genre.to_string()),
            ("limit", self.settings.limit.to_string()),
            ("market", self.settings.market.clone()),
        ];
        let targets = targets_for_emotion(emotion);
        if let Some(valence) = targets.valence {
            query.push(("target_valence", valence.to_string()));
        }
        if let Some(energy) = targets.energy {
            query.push(("target_energy", energy.to_string()));
        }

        let response = self.get("/recommendations", &query).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: RecommendationsResponse = response.json().await?;
                Ok(Some(body.tracks.into_iter().map(Recommendation::from).collect()))
            }
            status => Err(api_error(status, response).await),
        }
    }

    async fn search_tracks(&self, keyword: &str) -> Result<Vec<Recommendation>, RecommendationError> {
        let query = [
            ("q", keyword.to_string()),
            ("type", "track".to_string()),
            ("limit", self.settings.limit.to_string()),
            ("market", self.settings.market.clone()),
        ];
        let response = self.get("/search", &query).await?;
        if !response.status().is_success() {
            return Err(api_error(response.status(), response).await);
        }
        let body: SearchResponse = response.json().await?;
        Ok(body
            .tracks
            .map(|t| t.items)
            .unwrap_or_default()
            .into_iter()
            .map(Recommendation::from)
            .collect())
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> RecommendationError {
    RecommendationError::Api {
        status: status.as_u16(),
        message: response.text().await.unwrap_or_default(),
    }
}

#[async_trait]
impl MusicRecommender for SpotifyClient {
    async fn recommend(&self, emotion: &str) -> Result<Vec<Recommendation>, RecommendationError> {
        let genre = genre_for_emotion(emotion);
        debug!("Fetching recommendations for emotion={} genre={}", emotion, genre);

        if let Some(tracks) = self.fetch_recommendations(genre, emotion).await? {
            return Ok(tracks);
        }

        let keyword = keyword_for_genre(genre);
        info!(
            "Recommendations endpoint unavailable, searching for \"{}\" instead",
            keyword
        );
        self.search_tracks(keyword).await
    }
}
