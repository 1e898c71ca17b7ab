//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database. Models and the
//! music recommender are replaced by deterministic stubs.

use super::constants::*;
use super::fixtures::create_test_db_with_users;
use async_trait::async_trait;
use moodify_server::emotion::{
    EmotionError, EmotionService, FaceInput, FacialEmotionModel, SpeechEmotionModel,
    TextEmotionModel,
};
use moodify_server::recommendation::{MusicRecommender, Recommendation, RecommendationError};
use moodify_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use moodify_server::user::{JwtIssuer, SqliteUserStore, UserManager};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct StubTextModel;

#[async_trait]
impl TextEmotionModel for StubTextModel {
    async fn classify(&self, text: &str) -> Result<String, EmotionError> {
        if text == STUB_TEXT_FAILURE_INPUT {
            return Err(EmotionError::Api {
                status: 503,
                message: "Model is loading".to_string(),
            });
        }
        if text.to_lowercase().contains("sad") {
            Ok(STUB_SAD_TEXT_EMOTION.to_string())
        } else {
            Ok(STUB_TEXT_EMOTION.to_string())
        }
    }
}

struct StubSpeechModel;

impl SpeechEmotionModel for StubSpeechModel {
    fn classify(&self, features: &[f32]) -> Result<String, EmotionError> {
        if features.is_empty() {
            return Err(EmotionError::InvalidInput("no features".to_string()));
        }
        Ok(STUB_SPEECH_EMOTION.to_string())
    }
}

struct StubFacialModel;

impl FacialEmotionModel for StubFacialModel {
    fn top_emotion(&self, _face: &FaceInput) -> Result<Option<(String, f32)>, EmotionError> {
        Ok(Some((STUB_FACIAL_EMOTION.to_string(), 0.9)))
    }
}

/// Returns `STUB_RECOMMENDATIONS_COUNT` songs named after the emotion.
struct StubRecommender;

#[async_trait]
impl MusicRecommender for StubRecommender {
    async fn recommend(&self, emotion: &str) -> Result<Vec<Recommendation>, RecommendationError> {
        if emotion == STUB_RECOMMENDER_FAILURE_EMOTION {
            return Err(RecommendationError::Api {
                status: 500,
                message: "stub failure".to_string(),
            });
        }
        Ok((0..STUB_RECOMMENDATIONS_COUNT)
            .map(|i| Recommendation {
                name: format!("{} song {}", emotion, i),
                artist: "Stub Artist".to_string(),
                preview_url: None,
                external_url: Some(format!("https://open.spotify.com/track/{}{}", emotion, i)),
                image_url: None,
            })
            .collect())
    }
}

/// Test server instance with an isolated database
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    #[allow(dead_code)]
    pub port: u16,

    /// User manager for direct database access in tests
    #[allow(dead_code)]
    pub user_manager: Arc<Mutex<UserManager>>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port, with stub models.
    pub async fn spawn() -> Self {
        let emotion = EmotionService::new(
            Some(Arc::new(StubTextModel)),
            Some(Arc::new(StubSpeechModel)),
            Some(Arc::new(StubFacialModel)),
        );
        Self::spawn_with_emotion(emotion).await
    }

    /// Spawns a test server that has no emotion model at all.
    #[allow(dead_code)]
    pub async fn spawn_without_models() -> Self {
        Self::spawn_with_emotion(EmotionService::default()).await
    }

    /// This function:
    /// 1. Creates a temporary database with test users
    /// 2. Binds to a random port (127.0.0.1:0)
    /// 3. Spawns the server in a background task
    /// 4. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Database creation fails
    /// - Port binding fails
    /// - Server doesn't become ready within timeout
    async fn spawn_with_emotion(emotion: EmotionService) -> Self {
        let (temp_db_dir, db_path) =
            create_test_db_with_users().expect("Failed to create test database");

        let user_store = SqliteUserStore::new(&db_path).expect("Failed to open user store");
        let user_manager = Arc::new(Mutex::new(UserManager::new(Box::new(user_store))));

        let jwt = Arc::new(JwtIssuer::new(
            TEST_JWT_SECRET,
            Duration::from_secs(300),
            Duration::from_secs(3600),
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
            ..ServerConfig::default()
        };

        let app = make_app(
            config,
            user_manager.clone(),
            jwt,
            emotion,
            Arc::new(StubRecommender),
        )
        .expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            user_manager,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
