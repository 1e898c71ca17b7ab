use anyhow::{Context, Result};
use std::time::{Duration, Instant};

use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info};

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::api_docs::make_api_docs_routes;
use super::emotion_routes::make_emotion_routes;
use super::metrics::metrics_handler;
use super::user_routes::make_user_routes;
use super::{log_requests, state::*, ServerConfig};
use crate::emotion::EmotionService;

#[derive(Serialize, Deserialize, Debug)]
pub struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub version: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(stats)
}

impl ServerState {
    fn new(
        config: ServerConfig,
        user_manager: GuardedUserManager,
        jwt: GuardedJwtIssuer,
        emotion: EmotionService,
        recommender: GuardedRecommender,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            user_manager,
            jwt,
            emotion,
            recommender,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    user_manager: GuardedUserManager,
    jwt: GuardedJwtIssuer,
    emotion: EmotionService,
    recommender: GuardedRecommender,
) -> Result<Router> {
    let state = ServerState::new(config.clone(), user_manager, jwt, emotion, recommender);

    let emotion_routes = make_emotion_routes(state.clone())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .merge(make_api_docs_routes());
    let user_routes = make_user_routes(state.clone());

    // The API routes are matched before the static fallback.
    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router
        .nest("/api", emotion_routes)
        .nest("/users", user_routes);

    if config.permissive_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn run_metrics_server(port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    Ok(axum::serve(listener, make_metrics_app()).await?)
}

pub async fn run_server(
    config: ServerConfig,
    user_manager: GuardedUserManager,
    jwt: GuardedJwtIssuer,
    emotion: EmotionService,
    recommender: GuardedRecommender,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, user_manager, jwt, emotion, recommender)?;

    tokio::spawn(async move {
        if let Err(err) = run_metrics_server(metrics_port).await {
            error!("Metrics server stopped: {:#}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    Ok(axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::NoRecommender;
    use crate::user::{JwtIssuer, SqliteUserStore, UserManager};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app(config: ServerConfig) -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteUserStore::new(dir.path().join("moodify.db")).unwrap();
        let user_manager = Arc::new(Mutex::new(UserManager::new(Box::new(store))));
        let jwt = Arc::new(JwtIssuer::new(
            "test-secret",
            Duration::from_secs(300),
            Duration::from_secs(3600),
        ));
        let app = make_app(
            config,
            user_manager,
            jwt,
            EmotionService::default(),
            Arc::new(NoRecommender),
        )
        .unwrap();
        (app, dir)
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn responds_unauthorized_on_protected_routes() {
        let (app, _dir) = test_app(ServerConfig::default());

        let protected_routes = vec![
            ("GET", "/users/validate_token/"),
            ("GET", "/users/user/profile/"),
            ("PUT", "/users/user/profile/update/"),
            ("DELETE", "/users/user/profile/delete/"),
            ("GET", "/users/recommendations/abc/"),
            ("POST", "/users/recommendations/save/abc/"),
            ("GET", "/users/recommendations/get/abc/"),
            ("DELETE", "/users/recommendations/delete/abc/"),
            ("GET", "/users/mood_history/abc/"),
            ("POST", "/users/listening_history/abc/"),
        ];

        for (method, route) in protected_routes.into_iter() {
            let request = Request::builder()
                .method(method)
                .uri(route)
                .header("Authorization", "Bearer not-a-token")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, route);
        }
    }

    #[tokio::test]
    async fn home_reports_server_stats() {
        let (app, _dir) = test_app(ServerConfig::default());

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let stats: ServerStats = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats.version, env!("CARGO_PKG_VERSION"));
        assert!(stats.uptime.starts_with("0d "));
        assert_eq!(stats.hash, env!("GIT_HASH"));
        assert!(!stats.hash.trim().is_empty());
    }

    #[tokio::test]
    async fn rejects_text_emotion_without_text() {
        let (app, _dir) = test_app(ServerConfig::default());

        let request = Request::builder()
            .method("POST")
            .uri("/api/text_emotion/")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"text": "   "}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_uploads_over_the_body_limit() {
        let config = ServerConfig {
            max_upload_bytes: 1024,
            ..ServerConfig::default()
        };
        let (app, _dir) = test_app(config);

        let boundary = "moodify-boundary";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"big.wav\"\r\nContent-Type: audio/wav\r\n\r\n",
            b = boundary
        )
        .into_bytes();
        body.extend(std::iter::repeat(0u8).take(4096));
        body.extend(format!("\r\n--{}--\r\n", boundary).into_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/speech_emotion/")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn sends_cors_headers() {
        let (app, _dir) = test_app(ServerConfig::default());

        let request = Request::builder()
            .uri("/")
            .header("Origin", "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
