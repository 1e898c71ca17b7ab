mod api_docs;
pub mod config;
mod emotion_routes;
mod http_layers;
pub mod metrics;
mod responses;
pub mod server;
pub(self) mod session;
pub mod state;
mod user_routes;

pub use api_docs::openapi_document;
pub use config::ServerConfig;
pub use emotion_routes::EmotionResponse;
pub use http_layers::*;
pub use server::{make_app, run_server, ServerStats};
pub use user_routes::{ListeningHistoryResponse, MoodHistoryResponse, ProfileResponse};
