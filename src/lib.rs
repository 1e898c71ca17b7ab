//! Moodify Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod emotion;
pub mod recommendation;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use emotion::EmotionService;
pub use recommendation::{MusicRecommender, NoRecommender, Recommendation, SpotifyClient};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use user::{JwtIssuer, SqliteUserStore, UserManager, UserStore};
