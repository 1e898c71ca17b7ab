use axum::extract::FromRef;

use crate::emotion::EmotionService;
use crate::recommendation::MusicRecommender;
use crate::user::{JwtIssuer, UserManager};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::ServerConfig;

pub type GuardedUserManager = Arc<Mutex<UserManager>>;
pub type GuardedJwtIssuer = Arc<JwtIssuer>;
pub type GuardedRecommender = Arc<dyn MusicRecommender>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub user_manager: GuardedUserManager,
    pub jwt: GuardedJwtIssuer,
    pub emotion: EmotionService,
    pub recommender: GuardedRecommender,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedJwtIssuer {
    fn from_ref(input: &ServerState) -> Self {
        input.jwt.clone()
    }
}

impl FromRef<ServerState> for EmotionService {
    fn from_ref(input: &ServerState) -> Self {
        input.emotion.clone()
    }
}

impl FromRef<ServerState> for GuardedRecommender {
    fn from_ref(input: &ServerState) -> Self {
        input.recommender.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
