//! User data models

use crate::recommendation::Recommendation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Login account. Profiles hang off the username.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub id: usize,
    pub username: String,
    pub email: String,
    /// Bumped whenever previously issued tokens must stop working.
    pub token_version: u32,
    pub created: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub mood_history: Vec<String>,
    pub listening_history: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Mood,
    Listening,
}

impl HistoryKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            HistoryKind::Mood => "mood_history",
            HistoryKind::Listening => "listening_history",
        }
    }

    pub fn value_column(&self) -> &'static str {
        match self {
            HistoryKind::Mood => "mood",
            HistoryKind::Listening => "track",
        }
    }
}

/// Optional replacements applied by a profile update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub mood_history: Option<Vec<String>>,
    pub listening_history: Option<Vec<String>>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.mood_history.is_none() && self.listening_history.is_none()
    }
}
