pub mod auth;
pub mod jwt;
mod sqlite_user_store;
mod user_manager;
pub mod user_models;
mod user_store;

pub use auth::{MoodifyHasher, UserAuthCredentials, UsernamePasswordCredentials};
pub use jwt::{Claims, JwtError, JwtIssuer, TokenPair, TokenType};
pub use sqlite_user_store::SqliteUserStore;
pub use user_manager::{RegistrationError, UserManager};
pub use user_models::{HistoryKind, ProfileUpdate, UserAccount, UserProfile};
pub use user_store::{FullUserStore, UserAuthCredentialsStore, UserProfileStore, UserStore};
