use super::auth::{UserAuthCredentials, UsernamePasswordCredentials};
use super::user_models::{HistoryKind, UserAccount, UserProfile};
use crate::recommendation::Recommendation;
use anyhow::Result;

pub trait UserAuthCredentialsStore: Send + Sync {
    /// Returns the user's authentication credentials given the username.
    /// Returns Ok(None) if the user does not exist.
    /// Returns Err if there is a database error.
    fn get_user_auth_credentials(&self, username: &str) -> Result<Option<UserAuthCredentials>>;

    /// Replaces the user's authentication credentials, a `None` password
    /// removes the password login.
    fn update_user_auth_credentials(&self, credentials: UserAuthCredentials) -> Result<()>;
}

pub trait UserStore: Send + Sync {
    /// Creates a new user and returns the user id.
    fn create_user(&self, username: &str, email: &str) -> Result<usize>;

    /// Creates the user, its password login and an empty profile, all or
    /// nothing. `password.user_id` is ignored. Returns the user id.
    fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &UsernamePasswordCredentials,
    ) -> Result<usize>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: usize) -> Result<Option<UserAccount>>;

    fn get_user_by_username(&self, username: &str) -> Result<Option<UserAccount>>;

    /// Returns all users' usernames.
    fn get_all_usernames(&self) -> Result<Vec<String>>;

    fn update_user_email(&self, user_id: usize, email: &str) -> Result<()>;

    /// Increments the token version and returns the new value.
    fn bump_token_version(&self, user_id: usize) -> Result<u32>;

    /// Deletes the account together with its credentials. Returns false if
    /// the user did not exist.
    fn delete_user(&self, user_id: usize) -> Result<bool>;
}

pub trait UserProfileStore: Send + Sync {
    /// Creates an empty profile and returns its id.
    fn create_profile(&self, username: &str) -> Result<String>;

    /// Returns the profile with its histories and saved recommendations.
    /// Returns Ok(None) if the profile does not exist.
    fn get_profile(&self, profile_id: &str) -> Result<Option<UserProfile>>;

    fn get_profile_by_username(&self, username: &str) -> Result<Option<UserProfile>>;

    /// Returns false if the profile did not exist.
    fn delete_profile(&self, profile_id: &str) -> Result<bool>;

    fn append_history(&self, profile_id: &str, kind: HistoryKind, value: &str) -> Result<()>;

    /// Removes the oldest entry equal to `value`. Returns false if there
    /// was none.
    fn remove_history_entry(&self, profile_id: &str, kind: HistoryKind, value: &str)
        -> Result<bool>;

    /// Replaces the whole history, keeping the given order.
    fn replace_history(&self, profile_id: &str, kind: HistoryKind, values: &[String])
        -> Result<()>;

    fn append_recommendations(
        &self,
        profile_id: &str,
        recommendations: &[Recommendation],
    ) -> Result<()>;

    /// Returns the number of removed recommendations.
    fn clear_recommendations(&self, profile_id: &str) -> Result<usize>;
}

pub trait FullUserStore: UserStore + UserAuthCredentialsStore + UserProfileStore {}

impl<T: UserStore + UserAuthCredentialsStore + UserProfileStore> FullUserStore for T {}
