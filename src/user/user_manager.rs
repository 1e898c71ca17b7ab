use super::{
    FullUserStore, HistoryKind, ProfileUpdate, UserAccount, UserAuthCredentials, UserProfile,
    UsernamePasswordCredentials,
};
use crate::recommendation::Recommendation;
use anyhow::{bail, Context, Result};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("All fields are required.")]
    MissingFields,

    #[error("A user with that username already exists.")]
    UsernameTaken,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct UserManager {
    user_store: Arc<Mutex<Box<dyn FullUserStore>>>,
}

impl UserManager {
    pub fn new(user_store: Box<dyn FullUserStore>) -> Self {
        Self {
            user_store: Arc::new(Mutex::new(user_store)),
        }
    }

    /// Creates the account, its password login and an empty profile.
    pub fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<UserAccount, RegistrationError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || password.is_empty() || email.is_empty() {
            return Err(RegistrationError::MissingFields);
        }

        // Hashing is slow, keep it outside the store lock
        let credentials = UsernamePasswordCredentials::new(0, password)?;
        let store = self.user_store.lock().unwrap();
        if store.get_user_by_username(username)?.is_some() {
            return Err(RegistrationError::UsernameTaken);
        }

        let user_id = store.register_user(username, email, &credentials)?;
        info!("Registered user {} ({})", username, user_id);

        let account = store
            .get_user(user_id)?
            .context("Registered user disappeared")?;
        Ok(account)
    }

    /// Returns the account when the password matches.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserAccount>> {
        let store = self.user_store.lock().unwrap();
        let Some(credentials) = store.get_user_auth_credentials(username)? else {
            return Ok(None);
        };
        let Some(password_credentials) = credentials.username_password else {
            return Ok(None);
        };
        if !password_credentials.verify(password)? {
            return Ok(None);
        }
        store.get_user(credentials.user_id)
    }

    pub fn get_user(&self, user_id: usize) -> Result<Option<UserAccount>> {
        self.user_store.lock().unwrap().get_user(user_id)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        self.user_store.lock().unwrap().get_user_by_username(username)
    }

    pub fn verify_username_email(&self, username: &str, email: &str) -> Result<bool> {
        Ok(self
            .user_store
            .lock()
            .unwrap()
            .get_user_by_username(username)?
            .is_some_and(|user| user.email.eq_ignore_ascii_case(email.trim())))
    }

    /// Replaces the password and invalidates every issued token. Returns
    /// false when the user is unknown or the given email does not match.
    pub fn reset_password(
        &self,
        username: &str,
        new_password: &str,
        email: Option<&str>,
    ) -> Result<bool> {
        if new_password.is_empty() {
            bail!("The password cannot be empty.");
        }
        let store = self.user_store.lock().unwrap();
        let Some(user) = store.get_user_by_username(username)? else {
            return Ok(false);
        };
        if let Some(email) = email {
            if !user.email.eq_ignore_ascii_case(email.trim()) {
                return Ok(false);
            }
        }
        store.update_user_auth_credentials(UserAuthCredentials {
            user_id: user.id,
            username_password: Some(UsernamePasswordCredentials::new(user.id, new_password)?),
        })?;
        let version = store.bump_token_version(user.id)?;
        info!("Password reset for {}, token version now {}", username, version);
        Ok(true)
    }

    pub fn add_user(&self, username: &str, email: &str) -> Result<usize> {
        if username.is_empty() {
            bail!("The username cannot be empty.")
        }
        let store = self.user_store.lock().unwrap();
        if store.get_user_by_username(username)?.is_some() {
            bail!("Username already exists.");
        }
        let user_id = store.create_user(username, email)?;
        store.create_profile(username)?;
        Ok(user_id)
    }

    pub fn create_password_credentials(&self, username: &str, password: &str) -> Result<()> {
        let store = self.user_store.lock().unwrap();
        let mut credentials = store
            .get_user_auth_credentials(username)?
            .with_context(|| format!("User {} not found.", username))?;
        if credentials.username_password.is_some() {
            bail!(
                "User {} already has password credentials. Maybe you want to modify it?",
                username
            );
        }
        credentials.username_password = Some(UsernamePasswordCredentials::new(
            credentials.user_id,
            password,
        )?);
        store.update_user_auth_credentials(credentials)
    }

    pub fn update_password_credentials(&self, username: &str, password: &str) -> Result<()> {
        let store = self.user_store.lock().unwrap();
        let mut credentials = store
            .get_user_auth_credentials(username)?
            .with_context(|| format!("User {} not found.", username))?;
        if credentials.username_password.is_none() {
            bail!(
                "Cannot update password of user {} since it never had one.",
                username
            );
        }
        let user_id = credentials.user_id;
        credentials.username_password = Some(UsernamePasswordCredentials::new(user_id, password)?);
        store.update_user_auth_credentials(credentials)?;
        store.bump_token_version(user_id)?;
        Ok(())
    }

    pub fn delete_password_credentials(&self, username: &str) -> Result<()> {
        let store = self.user_store.lock().unwrap();
        let mut credentials = store
            .get_user_auth_credentials(username)?
            .with_context(|| format!("User {} not found.", username))?;
        credentials.username_password = None;
        store.update_user_auth_credentials(credentials)
    }

    pub fn get_user_credentials(&self, username: &str) -> Result<Option<UserAuthCredentials>> {
        self.user_store
            .lock()
            .unwrap()
            .get_user_auth_credentials(username)
    }

    pub fn get_all_usernames(&self) -> Result<Vec<String>> {
        self.user_store.lock().unwrap().get_all_usernames()
    }

    pub fn get_profile(&self, profile_id: &str) -> Result<Option<UserProfile>> {
        self.user_store.lock().unwrap().get_profile(profile_id)
    }

    pub fn get_profile_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        self.user_store
            .lock()
            .unwrap()
            .get_profile_by_username(username)
    }

    /// Applies the present fields. Returns false when the user has no
    /// profile.
    pub fn update_profile(&self, user: &UserAccount, update: ProfileUpdate) -> Result<bool> {
        let store = self.user_store.lock().unwrap();
        let Some(profile) = store.get_profile_by_username(&user.username)? else {
            return Ok(false);
        };
        if let Some(email) = update.email.as_deref() {
            store.update_user_email(user.id, email.trim())?;
        }
        if let Some(moods) = update.mood_history.as_deref() {
            store.replace_history(&profile.id, HistoryKind::Mood, moods)?;
        }
        if let Some(tracks) = update.listening_history.as_deref() {
            store.replace_history(&profile.id, HistoryKind::Listening, tracks)?;
        }
        Ok(true)
    }

    /// Removes the profile and its history. The account stays.
    pub fn delete_profile(&self, username: &str) -> Result<bool> {
        let store = self.user_store.lock().unwrap();
        match store.get_profile_by_username(username)? {
            Some(profile) => store.delete_profile(&profile.id),
            None => Ok(false),
        }
    }

    pub fn append_history(&self, profile_id: &str, kind: HistoryKind, value: &str) -> Result<()> {
        self.user_store
            .lock()
            .unwrap()
            .append_history(profile_id, kind, value)
    }

    pub fn remove_history_entry(
        &self,
        profile_id: &str,
        kind: HistoryKind,
        value: &str,
    ) -> Result<bool> {
        self.user_store
            .lock()
            .unwrap()
            .remove_history_entry(profile_id, kind, value)
    }

    pub fn save_recommendations(
        &self,
        profile_id: &str,
        recommendations: &[Recommendation],
    ) -> Result<()> {
        self.user_store
            .lock()
            .unwrap()
            .append_recommendations(profile_id, recommendations)
    }

    pub fn clear_recommendations(&self, profile_id: &str) -> Result<usize> {
        self.user_store
            .lock()
            .unwrap()
            .clear_recommendations(profile_id)
    }
}
