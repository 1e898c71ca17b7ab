//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all Moodify endpoints.
//!
//! When API routes or request formats change, update only this file.
#![allow(dead_code)]

use super::constants::*;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

/// HTTP test client holding the JWTs of its last successful login
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    access_token: Mutex<Option<String>>,
    refresh_token: Mutex<Option<String>>,
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication flows.
    /// For most tests, use `authenticated()` instead.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            access_token: Mutex::new(None),
            refresh_token: Mutex::new(None),
        }
    }

    /// Creates a client pre-authenticated as the regular test user
    ///
    /// # Panics
    ///
    /// Panics if authentication fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER, TEST_PASS).await
    }

    /// Creates a client pre-authenticated as the given user
    pub async fn authenticated_as(base_url: String, username: &str, password: &str) -> Self {
        let client = Self::new(base_url);
        let response = client.login(username, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::OK,
            "Authentication of {} failed",
            username
        );
        let tokens: Value = response.json().await.expect("Invalid login response");
        client.set_tokens(
            tokens["access"].as_str().map(String::from),
            tokens["refresh"].as_str().map(String::from),
        );
        client
    }

    pub fn set_tokens(&self, access: Option<String>, refresh: Option<String>) {
        *self.access_token.lock().unwrap() = access;
        *self.refresh_token.lock().unwrap() = refresh;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.lock().unwrap().clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.refresh_token.lock().unwrap().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Response {
        self.with_auth(builder)
            .send()
            .await
            .expect("Request failed")
    }

    // ========================================================================
    // Service
    // ========================================================================

    /// GET /
    pub async fn home(&self) -> Response {
        self.send(self.client.get(self.url("/"))).await
    }

    /// GET /api/openapi.json
    pub async fn openapi(&self) -> Response {
        self.send(self.client.get(self.url("/api/openapi.json"))).await
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// POST /users/register/
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Response {
        self.register_raw(json!({
            "username": username,
            "password": password,
            "email": email,
        }))
        .await
    }

    /// POST /users/register/ with an arbitrary body
    pub async fn register_raw(&self, body: Value) -> Response {
        self.send(self.client.post(self.url("/users/register/")).json(&body))
            .await
    }

    /// POST /users/login/
    pub async fn login(&self, username: &str, password: &str) -> Response {
        self.client
            .post(self.url("/users/login/"))
            .json(&json!({"username": username, "password": password}))
            .send()
            .await
            .expect("Login request failed")
    }

    /// POST /users/token/refresh/
    pub async fn refresh(&self, refresh_token: &str) -> Response {
        self.client
            .post(self.url("/users/token/refresh/"))
            .json(&json!({"refresh": refresh_token}))
            .send()
            .await
            .expect("Refresh request failed")
    }

    /// GET /users/validate_token/
    pub async fn validate_token(&self) -> Response {
        self.send(self.client.get(self.url("/users/validate_token/")))
            .await
    }

    /// POST /users/verify-username-email/
    pub async fn verify_username_email(&self, body: Value) -> Response {
        self.send(
            self.client
                .post(self.url("/users/verify-username-email/"))
                .json(&body),
        )
        .await
    }

    /// POST /users/reset-password/
    pub async fn reset_password(&self, body: Value) -> Response {
        self.send(self.client.post(self.url("/users/reset-password/")).json(&body))
            .await
    }

    // ========================================================================
    // Profile Endpoints
    // ========================================================================

    /// GET /users/user/profile/
    pub async fn get_profile(&self) -> Response {
        self.send(self.client.get(self.url("/users/user/profile/")))
            .await
    }

    /// Id of the caller's profile
    ///
    /// # Panics
    ///
    /// Panics if the caller has no profile.
    pub async fn profile_id(&self) -> String {
        let response = self.get_profile().await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let profile: Value = response.json().await.expect("Invalid profile");
        profile["id"]
            .as_str()
            .expect("Profile without id")
            .to_string()
    }

    /// PUT /users/user/profile/update/
    pub async fn update_profile(&self, body: Value) -> Response {
        self.send(
            self.client
                .put(self.url("/users/user/profile/update/"))
                .json(&body),
        )
        .await
    }

    /// DELETE /users/user/profile/delete/
    pub async fn delete_profile(&self) -> Response {
        self.send(self.client.delete(self.url("/users/user/profile/delete/")))
            .await
    }

    // ========================================================================
    // Recommendations
    // ========================================================================

    /// GET /users/recommendations/{id}/
    pub async fn get_recommendations(&self, profile_id: &str) -> Response {
        self.send(
            self.client
                .get(self.url(&format!("/users/recommendations/{}/", profile_id))),
        )
        .await
    }

    /// POST /users/recommendations/{id}/
    pub async fn post_recommendations(&self, profile_id: &str, body: Value) -> Response {
        self.send(
            self.client
                .post(self.url(&format!("/users/recommendations/{}/", profile_id)))
                .json(&body),
        )
        .await
    }

    /// DELETE /users/recommendations/{id}/
    pub async fn clear_recommendations(&self, profile_id: &str) -> Response {
        self.send(
            self.client
                .delete(self.url(&format!("/users/recommendations/{}/", profile_id))),
        )
        .await
    }

    /// POST /users/recommendations/save/{id}/
    pub async fn save_recommendations(&self, profile_id: &str, body: Value) -> Response {
        self.send(
            self.client
                .post(self.url(&format!("/users/recommendations/save/{}/", profile_id)))
                .json(&body),
        )
        .await
    }

    /// GET /users/recommendations/get/{id}/
    pub async fn get_saved_recommendations(&self, profile_id: &str) -> Response {
        self.send(
            self.client
                .get(self.url(&format!("/users/recommendations/get/{}/", profile_id))),
        )
        .await
    }

    /// DELETE /users/recommendations/delete/{id}/
    pub async fn delete_all_recommendations(&self, profile_id: &str) -> Response {
        self.send(
            self.client
                .delete(self.url(&format!("/users/recommendations/delete/{}/", profile_id))),
        )
        .await
    }

    // ========================================================================
    // History
    // ========================================================================

    /// GET /users/mood_history/{id}/
    pub async fn get_mood_history(&self, profile_id: &str) -> Response {
        self.send(
            self.client
                .get(self.url(&format!("/users/mood_history/{}/", profile_id))),
        )
        .await
    }

    /// POST /users/mood_history/{id}/
    pub async fn add_mood(&self, profile_id: &str, body: Value) -> Response {
        self.send(
            self.client
                .post(self.url(&format!("/users/mood_history/{}/", profile_id)))
                .json(&body),
        )
        .await
    }

    /// DELETE /users/mood_history/{id}/
    pub async fn remove_mood(&self, profile_id: &str, body: Value) -> Response {
        self.send(
            self.client
                .delete(self.url(&format!("/users/mood_history/{}/", profile_id)))
                .json(&body),
        )
        .await
    }

    /// GET /users/listening_history/{id}/
    pub async fn get_listening_history(&self, profile_id: &str) -> Response {
        self.send(
            self.client
                .get(self.url(&format!("/users/listening_history/{}/", profile_id))),
        )
        .await
    }

    /// POST /users/listening_history/{id}/
    pub async fn add_track(&self, profile_id: &str, body: Value) -> Response {
        self.send(
            self.client
                .post(self.url(&format!("/users/listening_history/{}/", profile_id)))
                .json(&body),
        )
        .await
    }

    /// DELETE /users/listening_history/{id}/
    pub async fn remove_track(&self, profile_id: &str, body: Value) -> Response {
        self.send(
            self.client
                .delete(self.url(&format!("/users/listening_history/{}/", profile_id)))
                .json(&body),
        )
        .await
    }

    // ========================================================================
    // Emotion API
    // ========================================================================

    /// POST /api/text_emotion/
    pub async fn text_emotion(&self, body: Value) -> Response {
        self.send(self.client.post(self.url("/api/text_emotion/")).json(&body))
            .await
    }

    /// POST /api/speech_emotion/ with `bytes` as the `file` field
    pub async fn speech_emotion(&self, bytes: Vec<u8>, file_name: &str) -> Response {
        self.upload("/api/speech_emotion/", "file", bytes, file_name)
            .await
    }

    /// POST /api/facial_emotion/ with `bytes` as the `file` field
    pub async fn facial_emotion(&self, bytes: Vec<u8>, file_name: &str) -> Response {
        self.upload("/api/facial_emotion/", "file", bytes, file_name)
            .await
    }

    /// POST a multipart body with a single file field
    pub async fn upload(
        &self,
        path: &str,
        field_name: &str,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Response {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part(field_name.to_string(), part);
        self.send(self.client.post(self.url(path)).multipart(form))
            .await
    }

    /// POST /api/music_recommendation/
    pub async fn music_recommendation(&self, body: Value) -> Response {
        self.send(
            self.client
                .post(self.url("/api/music_recommendation/"))
                .json(&body),
        )
        .await
    }
}
