//! Account, authentication and profile endpoints mounted under `/users`.

use super::metrics::{record_error, record_login_attempt};
use super::responses::{error_response, message_response};
use super::session::Session;
use super::state::{GuardedJwtIssuer, GuardedUserManager, ServerState};
use crate::recommendation::Recommendation;
use crate::user::{HistoryKind, ProfileUpdate, RegistrationError, TokenType, UserProfile};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Deserialize, Debug)]
struct RegisterBody {
    username: Option<String>,
    password: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LoginBody {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RefreshBody {
    refresh: Option<String>,
}

#[derive(Serialize)]
struct AccessTokenResponse {
    access: String,
}

#[derive(Deserialize, Debug)]
struct VerifyUsernameEmailBody {
    username: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResetPasswordBody {
    username: Option<String>,
    new_password: Option<String>,
    email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub mood_history: Vec<String>,
    pub listening_history: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Serialize, Deserialize, Debug)]
struct RecommendationsBody {
    #[serde(default)]
    recommendations: Option<Vec<Recommendation>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MoodHistoryResponse {
    pub mood_history: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListeningHistoryResponse {
    pub listening_history: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
struct HistoryEntryBody {
    mood: Option<String>,
    track: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn internal_error(context: &str, err: anyhow::Error) -> Response {
    error!("{}: {}", context, err);
    record_error("internal", context);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

//
// Authentication
//

async fn register(
    State(user_manager): State<GuardedUserManager>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return error_response(
            StatusCode::BAD_REQUEST,
            RegistrationError::MissingFields.to_string(),
        );
    };
    let username = body.username.unwrap_or_default();
    let password = body.password.unwrap_or_default();
    let email = body.email.unwrap_or_default();

    let result = user_manager
        .lock()
        .unwrap()
        .register(&username, &password, &email);
    match result {
        Ok(_) => message_response(StatusCode::CREATED, "User created successfully."),
        Err(RegistrationError::Internal(err)) => internal_error("register", err),
        Err(err) => {
            debug!("Registration of {:?} refused: {}", username, err);
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    State(jwt): State<GuardedJwtIssuer>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let invalid = || error_response(StatusCode::UNAUTHORIZED, "Invalid credentials");

    let (username, password) = match body {
        Ok(Json(LoginBody {
            username: Some(username),
            password: Some(password),
        })) => (username, password),
        _ => {
            record_login_attempt("failure", start.elapsed());
            return invalid();
        }
    };

    let authenticated = user_manager
        .lock()
        .unwrap()
        .authenticate(username.trim(), &password);
    let user = match authenticated {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!("Failed login attempt for {}", username);
            record_login_attempt("failure", start.elapsed());
            return invalid();
        }
        Err(err) => {
            record_login_attempt("error", start.elapsed());
            return internal_error("login", err);
        }
    };

    match jwt.issue_pair(&user) {
        Ok(pair) => {
            record_login_attempt("success", start.elapsed());
            Json(pair).into_response()
        }
        Err(err) => {
            error!("Failed to issue tokens for {}: {}", user.username, err);
            record_login_attempt("error", start.elapsed());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn refresh_token(
    State(user_manager): State<GuardedUserManager>,
    State(jwt): State<GuardedJwtIssuer>,
    body: Result<Json<RefreshBody>, JsonRejection>,
) -> Response {
    let invalid = || error_response(StatusCode::UNAUTHORIZED, "Token is invalid or expired");

    let Some(token) = body.ok().and_then(|Json(b)| non_empty(b.refresh)) else {
        return invalid();
    };
    let claims = match jwt.validate(&token, TokenType::Refresh) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Rejected refresh token: {}", err);
            return invalid();
        }
    };
    let Some(user_id) = claims.user_id() else {
        return invalid();
    };

    let user = match user_manager.lock().unwrap().get_user(user_id) {
        Ok(Some(user)) if user.token_version == claims.ver => user,
        Ok(_) => return invalid(),
        Err(err) => return internal_error("refresh_token", err),
    };

    match jwt.issue_access(&user) {
        Ok(access) => Json(AccessTokenResponse { access }).into_response(),
        Err(err) => {
            error!("Failed to issue access token: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn validate_token(session: Session) -> Response {
    debug!("Token of {} is valid", session.user.username);
    message_response(StatusCode::OK, "Token is valid.")
}

async fn verify_username_email(
    State(user_manager): State<GuardedUserManager>,
    body: Result<Json<VerifyUsernameEmailBody>, JsonRejection>,
) -> Response {
    let fields = body
        .ok()
        .and_then(|Json(b)| Some((non_empty(b.username)?, non_empty(b.email)?)));
    let Some((username, email)) = fields else {
        return error_response(StatusCode::BAD_REQUEST, "Username and email are required.");
    };

    let verified = user_manager
        .lock()
        .unwrap()
        .verify_username_email(&username, &email);
    match verified {
        Ok(true) => message_response(StatusCode::OK, "Username and email combination verified."),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "User not found."),
        Err(err) => internal_error("verify_username_email", err),
    }
}

async fn reset_password(
    State(user_manager): State<GuardedUserManager>,
    body: Result<Json<ResetPasswordBody>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Username and new password are required.",
        );
    };
    let (Some(username), Some(new_password)) = (non_empty(body.username), body.new_password)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Username and new password are required.",
        );
    };
    if new_password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Username and new password are required.",
        );
    }
    let email = non_empty(body.email);

    let reset = user_manager
        .lock()
        .unwrap()
        .reset_password(&username, &new_password, email.as_deref());
    match reset {
        Ok(true) => message_response(StatusCode::OK, "Password reset successfully."),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "User not found."),
        Err(err) => internal_error("reset_password", err),
    }
}

//
// Own profile
//

async fn get_own_profile(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> Response {
    let profile = user_manager
        .lock()
        .unwrap()
        .get_profile_by_username(&session.user.username);
    match profile {
        Ok(Some(profile)) => Json(ProfileResponse {
            id: profile.id,
            username: profile.username,
            email: session.user.email,
            mood_history: profile.mood_history,
            listening_history: profile.listening_history,
            recommendations: profile.recommendations,
        })
        .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "User profile not found."),
        Err(err) => internal_error("get_own_profile", err),
    }
}

async fn update_own_profile(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Response {
    let update = match body {
        Ok(Json(update)) => update,
        Err(rejection) => {
            debug!("Bad profile update body: {}", rejection);
            return error_response(StatusCode::BAD_REQUEST, "Invalid profile data.");
        }
    };
    if update.is_empty() {
        debug!("Empty profile update from {}", session.user.username);
    }

    let updated = user_manager
        .lock()
        .unwrap()
        .update_profile(&session.user, update);
    match updated {
        Ok(true) => message_response(StatusCode::OK, "Profile updated successfully."),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "User profile not found."),
        Err(err) => internal_error("update_own_profile", err),
    }
}

async fn delete_own_profile(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
) -> Response {
    let deleted = user_manager
        .lock()
        .unwrap()
        .delete_profile(&session.user.username);
    match deleted {
        Ok(true) => {
            info!("Deleted profile of {}", session.user.username);
            message_response(StatusCode::OK, "Profile deleted successfully.")
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "User profile not found."),
        Err(err) => internal_error("delete_own_profile", err),
    }
}

//
// Profile addressed by id
//

/// Loads the profile and checks that it belongs to the caller.
fn owned_profile(
    user_manager: &GuardedUserManager,
    session: &Session,
    profile_id: &str,
    not_found_message: &str,
) -> Result<UserProfile, Response> {
    let profile = user_manager.lock().unwrap().get_profile(profile_id);
    match profile {
        Ok(Some(profile)) if profile.username == session.user.username => Ok(profile),
        Ok(Some(_)) => {
            warn!(
                "{} tried to access profile {} of another user",
                session.user.username, profile_id
            );
            Err(error_response(
                StatusCode::FORBIDDEN,
                "You do not have permission to access this profile.",
            ))
        }
        Ok(None) => Err(error_response(StatusCode::NOT_FOUND, not_found_message)),
        Err(err) => Err(internal_error("owned_profile", err)),
    }
}

fn recommendations_response(profile: UserProfile) -> Response {
    Json(RecommendationsBody {
        recommendations: Some(profile.recommendations),
    })
    .into_response()
}

fn store_recommendations(
    user_manager: &GuardedUserManager,
    profile: &UserProfile,
    recommendations: &[Recommendation],
    success_message: &str,
) -> Response {
    if !recommendations.is_empty() {
        let saved = user_manager
            .lock()
            .unwrap()
            .save_recommendations(&profile.id, recommendations);
        if let Err(err) = saved {
            return internal_error("save_recommendations", err);
        }
    }
    message_response(StatusCode::CREATED, success_message)
}

async fn list_recommendations(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
) -> Response {
    match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => recommendations_response(profile),
        Err(response) => response,
    }
}

async fn append_recommendations(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
    body: Result<Json<RecommendationsBody>, JsonRejection>,
) -> Response {
    let profile = match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => profile,
        Err(response) => return response,
    };
    // A missing list appends nothing
    let recommendations = match body {
        Ok(Json(body)) => body.recommendations.unwrap_or_default(),
        Err(rejection) => {
            debug!("Bad recommendations body: {}", rejection);
            return error_response(StatusCode::BAD_REQUEST, "Invalid recommendations data.");
        }
    };
    store_recommendations(
        &user_manager,
        &profile,
        &recommendations,
        "Recommendations saved successfully.",
    )
}

async fn clear_recommendations(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
) -> Response {
    let profile = match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => profile,
        Err(response) => return response,
    };
    let cleared = user_manager.lock().unwrap().clear_recommendations(&profile.id);
    match cleared {
        Ok(count) => {
            debug!("Cleared {} recommendations of {}", count, profile.id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => internal_error("clear_recommendations", err),
    }
}

async fn save_recommendations(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
    body: Result<Json<RecommendationsBody>, JsonRejection>,
) -> Response {
    let profile = match owned_profile(&user_manager, &session, &user_id, "User not found") {
        Ok(profile) => profile,
        Err(response) => return response,
    };
    let recommendations = match body {
        Ok(Json(RecommendationsBody {
            recommendations: Some(recommendations),
        })) if !recommendations.is_empty() => recommendations,
        _ => return error_response(StatusCode::BAD_REQUEST, "Recommendations are required"),
    };
    store_recommendations(
        &user_manager,
        &profile,
        &recommendations,
        "Recommendations saved successfully",
    )
}

async fn delete_all_recommendations(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
) -> Response {
    let profile = match owned_profile(&user_manager, &session, &user_id, "User not found") {
        Ok(profile) => profile,
        Err(response) => return response,
    };
    let cleared = user_manager.lock().unwrap().clear_recommendations(&profile.id);
    match cleared {
        Ok(_) => message_response(StatusCode::OK, "All recommendations deleted"),
        Err(err) => internal_error("delete_all_recommendations", err),
    }
}

struct HistoryMessages {
    required: &'static str,
    updated: &'static str,
    not_found: &'static str,
}

fn history_messages(kind: HistoryKind) -> HistoryMessages {
    match kind {
        HistoryKind::Mood => HistoryMessages {
            required: "Mood is required.",
            updated: "Mood history updated.",
            not_found: "Mood not found in history.",
        },
        HistoryKind::Listening => HistoryMessages {
            required: "Track is required.",
            updated: "Listening history updated.",
            not_found: "Track not found in history.",
        },
    }
}

fn history_entry(kind: HistoryKind, body: Result<Json<HistoryEntryBody>, JsonRejection>) -> Option<String> {
    let Json(body) = body.ok()?;
    match kind {
        HistoryKind::Mood => non_empty(body.mood),
        HistoryKind::Listening => non_empty(body.track),
    }
}

fn list_history(kind: HistoryKind, profile: UserProfile) -> Response {
    match kind {
        HistoryKind::Mood => Json(MoodHistoryResponse {
            mood_history: profile.mood_history,
        })
        .into_response(),
        HistoryKind::Listening => Json(ListeningHistoryResponse {
            listening_history: profile.listening_history,
        })
        .into_response(),
    }
}

fn append_history_entry(
    user_manager: &GuardedUserManager,
    kind: HistoryKind,
    profile: &UserProfile,
    body: Result<Json<HistoryEntryBody>, JsonRejection>,
) -> Response {
    let messages = history_messages(kind);
    let Some(entry) = history_entry(kind, body) else {
        return error_response(StatusCode::BAD_REQUEST, messages.required);
    };
    let appended = user_manager
        .lock()
        .unwrap()
        .append_history(&profile.id, kind, &entry);
    match appended {
        Ok(()) => message_response(StatusCode::CREATED, messages.updated),
        Err(err) => internal_error("append_history", err),
    }
}

fn remove_history_entry(
    user_manager: &GuardedUserManager,
    kind: HistoryKind,
    profile: &UserProfile,
    body: Result<Json<HistoryEntryBody>, JsonRejection>,
) -> Response {
    let messages = history_messages(kind);
    let Some(entry) = history_entry(kind, body) else {
        return error_response(StatusCode::BAD_REQUEST, messages.required);
    };
    let removed = user_manager
        .lock()
        .unwrap()
        .remove_history_entry(&profile.id, kind, &entry);
    match removed {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, messages.not_found),
        Err(err) => internal_error("remove_history_entry", err),
    }
}

async fn get_mood_history(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
) -> Response {
    match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => list_history(HistoryKind::Mood, profile),
        Err(response) => response,
    }
}

async fn post_mood_history(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
    body: Result<Json<HistoryEntryBody>, JsonRejection>,
) -> Response {
    match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => append_history_entry(&user_manager, HistoryKind::Mood, &profile, body),
        Err(response) => response,
    }
}

async fn delete_mood_history(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
    body: Result<Json<HistoryEntryBody>, JsonRejection>,
) -> Response {
    match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => remove_history_entry(&user_manager, HistoryKind::Mood, &profile, body),
        Err(response) => response,
    }
}

async fn get_listening_history(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
) -> Response {
    match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => list_history(HistoryKind::Listening, profile),
        Err(response) => response,
    }
}

async fn post_listening_history(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
    body: Result<Json<HistoryEntryBody>, JsonRejection>,
) -> Response {
    match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => {
            append_history_entry(&user_manager, HistoryKind::Listening, &profile, body)
        }
        Err(response) => response,
    }
}

async fn delete_listening_history(
    session: Session,
    State(user_manager): State<GuardedUserManager>,
    Path(user_id): Path<String>,
    body: Result<Json<HistoryEntryBody>, JsonRejection>,
) -> Response {
    match owned_profile(&user_manager, &session, &user_id, "User not found.") {
        Ok(profile) => {
            remove_history_entry(&user_manager, HistoryKind::Listening, &profile, body)
        }
        Err(response) => response,
    }
}

pub fn make_user_routes(state: ServerState) -> Router {
    Router::new()
        .route("/register/", post(register))
        .route("/login/", post(login))
        .route("/token/refresh/", post(refresh_token))
        .route("/validate_token/", get(validate_token))
        .route("/verify-username-email/", post(verify_username_email))
        .route("/reset-password/", post(reset_password))
        .route("/user/profile/", get(get_own_profile))
        .route("/user/profile/update/", put(update_own_profile))
        .route("/user/profile/delete/", delete(delete_own_profile))
        .route(
            "/recommendations/{user_id}/",
            get(list_recommendations)
                .post(append_recommendations)
                .delete(clear_recommendations),
        )
        .route(
            "/recommendations/save/{user_id}/",
            post(save_recommendations),
        )
        .route("/recommendations/get/{user_id}/", get(list_recommendations))
        .route(
            "/recommendations/delete/{user_id}/",
            delete(delete_all_recommendations),
        )
        .route(
            "/mood_history/{user_id}/",
            get(get_mood_history)
                .post(post_mood_history)
                .delete(delete_mood_history),
        )
        .route(
            "/listening_history/{user_id}/",
            get(get_listening_history)
                .post(post_listening_history)
                .delete(delete_listening_history),
        )
        .with_state(state)
}
