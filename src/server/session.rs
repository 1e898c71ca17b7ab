use super::state::ServerState;
use crate::user::{Claims, TokenType, UserAccount};

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{debug, error};

/// An authenticated caller, resolved from an `Authorization: Bearer` access
/// token whose version still matches the account.
#[derive(Debug)]
pub struct Session {
    pub user: UserAccount,
    pub claims: Claims,
}

pub const BEARER_PREFIX: &str = "Bearer ";

pub enum SessionExtractionError {
    Unauthenticated,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Authentication credentials were not provided."})),
            )
                .into_response(),
            SessionExtractionError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_at_checked(BEARER_PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn extract_session_from_request_parts(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Result<Session, SessionExtractionError> {
    let token = extract_bearer_token(parts).ok_or_else(|| {
        debug!("No bearer token in request headers.");
        SessionExtractionError::Unauthenticated
    })?;

    let claims = ctx.jwt.validate(&token, TokenType::Access).map_err(|e| {
        debug!("Rejected access token: {}", e);
        SessionExtractionError::Unauthenticated
    })?;
    let user_id = claims
        .user_id()
        .ok_or(SessionExtractionError::Unauthenticated)?;

    let user = match ctx.user_manager.lock().unwrap().get_user(user_id) {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("Token subject {} does not exist anymore", user_id);
            return Err(SessionExtractionError::Unauthenticated);
        }
        Err(e) => {
            error!("Failed to load user {}: {}", user_id, e);
            return Err(SessionExtractionError::InternalError);
        }
    };

    if user.token_version != claims.ver {
        debug!(
            "Token version {} of user {} is stale (current {})",
            claims.ver, user_id, user.token_version
        );
        return Err(SessionExtractionError::Unauthenticated);
    }

    Ok(Session { user, claims })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/users/validate_token/");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn reads_bearer_tokens() {
        assert_eq!(
            extract_bearer_token(&parts_with_auth(Some("Bearer abc.def"))),
            Some("abc.def".to_string())
        );
        assert_eq!(
            extract_bearer_token(&parts_with_auth(Some("bearer   xyz "))),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn ignores_other_schemes() {
        assert_eq!(extract_bearer_token(&parts_with_auth(None)), None);
        assert_eq!(
            extract_bearer_token(&parts_with_auth(Some("Basic dXNlcjpwdw=="))),
            None
        );
        assert_eq!(extract_bearer_token(&parts_with_auth(Some("Bearer "))), None);
        assert_eq!(extract_bearer_token(&parts_with_auth(Some("Bear"))), None);
    }
}
