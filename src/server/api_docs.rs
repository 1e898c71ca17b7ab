//! OpenAPI 3 description of the public routes, served at `/api/openapi.json`.

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};

struct ApiOperation {
    method: &'static str,
    path: &'static str,
    tag: &'static str,
    summary: &'static str,
    authenticated: bool,
    /// Required JSON body fields, all strings unless listed in `ARRAY_FIELDS`.
    json_fields: &'static [&'static str],
    /// Multipart file field.
    upload_field: Option<&'static str>,
    responses: &'static [(u16, &'static str)],
}

const ARRAY_FIELDS: &[&str] = &["recommendations"];

const EMOTION_RESPONSES: &[(u16, &str)] = &[
    (200, "Detected emotion with recommended tracks"),
    (400, "Missing or invalid input"),
];

const OWNED_PROFILE_RESPONSES: &[(u16, &str)] = &[
    (200, "OK"),
    (401, "Authentication credentials were not provided."),
    (403, "Profile belongs to another user"),
    (404, "User not found"),
];

const OPERATIONS: &[ApiOperation] = &[
    ApiOperation {
        method: "post",
        path: "/api/text_emotion/",
        tag: "emotion",
        summary: "Detect emotion from text",
        authenticated: false,
        json_fields: &["text"],
        upload_field: None,
        responses: &[
            (200, "Detected emotion with recommended tracks"),
            (400, "No text provided"),
            (503, "Text model unavailable"),
        ],
    },
    ApiOperation {
        method: "post",
        path: "/api/speech_emotion/",
        tag: "emotion",
        summary: "Detect emotion from a speech recording",
        authenticated: false,
        json_fields: &[],
        upload_field: Some("file"),
        responses: EMOTION_RESPONSES,
    },
    ApiOperation {
        method: "post",
        path: "/api/facial_emotion/",
        tag: "emotion",
        summary: "Detect emotion from a face image",
        authenticated: false,
        json_fields: &[],
        upload_field: Some("file"),
        responses: EMOTION_RESPONSES,
    },
    ApiOperation {
        method: "post",
        path: "/api/music_recommendation/",
        tag: "emotion",
        summary: "Recommend tracks for an emotion",
        authenticated: false,
        json_fields: &["emotion"],
        upload_field: None,
        responses: &[(200, "Recommended tracks"), (400, "No emotion provided")],
    },
    ApiOperation {
        method: "post",
        path: "/users/register/",
        tag: "auth",
        summary: "Create an account with an empty profile",
        authenticated: false,
        json_fields: &["username", "password", "email"],
        upload_field: None,
        responses: &[
            (201, "User created successfully."),
            (400, "Missing fields or username taken"),
        ],
    },
    ApiOperation {
        method: "post",
        path: "/users/login/",
        tag: "auth",
        summary: "Obtain an access and refresh token pair",
        authenticated: false,
        json_fields: &["username", "password"],
        upload_field: None,
        responses: &[(200, "Token pair"), (401, "Invalid credentials")],
    },
    ApiOperation {
        method: "post",
        path: "/users/token/refresh/",
        tag: "auth",
        summary: "Exchange a refresh token for a new access token",
        authenticated: false,
        json_fields: &["refresh"],
        upload_field: None,
        responses: &[(200, "New access token"), (401, "Invalid refresh token")],
    },
    ApiOperation {
        method: "get",
        path: "/users/validate_token/",
        tag: "auth",
        summary: "Check an access token",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: &[
            (200, "Token is valid."),
            (401, "Unauthorized. Token is invalid or expired."),
        ],
    },
    ApiOperation {
        method: "post",
        path: "/users/verify-username-email/",
        tag: "auth",
        summary: "Check that a username and email belong together",
        authenticated: false,
        json_fields: &["username", "email"],
        upload_field: None,
        responses: &[
            (200, "Username and email combination verified."),
            (400, "Username and email are required."),
            (404, "User not found."),
        ],
    },
    ApiOperation {
        method: "post",
        path: "/users/reset-password/",
        tag: "auth",
        summary: "Set a new password and revoke issued tokens",
        authenticated: false,
        json_fields: &["username", "new_password"],
        upload_field: None,
        responses: &[
            (200, "Password reset successfully."),
            (400, "Username and new password are required."),
            (404, "User not found."),
        ],
    },
    ApiOperation {
        method: "get",
        path: "/users/user/profile/",
        tag: "profile",
        summary: "Get the caller's profile",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: &[(200, "Profile"), (401, "Not authenticated")],
    },
    ApiOperation {
        method: "put",
        path: "/users/user/profile/update/",
        tag: "profile",
        summary: "Update the caller's profile",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: &[(200, "Updated profile"), (400, "Invalid profile data")],
    },
    ApiOperation {
        method: "delete",
        path: "/users/user/profile/delete/",
        tag: "profile",
        summary: "Delete the caller's account",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: &[
            (200, "Profile deleted successfully."),
            (404, "User profile not found."),
        ],
    },
    ApiOperation {
        method: "get",
        path: "/users/recommendations/{user_id}/",
        tag: "recommendations",
        summary: "List saved recommendations",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: OWNED_PROFILE_RESPONSES,
    },
    ApiOperation {
        method: "post",
        path: "/users/recommendations/{user_id}/",
        tag: "recommendations",
        summary: "Append recommendations, a missing list appends nothing",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: &[
            (201, "Recommendations saved successfully."),
            (400, "Invalid recommendations data."),
            (404, "User not found."),
        ],
    },
    ApiOperation {
        method: "delete",
        path: "/users/recommendations/{user_id}/",
        tag: "recommendations",
        summary: "Clear saved recommendations",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: &[(204, "Cleared"), (404, "User not found.")],
    },
    ApiOperation {
        method: "post",
        path: "/users/recommendations/save/{user_id}/",
        tag: "recommendations",
        summary: "Save a non-empty list of recommendations",
        authenticated: true,
        json_fields: &["recommendations"],
        upload_field: None,
        responses: &[
            (201, "Recommendations saved successfully"),
            (400, "Recommendations are required"),
            (404, "User not found"),
        ],
    },
    ApiOperation {
        method: "get",
        path: "/users/recommendations/get/{user_id}/",
        tag: "recommendations",
        summary: "List saved recommendations",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: OWNED_PROFILE_RESPONSES,
    },
    ApiOperation {
        method: "delete",
        path: "/users/recommendations/delete/{user_id}/",
        tag: "recommendations",
        summary: "Delete all saved recommendations",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: OWNED_PROFILE_RESPONSES,
    },
    ApiOperation {
        method: "get",
        path: "/users/mood_history/{user_id}/",
        tag: "history",
        summary: "Get the mood history",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: OWNED_PROFILE_RESPONSES,
    },
    ApiOperation {
        method: "post",
        path: "/users/mood_history/{user_id}/",
        tag: "history",
        summary: "Append an entry to the mood history",
        authenticated: true,
        json_fields: &["mood"],
        upload_field: None,
        responses: &[(201, "History updated"), (400, "Mood is required.")],
    },
    ApiOperation {
        method: "delete",
        path: "/users/mood_history/{user_id}/",
        tag: "history",
        summary: "Remove an entry from the mood history",
        authenticated: true,
        json_fields: &["mood"],
        upload_field: None,
        responses: &[(204, "Removed"), (404, "Mood not found in history.")],
    },
    ApiOperation {
        method: "get",
        path: "/users/listening_history/{user_id}/",
        tag: "history",
        summary: "Get the listening history",
        authenticated: true,
        json_fields: &[],
        upload_field: None,
        responses: OWNED_PROFILE_RESPONSES,
    },
    ApiOperation {
        method: "post",
        path: "/users/listening_history/{user_id}/",
        tag: "history",
        summary: "Append an entry to the listening history",
        authenticated: true,
        json_fields: &["track"],
        upload_field: None,
        responses: &[(201, "History updated"), (400, "Track is required.")],
    },
    ApiOperation {
        method: "delete",
        path: "/users/listening_history/{user_id}/",
        tag: "history",
        summary: "Remove an entry from the listening history",
        authenticated: true,
        json_fields: &["track"],
        upload_field: None,
        responses: &[(204, "Removed"), (404, "Track not found in history.")],
    },
];

fn field_schema(name: &str) -> Value {
    if ARRAY_FIELDS.contains(&name) {
        json!({"type": "array", "items": {}})
    } else {
        json!({"type": "string"})
    }
}

fn request_body(operation: &ApiOperation) -> Option<Value> {
    if let Some(field) = operation.upload_field {
        return Some(json!({
            "required": true,
            "content": {"multipart/form-data": {"schema": {
                "type": "object",
                "required": [field],
                "properties": {field: {"type": "string", "format": "binary"}},
            }}},
        }));
    }
    if operation.json_fields.is_empty() {
        return None;
    }
    let properties: Map<String, Value> = operation
        .json_fields
        .iter()
        .map(|name| (name.to_string(), field_schema(name)))
        .collect();
    Some(json!({
        "required": true,
        "content": {"application/json": {"schema": {
            "type": "object",
            "required": operation.json_fields,
            "properties": properties,
        }}},
    }))
}

fn operation_object(operation: &ApiOperation) -> Value {
    let responses: Map<String, Value> = operation
        .responses
        .iter()
        .map(|(status, description)| (status.to_string(), json!({"description": description})))
        .collect();
    let mut object = json!({
        "tags": [operation.tag],
        "summary": operation.summary,
        "responses": responses,
    });
    if operation.path.contains("{user_id}") {
        object["parameters"] = json!([{
            "name": "user_id",
            "in": "path",
            "required": true,
            "schema": {"type": "integer"},
        }]);
    }
    if operation.authenticated {
        object["security"] = json!([{"bearerAuth": []}]);
    }
    if let Some(body) = request_body(operation) {
        object["requestBody"] = body;
    }
    object
}

pub fn openapi_document() -> Value {
    let mut paths = Map::new();
    for operation in OPERATIONS {
        let path_item = paths
            .entry(operation.path)
            .or_insert_with(|| Value::Object(Map::new()));
        path_item[operation.method] = operation_object(operation);
    }
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Moodify API",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
        "components": {"securitySchemes": {"bearerAuth": {
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT",
        }}},
    })
}

async fn openapi_json() -> Json<Value> {
    Json(openapi_document())
}

pub fn make_api_docs_routes() -> Router {
    Router::new().route("/openapi.json", get(openapi_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route_once() {
        let document = openapi_document();
        let paths = document["paths"].as_object().unwrap();

        let operations: usize = paths.values().map(|item| item.as_object().unwrap().len()).sum();
        assert_eq!(operations, OPERATIONS.len());
        assert_eq!(paths["/users/mood_history/{user_id}/"].as_object().unwrap().len(), 3);
        assert!(paths.contains_key("/api/speech_emotion/"));
    }

    #[test]
    fn describes_bodies_and_auth() {
        let document = openapi_document();
        let register = &document["paths"]["/users/register/"]["post"];
        assert_eq!(
            register["requestBody"]["content"]["application/json"]["schema"]["required"],
            json!(["username", "password", "email"])
        );
        assert!(register.get("security").is_none());

        let history = &document["paths"]["/users/listening_history/{user_id}/"]["post"];
        assert_eq!(history["security"], json!([{"bearerAuth": []}]));
        assert_eq!(history["parameters"][0]["name"], "user_id");
        let recommendations = &document["paths"]["/users/recommendations/save/{user_id}/"]["post"];
        assert_eq!(
            recommendations["requestBody"]["content"]["application/json"]["schema"]["properties"]
                ["recommendations"]["type"],
            "array"
        );
        assert_eq!(
            history["requestBody"]["content"]["application/json"]["schema"]["properties"]
                ["track"]["type"],
            "string"
        );

        let upload = &document["paths"]["/api/facial_emotion/"]["post"];
        assert!(upload["requestBody"]["content"]["multipart/form-data"].is_object());
    }
}
