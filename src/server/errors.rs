use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use super::metrics::record_error;
use crate::user::{DuplicateEntry, LimitError, RegistrationError};

/// An error answered to the client as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
    #[error("{error}")]
    LimitReached {
        error: &'static str,
        message: String,
        code: &'static str,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> ApiError {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> ApiError {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> ApiError {
        ApiError::NotFound(message.into())
    }

    /// Logs an unexpected failure and hides it behind `message`.
    pub fn internal(endpoint: &str, message: &str, err: impl std::fmt::Display) -> ApiError {
        error!("{} {}: {}", endpoint, message, err);
        record_error("internal", endpoint);
        ApiError::Internal(message.to_string())
    }

    /// Maps a failure coming out of the user manager or store, keeping known domain errors.
    pub fn from_store(endpoint: &str, message: &str, err: anyhow::Error) -> ApiError {
        if let Some(registration) = err.downcast_ref::<RegistrationError>() {
            return ApiError::BadRequest(registration.to_string());
        }
        if let Some(limit) = err.downcast_ref::<LimitError>() {
            return limit.clone().into();
        }
        if let Some(duplicate) = err.downcast_ref::<DuplicateEntry>() {
            return ApiError::Conflict(capitalize(&duplicate.to_string()));
        }
        ApiError::internal(endpoint, message, err)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::LimitReached { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Treats missing, blank and whitespace-only values alike.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<LimitError> for ApiError {
    fn from(err: LimitError) -> Self {
        let (error, code) = match err {
            LimitError::PlaylistLimitReached(_) => {
                ("Playlist limit reached", "PLAYLIST_LIMIT_REACHED")
            }
            LimitError::UploadLimitReached(_) => ("Upload limit reached", "UPLOAD_LIMIT_REACHED"),
        };
        ApiError::LimitReached {
            error,
            message: err.to_string(),
            code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::LimitReached {
                error,
                message,
                code,
            } => json!({ "error": error, "message": message, "code": code }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// A JSON request body whose rejections are answered as [`ApiError::BadRequest`].
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        ApiError::BadRequest("Invalid request body".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn renders_uniform_error_body() {
        let (status, body) = body_json(ApiError::not_found("Playlist not found")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Playlist not found"}));
    }

    #[tokio::test]
    async fn renders_limit_errors_with_code() {
        let (status, body) = body_json(LimitError::PlaylistLimitReached(3).into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Playlist limit reached");
        assert_eq!(body["code"], "PLAYLIST_LIMIT_REACHED");
        assert_eq!(
            body["message"],
            "Free users can only create up to 3 playlists. Upgrade to Premium for unlimited playlists!"
        );
    }

    #[tokio::test]
    async fn rejects_malformed_json_bodies_uniformly() {
        #[derive(serde::Deserialize, Debug)]
        struct Body {
            #[allow(dead_code)]
            name: Option<String>,
        }

        let request = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let err = ApiJson::<Body>::from_request(request, &()).await.err().unwrap();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Invalid request body"}));

        let request = Request::builder()
            .method("POST")
            .body(axum::body::Body::from("{}"))
            .unwrap();
        let err = ApiJson::<Body>::from_request(request, &()).await.err().unwrap();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn maps_domain_errors_from_anyhow() {
        let err = ApiError::from_store("test", "Failed", RegistrationError::EmailTaken.into());
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "Email already registered"));

        let err = ApiError::from_store("test", "Failed", DuplicateEntry("song").into());
        assert!(matches!(err, ApiError::Conflict(ref m) if m == "Song already exists"));

        let err = ApiError::from_store("test", "Failed to fetch", anyhow::anyhow!("disk on fire"));
        assert!(matches!(err, ApiError::Internal(ref m) if m == "Failed to fetch"));
    }
}
