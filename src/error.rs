use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::jwt::JwtError;
use crate::images::ImageError;
use crate::mail::MailError;
use crate::state::AppState;

/// One failed field in a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Mail(_)
            | AppError::Image(_)
            | AppError::Token(_)
            | AppError::Hash(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

/// Debug rendering of the error that produced a response. Attached as
/// `stack` by [`error_envelope`] outside production.
#[derive(Clone, Debug)]
pub struct ErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = ErrorDetail(format!("{self:?}"));

        let (message, errors) = match self {
            AppError::Validation(errors) => ("Validation failed".to_string(), Some(errors)),
            AppError::Unauthorized => ("not authorized, token missing or invalid".to_string(), None),
            AppError::BadRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => (msg, None),
            other => {
                tracing::error!("{}", other);
                ("Internal server error".to_string(), None)
            }
        };

        let mut response = (status, Json(ErrorBody { message, errors })).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;

const MAX_ERROR_BODY: usize = 64 * 1024;

/// Terminal error handler: adds `stack` to error envelopes unless running in
/// production.
pub async fn error_envelope(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    if state.config.server.environment.is_production() {
        return response;
    }

    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_ERROR_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to buffer error body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => return Response::from_parts(parts, axum::body::Body::from(bytes)),
    };
    if let Some(object) = value.as_object_mut() {
        object.insert("stack".to_string(), serde_json::Value::String(detail));
    }

    let body = serde_json::to_vec(&value).unwrap_or_else(|_| bytes.to_vec());
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, axum::body::Body::from(body))
}

/// Fallback for unknown routes.
pub async fn route_not_found(uri: axum::http::Uri) -> AppError {
    AppError::NotFound(format!("Not Found - {uri}"))
}
