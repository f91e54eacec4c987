use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::auth::policy;
use crate::db::users;
use crate::error::{AppError, FieldError};
use crate::state::AppState;

/// Name of the cookie carrying the access token.
pub const AUTH_COOKIE: &str = "authToken";
/// Name of the cookie the client keeps its cached profile in.
pub const USER_INFO_COOKIE: &str = "userInfo";

/// The authenticated principal, loaded from the store for every request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub is_admin: bool,
}

/// Extractor that requires authentication.
/// Rejects with 401 when the credential is missing or invalid and with 404
/// when it names a user that no longer exists.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(parts)
            .or_else(|| cookie_value(parts, AUTH_COOKIE))
            .ok_or(AppError::Unauthorized)?;

        let claims = state.jwt.verify(token).map_err(|e| {
            tracing::debug!("Rejected access token: {}", e);
            AppError::Unauthorized
        })?;

        let conn = state.db.get()?;
        let user = users::find_by_id(&conn, &claims.sub)?
            .ok_or_else(|| AppError::not_found("user"))?;

        Ok(CurrentUser {
            id: user.id,
            is_admin: user.is_admin,
        })
    }
}

/// Extractor that requires an authenticated admin (403 otherwise).
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        policy::require_admin(&user)?;
        Ok(AdminUser(user))
    }
}

fn extract_bearer(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

/// JSON body that must pass its `Validate` rules. Malformed JSON is a 400
/// with the parser's message; rule failures are a 400 listing each field.
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        value.validate().map_err(validation_error)?;
        Ok(ValidJson(value))
    }
}

/// Query string whose parse failures become a 400 in the error envelope
/// instead of the framework's plain-text rejection.
pub struct AppQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(AppQuery(value))
    }
}

pub fn validation_error(errors: ValidationErrors) -> AppError {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, failures)| {
            failures.iter().map(move |failure| {
                let message = failure
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"));
                FieldError::new(field.to_string(), message)
            })
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    AppError::Validation(fields)
}
