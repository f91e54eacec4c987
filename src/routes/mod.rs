pub mod admin;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod password;
pub mod posts;
pub mod users;

use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Request};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::PaginationConfig;
use crate::db::models::ImageRef;
use crate::error::{AppError, AppResult, FieldError};
use crate::images::{image_extension, MAX_IMAGE_BYTES};
use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(password::router())
        .merge(users::router())
        .merge(categories::router())
        .merge(posts::router())
        .merge(comments::router())
        .merge(admin::router())
}

/// `{status, result}` envelope used by "me" style endpoints.
pub fn success<T: Serialize>(result: T) -> Value {
    json!({ "status": "success", "result": result })
}

pub fn message(text: &str) -> Value {
    json!({ "message": text })
}

/// Common `?page=&limit=&search=` query. Signed so that `page=-1` is
/// clamped rather than rejected.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

impl PageQuery {
    /// `(limit, offset)` with the page size clamped to the configured bounds
    /// and pages below 1 read as the first page.
    pub fn window(&self, config: &PaginationConfig) -> (u32, u32) {
        let max = config.max_limit.max(1);
        let limit = self
            .limit
            .unwrap_or(i64::from(config.default_limit))
            .clamp(1, i64::from(max));
        let page = self.page.unwrap_or(1).max(1);
        let offset = (page - 1).saturating_mul(limit).min(i64::from(u32::MAX));
        // Both values were clamped into u32 range above.
        (limit as u32, offset as u32)
    }
}

/// Trimmed value of a required text field, or a field error when blank.
pub fn required<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(vec![FieldError::new(
            field,
            format!("{field} is required"),
        )]));
    }
    Ok(trimmed)
}

/// An uploaded image pulled out of a multipart form.
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// Text fields and the optional `image` file of a multipart form.
#[derive(Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub image: Option<ImageUpload>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn require_image(&mut self) -> AppResult<ImageUpload> {
        self.image.take().ok_or_else(|| {
            AppError::Validation(vec![FieldError::new("image", "no image provided")])
        })
    }
}

/// Multipart body read into an `UploadForm`. A body that is not multipart
/// is a 400 in the error envelope.
impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        read_form(multipart).await
    }
}

/// Remove an upload that never made it into the store.
pub async fn discard_upload(state: &AppState, image: &ImageRef) {
    if let Some(public_id) = &image.public_id {
        if let Err(e) = state.images.remove(public_id).await {
            tracing::warn!("Failed to remove orphaned image {}: {}", public_id, e);
        }
    }
}

async fn read_form(mut multipart: Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let extension = image_extension(field.file_name(), field.content_type())
                .ok_or_else(|| {
                    AppError::Validation(vec![FieldError::new(
                        "image",
                        "image must be a png, jpeg, gif or webp file",
                    )])
                })?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            if bytes.is_empty() || bytes.len() > MAX_IMAGE_BYTES {
                return Err(AppError::Validation(vec![FieldError::new(
                    "image",
                    "image must be between 1 byte and 5 MB",
                )]));
            }
            form.image = Some(ImageUpload {
                bytes: bytes.to_vec(),
                extension,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            form.fields.insert(name, text);
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pagination() -> PaginationConfig {
        PaginationConfig {
            default_limit: 6,
            max_limit: 50,
        }
    }

    #[test]
    fn window_defaults_to_first_page() {
        assert_eq!(PageQuery::default().window(&pagination()), (6, 0));
    }

    #[test]
    fn window_clamps_limit_and_page() {
        let query = PageQuery {
            page: Some(0),
            limit: Some(500),
            search: None,
        };
        assert_eq!(query.window(&pagination()), (50, 0));

        let query = PageQuery {
            page: Some(3),
            limit: Some(0),
            search: None,
        };
        assert_eq!(query.window(&pagination()), (1, 2));
    }

    #[test]
    fn window_treats_negative_values_as_lower_bounds() {
        let query = PageQuery {
            page: Some(-1),
            limit: Some(-5),
            search: None,
        };
        assert_eq!(query.window(&pagination()), (1, 0));

        let query = PageQuery {
            page: Some(i64::MAX),
            limit: Some(50),
            search: None,
        };
        assert_eq!(query.window(&pagination()), (50, u32::MAX));
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("title", "  Rust ").unwrap(), "Rust");
        assert!(matches!(
            required("title", "   "),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn success_envelope_shape() {
        let value = success(json!({ "id": "u1" }));
        assert_eq!(value["status"], "success");
        assert_eq!(value["result"]["id"], "u1");
    }
}
