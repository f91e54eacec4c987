use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::db::models::Category;
use crate::db::{self, categories};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, AppQuery, ValidJson};
use crate::routes::{required, PageQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1 to 100 characters"))]
    pub title: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
}

/// POST /categories (admin)
///
/// Concurrent requests for the same title race on the store's unique
/// index; the losers get 409.
async fn create_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(req): ValidJson<CategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let title = required("title", &req.title)?;
    let conn = state.db.get()?;
    let category = categories::insert(&conn, &admin.id, title)?;
    tracing::info!(category_id = %category.id, title = %category.title, "Created category");
    Ok((StatusCode::CREATED, Json(category)))
}

/// GET /categories?search=&page=&limit=
async fn list_categories(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> AppResult<Json<Value>> {
    let (limit, offset) = query.window(&state.config.pagination);
    let conn = state.db.get()?;
    let (categories, total) = categories::search(&conn, query.search.as_deref(), limit, offset)?;
    Ok(Json(json!({
        "categories": categories,
        "totalPages": db::total_pages(total, limit),
    })))
}

/// GET /categories/{id}
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Category>> {
    let conn = state.db.get()?;
    let category = categories::find_by_id(&conn, &id)?
        .ok_or_else(|| AppError::not_found("category"))?;
    Ok(Json(category))
}

/// PUT /categories/{id} (admin)
async fn update_category(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<CategoryRequest>,
) -> AppResult<Json<Category>> {
    let title = required("title", &req.title)?;
    let conn = state.db.get()?;
    Ok(Json(categories::rename(&conn, &id, title)?))
}

/// DELETE /categories/{id} (admin)
async fn delete_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    if !categories::delete(&conn, &id)? {
        return Err(AppError::not_found("category"));
    }
    tracing::info!(category_id = %id, by = %admin.id, "Deleted category");
    Ok(Json(json!({
        "message": "category has been deleted successfully",
        "categoryId": id,
    })))
}
