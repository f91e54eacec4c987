use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::policy;
use crate::db::models::Comment;
use crate::db::{self, comments};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, AppQuery, CurrentUser, ValidJson};
use crate::routes::{required, PageQuery};
use crate::sanitize;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCommentRequest {
    #[validate(length(min = 1, message = "postId is required"))]
    pub post_id: String,
    #[validate(length(min = 1, max = 2000, message = "text must be 1 to 2000 characters"))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 2000, message = "text must be 1 to 2000 characters"))]
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", get(list_comments).post(create_comment))
        .route("/comments/{id}", put(update_comment).delete(delete_comment))
}

/// POST /comments
async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidJson(req): ValidJson<NewCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let text = sanitize::plain_text(&req.text);
    let text = required("text", &text)?;

    let conn = state.db.get()?;
    let comment = comments::insert(&conn, req.post_id.trim(), &user.id, text)?;
    tracing::info!(comment_id = %comment.id, post_id = %comment.post_id, "Created comment");

    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /comments?page=&limit= (admin)
async fn list_comments(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> AppResult<Json<Value>> {
    let (limit, offset) = query.window(&state.config.pagination);
    let conn = state.db.get()?;
    let (comments, total) = comments::list(&conn, limit, offset)?;
    Ok(Json(json!({
        "comments": comments,
        "totalPages": db::total_pages(total, limit),
    })))
}

/// PUT /comments/{id} (owner)
async fn update_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    let conn = state.db.get()?;
    let owner_id = comments::owner_of(&conn, &id)?.ok_or_else(|| AppError::not_found("comment"))?;
    policy::require_owner(&user, &owner_id)?;

    let text = sanitize::plain_text(&req.text);
    let text = required("text", &text)?;
    Ok(Json(comments::update_text(&conn, &id, text)?))
}

/// DELETE /comments/{id} (owner or admin)
async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let owner_id = comments::owner_of(&conn, &id)?.ok_or_else(|| AppError::not_found("comment"))?;
    policy::require_owner_or_admin(&user, &owner_id)?;

    if !comments::delete(&conn, &id)? {
        return Err(AppError::not_found("comment"));
    }
    tracing::info!(comment_id = %id, by = %user.id, "Deleted comment");

    Ok(Json(json!({
        "message": "comment has been deleted",
        "commentId": id,
    })))
}
