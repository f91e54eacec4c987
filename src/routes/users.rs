use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::{password, policy};
use crate::db::models::{ImageRef, Post};
use crate::db::{self, posts, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, AppQuery, CurrentUser, ValidJson};
use crate::routes::{discard_upload, required, success, PageQuery, UploadForm};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 2, max = 100, message = "username must be 2 to 100 characters"))]
    pub username: Option<String>,
    #[validate(length(min = 8, max = 128, message = "password must be 8 to 128 characters"))]
    pub password: Option<String>,
    #[validate(length(max = 500, message = "bio must be at most 500 characters"))]
    pub bio: Option<String>,
}

/// What anyone may see of a user.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub bio: Option<String>,
    pub profile_photo: ImageRef,
    pub is_admin: bool,
    pub created_at: String,
    pub posts: Vec<Post>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(me))
        .route("/users/count", get(count_users))
        .route("/users/profile-photo", post(upload_profile_photo))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// GET /users (admin)
async fn list_users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> AppResult<Json<Value>> {
    let (limit, offset) = query.window(&state.config.pagination);
    let conn = state.db.get()?;
    let users = users::list(&conn, limit, offset)?;
    let total = users::count(&conn)?;
    Ok(Json(json!({
        "users": users,
        "totalPages": db::total_pages(total, limit),
    })))
}

/// GET /users/me
async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let profile = users::find_by_id(&conn, &user.id)?.ok_or_else(|| AppError::not_found("user"))?;
    Ok(Json(success(profile)))
}

/// GET /users/count (admin)
async fn count_users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    Ok(Json(json!({ "count": users::count(&conn)? })))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PublicProfile>> {
    let conn = state.db.get()?;
    let user = users::find_by_id(&conn, &id)?.ok_or_else(|| AppError::not_found("user"))?;
    let posts = posts::list_by_user(&conn, &id)?;

    Ok(Json(PublicProfile {
        id: user.id,
        username: user.username,
        bio: user.bio,
        profile_photo: user.profile_photo,
        is_admin: user.is_admin,
        created_at: user.created_at,
        posts,
    }))
}

/// PUT /users/{id} (the user themself)
async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateUserRequest>,
) -> AppResult<Json<Value>> {
    policy::require_self(&user, &id)?;

    let username = req
        .username
        .as_deref()
        .map(|name| required("username", name))
        .transpose()?;
    let password_hash = req
        .password
        .as_deref()
        .map(|pw| password::hash(pw, state.config.auth.bcrypt_cost))
        .transpose()?;
    let bio = req.bio.as_deref().map(str::trim);

    let conn = state.db.get()?;
    let updated = users::update_profile(
        &conn,
        &id,
        &users::ProfileChanges {
            username,
            password_hash: password_hash.as_deref(),
            bio,
        },
    )?;
    tracing::info!(user_id = %id, "Updated profile");

    Ok(Json(success(updated)))
}

/// DELETE /users/{id} (the user themself or an admin)
async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let image_ids = {
        let conn = state.db.get()?;
        if users::find_by_id(&conn, &id)?.is_none() {
            return Err(AppError::not_found("user"));
        }
        policy::require_self_or_admin(&user, &id)?;

        let image_ids = users::owned_image_ids(&conn, &id)?;
        users::delete(&conn, &id)?;
        image_ids
    };
    tracing::info!(user_id = %id, by = %user.id, "Deleted user");

    for public_id in image_ids {
        if let Err(e) = state.images.remove(&public_id).await {
            tracing::warn!("Failed to remove image {}: {}", public_id, e);
        }
    }

    Ok(Json(json!({
        "message": "profile has been deleted",
        "userId": id,
    })))
}

/// POST /users/profile-photo
async fn upload_profile_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    mut form: UploadForm,
) -> AppResult<Json<Value>> {
    let upload = form.require_image()?;

    let photo = state.images.upload(upload.bytes, &upload.extension).await?;
    let swapped = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| users::set_profile_photo(&conn, &user.id, &photo));
    let previous = match swapped {
        Ok(previous) => previous,
        Err(e) => {
            discard_upload(&state, &photo).await;
            return Err(e);
        }
    };

    if let Some(previous) = previous {
        if let Err(e) = state.images.remove(&previous).await {
            tracing::warn!("Failed to remove old profile photo {}: {}", previous, e);
        }
    }

    Ok(Json(json!({
        "message": "your profile photo uploaded successfully",
        "profilePhoto": photo,
    })))
}
