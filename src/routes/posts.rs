use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::policy;
use crate::db::models::{Comment, Post};
use crate::db::posts::{self, NewPost, PostChanges, PostFilter};
use crate::db::{self, categories, comments};
use crate::error::{AppError, AppResult};
use crate::extractors::{validation_error, AppQuery, CurrentUser, ValidJson};
use crate::routes::{discard_upload, required, PageQuery, UploadForm};
use crate::sanitize;
use crate::state::AppState;

/// Text fields of the multipart create form.
#[derive(Debug, Validate)]
struct NewPostFields {
    #[validate(length(min = 2, max = 200, message = "title must be 2 to 200 characters"))]
    title: String,
    #[validate(length(min = 10, message = "description must be at least 10 characters"))]
    description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 2, max = 200, message = "title must be 2 to 200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 10, message = "description must be at least 10 characters"))]
    pub description: Option<String>,
    /// Category id or title. An empty value clears the category.
    pub category: Option<String>,
}

/// `PageQuery` plus a category filter. Not flattened: serde_urlencoded
/// cannot parse numbers through `#[serde(flatten)]`.
#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    /// Category id or title.
    pub category: Option<String>,
}

impl PostQuery {
    fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
            search: None,
        }
    }
}

#[derive(Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/count", get(count_posts))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/posts/{id}/image", put(update_post_image))
        .route("/posts/{id}/like", put(toggle_like))
        .route("/posts/{id}/comments", get(list_post_comments))
}

/// Resolve a category reference given either as id or as title.
fn resolve_category(conn: &Connection, reference: &str) -> AppResult<String> {
    let reference = reference.trim();
    if let Some(category) = categories::find_by_id(conn, reference)? {
        return Ok(category.id);
    }
    categories::find_by_title(conn, reference)?
        .map(|category| category.id)
        .ok_or_else(|| AppError::not_found("category"))
}

fn load_post(conn: &Connection, id: &str) -> AppResult<Post> {
    posts::find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("post"))
}

/// POST /posts (multipart: title, description, category?, image)
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    mut form: UploadForm,
) -> AppResult<(StatusCode, Json<Post>)> {
    let fields = NewPostFields {
        title: form.field("title").unwrap_or_default().trim().to_string(),
        description: form.field("description").unwrap_or_default().trim().to_string(),
    };
    fields.validate().map_err(validation_error)?;
    let upload = form.require_image()?;

    let title = sanitize::plain_text(&fields.title);
    let description = sanitize::rich_text(&fields.description);
    required("title", &title)?;
    required("description", &description)?;

    let category_id = {
        let conn = state.db.get()?;
        form.field("category")
            .filter(|c| !c.trim().is_empty())
            .map(|c| resolve_category(&conn, c))
            .transpose()?
    };

    let image = state.images.upload(upload.bytes, &upload.extension).await?;
    let inserted = state.db.get().map_err(AppError::from).and_then(|conn| {
        posts::insert(
            &conn,
            &NewPost {
                user_id: &user.id,
                title: &title,
                description: &description,
                category_id: category_id.as_deref(),
                image: Some(&image),
            },
        )
    });

    let post = match inserted {
        Ok(post) => post,
        Err(e) => {
            discard_upload(&state, &image).await;
            return Err(e);
        }
    };
    tracing::info!(post_id = %post.id, user_id = %user.id, "Created post");

    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts?search=&category=&page=&limit=
async fn list_posts(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PostQuery>,
) -> AppResult<Json<Value>> {
    let (limit, offset) = query.paging().window(&state.config.pagination);
    let conn = state.db.get()?;
    let (posts, total) = posts::search(
        &conn,
        &PostFilter {
            search: query.search.as_deref(),
            category: query.category.as_deref(),
        },
        limit,
        offset,
    )?;
    Ok(Json(json!({
        "posts": posts,
        "totalPages": db::total_pages(total, limit),
    })))
}

/// GET /posts/count
async fn count_posts(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    Ok(Json(json!({ "count": posts::count(&conn)? })))
}

/// GET /posts/{id}
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostDetail>> {
    let conn = state.db.get()?;
    let post = load_post(&conn, &id)?;
    let comments = comments::list_for_post(&conn, &id)?;
    Ok(Json(PostDetail { post, comments }))
}

/// PUT /posts/{id} (owner)
async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    let (owner_id, _) = posts::ownership(&conn, &id)?.ok_or_else(|| AppError::not_found("post"))?;
    policy::require_owner(&user, &owner_id)?;

    let title = req.title.as_deref().map(sanitize::plain_text);
    let description = req.description.as_deref().map(sanitize::rich_text);
    if let Some(title) = &title {
        required("title", title)?;
    }
    if let Some(description) = &description {
        required("description", description)?;
    }
    let category_id = match req.category.as_deref().map(str::trim) {
        None => None,
        Some("") => Some(None),
        Some(reference) => Some(Some(resolve_category(&conn, reference)?)),
    };

    let post = posts::update(
        &conn,
        &id,
        &PostChanges {
            title: title.as_deref().map(str::trim),
            description: description.as_deref().map(str::trim),
            category_id: category_id.as_ref().map(|c| c.as_deref()),
        },
    )?;
    tracing::info!(post_id = %id, "Updated post");

    Ok(Json(post))
}

/// PUT /posts/{id}/image (owner, multipart `image`)
async fn update_post_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut form: UploadForm,
) -> AppResult<Json<Post>> {
    let (owner_id, previous) = {
        let conn = state.db.get()?;
        posts::ownership(&conn, &id)?.ok_or_else(|| AppError::not_found("post"))?
    };
    policy::require_owner(&user, &owner_id)?;

    let upload = form.require_image()?;
    let image = state.images.upload(upload.bytes, &upload.extension).await?;

    let swapped = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| posts::set_image(&conn, &id, &image));
    let post = match swapped {
        Ok(post) => post,
        Err(e) => {
            discard_upload(&state, &image).await;
            return Err(e);
        }
    };

    if let Some(previous) = previous {
        if let Err(e) = state.images.remove(&previous).await {
            tracing::warn!("Failed to remove old post image {}: {}", previous, e);
        }
    }

    Ok(Json(post))
}

/// PUT /posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let mut conn = state.db.get()?;
    let liked = posts::toggle_like(&mut conn, &id, &user.id)?;
    tracing::debug!(post_id = %id, user_id = %user.id, liked, "Toggled like");
    Ok(Json(load_post(&conn, &id)?))
}

/// DELETE /posts/{id} (owner or admin)
async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let image_id = {
        let conn = state.db.get()?;
        let (owner_id, image_id) =
            posts::ownership(&conn, &id)?.ok_or_else(|| AppError::not_found("post"))?;
        policy::require_owner_or_admin(&user, &owner_id)?;
        if !posts::delete(&conn, &id)? {
            return Err(AppError::not_found("post"));
        }
        image_id
    };
    tracing::info!(post_id = %id, by = %user.id, "Deleted post");

    if let Some(public_id) = image_id {
        if let Err(e) = state.images.remove(&public_id).await {
            tracing::warn!("Failed to remove post image {}: {}", public_id, e);
        }
    }

    Ok(Json(json!({
        "message": "post has been deleted successfully",
        "postId": id,
    })))
}

/// GET /posts/{id}/comments
async fn list_post_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Comment>>> {
    let conn = state.db.get()?;
    if posts::ownership(&conn, &id)?.is_none() {
        return Err(AppError::not_found("post"));
    }
    Ok(Json(comments::list_for_post(&conn, &id)?))
}
