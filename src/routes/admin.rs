use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::{categories, comments, posts, users};
use crate::error::AppResult;
use crate::extractors::AdminUser;
use crate::state::AppState;

/// Row counts shown on the admin dashboard.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AdminInfo {
    pub users: i64,
    pub posts: i64,
    pub categories: i64,
    pub comments: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/info", get(info))
}

/// GET /admin/info (admin)
async fn info(State(state): State<AppState>, AdminUser(_): AdminUser) -> AppResult<Json<AdminInfo>> {
    let conn = state.db.get()?;
    Ok(Json(AdminInfo {
        users: users::count(&conn)?,
        posts: posts::count(&conn)?,
        categories: categories::count(&conn)?,
        comments: comments::count(&conn)?,
    }))
}
