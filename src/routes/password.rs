use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::auth::password;
use crate::db::models::TokenPurpose;
use crate::db::tokens::{self, Redemption};
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::extractors::ValidJson;
use crate::mail;
use crate::routes::message;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ResetLinkRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewPasswordRequest {
    #[validate(length(min = 8, max = 128, message = "password must be 8 to 128 characters"))]
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/password/reset-link", post(send_reset_link))
        .route(
            "/password/reset/{user_id}/{token}",
            get(check_reset_link).post(reset_password),
        )
}

fn invalid_link() -> AppError {
    AppError::BadRequest("invalid link".into())
}

/// POST /password/reset-link
async fn send_reset_link(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ResetLinkRequest>,
) -> AppResult<Json<Value>> {
    let (user, token) = {
        let conn = state.db.get()?;
        let user = users::find_by_email(&conn, &req.email)?.ok_or_else(|| {
            AppError::NotFound("user with given email does not exist".into())
        })?;
        let token = tokens::issue(
            &conn,
            &user.id,
            TokenPurpose::Reset,
            state.config.auth.link_ttl_hours,
        )?;
        (user, token)
    };

    let link = state.client_link(&format!("reset-password/{}/{}", user.id, token));
    state
        .mailer
        .send(mail::reset_password_mail(&user.email, &link))
        .await?;
    tracing::info!(user_id = %user.id, "Sent password reset link");

    Ok(Json(message(
        "password reset link sent to your email, please check your inbox",
    )))
}

/// GET /password/reset/{user_id}/{token}
async fn check_reset_link(
    State(state): State<AppState>,
    Path((user_id, token)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    if users::find_by_id(&conn, &user_id)?.is_none()
        || !tokens::is_valid(&conn, &user_id, TokenPurpose::Reset, &token)?
    {
        return Err(invalid_link());
    }
    Ok(Json(message("valid url")))
}

/// POST /password/reset/{user_id}/{token}
async fn reset_password(
    State(state): State<AppState>,
    Path((user_id, token)): Path<(String, String)>,
    ValidJson(req): ValidJson<NewPasswordRequest>,
) -> AppResult<Json<Value>> {
    let password_hash = password::hash(&req.password, state.config.auth.bcrypt_cost)?;

    let mut conn = state.db.get()?;
    if users::find_by_id(&conn, &user_id)?.is_none() {
        return Err(invalid_link());
    }
    tokens::redeem(
        &mut conn,
        &user_id,
        &token,
        Redemption::ResetPassword {
            password_hash: &password_hash,
        },
    )?;
    tracing::info!(user_id = %user_id, "Password reset");

    Ok(Json(message("password reset successfully, please log in")))
}
