use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::password;
use crate::db::models::{TokenPurpose, User};
use crate::db::tokens::{self, Redemption};
use crate::db::users::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{ValidJson, AUTH_COOKIE, USER_INFO_COOKIE};
use crate::mail;
use crate::routes::{message, required, success};
use crate::state::AppState;

const CHECK_INBOX: &str = "we sent you an email, please verify your email address";

// -- Request types --

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "username must be 2 to 100 characters"))]
    pub username: String,
    #[validate(
        email(message = "email must be a valid address"),
        length(max = 100, message = "email must be at most 100 characters")
    )]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "password must be 8 to 128 characters"))]
    pub password: String,
    /// Accepted so old clients keep working; never trusted.
    #[serde(default)]
    pub is_admin: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

// -- Cookie helpers --

fn auth_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{AUTH_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_cookie(name: &str, secure: bool) -> String {
    let mut cookie = format!("{name}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

// -- Router --

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/{user_id}/verify/{token}", get(verify_account))
}

// -- Handlers --

/// Send a fresh verification link to `user`.
async fn send_verification(state: &AppState, user: &User) -> AppResult<()> {
    let token = {
        let conn = state.db.get()?;
        tokens::issue(
            &conn,
            &user.id,
            TokenPurpose::Verify,
            state.config.auth.link_ttl_hours,
        )?
    };
    let link = state.client_link(&format!("users/{}/verify/{}", user.id, token));
    state
        .mailer
        .send(mail::verification_mail(&user.email, &link))
        .await?;
    Ok(())
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> AppResult<Response> {
    let username = required("username", &req.username)?;
    if req.is_admin.is_some() {
        tracing::debug!("Ignoring client-supplied isAdmin on registration");
    }

    let password_hash = password::hash(&req.password, state.config.auth.bcrypt_cost)?;
    let user = {
        let conn = state.db.get()?;
        users::insert(
            &conn,
            &NewUser {
                username,
                email: &req.email,
                password_hash: &password_hash,
            },
        )?
    };
    tracing::info!(user_id = %user.id, is_admin = user.is_admin, "Registered user");

    // The user stays registered even if the mail cannot be delivered.
    send_verification(&state, &user).await?;

    Ok((StatusCode::CREATED, Json(message(CHECK_INBOX))).into_response())
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> AppResult<Response> {
    let invalid = || AppError::BadRequest("invalid email or password".into());

    let user = {
        let conn = state.db.get()?;
        users::find_by_email(&conn, &req.email)?
    }
    .ok_or_else(invalid)?;

    if !password::verify(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    if !user.is_account_verified {
        send_verification(&state, &user).await?;
        return Err(AppError::BadRequest(CHECK_INBOX.into()));
    }

    let token = state.jwt.issue(&user.id, user.is_admin)?;
    let secure = state.config.server.environment.is_production();
    let max_age = state.config.auth.token_days * 24 * 3600;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, auth_cookie(&token, max_age, secure))],
        Json(success(LoginResult { user, token })),
    )
        .into_response())
}

/// POST /auth/logout
async fn logout(State(state): State<AppState>) -> Response {
    let secure = state.config.server.environment.is_production();
    (
        StatusCode::OK,
        AppendHeaders([
            (header::SET_COOKIE, clear_cookie(AUTH_COOKIE, secure)),
            (header::SET_COOKIE, clear_cookie(USER_INFO_COOKIE, secure)),
        ]),
        Json(message("logged out successfully")),
    )
        .into_response()
}

/// GET /auth/{user_id}/verify/{token}
async fn verify_account(
    State(state): State<AppState>,
    Path((user_id, token)): Path<(String, String)>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db.get()?;
    if users::find_by_id(&conn, &user_id)?.is_none() {
        return Err(AppError::BadRequest("invalid link".into()));
    }
    tokens::redeem(&mut conn, &user_id, &token, Redemption::VerifyAccount)?;
    tracing::info!(user_id = %user_id, "Account verified");

    Ok(Json(message("your account verified")))
}
