use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::models::TokenPurpose;
use crate::db::users;
use crate::error::{AppError, AppResult};

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn invalid_link() -> AppError {
    AppError::BadRequest("invalid link".into())
}

/// Issue a token for `(user, purpose)`, replacing any earlier one, and
/// return it for the link.
pub fn issue(
    conn: &Connection,
    user_id: &str,
    purpose: TokenPurpose,
    ttl_hours: i64,
) -> AppResult<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let token = generate_token();

    conn.execute(
        "INSERT INTO verification_tokens (id, user_id, purpose, token, expires_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now', ?5))
         ON CONFLICT(user_id, purpose) DO UPDATE SET
           id = excluded.id,
           token = excluded.token,
           expires_at = excluded.expires_at,
           created_at = datetime('now')",
        params![id, user_id, purpose.as_str(), token, format!("{:+} hours", ttl_hours)],
    )?;

    Ok(token)
}

/// Whether `token` is currently redeemable for `(user, purpose)`.
pub fn is_valid(
    conn: &Connection,
    user_id: &str,
    purpose: TokenPurpose,
    token: &str,
) -> AppResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM verification_tokens
             WHERE user_id = ?1 AND purpose = ?2 AND token = ?3 AND expires_at > datetime('now')",
            params![user_id, purpose.as_str(), token],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// What a successful redemption does to the account.
pub enum Redemption<'a> {
    VerifyAccount,
    ResetPassword { password_hash: &'a str },
}

impl Redemption<'_> {
    fn purpose(&self) -> TokenPurpose {
        match self {
            Redemption::VerifyAccount => TokenPurpose::Verify,
            Redemption::ResetPassword { .. } => TokenPurpose::Reset,
        }
    }
}

/// Consume `token` and apply its side effect. The delete and the account
/// update commit together; a token that was already consumed, expired or
/// never existed yields `BadRequest("invalid link")`.
pub fn redeem(
    conn: &mut Connection,
    user_id: &str,
    token: &str,
    redemption: Redemption<'_>,
) -> AppResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let deleted = tx.execute(
        "DELETE FROM verification_tokens
         WHERE user_id = ?1 AND purpose = ?2 AND token = ?3 AND expires_at > datetime('now')",
        params![user_id, redemption.purpose().as_str(), token],
    )?;
    if deleted == 0 {
        return Err(invalid_link());
    }

    match redemption {
        Redemption::VerifyAccount => users::mark_verified(&tx, user_id)?,
        Redemption::ResetPassword { password_hash } => {
            users::set_password(&tx, user_id, password_hash)?
        }
    }

    tx.commit()?;
    Ok(())
}
