use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::is_unique_violation;
use crate::db::models::{profile_photo, ImageRef, User};
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str = "id, username, email, password_hash, bio, profile_photo_url, \
     profile_photo_id, is_admin, is_account_verified, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        bio: row.get(4)?,
        profile_photo: profile_photo(row.get(5)?, row.get(6)?),
        is_admin: row.get(7)?,
        is_account_verified: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

/// Insert a user. The admin flag is decided inside the statement: only the
/// first row ever written to an empty table becomes admin.
pub fn insert(conn: &Connection, new: &NewUser<'_>) -> AppResult<User> {
    let id = uuid::Uuid::now_v7().to_string();
    let result = conn.execute(
        "INSERT INTO users (id, username, email, password_hash, is_admin)
         SELECT ?1, ?2, ?3, ?4, NOT EXISTS (SELECT 1 FROM users)",
        params![id, new.username, new.email.trim(), new.password_hash],
    );
    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict("user already exists".into()))
        }
        Err(e) => return Err(e.into()),
    }

    find_by_id(conn, &id)?.ok_or_else(|| AppError::Internal("inserted user vanished".into()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE lower(trim(email)) = lower(trim(?1))"),
            params![email],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn list(conn: &Connection, limit: u32, offset: u32) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
    ))?;
    let users = stmt
        .query_map(params![limit, offset], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

#[derive(Default)]
pub struct ProfileChanges<'a> {
    pub username: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub bio: Option<&'a str>,
}

pub fn update_profile(conn: &Connection, id: &str, changes: &ProfileChanges<'_>) -> AppResult<User> {
    let updated = conn.execute(
        "UPDATE users SET
            username = COALESCE(?2, username),
            password_hash = COALESCE(?3, password_hash),
            bio = COALESCE(?4, bio),
            updated_at = datetime('now')
         WHERE id = ?1",
        params![id, changes.username, changes.password_hash, changes.bio],
    )?;
    if updated == 0 {
        return Err(AppError::not_found("user"));
    }
    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("user"))
}

/// Point the user at a new photo. Returns the photo it replaced, if it was
/// an uploaded one.
pub fn set_profile_photo(conn: &Connection, id: &str, photo: &ImageRef) -> AppResult<Option<String>> {
    let previous: Option<Option<String>> = conn
        .query_row(
            "SELECT profile_photo_id FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(previous) = previous else {
        return Err(AppError::not_found("user"));
    };

    conn.execute(
        "UPDATE users SET profile_photo_url = ?2, profile_photo_id = ?3, updated_at = datetime('now')
         WHERE id = ?1",
        params![id, photo.url, photo.public_id],
    )?;
    Ok(previous)
}

pub fn mark_verified(conn: &Connection, id: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET is_account_verified = 1, updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn set_password(conn: &Connection, id: &str, password_hash: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?2, is_account_verified = 1, updated_at = datetime('now')
         WHERE id = ?1",
        params![id, password_hash],
    )?;
    Ok(())
}

/// Image ids owned by the user: profile photo plus every post image.
pub fn owned_image_ids(conn: &Connection, id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT profile_photo_id FROM users WHERE id = ?1 AND profile_photo_id IS NOT NULL
         UNION ALL
         SELECT image_id FROM posts WHERE user_id = ?1 AND image_id IS NOT NULL",
    )?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Delete the user; posts, comments, likes, categories and tokens go with it.
pub fn delete(conn: &Connection, id: &str) -> AppResult<bool> {
    let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
