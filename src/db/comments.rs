use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{profile_photo, Author, Comment};
use crate::error::{AppError, AppResult};

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.text, c.created_at, c.updated_at,
        u.id, u.username, u.profile_photo_url, u.profile_photo_id
     FROM comments c
     JOIN users u ON u.id = c.user_id";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        text: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        user: Author {
            id: row.get(5)?,
            username: row.get(6)?,
            profile_photo: profile_photo(row.get(7)?, row.get(8)?),
        },
    })
}

/// Insert a comment. The post's existence is checked by the foreign key.
pub fn insert(conn: &Connection, post_id: &str, user_id: &str, text: &str) -> AppResult<Comment> {
    let id = uuid::Uuid::now_v7().to_string();
    let result = conn.execute(
        "INSERT INTO comments (id, post_id, user_id, text) VALUES (?1, ?2, ?3, ?4)",
        params![id, post_id, user_id, text],
    );
    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            return Err(AppError::not_found("post"));
        }
        Err(e) => return Err(e.into()),
    }
    find_by_id(conn, &id)?.ok_or_else(|| AppError::Internal("inserted comment vanished".into()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<Comment>> {
    let comment = conn
        .query_row(
            &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
            params![id],
            map_comment,
        )
        .optional()?;
    Ok(comment)
}

pub fn owner_of(conn: &Connection, id: &str) -> AppResult<Option<String>> {
    let owner = conn
        .query_row(
            "SELECT user_id FROM comments WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(owner)
}

pub fn list_for_post(conn: &Connection, post_id: &str) -> AppResult<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
    ))?;
    let comments = stmt
        .query_map(params![post_id], map_comment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn list(conn: &Connection, limit: u32, offset: u32) -> AppResult<(Vec<Comment>, i64)> {
    let total = count(conn)?;
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} ORDER BY c.created_at DESC, c.id DESC LIMIT ?1 OFFSET ?2"
    ))?;
    let comments = stmt
        .query_map(params![limit, offset], map_comment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((comments, total))
}

pub fn update_text(conn: &Connection, id: &str, text: &str) -> AppResult<Comment> {
    let updated = conn.execute(
        "UPDATE comments SET text = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, text],
    )?;
    if updated == 0 {
        return Err(AppError::not_found("comment"));
    }
    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("comment"))
}

pub fn delete(conn: &Connection, id: &str) -> AppResult<bool> {
    let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

pub fn count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))?)
}
