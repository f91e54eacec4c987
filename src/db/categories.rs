use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Category;
use crate::db::{is_unique_violation, like_pattern};
use crate::error::{AppError, AppResult};

const CATEGORY_COLUMNS: &str = "id, user_id, title, created_at, updated_at";

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn duplicate_or(err: rusqlite::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict("category already exists".into())
    } else {
        err.into()
    }
}

/// Insert a category. Concurrent inserts of the same title are settled by
/// the `categories_title_key` index: exactly one succeeds, the rest get
/// `Conflict`.
pub fn insert(conn: &Connection, user_id: &str, title: &str) -> AppResult<Category> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO categories (id, user_id, title) VALUES (?1, ?2, ?3)",
        params![id, user_id, title.trim()],
    )
    .map_err(duplicate_or)?;

    find_by_id(conn, &id)?.ok_or_else(|| AppError::Internal("inserted category vanished".into()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<Category>> {
    let category = conn
        .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
            params![id],
            map_category,
        )
        .optional()?;
    Ok(category)
}

pub fn find_by_title(conn: &Connection, title: &str) -> AppResult<Option<Category>> {
    let category = conn
        .query_row(
            &format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories WHERE lower(trim(title)) = lower(trim(?1))"
            ),
            params![title],
            map_category,
        )
        .optional()?;
    Ok(category)
}

/// One page of categories whose title contains `search`, plus the total
/// number of matches.
pub fn search(
    conn: &Connection,
    search: Option<&str>,
    limit: u32,
    offset: u32,
) -> AppResult<(Vec<Category>, i64)> {
    let pattern = like_pattern(search.unwrap_or("").trim());

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM categories WHERE title LIKE ?1 ESCAPE '\\'",
        params![pattern],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories
         WHERE title LIKE ?1 ESCAPE '\\'
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3"
    ))?;
    let categories = stmt
        .query_map(params![pattern, limit, offset], map_category)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((categories, total))
}

pub fn rename(conn: &Connection, id: &str, title: &str) -> AppResult<Category> {
    let updated = conn
        .execute(
            "UPDATE categories SET title = ?2, updated_at = datetime('now') WHERE id = ?1",
            params![id, title.trim()],
        )
        .map_err(duplicate_or)?;
    if updated == 0 {
        return Err(AppError::not_found("category"));
    }
    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("category"))
}

pub fn delete(conn: &Connection, id: &str) -> AppResult<bool> {
    let rows = conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

pub fn count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?)
}
