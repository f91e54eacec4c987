use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::like_pattern;
use crate::db::models::{image_ref, profile_photo, Author, CategorySummary, ImageRef, Post};
use crate::error::{AppError, AppResult};

const POST_SELECT: &str = "SELECT p.id, p.title, p.description, p.image_url, p.image_id,
        p.created_at, p.updated_at,
        u.id, u.username, u.profile_photo_url, u.profile_photo_id,
        c.id, c.title,
        (SELECT group_concat(l.user_id) FROM post_likes l WHERE l.post_id = p.id)
     FROM posts p
     JOIN users u ON u.id = p.user_id
     LEFT JOIN categories c ON c.id = p.category_id";

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    let category = match (row.get::<_, Option<String>>(11)?, row.get::<_, Option<String>>(12)?) {
        (Some(id), Some(title)) => Some(CategorySummary { id, title }),
        _ => None,
    };
    let likes = row
        .get::<_, Option<String>>(13)?
        .map(|joined| joined.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image: image_ref(row.get(3)?, row.get(4)?),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        user: Author {
            id: row.get(7)?,
            username: row.get(8)?,
            profile_photo: profile_photo(row.get(9)?, row.get(10)?),
        },
        category,
        likes,
    })
}

pub struct NewPost<'a> {
    pub user_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub category_id: Option<&'a str>,
    pub image: Option<&'a ImageRef>,
}

pub fn insert(conn: &Connection, new: &NewPost<'_>) -> AppResult<Post> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO posts (id, user_id, category_id, title, description, image_url, image_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            new.user_id,
            new.category_id,
            new.title,
            new.description,
            new.image.map(|i| i.url.as_str()),
            new.image.and_then(|i| i.public_id.as_deref()),
        ],
    )?;
    find_by_id(conn, &id)?.ok_or_else(|| AppError::Internal("inserted post vanished".into()))
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<Post>> {
    let post = conn
        .query_row(&format!("{POST_SELECT} WHERE p.id = ?1"), params![id], map_post)
        .optional()?;
    Ok(post)
}

/// Owner id and image id of a post, for authorization checks.
pub fn ownership(conn: &Connection, id: &str) -> AppResult<Option<(String, Option<String>)>> {
    let owner = conn
        .query_row(
            "SELECT user_id, image_id FROM posts WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(owner)
}

pub struct PostFilter<'a> {
    pub search: Option<&'a str>,
    /// Category id or title.
    pub category: Option<&'a str>,
}

pub fn search(
    conn: &Connection,
    filter: &PostFilter<'_>,
    limit: u32,
    offset: u32,
) -> AppResult<(Vec<Post>, i64)> {
    let pattern = like_pattern(filter.search.unwrap_or("").trim());
    let category = filter.category.map(str::trim).filter(|c| !c.is_empty());
    let condition = "(p.title LIKE ?1 ESCAPE '\\' OR p.description LIKE ?1 ESCAPE '\\')
         AND (?2 IS NULL OR p.category_id = ?2 OR lower(c.title) = lower(?2))";

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM posts p LEFT JOIN categories c ON c.id = p.category_id
             WHERE {condition}"
        ),
        params![pattern, category],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE {condition}
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT ?3 OFFSET ?4"
    ))?;
    let posts = stmt
        .query_map(params![pattern, category, limit, offset], map_post)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((posts, total))
}

pub fn list_by_user(conn: &Connection, user_id: &str) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE p.user_id = ?1 ORDER BY p.created_at DESC, p.id DESC"
    ))?;
    let posts = stmt
        .query_map(params![user_id], map_post)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

#[derive(Default)]
pub struct PostChanges<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    /// `None` keeps the category, `Some(None)` clears it.
    pub category_id: Option<Option<&'a str>>,
}

pub fn update(conn: &Connection, id: &str, changes: &PostChanges<'_>) -> AppResult<Post> {
    let updated = conn.execute(
        "UPDATE posts SET
            title = COALESCE(?2, title),
            description = COALESCE(?3, description),
            category_id = CASE WHEN ?5 THEN ?4 ELSE category_id END,
            updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            changes.title,
            changes.description,
            changes.category_id.flatten(),
            changes.category_id.is_some()
        ],
    )?;
    if updated == 0 {
        return Err(AppError::not_found("post"));
    }
    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("post"))
}

pub fn set_image(conn: &Connection, id: &str, image: &ImageRef) -> AppResult<Post> {
    let updated = conn.execute(
        "UPDATE posts SET image_url = ?2, image_id = ?3, updated_at = datetime('now') WHERE id = ?1",
        params![id, image.url, image.public_id],
    )?;
    if updated == 0 {
        return Err(AppError::not_found("post"));
    }
    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("post"))
}

/// Flip `user_id`'s membership in the post's likes. Remove-if-present and
/// add-if-absent run in one write transaction; the `(post_id, user_id)`
/// primary key rules out duplicates regardless of interleaving. Returns
/// whether the user now likes the post.
pub fn toggle_like(conn: &mut Connection, post_id: &str, user_id: &str) -> AppResult<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::not_found("post"));
    }

    let removed = tx.execute(
        "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
    )?;
    if removed == 0 {
        tx.execute(
            "INSERT OR IGNORE INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
            params![post_id, user_id],
        )?;
    }
    tx.commit()?;

    Ok(removed == 0)
}

pub fn delete(conn: &Connection, id: &str) -> AppResult<bool> {
    let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

pub fn count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{categories, test_support};

    fn post<'a>(user_id: &'a str, title: &'a str, category_id: Option<&'a str>) -> NewPost<'a> {
        NewPost {
            user_id,
            title,
            description: "body text",
            category_id,
            image: None,
        }
    }

    #[test]
    fn insert_joins_author_and_category() {
        let (_tmp, pool) = test_support::pool();
        let conn = pool.get().unwrap();
        let user = test_support::insert_user(&conn, "alice");
        let category = categories::insert(&conn, &user, "Rust").unwrap();

        let created = insert(&conn, &post(&user, "Hello", Some(&category.id))).unwrap();
        assert_eq!(created.user.username, "alice");
        assert_eq!(created.category.unwrap().title, "Rust");
        assert!(created.likes.is_empty());
        assert!(created.image.is_none());
    }

    #[test]
    fn toggle_like_alternates() {
        let (_tmp, pool) = test_support::pool();
        let mut conn = pool.get().unwrap();
        let user = test_support::insert_user(&conn, "alice");
        let created = insert(&conn, &post(&user, "Hello", None)).unwrap();

        assert!(toggle_like(&mut conn, &created.id, &user).unwrap());
        assert_eq!(find_by_id(&conn, &created.id).unwrap().unwrap().likes, vec![user.clone()]);
        assert!(!toggle_like(&mut conn, &created.id, &user).unwrap());
        assert!(find_by_id(&conn, &created.id).unwrap().unwrap().likes.is_empty());
        assert!(toggle_like(&mut conn, &created.id, &user).unwrap());
    }

    #[test]
    fn toggle_like_on_missing_post_is_not_found() {
        let (_tmp, pool) = test_support::pool();
        let mut conn = pool.get().unwrap();
        let user = test_support::insert_user(&conn, "alice");
        assert!(matches!(
            toggle_like(&mut conn, "missing", &user).unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn likes_cannot_hold_duplicates() {
        let (_tmp, pool) = test_support::pool();
        let conn = pool.get().unwrap();
        let user = test_support::insert_user(&conn, "alice");
        let created = insert(&conn, &post(&user, "Hello", None)).unwrap();

        conn.execute(
            "INSERT INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
            params![created.id, user],
        )
        .unwrap();
        let again = conn.execute(
            "INSERT INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
            params![created.id, user],
        );
        assert!(again.is_err());
    }

    #[test]
    fn search_by_text_and_category() {
        let (_tmp, pool) = test_support::pool();
        let conn = pool.get().unwrap();
        let user = test_support::insert_user(&conn, "alice");
        let rust = categories::insert(&conn, &user, "Rust").unwrap();
        insert(&conn, &post(&user, "Ownership explained", Some(&rust.id))).unwrap();
        insert(&conn, &post(&user, "Lifetimes", Some(&rust.id))).unwrap();
        insert(&conn, &post(&user, "Gardening", None)).unwrap();

        let by_title = PostFilter {
            search: None,
            category: Some("rust"),
        };
        let (_, total) = search(&conn, &by_title, 10, 0).unwrap();
        assert_eq!(total, 2);

        let by_id = PostFilter {
            search: Some("owner"),
            category: Some(&rust.id),
        };
        let (found, total) = search(&conn, &by_id, 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].title, "Ownership explained");

        let everything = PostFilter {
            search: None,
            category: None,
        };
        let (page, total) = search(&conn, &everything, 2, 2).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn update_keeps_or_clears_category() {
        let (_tmp, pool) = test_support::pool();
        let conn = pool.get().unwrap();
        let user = test_support::insert_user(&conn, "alice");
        let rust = categories::insert(&conn, &user, "Rust").unwrap();
        let created = insert(&conn, &post(&user, "Hello", Some(&rust.id))).unwrap();

        let retitled = update(
            &conn,
            &created.id,
            &PostChanges {
                title: Some("Hello again"),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(retitled.title, "Hello again");
        assert_eq!(retitled.category.unwrap().id, rust.id);

        let cleared = update(
            &conn,
            &created.id,
            &PostChanges {
                category_id: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(cleared.category.is_none());
        assert_eq!(cleared.title, "Hello again");
    }

    #[test]
    fn deleting_category_clears_post_reference() {
        let (_tmp, pool) = test_support::pool();
        let conn = pool.get().unwrap();
        let user = test_support::insert_user(&conn, "alice");
        let rust = categories::insert(&conn, &user, "Rust").unwrap();
        let created = insert(&conn, &post(&user, "Hello", Some(&rust.id))).unwrap();

        categories::delete(&conn, &rust.id).unwrap();
        assert!(find_by_id(&conn, &created.id).unwrap().unwrap().category.is_none());
    }
}
