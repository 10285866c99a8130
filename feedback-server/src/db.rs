use anyhow::Context;
use feedback_api::{Comment, CommentId, DeleteResult, NewComment};
use futures::TryStreamExt;
use sqlx::{sqlite::SqliteRow, Row};

pub async fn initialize_schema(conn: &mut sqlx::SqliteConnection) -> anyhow::Result<()> {
    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                message TEXT NOT NULL,
                created TEXT NOT NULL
            )
        ",
    )
    .execute(conn)
    .await
    .context("creating comments table")?;
    Ok(())
}

fn comment_from_row(row: &SqliteRow) -> anyhow::Result<Comment> {
    let created: String = row
        .try_get("created")
        .context("retrieving the created field")?;
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        name: row.try_get("name").context("retrieving the name field")?,
        message: row
            .try_get("message")
            .context("retrieving the message field")?,
        created: feedback_api::parse_time(&created)
            .with_context(|| format!("parsing creation date {created:?}"))?,
    })
}

/// Inserts the comment, returning it as committed (assigned id and creation date)
pub async fn create_comment(
    conn: &mut sqlx::SqliteConnection,
    c: NewComment,
) -> anyhow::Result<Comment> {
    let created = feedback_api::now();
    let res = sqlx::query("INSERT INTO comments (name, message, created) VALUES (?, ?, ?)")
        .bind(&c.name)
        .bind(&c.message)
        .bind(feedback_api::format_time(&created))
        .execute(conn)
        .await
        .context("inserting comment")?;
    anyhow::ensure!(
        res.rows_affected() == 1,
        "insertion of comment affected {} rows",
        res.rows_affected()
    );
    Ok(Comment {
        id: CommentId(res.last_insert_rowid()),
        name: c.name,
        message: c.message,
        created,
    })
}

pub async fn fetch_comment(
    conn: &mut sqlx::SqliteConnection,
    id: CommentId,
) -> anyhow::Result<Option<Comment>> {
    sqlx::query("SELECT id, name, message, created FROM comments WHERE id = ?")
        .bind(id.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("querying comment {id:?}"))?
        .map(|row| comment_from_row(&row))
        .transpose()
}

pub async fn fetch_comments(conn: &mut sqlx::SqliteConnection) -> anyhow::Result<Vec<Comment>> {
    let mut comments = Vec::new();
    let mut query = sqlx::query("SELECT id, name, message, created FROM comments").fetch(conn);
    while let Some(row) = query
        .try_next()
        .await
        .context("querying comments table")?
    {
        comments.push(comment_from_row(&row)?);
    }
    Ok(comments)
}

pub async fn delete_comment(
    conn: &mut sqlx::SqliteConnection,
    id: CommentId,
) -> anyhow::Result<DeleteResult> {
    let res = sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting comment {id:?}"))?;
    Ok(DeleteResult {
        deleted_count: res.rows_affected(),
    })
}

pub async fn delete_comments(conn: &mut sqlx::SqliteConnection) -> anyhow::Result<DeleteResult> {
    let res = sqlx::query("DELETE FROM comments")
        .execute(conn)
        .await
        .context("deleting all comments")?;
    Ok(DeleteResult {
        deleted_count: res.rows_affected(),
    })
}
