use std::convert::Infallible;

use anyhow::Context;
use axum::{
    extract::State,
    response::sse::{self, KeepAlive, Sse},
};
use feedback_api::{Comment, CommentId, CreatedComment, DeleteResult, GetComment, NewComment};
use futures::{Stream, StreamExt};

use crate::{db, extractors::*, CommentFeeds, Error};

pub async fn create_comment(
    State(feeds): State<CommentFeeds>,
    mut conn: SqliteConn,
    Json(data): Json<NewComment>,
) -> Result<Json<CreatedComment>, Error> {
    data.validate()?;
    let comment = db::create_comment(&mut *conn, data)
        .await
        .context("creating comment")?;
    feeds.relay_comment(&comment);
    Ok(Json(CreatedComment { id: comment.id }))
}

async fn fetch_comment_impl(
    conn: &mut sqlx::SqliteConnection,
    id: CommentId,
) -> Result<Json<Comment>, Error> {
    Ok(Json(
        db::fetch_comment(conn, id)
            .await
            .with_context(|| format!("fetching comment {id:?}"))?
            .ok_or(Error::not_found(id))?,
    ))
}

/// Looks the comment up from the id in the request body
pub async fn fetch_comment(
    mut conn: SqliteConn,
    Json(GetComment { id }): Json<GetComment>,
) -> Result<Json<Comment>, Error> {
    fetch_comment_impl(&mut *conn, id).await
}

pub async fn fetch_comment_by_path(
    mut conn: SqliteConn,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, Error> {
    fetch_comment_impl(&mut *conn, CommentId(id)).await
}

pub async fn fetch_comments(mut conn: SqliteConn) -> Result<Json<Vec<Comment>>, Error> {
    Ok(Json(
        db::fetch_comments(&mut *conn)
            .await
            .context("fetching comment list")?,
    ))
}

pub async fn delete_comment(
    mut conn: SqliteConn,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResult>, Error> {
    let id = CommentId(id);
    Ok(Json(
        db::delete_comment(&mut *conn, id)
            .await
            .with_context(|| format!("deleting comment {id:?}"))?,
    ))
}

pub async fn delete_comments(mut conn: SqliteConn) -> Result<Json<DeleteResult>, Error> {
    Ok(Json(
        db::delete_comments(&mut *conn)
            .await
            .context("deleting all comments")?,
    ))
}

pub async fn comment_feed(
    State(feeds): State<CommentFeeds>,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    let feed = feeds.subscribe();
    // axum writes `data:` without the space
    Sse::new(feed.map(|json| Ok(sse::Event::default().data(format!(" {json}")))))
        .keep_alive(KeepAlive::default())
}
