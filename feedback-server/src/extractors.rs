use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    http::{request, Request},
    response::{IntoResponse, Response},
};
use feedback_api::Error as ApiError;

use crate::{CommentFeeds, Error};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: SqlitePool,
    pub feeds: CommentFeeds,
}

#[derive(Clone)]
pub struct SqlitePool(sqlx::SqlitePool);

impl SqlitePool {
    pub fn new(pool: sqlx::SqlitePool) -> SqlitePool {
        SqlitePool(pool)
    }

    pub async fn acquire(&self) -> Result<SqliteConn, Error> {
        Ok(SqliteConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }
}

pub struct SqliteConn(sqlx::pool::PoolConnection<sqlx::Sqlite>);

#[async_trait]
impl FromRequestParts<AppState> for SqliteConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<SqliteConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for SqliteConn {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SqliteConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// JSON body, rejected with an API error when it does not decode
pub struct Json<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for Json<T>
where
    axum::Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    T: Send,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Error;

    async fn from_request(req: Request<B>, state: &S) -> Result<Json<T>, Error> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(data)) => Ok(Json(data)),
            Err(rejection) => Err(Error::Api(ApiError::BadRequest(rejection.to_string()))),
        }
    }
}

impl<T: serde::Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Path parameters, rejected with an API error when they do not parse
pub struct Path<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Path<T>
where
    axum::extract::Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    T: Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<Path<T>, Error> {
        match axum::extract::Path::<T>::from_request_parts(req, state).await {
            Ok(axum::extract::Path(data)) => Ok(Path(data)),
            Err(rejection) => Err(Error::Api(ApiError::BadRequest(rejection.to_string()))),
        }
    }
}
