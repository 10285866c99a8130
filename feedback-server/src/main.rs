use anyhow::Context;
use axum::{
    http::StatusCode,
    routing::{delete, get, get_service, post},
    Router,
};
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

mod db;
mod error;
mod extractors;
mod feeds;
mod handlers;

#[cfg(test)]
mod fuzz;

use error::Error;
use extractors::{AppState, SqlitePool};
use feeds::CommentFeeds;

#[derive(Clone, Debug, structopt::StructOpt)]
struct Opt {
    /// Address to listen on
    #[structopt(long, default_value = "127.0.0.1")]
    listen: IpAddr,

    /// Port to listen on
    #[structopt(short, long, env = "PORT", default_value = "3001")]
    port: u16,

    /// Location of the sqlite database file, created if missing
    #[structopt(long, env = "DATABASE_PATH", default_value = "./database.sqlite3")]
    database: PathBuf,

    /// Directory static assets are served from
    #[structopt(long, env = "PUBLIC_DIR", default_value = "public")]
    public_dir: PathBuf,

    /// Page served at the root
    #[structopt(long, env = "INDEX_PATH", default_value = "public/index.html")]
    index: PathBuf,
}

pub async fn create_sqlx_pool(path: &Path) -> anyhow::Result<sqlx::SqlitePool> {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("Error opening database {:?}", path))
}

async fn handle_static_error(err: std::io::Error) -> (StatusCode, String) {
    tracing::error!(?err, "failed serving static file");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        String::from("Internal server error, see logs for details"),
    )
}

pub fn app(db: sqlx::SqlitePool, feeds: CommentFeeds) -> Router {
    Router::new()
        .route("/createComment", post(handlers::create_comment))
        .route("/getComment", get(handlers::fetch_comment))
        .route("/getComment/:id", get(handlers::fetch_comment_by_path))
        .route("/getComments", get(handlers::fetch_comments))
        .route("/deleteComment/:id", delete(handlers::delete_comment))
        .route("/deleteComments", delete(handlers::delete_comments))
        .route("/events", get(handlers::comment_feed))
        .with_state(AppState {
            db: SqlitePool::new(db),
            feeds,
        })
}

fn static_files(opt: &Opt) -> Router {
    Router::new()
        .route(
            "/",
            get_service(ServeFile::new(&opt.index)).handle_error(handle_static_error),
        )
        .fallback_service(
            get_service(ServeDir::new(&opt.public_dir)).handle_error(handle_static_error),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let pool = create_sqlx_pool(&opt.database).await?;
    db::initialize_schema(&mut *pool.acquire().await.context("getting schema connection")?)
        .await
        .context("initializing database schema")?;

    let feeds = CommentFeeds::new();
    let app = app(pool, feeds.clone())
        .merge(static_files(&opt))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::new(opt.listen, opt.port);
    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(?err, "failed listening for shutdown signal");
                std::future::pending::<()>().await;
            }
            // open event streams would otherwise keep the server from draining
            feeds.close_all();
        })
        .await
        .context("serving axum webserver")
}
