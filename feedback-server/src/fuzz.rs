#![cfg(test)]

use bolero::generator::TypeGenerator;
use axum::{
    body::{Body, BoxBody},
    http::{self, request},
    Router,
};
use feedback_api::{
    Comment, CommentId, CreatedComment, DeleteResult, Error as ApiError, GetComment, NewComment,
};
use feedback_mock_server::MockServer;
use futures::{FutureExt, StreamExt};
use hyper::body::HttpBody;
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path, time::Duration};
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};

use crate::{feeds::FeedSubscription, *};

async fn create_test_pool(path: &Path) -> sqlx::SqlitePool {
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Off);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .expect("creating sqlx pool");
    db::initialize_schema(&mut *pool.acquire().await.expect("getting schema connection"))
        .await
        .expect("failed initializing schema");
    pool
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            let pool = AssertUnwindSafe(
                runtime.block_on(create_test_pool(&datadir.path().join("test.sqlite3"))),
            );
            bolero::check!()
                .with_generator($gen)
                .cloned()
                .for_each(move |v| {
                    let pool = pool.clone();
                    // run the test
                    let idle_before = pool.num_idle();
                    let v_str = format!("{v:?}");
                    let idle_after_res: Result<usize, _> = {
                        let pool = pool.clone();
                        std::panic::catch_unwind(AssertUnwindSafe(|| {
                            runtime.block_on(async move {
                                let () = $fn(pool.clone(), v).await;
                                let mut idle_after = pool.num_idle();
                                let wait_release_since = std::time::Instant::now();
                                while idle_after < idle_before
                                    && wait_release_since.elapsed()
                                        <= std::time::Duration::from_secs(1)
                                {
                                    tokio::task::yield_now().await;
                                    idle_after = pool.num_idle();
                                }
                                idle_after
                            })
                        }))
                    };
                    runtime.block_on(async move {
                        // cleanup
                        let mut conn =
                            pool.acquire().await.expect("getting db cleanup connection");
                        for reset in ["DELETE FROM comments", "DELETE FROM sqlite_sequence"] {
                            sqlx::query(reset)
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        }
                    });
                    // resume the panics
                    match idle_after_res {
                        Err(e) => std::panic::resume_unwind(e),
                        Ok(idle_after) => assert!(
                            idle_after >= idle_before,
                            "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                            stringify!($name)
                        ),
                    }
                });
        }
    };
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!("parsing response body {body:?} to request {req_body:?}: {err}")
        }));
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

async fn open_event_stream(app: &mut Router) -> BoxBody {
    let req = request::Builder::new()
        .method("GET")
        .uri("/events")
        .body(Body::empty())
        .expect("building request");
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    assert_eq!(resp.status(), http::StatusCode::OK);
    let content_type = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .expect("event stream has no content type");
    assert_eq!(content_type, "text/event-stream");
    resp.into_body()
}

/// Waits for the next data event of the stream, skipping keep-alive comments
async fn next_event(stream: &mut BoxBody, buf: &mut String) -> Comment {
    loop {
        if let Some(end) = buf.find("\n\n") {
            let block = buf[..end].to_string();
            buf.drain(..end + 2);
            if block.starts_with(':') {
                continue;
            }
            let json = block
                .strip_prefix("data: ")
                .unwrap_or_else(|| panic!("unexpected event block {block:?}"));
            return serde_json::from_str(json).expect("parsing event data");
        }
        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.data())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream ended")
            .expect("reading event stream");
        buf.push_str(std::str::from_utf8(&chunk).expect("event stream is not utf8"));
    }
}

fn has_pending_event(stream: &mut BoxBody, buf: &str) -> bool {
    !buf.is_empty() || stream.data().now_or_never().is_some()
}

async fn scenario_app() -> (tempfile::TempDir, Router, CommentFeeds) {
    let dir = tempfile::tempdir().expect("creating tempdir");
    let pool = create_test_pool(&dir.path().join("test.sqlite3")).await;
    let feeds = CommentFeeds::new();
    let app = app(pool, feeds.clone());
    (dir, app, feeds)
}

#[tokio::test]
async fn created_comment_is_listed_and_pushed() {
    let (_dir, mut app, _feeds) = scenario_app().await;
    let mut stream = open_event_stream(&mut app).await;
    let mut buf = String::new();

    let created: CreatedComment = run_on_app(
        &mut app,
        "POST",
        "/createComment",
        &NewComment::new("Ann", "Great job"),
    )
    .await
    .expect("creating comment");
    assert_eq!(created.id, CommentId(1));

    let listed: Vec<Comment> = run_on_app(&mut app, "GET", "/getComments", &())
        .await
        .expect("listing comments");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, CommentId(1));
    assert_eq!(listed[0].name, "Ann");
    assert_eq!(listed[0].message, "Great job");

    let pushed = next_event(&mut stream, &mut buf).await;
    assert_eq!(pushed, listed[0]);
    assert!(!has_pending_event(&mut stream, &buf));
}

#[tokio::test]
async fn closed_streams_stop_receiving() {
    let (_dir, mut app, feeds) = scenario_app().await;
    let mut a = open_event_stream(&mut app).await;
    let mut b = open_event_stream(&mut app).await;
    let (mut buf_a, mut buf_b) = (String::new(), String::new());
    assert_eq!(feeds.len(), 2);

    let _: CreatedComment = run_on_app(
        &mut app,
        "POST",
        "/createComment",
        &NewComment::new("Ann", "Great job"),
    )
    .await
    .expect("creating first comment");
    let from_a = next_event(&mut a, &mut buf_a).await;
    let from_b = next_event(&mut b, &mut buf_b).await;
    assert_eq!(from_a, from_b);
    assert!(!has_pending_event(&mut a, &buf_a));
    assert!(!has_pending_event(&mut b, &buf_b));

    std::mem::drop(a);
    assert_eq!(feeds.len(), 1);

    let second: CreatedComment = run_on_app(
        &mut app,
        "POST",
        "/createComment",
        &NewComment::new("Bob", "Could be better"),
    )
    .await
    .expect("creating second comment");
    let from_b = next_event(&mut b, &mut buf_b).await;
    assert_eq!(from_b.id, second.id);
    assert_eq!(from_b.name, "Bob");
    assert!(!has_pending_event(&mut b, &buf_b));
}

#[tokio::test]
async fn blank_comments_are_rejected() {
    let (_dir, mut app, _feeds) = scenario_app().await;
    let mut stream = open_event_stream(&mut app).await;

    for (name, message, field) in [
        ("", "Great job", "name"),
        ("   ", "Great job", "name"),
        ("Ann", "", "message"),
        ("Ann", " \n\t", "message"),
    ] {
        let res: Result<CreatedComment, ApiError> = run_on_app(
            &mut app,
            "POST",
            "/createComment",
            &NewComment::new(name, message),
        )
        .await;
        assert_eq!(res, Err(ApiError::EmptyField(String::from(field))));
    }

    let listed: Vec<Comment> = run_on_app(&mut app, "GET", "/getComments", &())
        .await
        .expect("listing comments");
    assert!(listed.is_empty());
    assert!(!has_pending_event(&mut stream, ""));
}

#[tokio::test]
async fn single_comment_lookup() {
    let (_dir, mut app, _feeds) = scenario_app().await;
    let created: CreatedComment = run_on_app(
        &mut app,
        "POST",
        "/createComment",
        &NewComment::new("Ann", "Great job"),
    )
    .await
    .expect("creating comment");

    let by_body: Comment = run_on_app(
        &mut app,
        "GET",
        "/getComment",
        &GetComment { id: created.id },
    )
    .await
    .expect("fetching comment by body");
    let by_path_uri = format!("/getComment/{}", created.id.0);
    let by_path: Comment = run_on_app(&mut app, "GET", &by_path_uri, &())
        .await
        .expect("fetching comment by path");
    assert_eq!(by_body, by_path);
    assert_eq!(by_body.name, "Ann");

    let missing: Result<Comment, ApiError> = run_on_app(
        &mut app,
        "GET",
        "/getComment",
        &GetComment { id: CommentId(42) },
    )
    .await;
    assert_eq!(missing, Err(ApiError::NotFound(CommentId(42))));
}

#[tokio::test]
async fn deletions() {
    let (_dir, mut app, _feeds) = scenario_app().await;
    for i in 0..3 {
        let _: CreatedComment = run_on_app(
            &mut app,
            "POST",
            "/createComment",
            &NewComment::new(format!("user {i}"), "hello"),
        )
        .await
        .expect("creating comment");
    }

    let res: DeleteResult = run_on_app(&mut app, "DELETE", "/deleteComment/42", &())
        .await
        .expect("deleting missing comment");
    assert_eq!(res.deleted_count, 0);
    let res: DeleteResult = run_on_app(&mut app, "DELETE", "/deleteComment/1", &())
        .await
        .expect("deleting comment");
    assert_eq!(res.deleted_count, 1);

    let res: DeleteResult = run_on_app(&mut app, "DELETE", "/deleteComments", &())
        .await
        .expect("deleting all comments");
    assert_eq!(res.deleted_count, 2);
    let listed: Vec<Comment> = run_on_app(&mut app, "GET", "/getComments", &())
        .await
        .expect("listing comments");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn undecodable_requests_get_json_errors() {
    let (_dir, mut app, _feeds) = scenario_app().await;
    let mut stream = open_event_stream(&mut app).await;

    let requests = [
        ("POST", "/createComment", Some("application/json"), r#"{"name":"Ann"}"#),
        ("POST", "/createComment", Some("application/json"), "not json"),
        ("POST", "/createComment", None, r#"{"name":"Ann","message":"Great job"}"#),
        ("GET", "/getComment", Some("application/json"), r#"{"id":"one"}"#),
        ("GET", "/getComment/abc", None, ""),
        ("DELETE", "/deleteComment/abc", None, ""),
    ];
    for (method, uri, content_type, body) in requests {
        let mut req = request::Builder::new().method(method).uri(uri);
        if let Some(content_type) = content_type {
            req = req.header(http::header::CONTENT_TYPE, content_type);
        }
        let req = req.body(Body::from(body)).expect("building request");
        let res: Result<Comment, ApiError> = call(&mut app, req, &body).await;
        assert!(
            matches!(res, Err(ApiError::BadRequest(ref msg)) if !msg.is_empty()),
            "{method} {uri} with {body:?} answered {res:?}"
        );
    }

    let listed: Vec<Comment> = run_on_app(&mut app, "GET", "/getComments", &())
        .await
        .expect("listing comments");
    assert!(listed.is_empty());
    assert!(!has_pending_event(&mut stream, ""));
}

#[tokio::test]
async fn events_use_the_spaced_data_prefix() {
    let (_dir, mut app, _feeds) = scenario_app().await;
    let mut stream = open_event_stream(&mut app).await;
    let _: CreatedComment = run_on_app(
        &mut app,
        "POST",
        "/createComment",
        &NewComment::new("Ann", "Great job"),
    )
    .await
    .expect("creating comment");

    let mut raw = String::new();
    while !raw.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.data())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream ended")
            .expect("reading event stream");
        raw.push_str(std::str::from_utf8(&chunk).expect("event stream is not utf8"));
    }
    assert!(raw.starts_with("data: {\"id\":1,"), "unexpected event {raw:?}");
    assert!(raw.ends_with("}\n\n"), "unexpected event {raw:?}");
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateComment {
        #[generator(bolero::generator::gen_with::<String>().len(0..20usize))]
        name: String,
        #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
        message: String,
    },
    FetchComment {
        id: usize,
    },
    FetchCommentByPath {
        id: usize,
    },
    FetchComments,
    DeleteComment {
        id: usize,
    },
    DeleteComments,
    OpenFeed,
    CloseFeed {
        feed: usize,
    },
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

/// Creation dates are assigned independently by app and mock
fn without_date(c: Comment) -> (CommentId, String, String) {
    (c.id, c.name, c.message)
}

struct Feed {
    app: FeedSubscription,
    mock: mpsc::UnboundedReceiver<Comment>,
}

struct ComparativeFuzzer {
    app: Router,
    feeds: CommentFeeds,
    mock: MockServer,
    open_feeds: Vec<Feed>,
}

impl ComparativeFuzzer {
    fn new(pool: sqlx::SqlitePool) -> ComparativeFuzzer {
        let feeds = CommentFeeds::new();
        ComparativeFuzzer {
            app: app(pool, feeds.clone()),
            feeds,
            mock: MockServer::new(),
            open_feeds: Vec::new(),
        }
    }

    fn comment_id(&self, fuzz_id: usize) -> CommentId {
        let end = self.mock.test_last_id() as usize + 2;
        CommentId(resize_int(fuzz_id, ..end).unwrap_or(0) as i64)
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateComment { name, message } => {
                let c = NewComment { name, message };
                compare(
                    "CreateComment",
                    run_on_app(&mut self.app, "POST", "/createComment", &c).await,
                    self.mock.create_comment(c),
                );
            }
            FuzzOp::FetchComment { id } => {
                let id = self.comment_id(id);
                compare(
                    "FetchComment",
                    run_on_app(&mut self.app, "GET", "/getComment", &GetComment { id })
                        .await
                        .map(without_date),
                    self.mock.fetch_comment(id).map(without_date),
                );
            }
            FuzzOp::FetchCommentByPath { id } => {
                let id = self.comment_id(id);
                let uri = format!("/getComment/{}", id.0);
                compare(
                    "FetchCommentByPath",
                    run_on_app(&mut self.app, "GET", &uri, &())
                        .await
                        .map(without_date),
                    self.mock.fetch_comment(id).map(without_date),
                );
            }
            FuzzOp::FetchComments => {
                let sorted = |comments: Vec<Comment>| {
                    let mut res = comments.into_iter().map(without_date).collect::<Vec<_>>();
                    res.sort();
                    res
                };
                compare(
                    "FetchComments",
                    run_on_app(&mut self.app, "GET", "/getComments", &())
                        .await
                        .map(sorted),
                    self.mock.fetch_comments().map(sorted),
                );
            }
            FuzzOp::DeleteComment { id } => {
                let id = self.comment_id(id);
                let uri = format!("/deleteComment/{}", id.0);
                compare::<DeleteResult>(
                    "DeleteComment",
                    run_on_app(&mut self.app, "DELETE", &uri, &()).await,
                    self.mock.delete_comment(id),
                );
            }
            FuzzOp::DeleteComments => {
                compare::<DeleteResult>(
                    "DeleteComments",
                    run_on_app(&mut self.app, "DELETE", "/deleteComments", &()).await,
                    self.mock.delete_comments(),
                );
            }
            FuzzOp::OpenFeed => {
                self.open_feeds.push(Feed {
                    app: self.feeds.subscribe(),
                    mock: self.mock.comment_feed(),
                });
            }
            FuzzOp::CloseFeed { feed } => {
                if let Some(feed) = resize_int(feed, ..self.open_feeds.len()) {
                    self.open_feeds.remove(feed);
                }
            }
        }
        self.check_feeds();
    }

    fn check_feeds(&mut self) {
        assert_eq!(
            self.feeds.len(),
            self.open_feeds.len(),
            "app does not have the expected number of registered feeds"
        );
        for (i, feed) in self.open_feeds.iter_mut().enumerate() {
            loop {
                let app_msg = feed.app.next().now_or_never().flatten().map(|json| {
                    without_date(serde_json::from_str(&json).expect("parsing relayed comment"))
                });
                let mock_msg = feed.mock.try_recv().ok().map(without_date);
                assert_eq!(
                    app_msg, mock_msg,
                    "app and mock did not relay the same comment to feed {i}"
                );
                if app_msg.is_none() {
                    break;
                }
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..30usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
