use anyhow::Context;

use crate::{
    api::{self, Comment, CommentId, CreatedComment, DeleteResult, GetComment, NewComment},
    CommentFeed,
};

/// HTTP client for a feedback server
#[derive(Clone, Debug)]
pub struct Client {
    host: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(host: impl Into<String>) -> Client {
        let host: String = host.into();
        Client {
            host: String::from(host.trim_end_matches('/')),
            http: reqwest::Client::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path)
    }

    /// Errors returned by the server are `api::Error`s, that callers can downcast to
    async fn send<R>(&self, req: reqwest::RequestBuilder, what: &str) -> anyhow::Result<R>
    where
        R: for<'de> serde::Deserialize<'de>,
    {
        let resp = req
            .send()
            .await
            .with_context(|| format!("sending {what} request"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .bytes()
                .await
                .with_context(|| format!("reading {what} error body"))?;
            return Err(match api::Error::parse(&body) {
                Ok(err) => anyhow::Error::from(err),
                Err(_) => anyhow::anyhow!("server answered {what} with {status}: {body:?}"),
            });
        }
        resp.json()
            .await
            .with_context(|| format!("parsing {what} response"))
    }

    pub async fn create_comment(&self, c: &NewComment) -> anyhow::Result<CreatedComment> {
        self.send(self.http.post(self.url("createComment")).json(c), "create")
            .await
    }

    /// Looks the comment up, sending its id in the request body
    pub async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Comment> {
        self.send(
            self.http
                .get(self.url("getComment"))
                .json(&GetComment { id }),
            "fetch",
        )
        .await
    }

    pub async fn fetch_comments(&self) -> anyhow::Result<Vec<Comment>> {
        self.send(self.http.get(self.url("getComments")), "list")
            .await
    }

    pub async fn delete_comment(&self, id: CommentId) -> anyhow::Result<DeleteResult> {
        self.send(
            self.http
                .delete(self.url(&format!("deleteComment/{}", id.0))),
            "delete",
        )
        .await
    }

    pub async fn delete_comments(&self) -> anyhow::Result<DeleteResult> {
        self.send(self.http.delete(self.url("deleteComments")), "delete-all")
            .await
    }

    /// Feed of newly created comments, connecting lazily
    pub fn comment_feed(&self) -> CommentFeed {
        CommentFeed::new(self.http.clone(), self.url("events"))
    }
}
