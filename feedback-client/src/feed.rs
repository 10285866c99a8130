use std::collections::VecDeque;

use crate::{api::Comment, sse::EventParser};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FeedError {
    /// An event did not hold a valid comment; the feed stays open
    #[error("Error parsing message: {0}")]
    Parse(String),

    /// The connection failed; the feed is over until restarted
    #[error("Error with connection: {0}")]
    Connection(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FeedState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Comments pushed by the server, as they get created
///
/// Nothing happens until the first call to `next`. Once the feed is closed or errored, it yields
/// nothing more until `restart` is called.
pub struct CommentFeed {
    http: reqwest::Client,
    url: String,
    state: FeedState,
    response: Option<reqwest::Response>,
    parser: EventParser,
    pending: VecDeque<Result<Comment, FeedError>>,
}

impl CommentFeed {
    pub(crate) fn new(http: reqwest::Client, url: String) -> CommentFeed {
        CommentFeed {
            http,
            url,
            state: FeedState::Connecting,
            response: None,
            parser: EventParser::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Drops the current connection, the next call to `next` will reconnect
    pub fn restart(&mut self) {
        self.state = FeedState::Connecting;
        self.response = None;
        self.parser = EventParser::new();
        self.pending.clear();
    }

    fn fail(&mut self, err: String) -> Option<Result<Comment, FeedError>> {
        tracing::warn!(url = %self.url, %err, "comment feed connection failed");
        self.state = FeedState::Errored;
        self.response = None;
        Some(Err(FeedError::Connection(err)))
    }

    /// Returns `None` once the feed is over
    pub async fn next(&mut self) -> Option<Result<Comment, FeedError>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            match self.state {
                FeedState::Connecting => {
                    let resp = self
                        .http
                        .get(&self.url)
                        .header(reqwest::header::ACCEPT, "text/event-stream")
                        .send()
                        .await
                        .and_then(|r| r.error_for_status());
                    match resp {
                        Ok(resp) => {
                            tracing::debug!(url = %self.url, "comment feed connected");
                            self.response = Some(resp);
                            self.state = FeedState::Open;
                        }
                        Err(err) => return self.fail(err.to_string()),
                    }
                }
                FeedState::Open => {
                    let chunk = match &mut self.response {
                        Some(resp) => resp.chunk().await,
                        None => return self.fail(String::from("no response for open feed")),
                    };
                    match chunk {
                        Ok(Some(chunk)) => self.pending.extend(
                            self.parser
                                .push(&chunk)
                                .into_iter()
                                .map(|data| parse_comment(&data)),
                        ),
                        Ok(None) => {
                            tracing::debug!(url = %self.url, "comment feed closed by server");
                            self.state = FeedState::Closed;
                            self.response = None;
                            return None;
                        }
                        Err(err) => return self.fail(err.to_string()),
                    }
                }
                FeedState::Closed | FeedState::Errored => return None,
            }
        }
    }
}

fn parse_comment(data: &str) -> Result<Comment, FeedError> {
    serde_json::from_str(data).map_err(|err| FeedError::Parse(err.to_string()))
}
