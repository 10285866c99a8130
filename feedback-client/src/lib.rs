mod board;
pub use board::CommentBoard;

mod client;
pub use client::Client;

mod feed;
pub use feed::{CommentFeed, FeedError, FeedState};

mod sse;
pub use sse::EventParser;

pub mod api {
    pub use feedback_api::*;
}
