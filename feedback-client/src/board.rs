use crate::{
    api::{Comment, CommentId, CreatedComment, NewComment, Time},
    FeedError,
};

/// Local view of the comment board, newest comments first
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentBoard {
    comments: Vec<Comment>,
    error: Option<String>,
    alert: Option<String>,
}

impl CommentBoard {
    pub fn from_fetched(mut comments: Vec<Comment>) -> CommentBoard {
        Comment::sort_newest_first(&mut comments);
        CommentBoard {
            comments,
            error: None,
            alert: None,
        }
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn contains(&self, id: CommentId) -> bool {
        self.comments.iter().any(|c| c.id == id)
    }

    /// Adds `c` on top of the board, returns false if it was already there
    pub fn merge(&mut self, c: Comment) -> bool {
        if self.contains(c.id) {
            return false;
        }
        self.comments.insert(0, c);
        true
    }

    /// Handles one item of a comment feed, returns true if a new comment was added
    pub fn apply(&mut self, item: Result<Comment, FeedError>) -> bool {
        match item {
            Ok(c) => self.merge(c),
            Err(e) => {
                self.record_feed_error(&e);
                false
            }
        }
    }

    pub fn record_feed_error(&mut self, e: &FeedError) {
        self.error = Some(String::from(match e {
            FeedError::Parse(_) => "Error parsing message",
            FeedError::Connection(_) => "Error with connection",
        }));
    }

    /// Validates a submission before it gets sent to the server
    pub fn check_submission(&mut self, c: &NewComment) -> bool {
        match c.validate() {
            Ok(()) => true,
            Err(_) => {
                self.error = Some(String::from(crate::api::EMPTY_FIELD_MESSAGE));
                false
            }
        }
    }

    /// Shows our own comment right away, without waiting for the feed to relay it
    pub fn record_submission(&mut self, created: CreatedComment, c: NewComment, date: Time) {
        self.alert = Some(format!("New comment by {}!", c.name));
        self.merge(Comment {
            id: created.id,
            name: c.name,
            message: c.message,
            created: date,
        });
    }

    pub fn remove(&mut self, id: CommentId) {
        self.comments.retain(|c| c.id != id);
    }

    pub fn clear(&mut self) {
        self.comments.clear();
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }
}
