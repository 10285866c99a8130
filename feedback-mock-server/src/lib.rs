use std::collections::BTreeMap;

use feedback_api::{Comment, CommentId, CreatedComment, DeleteResult, Error, NewComment};
use tokio::sync::mpsc;

/// In-memory model of the feedback server
pub struct MockServer {
    comments: BTreeMap<CommentId, Comment>,
    last_id: i64,
    feeds: Vec<mpsc::UnboundedSender<Comment>>,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            comments: BTreeMap::new(),
            last_id: 0,
            feeds: Vec::new(),
        }
    }

    /// Return the highest id ever assigned, 0 if none
    pub fn test_last_id(&self) -> i64 {
        self.last_id
    }

    /// Return the current number of comments
    pub fn test_num_comments(&self) -> usize {
        self.comments.len()
    }

    /// Return the current number of open feeds
    pub fn test_num_feeds(&self) -> usize {
        self.feeds.len()
    }

    fn relay_comment(&mut self, c: &Comment) {
        self.feeds.retain(|f| matches!(f.send(c.clone()), Ok(())));
    }

    pub fn create_comment(&mut self, c: NewComment) -> Result<CreatedComment, Error> {
        c.validate()?;
        self.last_id += 1;
        let comment = Comment {
            id: CommentId(self.last_id),
            name: c.name,
            message: c.message,
            created: feedback_api::now(),
        };
        self.comments.insert(comment.id, comment.clone());
        self.relay_comment(&comment);
        Ok(CreatedComment { id: comment.id })
    }

    pub fn fetch_comment(&self, id: CommentId) -> Result<Comment, Error> {
        self.comments.get(&id).cloned().ok_or(Error::NotFound(id))
    }

    pub fn fetch_comments(&self) -> Result<Vec<Comment>, Error> {
        Ok(self.comments.values().cloned().collect())
    }

    pub fn delete_comment(&mut self, id: CommentId) -> Result<DeleteResult, Error> {
        Ok(DeleteResult {
            deleted_count: self.comments.remove(&id).map(|_| 1).unwrap_or(0),
        })
    }

    pub fn delete_comments(&mut self) -> Result<DeleteResult, Error> {
        let deleted_count = self.comments.len() as u64;
        self.comments.clear();
        Ok(DeleteResult { deleted_count })
    }

    pub fn comment_feed(&mut self) -> mpsc::UnboundedReceiver<Comment> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.feeds.push(sender);
        receiver
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}
