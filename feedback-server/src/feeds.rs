use std::{
    collections::BTreeMap,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use feedback_api::Comment;
use futures::{channel::mpsc, Stream, StreamExt};
use parking_lot::RwLock;

/// Identifies one open push connection, in registration order
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FeedId(u64);

type FeedSender = mpsc::UnboundedSender<Arc<str>>;

/// Registry of the currently-open comment feeds
#[derive(Clone, Debug)]
pub struct CommentFeeds {
    next_id: Arc<AtomicU64>,
    // Note: this must stay unbounded, as relaying must never wait on a slow connection
    senders: Arc<RwLock<BTreeMap<FeedId, FeedSender>>>,
}

impl CommentFeeds {
    pub fn new() -> CommentFeeds {
        CommentFeeds {
            next_id: Arc::new(AtomicU64::new(0)),
            senders: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Opens a new feed, that stays registered until the returned subscription is dropped
    pub fn subscribe(&self) -> FeedSubscription {
        let (sender, receiver) = mpsc::unbounded();
        let id = self.register(sender);
        tracing::debug!(?id, "comment feed connected");
        FeedSubscription {
            id,
            feeds: self.clone(),
            receiver,
        }
    }

    pub fn register(&self, sender: FeedSender) -> FeedId {
        // TODO: limit to some reasonable number of feeds, to avoid unbounded memory use
        let id = FeedId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.senders.write().insert(id, sender);
        id
    }

    /// Returns whether the feed was still registered
    pub fn unregister(&self, id: FeedId) -> bool {
        self.senders.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.senders.read().len()
    }

    pub fn is_registered(&self, id: FeedId) -> bool {
        self.senders.read().contains_key(&id)
    }

    /// Sends `c` to every feed registered at call time, dropping the feeds that cannot take it
    pub fn relay_comment(&self, c: &Comment) {
        let json: Arc<str> = match serde_json::to_string(c) {
            Ok(json) => json.into(),
            Err(err) => {
                tracing::error!(?err, ?c, "failed serializing comment to json");
                return;
            }
        };
        let snapshot = self
            .senders
            .read()
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect::<Vec<_>>();
        let mut failed = Vec::new();
        for (id, s) in snapshot.iter() {
            if s.unbounded_send(json.clone()).is_err() {
                failed.push(*id);
            }
        }
        for id in failed {
            tracing::debug!(?id, "dropping comment feed that failed delivery");
            self.unregister(id);
        }
        tracing::debug!(comment = ?c.id, num_feeds = snapshot.len(), "relayed comment");
    }

    /// Closes every feed, ending the corresponding event streams
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut *self.senders.write());
        tracing::info!(num_feeds = closed.len(), "closing all comment feeds");
    }
}

impl Default for CommentFeeds {
    fn default() -> CommentFeeds {
        CommentFeeds::new()
    }
}

/// Serialized comments relayed to one push connection
pub struct FeedSubscription {
    id: FeedId,
    feeds: CommentFeeds,
    receiver: mpsc::UnboundedReceiver<Arc<str>>,
}

impl FeedSubscription {
    pub fn id(&self) -> FeedId {
        self.id
    }
}

impl Stream for FeedSubscription {
    type Item = Arc<str>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Arc<str>>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if self.feeds.unregister(self.id) {
            tracing::debug!(id = ?self.id, "comment feed disconnected");
        }
    }
}
