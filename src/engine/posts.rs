use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CraftError, CraftResult};
use crate::ids::{ActorId, PostId};
use crate::model::{NewPost, Post};
use crate::path::DataPath;
use crate::schema;
use crate::subscription::{Snapshot, Subscription};

use super::{serialization, CraftEngine};

impl CraftEngine {
    /// Publish a post as the current actor.
    ///
    /// Writes `posts/{id}` and then the author's `users/{uid}/posts/{id}`
    /// marker.
    ///
    /// # Errors
    /// `Unauthenticated`, `Validation` for missing or oversized fields, or a
    /// storage error.
    pub fn create_post(&self, new: &NewPost) -> CraftResult<PostId> {
        let author = self.actor()?;
        new.validate(&self.cfg.limits)?;

        let now = self.clock.now();
        let post_id = self.ids.next_post_id(now);
        let node = new.to_node(&author, now.timestamp_millis()).map_err(serialization)?;

        self.store.write(&schema::post(&post_id), node)?;
        self.store.write(
            &schema::user_posts(&author).child_trusted(post_id.as_str()),
            Value::Bool(true),
        )?;

        info!(%post_id, %author, "Post created");
        Ok(post_id)
    }

    /// Read one post.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist, `Validation` if it is malformed.
    pub fn post(&self, post_id: &PostId) -> CraftResult<Post> {
        let path = schema::post(post_id);
        let node = self.store.read(&path)?.ok_or_else(|| CraftError::NotFound { path: path.clone() })?;
        Ok(Post::from_node(post_id.clone(), &path, &node)?)
    }

    /// Every post, newest first. Malformed posts are skipped.
    ///
    /// # Errors
    /// A storage error if `posts` cannot be read.
    pub fn feed(&self) -> CraftResult<Vec<Post>> {
        let node = self.store.read(&schema::posts())?;
        Ok(decode_feed(node.as_ref()))
    }

    /// Posts written by `author`, newest first.
    ///
    /// # Errors
    /// A storage error if `posts` cannot be read.
    pub fn posts_by_author(&self, author: &ActorId) -> CraftResult<Vec<Post>> {
        let mut posts = self.feed()?;
        posts.retain(|post| post.user_id.as_ref() == Some(author));
        Ok(posts)
    }

    /// Watch one post. The first event is the current state.
    ///
    /// # Errors
    /// A storage error if the subscription cannot be registered.
    pub fn subscribe_post(&self, post_id: &PostId) -> CraftResult<PostSubscription> {
        let inner = self.store.subscribe(&schema::post(post_id))?;
        Ok(PostSubscription {
            post_id: post_id.clone(),
            inner,
        })
    }

    /// Watch the whole feed. The first event is the current feed.
    ///
    /// # Errors
    /// A storage error if the subscription cannot be registered.
    pub fn subscribe_feed(&self) -> CraftResult<FeedSubscription> {
        let inner = self.store.subscribe(&schema::posts())?;
        Ok(FeedSubscription { inner })
    }
}

/// Decode the `posts` node, newest first (ties broken by id, newest first).
fn decode_feed(node: Option<&Value>) -> Vec<Post> {
    let Some(entries) = node.and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut posts: Vec<Post> = entries
        .iter()
        .filter_map(|(key, post_node)| {
            let decoded = PostId::from_key(key.as_str()).map_err(CraftError::from).and_then(|post_id| {
                let path = schema::post(&post_id);
                Post::from_node(post_id, &path, post_node).map_err(CraftError::from)
            });
            match decoded {
                Ok(post) => Some(post),
                Err(err) => {
                    warn!(post_key = %key, error = %err, "Skipping malformed post");
                    None
                }
            }
        })
        .collect();
    posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    posts
}

fn read_failed(path: &DataPath, reason: String) -> CraftError {
    CraftError::ReadFailed {
        path: path.clone(),
        reason,
    }
}

/// Typed subscription to one post.
#[derive(Debug)]
pub struct PostSubscription {
    post_id: PostId,
    inner: Subscription,
}

impl PostSubscription {
    #[must_use]
    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    /// Next state of the post; `None` once it has been deleted.
    ///
    /// # Errors
    /// `ReadFailed` if the post could not be read or decoded (the subscription
    /// stays live), `Timeout`, or `Storage(Disconnected)` once it has ended.
    pub fn recv_timeout(&self, timeout: Duration) -> CraftResult<Option<Post>> {
        let snapshot = self.inner.recv_timeout(timeout)?;
        self.decode(&snapshot)
    }

    /// Blocking variant of [`recv_timeout`](Self::recv_timeout).
    ///
    /// # Errors
    /// As [`recv_timeout`](Self::recv_timeout), without `Timeout`.
    pub fn recv(&self) -> CraftResult<Option<Post>> {
        let snapshot = self.inner.recv()?;
        self.decode(&snapshot)
    }

    fn decode(&self, snapshot: &Snapshot) -> CraftResult<Option<Post>> {
        snapshot
            .value
            .as_ref()
            .map(|node| {
                Post::from_node(self.post_id.clone(), &snapshot.path, node)
                    .map_err(|e| read_failed(&snapshot.path, e.to_string()))
            })
            .transpose()
    }

    /// Stop receiving updates.
    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }
}

/// Typed subscription to the feed.
#[derive(Debug)]
pub struct FeedSubscription {
    inner: Subscription,
}

impl FeedSubscription {
    /// Next state of the feed, newest first.
    ///
    /// # Errors
    /// `Timeout`, `ReadFailed`, or `Storage(Disconnected)` once it has ended.
    pub fn recv_timeout(&self, timeout: Duration) -> CraftResult<Vec<Post>> {
        let snapshot = self.inner.recv_timeout(timeout)?;
        Ok(decode_feed(snapshot.value.as_ref()))
    }

    /// Blocking variant of [`recv_timeout`](Self::recv_timeout).
    ///
    /// # Errors
    /// `ReadFailed`, or `Storage(Disconnected)` once it has ended.
    pub fn recv(&self) -> CraftResult<Vec<Post>> {
        let snapshot = self.inner.recv()?;
        Ok(decode_feed(snapshot.value.as_ref()))
    }

    /// Stop receiving updates.
    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }
}
