use std::collections::{HashMap, HashSet};

use crate::engagement::{rollback_like, toggle_like, LikeContext, LikeOperation};
use crate::error::{PulseError, Result};
use crate::post::join_authors;
use crate::scoring::FeedPipeline;
use crate::store::DocumentStore;
use crate::{Post, User};

#[derive(Debug, Clone)]
pub enum FeedChange {
    Upsert(Post),
    Remove(String),
}

/// A session's local view of the feed. Holds the full working set in ranked
/// order and re-ranks all of it on every reload or change notification.
#[derive(Debug, Clone)]
pub struct FeedSession {
    pipeline: FeedPipeline,
    posts: Vec<Post>,
    in_flight: HashSet<String>,
}

impl FeedSession {
    pub fn new(pipeline: FeedPipeline) -> Self {
        Self {
            pipeline,
            posts: Vec::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn get(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == post_id)
    }

    pub fn is_in_flight(&self, post_id: &str) -> bool {
        self.in_flight.contains(post_id)
    }

    /// Full reload: `posts` are expected newest first, so equal scores keep
    /// reverse-chronological order.
    pub fn replace_all(&mut self, mut posts: Vec<Post>, users: &HashMap<String, User>) {
        join_authors(&mut posts, users);
        self.posts = self.pipeline.rank_feed(posts);
    }

    pub fn apply_change(&mut self, change: FeedChange) {
        match change {
            FeedChange::Upsert(post) => {
                match self.posts.iter_mut().find(|existing| existing.id == post.id) {
                    Some(existing) => *existing = post,
                    None => self.posts.insert(0, post),
                }
            }
            FeedChange::Remove(post_id) => self.posts.retain(|post| post.id != post_id),
        }
        self.rerank();
    }

    fn rerank(&mut self) {
        let posts = std::mem::take(&mut self.posts);
        self.posts = self.pipeline.rank_feed(posts);
    }

    pub async fn reload<S>(&mut self, store: &S) -> Result<()>
    where
        S: DocumentStore + ?Sized,
    {
        let posts = store.list_posts().await?;
        let users: HashMap<String, User> = store
            .list_users()
            .await?
            .into_iter()
            .map(|user| (user.uid.clone(), user))
            .collect();
        self.replace_all(posts, &users);
        Ok(())
    }

    /// Optimistic phase of a like toggle. The local post changes in place and
    /// keeps its position until the remote result comes back. A second toggle
    /// on the same post is refused until the first one settles.
    pub fn begin_like(
        &mut self,
        post_id: &str,
        user_id: &str,
        context: LikeContext,
    ) -> Result<LikeOperation> {
        if self.in_flight.contains(post_id) {
            return Err(PulseError::LikeInFlight(post_id.to_string()));
        }
        let post = self
            .posts
            .iter_mut()
            .find(|post| post.id == post_id)
            .ok_or_else(|| PulseError::NotFound(format!("post {}", post_id)))?;

        let toggle = toggle_like(post, user_id, context);
        *post = toggle.local;
        self.in_flight.insert(post_id.to_string());
        Ok(toggle.operation)
    }

    /// Reconciles with the remote outcome: confirmed posts replace the local
    /// copy (keeping the joined author fields) and the feed is re-ranked;
    /// failures revert the optimistic change and are passed back.
    pub fn settle_like(&mut self, operation: &LikeOperation, outcome: Result<Post>) -> Result<()> {
        self.in_flight.remove(&operation.post_id);

        match outcome {
            Ok(mut confirmed) => {
                if let Some(local) = self.posts.iter_mut().find(|post| post.id == confirmed.id) {
                    confirmed.user_name = local.user_name.clone();
                    confirmed.profile_picture = local.profile_picture.clone();
                    confirmed.user_rank = local.user_rank.clone();
                    *local = confirmed;
                    self.rerank();
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    post_id = %operation.post_id,
                    error = %err,
                    "like failed, rolling back"
                );
                if let Some(local) = self
                    .posts
                    .iter_mut()
                    .find(|post| post.id == operation.post_id)
                {
                    rollback_like(local, operation);
                }
                Err(err)
            }
        }
    }

    pub async fn toggle_like<S>(
        &mut self,
        store: &S,
        post_id: &str,
        user_id: &str,
        context: LikeContext,
    ) -> Result<()>
    where
        S: DocumentStore + ?Sized,
    {
        let operation = self.begin_like(post_id, user_id, context)?;
        let outcome = store.apply_like(&operation).await;
        self.settle_like(&operation, outcome)
    }
}

impl Default for FeedSession {
    fn default() -> Self {
        Self::new(FeedPipeline::default())
    }
}
