use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::DocumentStore;
use crate::user::User;
use crate::validation::validate_comment;
use crate::{Comment, Post};

pub const TEMP_COMMENT_PREFIX: &str = "temp-";

/// Where a like was issued. Likes from the feed also move the poster's
/// activity score; likes on the single-post page only count toward
/// `likes_received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeContext {
    Feed,
    PostPage,
}

impl LikeContext {
    pub fn activity_points_per_like(self) -> i64 {
        match self {
            LikeContext::Feed => 2,
            LikeContext::PostPage => 0,
        }
    }
}

/// Remote half of a like toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOperation {
    pub post_id: String,
    pub user_id: String,
    pub owner_id: String,
    /// +1 for a like, -1 for an unlike.
    pub delta: i64,
    pub owner_activity_delta: i64,
}

impl LikeOperation {
    pub fn is_like(&self) -> bool {
        self.delta > 0
    }
}

#[derive(Debug, Clone)]
pub struct LikeToggle {
    pub local: Post,
    pub operation: LikeOperation,
}

/// Computes the optimistic post and the remote operation for a like toggle.
pub fn toggle_like(post: &Post, user_id: &str, context: LikeContext) -> LikeToggle {
    let was_liked = post.is_liked_by(user_id);
    let delta: i64 = if was_liked { -1 } else { 1 };

    let mut local = post.clone();
    set_liked(&mut local, user_id, !was_liked);

    LikeToggle {
        local,
        operation: LikeOperation {
            post_id: post.id.clone(),
            user_id: user_id.to_string(),
            owner_id: post.user_id.clone(),
            delta,
            owner_activity_delta: delta * context.activity_points_per_like(),
        },
    }
}

/// Undoes an optimistic toggle on whatever the post looks like now.
pub fn rollback_like(post: &mut Post, operation: &LikeOperation) {
    set_liked(post, &operation.user_id, !operation.is_like());
}

/// Adds or removes `user_id` from the likers and moves the counter only when
/// membership actually changed, so `likes` tracks `likes_users`.
pub fn set_liked(post: &mut Post, user_id: &str, liked: bool) -> bool {
    let present = post.is_liked_by(user_id);
    if liked && !present {
        post.likes_users.push(user_id.to_string());
        post.likes = post.likes.saturating_add(1);
        true
    } else if !liked && present {
        post.likes_users.retain(|id| id != user_id);
        post.likes = post.likes.saturating_sub(1);
        true
    } else {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentAuthor {
    pub user_id: String,
    pub user_name: String,
    pub profile_picture: Option<String>,
}

impl CommentAuthor {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.uid.clone(),
            user_name: user.name().to_string(),
            profile_picture: user.profile_picture.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingComment {
    pub temp_id: String,
    pub draft: String,
}

/// A post's comment list as shown on the post page, with optimistic
/// inserts tracked by temporary ids.
#[derive(Debug, Clone)]
pub struct CommentThread {
    pub post: Post,
    pub comments: Vec<Comment>,
}

impl CommentThread {
    pub fn new(post: Post, comments: Vec<Comment>) -> Self {
        Self { post, comments }
    }

    pub fn begin_comment(
        &mut self,
        author: &CommentAuthor,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<(PendingComment, Comment)> {
        let content = validate_comment(content)?;
        let temp_id = format!("{}{}", TEMP_COMMENT_PREFIX, now.timestamp_millis());
        let comment = Comment {
            id: temp_id.clone(),
            post_id: self.post.id.clone(),
            user_id: author.user_id.clone(),
            user_name: author.user_name.clone(),
            profile_picture: author.profile_picture.clone(),
            content: content.clone(),
            created_at: now,
        };
        self.comments.push(comment.clone());
        self.post.comments_count = self.post.comments_count.saturating_add(1);
        Ok((
            PendingComment {
                temp_id,
                draft: content,
            },
            comment,
        ))
    }

    pub fn confirm_comment(&mut self, pending: &PendingComment, stored: Comment) {
        if let Some(slot) = self
            .comments
            .iter_mut()
            .find(|comment| comment.id == pending.temp_id)
        {
            *slot = stored;
        }
    }

    /// Drops the optimistic comment and hands back the draft text.
    pub fn rollback_comment(&mut self, pending: PendingComment) -> String {
        let before = self.comments.len();
        self.comments.retain(|comment| comment.id != pending.temp_id);
        if self.comments.len() != before {
            self.post.comments_count = self.post.comments_count.saturating_sub(1);
        }
        pending.draft
    }

    pub async fn submit_comment<S>(
        &mut self,
        store: &S,
        author: &CommentAuthor,
        content: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<Comment, (crate::PulseError, String)>
    where
        S: DocumentStore + ?Sized,
    {
        let (pending, comment) = self
            .begin_comment(author, content, now)
            .map_err(|err| (err, content.to_string()))?;

        match store.add_comment(comment).await {
            Ok(stored) => {
                self.confirm_comment(&pending, stored.clone());
                Ok(stored)
            }
            Err(err) => {
                tracing::warn!(post_id = %self.post.id, error = %err, "comment failed, rolling back");
                let draft = self.rollback_comment(pending);
                Err((err, draft))
            }
        }
    }

    pub async fn delete_comment<S>(&mut self, store: &S, comment_id: &str) -> Result<()>
    where
        S: DocumentStore + ?Sized,
    {
        store.delete_comment(&self.post.id, comment_id).await?;
        let before = self.comments.len();
        self.comments.retain(|comment| comment.id != comment_id);
        if self.comments.len() != before {
            self.post.comments_count = self.post.comments_count.saturating_sub(1);
        }
        Ok(())
    }
}
