use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::cleanup::clear_expired_media;
use crate::engagement::{set_liked, LikeOperation};
use crate::error::{PulseError, Result, ValidationErrors};
use crate::user::profile::apply_delta;
use crate::validation::ProfileEdit;
use crate::{Comment, Post, User};

const DOCUMENT_ID_LEN: usize = 20;

pub fn new_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    PostChanged { post_id: String },
    PostRemoved { post_id: String },
    UserChanged { uid: String },
    MediaCleared { post_ids: Vec<String> },
}

/// The document-store operations the app relies on: point reads, atomic
/// counter updates, set add/remove on likers and batched writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Posts newest first.
    async fn list_posts(&self) -> Result<Vec<Post>>;
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>>;
    async fn insert_post(&self, post: Post) -> Result<Post>;
    async fn delete_post(&self, post_id: &str, requester: &str) -> Result<()>;
    /// Applies a like toggle to the post and its owner in one write. Returns
    /// the post as stored.
    async fn apply_like(&self, operation: &LikeOperation) -> Result<Post>;
    /// Stores a comment under a fresh id and bumps the post's comment count.
    async fn add_comment(&self, comment: Comment) -> Result<Comment>;
    async fn delete_comment(&self, post_id: &str, comment_id: &str) -> Result<()>;
    /// Comments oldest first.
    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>>;
    async fn get_user(&self, uid: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn put_user(&self, user: User) -> Result<User>;
    /// Validates and applies a profile edit; usernames stay unique.
    async fn update_profile(&self, uid: &str, edit: &ProfileEdit) -> Result<User>;
    /// Returns whether anything changed.
    async fn set_follow(&self, follower: &str, target: &str, follow: bool) -> Result<bool>;
    /// Users following `uid`.
    async fn list_followers(&self, uid: &str) -> Result<Vec<User>>;
    /// Users `uid` follows.
    async fn list_following(&self, uid: &str) -> Result<Vec<User>>;
    /// Clears media on every expired post in one batch; returns their ids.
    async fn clear_expired_media(&self, now: DateTime<Utc>) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct FollowEdge {
    follower: String,
    target: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    users: BTreeMap<String, User>,
    #[serde(default)]
    posts: BTreeMap<String, Post>,
    #[serde(default)]
    comments: BTreeMap<String, Vec<Comment>>,
    #[serde(default)]
    follows: BTreeSet<FollowEdge>,
}

impl StoreData {
    fn users_where<F>(&self, mut edge_match: F) -> Vec<User>
    where
        F: FnMut(&FollowEdge) -> Option<&str>,
    {
        self.follows
            .iter()
            .filter_map(|edge| edge_match(edge))
            .filter_map(|uid| self.users.get(uid).cloned())
            .collect()
    }
}

/// Single-file JSON document store. Writes are staged on a copy of the
/// documents and only become visible once they are on disk; change events go
/// out afterwards.
pub struct JsonStore {
    path: PathBuf,
    data: RwLock<StoreData>,
    changes: broadcast::Sender<StoreEvent>,
}

impl JsonStore {
    pub async fn load(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let raw = tokio::fs::read_to_string(&path).await?;
            if raw.trim().is_empty() {
                StoreData::default()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            StoreData::default()
        };
        for post in data.posts.values_mut() {
            if post.normalize_likes() {
                tracing::warn!(post_id = %post.id, "duplicate likers removed on load");
            }
        }
        tracing::debug!(
            path = %path.display(),
            users = data.users.len(),
            posts = data.posts.len(),
            "store loaded"
        );

        let (changes, _) = broadcast::channel(64);
        Ok(Self {
            path,
            data: RwLock::new(data),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.changes.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        let _ = self.changes.send(event);
    }

    async fn persist(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent).await?;
        }
        let payload = serde_json::to_string_pretty(data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, payload).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        tracing::debug!(path = %self.path.display(), "store persisted");
        Ok(())
    }

    /// Runs `change` against a staged copy of the documents. The copy replaces
    /// the live data only when `change` reports a modification and the write
    /// to disk succeeds; on any error the live data is untouched.
    async fn commit<T, F>(&self, change: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut StoreData) -> Result<(T, bool)> + Send,
    {
        let mut guard = self.data.write().await;
        let mut staged = guard.clone();
        let (value, changed) = change(&mut staged)?;
        if changed {
            self.persist(&staged).await?;
            *guard = staged;
        }
        Ok(value)
    }
}

#[async_trait]
impl DocumentStore for JsonStore {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        let guard = self.data.read().await;
        let mut posts: Vec<Post> = guard.posts.values().cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let guard = self.data.read().await;
        Ok(guard.posts.get(post_id).cloned())
    }

    async fn insert_post(&self, post: Post) -> Result<Post> {
        let post = self
            .commit(|data| {
                if let Some(author) = data.users.get_mut(&post.user_id) {
                    author.posts_count = author.posts_count.saturating_add(1);
                }
                data.posts.insert(post.id.clone(), post.clone());
                Ok((post, true))
            })
            .await?;

        self.notify(StoreEvent::PostChanged {
            post_id: post.id.clone(),
        });
        Ok(post)
    }

    async fn delete_post(&self, post_id: &str, requester: &str) -> Result<()> {
        self.commit(|data| {
            let owner = data
                .posts
                .get(post_id)
                .map(|post| post.user_id.clone())
                .ok_or_else(|| PulseError::NotFound(format!("post {}", post_id)))?;
            if owner != requester {
                return Err(PulseError::Forbidden(format!(
                    "post {} can only be deleted by its owner",
                    post_id
                )));
            }
            data.posts.remove(post_id);
            data.comments.remove(post_id);
            if let Some(author) = data.users.get_mut(&owner) {
                author.posts_count = author.posts_count.saturating_sub(1);
            }
            Ok(((), true))
        })
        .await?;

        self.notify(StoreEvent::PostRemoved {
            post_id: post_id.to_string(),
        });
        Ok(())
    }

    async fn apply_like(&self, operation: &LikeOperation) -> Result<Post> {
        let (stored, changed) = self
            .commit(|data| {
                let post = data
                    .posts
                    .get_mut(&operation.post_id)
                    .ok_or_else(|| PulseError::NotFound(format!("post {}", operation.post_id)))?;
                let changed = set_liked(post, &operation.user_id, operation.is_like());
                let stored = post.clone();

                if changed {
                    if let Some(owner) = data.users.get_mut(&operation.owner_id) {
                        owner.likes_received = apply_delta(owner.likes_received, operation.delta);
                        if operation.owner_activity_delta != 0 {
                            owner.adjust_activity_score(operation.owner_activity_delta);
                        }
                    }
                }
                Ok(((stored, changed), changed))
            })
            .await?;

        if changed {
            self.notify(StoreEvent::PostChanged {
                post_id: operation.post_id.clone(),
            });
            self.notify(StoreEvent::UserChanged {
                uid: operation.owner_id.clone(),
            });
        }
        Ok(stored)
    }

    async fn add_comment(&self, mut comment: Comment) -> Result<Comment> {
        comment.id = new_document_id();
        let comment = self
            .commit(|data| {
                let post = data
                    .posts
                    .get_mut(&comment.post_id)
                    .ok_or_else(|| PulseError::NotFound(format!("post {}", comment.post_id)))?;
                post.comments_count = post.comments_count.saturating_add(1);
                data.comments
                    .entry(comment.post_id.clone())
                    .or_default()
                    .push(comment.clone());
                Ok((comment, true))
            })
            .await?;

        self.notify(StoreEvent::PostChanged {
            post_id: comment.post_id.clone(),
        });
        Ok(comment)
    }

    async fn delete_comment(&self, post_id: &str, comment_id: &str) -> Result<()> {
        self.commit(|data| {
            let comments = data
                .comments
                .get_mut(post_id)
                .ok_or_else(|| PulseError::NotFound(format!("comments of post {}", post_id)))?;
            let before = comments.len();
            comments.retain(|comment| comment.id != comment_id);
            if comments.len() == before {
                return Err(PulseError::NotFound(format!("comment {}", comment_id)));
            }
            if let Some(post) = data.posts.get_mut(post_id) {
                post.comments_count = post.comments_count.saturating_sub(1);
            }
            Ok(((), true))
        })
        .await?;

        self.notify(StoreEvent::PostChanged {
            post_id: post_id.to_string(),
        });
        Ok(())
    }

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let guard = self.data.read().await;
        let mut comments = guard.comments.get(post_id).cloned().unwrap_or_default();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        let guard = self.data.read().await;
        Ok(guard.users.get(uid).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let guard = self.data.read().await;
        Ok(guard.users.values().cloned().collect())
    }

    async fn put_user(&self, user: User) -> Result<User> {
        let user = self
            .commit(|data| {
                data.users.insert(user.uid.clone(), user.clone());
                Ok((user, true))
            })
            .await?;

        self.notify(StoreEvent::UserChanged {
            uid: user.uid.clone(),
        });
        Ok(user)
    }

    async fn update_profile(&self, uid: &str, edit: &ProfileEdit) -> Result<User> {
        edit.validate()?;
        if edit.is_empty() {
            let mut errors = ValidationErrors::new();
            errors.add("profile", "No changes to save");
            return Err(errors.into());
        }

        let user = self
            .commit(|data| {
                if let Some(username) = edit.normalized_username() {
                    let taken = data
                        .users
                        .values()
                        .any(|other| other.uid != uid && other.username == username);
                    if taken {
                        let mut errors = ValidationErrors::new();
                        errors.add("username", "Username is already taken");
                        return Err(errors.into());
                    }
                }
                let user = data
                    .users
                    .get_mut(uid)
                    .ok_or_else(|| PulseError::NotFound(format!("user {}", uid)))?;
                user.apply_profile_edit(edit);
                Ok((user.clone(), true))
            })
            .await?;

        self.notify(StoreEvent::UserChanged {
            uid: uid.to_string(),
        });
        Ok(user)
    }

    async fn set_follow(&self, follower: &str, target: &str, follow: bool) -> Result<bool> {
        if follower == target {
            return Err(PulseError::Forbidden(
                "users cannot follow themselves".to_string(),
            ));
        }
        let changed = self
            .commit(|data| {
                for uid in [follower, target] {
                    if !data.users.contains_key(uid) {
                        return Err(PulseError::NotFound(format!("user {}", uid)));
                    }
                }

                let edge = FollowEdge {
                    follower: follower.to_string(),
                    target: target.to_string(),
                };
                let changed = if follow {
                    data.follows.insert(edge)
                } else {
                    data.follows.remove(&edge)
                };
                if changed {
                    let delta = if follow { 1 } else { -1 };
                    if let Some(user) = data.users.get_mut(target) {
                        user.followers_count = apply_delta(user.followers_count, delta);
                    }
                    if let Some(user) = data.users.get_mut(follower) {
                        user.following_count = apply_delta(user.following_count, delta);
                    }
                }
                Ok((changed, changed))
            })
            .await?;

        if changed {
            self.notify(StoreEvent::UserChanged {
                uid: target.to_string(),
            });
            self.notify(StoreEvent::UserChanged {
                uid: follower.to_string(),
            });
        }
        Ok(changed)
    }

    async fn list_followers(&self, uid: &str) -> Result<Vec<User>> {
        let guard = self.data.read().await;
        Ok(guard.users_where(|edge| (edge.target == uid).then_some(edge.follower.as_str())))
    }

    async fn list_following(&self, uid: &str) -> Result<Vec<User>> {
        let guard = self.data.read().await;
        Ok(guard.users_where(|edge| (edge.follower == uid).then_some(edge.target.as_str())))
    }

    async fn clear_expired_media(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let cleared = self
            .commit(|data| {
                let cleared = clear_expired_media(data.posts.values_mut(), now);
                let changed = !cleared.is_empty();
                Ok((cleared, changed))
            })
            .await?;

        if !cleared.is_empty() {
            self.notify(StoreEvent::MediaCleared {
                post_ids: cleared.clone(),
            });
        }
        Ok(cleared)
    }
}

async fn ensure_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_are_alphanumeric() {
        let id = new_document_id();
        assert_eq!(id.len(), DOCUMENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_document_id());
    }
}
