use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::text::extract_hashtags;
use crate::user::{User, ANONYMOUS};
use crate::validation::PostDraft;
use crate::MediaType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub media_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub likes_users: Vec<String>,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub views: u64,
    /// Poster's rank label as last joined from the users collection. Feed
    /// scoring reads it as-is, so it can lag behind the poster's live rank.
    #[serde(default)]
    pub user_rank: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Builds a new post from a validated draft. `media_url` is the durable
    /// URL returned by the upload endpoint, if the draft carried media.
    pub fn from_draft(
        id: String,
        author: &User,
        draft: &PostDraft,
        media_url: Option<String>,
        media_retention: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Self {
        let content = draft.text.trim().to_string();
        let media_type = media_url.as_ref().and(draft.media.as_ref().map(|m| m.kind));
        let media_expires_at = match (&media_url, media_retention) {
            (Some(_), Some(retention)) => Some(now + retention),
            _ => None,
        };
        Self {
            id,
            user_id: author.uid.clone(),
            user_name: author.name().to_string(),
            profile_picture: author.profile_picture.clone(),
            hashtags: extract_hashtags(&content),
            content,
            media_url,
            media_type,
            media_expires_at,
            likes: 0,
            likes_users: Vec::new(),
            comments_count: 0,
            views: 0,
            user_rank: Some(author.rank.clone()),
            created_at: now,
        }
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes_users.iter().any(|id| id == user_id)
    }

    /// Drops repeated likers and realigns `likes` with the remaining set.
    /// Returns whether the document needed fixing.
    pub fn normalize_likes(&mut self) -> bool {
        let mut seen = HashSet::new();
        let before = self.likes_users.len();
        self.likes_users.retain(|id| seen.insert(id.clone()));
        let count = self.likes_users.len() as u64;
        let fixed = self.likes_users.len() != before || self.likes != count;
        self.likes = count;
        fixed
    }

    pub fn is_video(&self) -> bool {
        matches!(self.media_type, Some(MediaType::Video)) && self.media_url.is_some()
    }

    /// Refreshes the denormalized author fields from the users collection.
    /// A missing author keeps the stored name (or "Anonymous") and drops the
    /// rank snapshot.
    pub fn join_author(&mut self, author: Option<&User>) {
        match author {
            Some(user) => {
                self.user_name = user.name().to_string();
                self.profile_picture = user.profile_picture.clone();
                self.user_rank = Some(user.rank.clone());
            }
            None => {
                if self.user_name.trim().is_empty() {
                    self.user_name = ANONYMOUS.to_string();
                }
                self.user_rank = None;
            }
        }
    }
}

pub fn join_authors(posts: &mut [Post], users: &HashMap<String, User>) {
    for post in posts.iter_mut() {
        post.join_author(users.get(&post.user_id));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_pending(&self) -> bool {
        self.id.starts_with(crate::engagement::TEMP_COMMENT_PREFIX)
    }
}
