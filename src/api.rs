use pulse_feed::engagement::LikeContext;
use pulse_feed::scoring::ScoredPost;
use pulse_feed::text::{extract_mentions, parse_text, Segment};
use pulse_feed::validation::{MediaAttachment, PostDraft};
use pulse_feed::user::ActivityOutcome;
use pulse_feed::{MediaType, Post, User, ValidationErrors};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiFeedEntry {
    pub score: u64,
    pub engagement_score: u64,
    pub rank_boost: u64,
    /// Post text split for rendering hashtag, mention and link segments.
    pub segments: Vec<Segment>,
    pub mentions: Vec<String>,
    pub post: Post,
}

impl From<ScoredPost> for ApiFeedEntry {
    fn from(scored: ScoredPost) -> Self {
        Self {
            score: scored.score,
            engagement_score: scored.engagement_score,
            rank_boost: scored.rank_boost,
            segments: parse_text(&scored.post.content),
            mentions: extract_mentions(&scored.post.content),
            post: scored.post,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiCreatePostRequest {
    pub user_id: String,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub media_size_bytes: Option<u64>,
}

impl ApiCreatePostRequest {
    /// Media arrives already uploaded, so the draft only carries its kind and
    /// reported size.
    pub fn into_draft(self) -> Result<(String, PostDraft, Option<String>), ValidationErrors> {
        let media = match (&self.media_url, self.media_type.as_deref()) {
            (Some(_), Some(kind)) => match MediaType::from_str(kind) {
                Some(kind) => Some(MediaAttachment {
                    kind,
                    size_bytes: self.media_size_bytes.unwrap_or(0),
                }),
                None => {
                    let mut errors = ValidationErrors::new();
                    errors.add("media_type", format!("invalid media type: {}", kind));
                    return Err(errors);
                }
            },
            (Some(_), None) => {
                let mut errors = ValidationErrors::new();
                errors.add("media_type", "required when media_url is set");
                return Err(errors);
            }
            _ => None,
        };

        let draft = PostDraft {
            text: self.text.unwrap_or_default(),
            media,
        };
        Ok((self.user_id, draft, self.media_url))
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiLikeRequest {
    pub user_id: String,
    pub context: Option<LikeContext>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommentRequest {
    pub user_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiFollowRequest {
    pub target: String,
    pub follow: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ApiCheckinResponse {
    pub outcome: &'static str,
    pub user: User,
}

impl ApiCheckinResponse {
    pub fn new(outcome: ActivityOutcome, user: User) -> Self {
        let outcome = match outcome {
            ActivityOutcome::AlreadyRewarded => "already_rewarded",
            ActivityOutcome::Rewarded => "rewarded",
            ActivityOutcome::Decayed => "decayed",
        };
        Self { outcome, user }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ValidationErrors>,
}
