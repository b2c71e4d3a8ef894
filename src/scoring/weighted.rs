use serde::{Deserialize, Serialize};

use crate::Post;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedWeights {
    pub like: u64,
    pub comment: u64,
}

impl Default for FeedWeights {
    fn default() -> Self {
        Self {
            like: 2,
            comment: 1,
        }
    }
}

/// Engagement part of the feed score.
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    weights: FeedWeights,
}

impl WeightedScorer {
    pub fn new(weights: FeedWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, post: &Post) -> u64 {
        post.likes
            .saturating_mul(self.weights.like)
            .saturating_add(post.comments_count.saturating_mul(self.weights.comment))
    }
}
