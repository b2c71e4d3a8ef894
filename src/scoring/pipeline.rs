use serde::{Deserialize, Serialize};

use crate::scoring::{FeedWeights, RankBoostConfig, RankBoostScorer, WeightedScorer};
use crate::Post;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub weights: FeedWeights,
    pub boosts: RankBoostConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredPost {
    pub post: Post,
    pub engagement_score: u64,
    pub rank_boost: u64,
    pub score: u64,
}

#[derive(Debug, Clone)]
pub struct FeedPipeline {
    weighted_scorer: WeightedScorer,
    boost_scorer: RankBoostScorer,
}

impl Default for FeedPipeline {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}

impl FeedPipeline {
    pub fn new(weighted_scorer: WeightedScorer, boost_scorer: RankBoostScorer) -> Self {
        Self {
            weighted_scorer,
            boost_scorer,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            WeightedScorer::new(config.weights.clone()),
            RankBoostScorer::new(config.boosts.clone()),
        )
    }

    pub fn score(&self, post: &Post) -> u64 {
        self.weighted_scorer
            .score(post)
            .saturating_add(self.boost_scorer.boost(post.user_rank.as_deref()))
    }

    pub fn score_post(&self, post: Post) -> ScoredPost {
        let engagement_score = self.weighted_scorer.score(&post);
        let rank_boost = self.boost_scorer.boost(post.user_rank.as_deref());
        ScoredPost {
            post,
            engagement_score,
            rank_boost,
            score: engagement_score.saturating_add(rank_boost),
        }
    }

    /// Scores every post and orders by descending score. The sort is stable:
    /// equal scores keep their input order, which is newest first when posts
    /// come straight from the store.
    pub fn rank(&self, posts: Vec<Post>) -> Vec<ScoredPost> {
        let mut scored: Vec<ScoredPost> = posts
            .into_iter()
            .map(|post| self.score_post(post))
            .collect();
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored
    }

    pub fn rank_feed(&self, posts: Vec<Post>) -> Vec<Post> {
        self.rank(posts).into_iter().map(|scored| scored.post).collect()
    }
}
