pub mod boost;
pub mod pipeline;
pub mod weighted;

pub use boost::{RankBoostConfig, RankBoostScorer};
pub use pipeline::{FeedConfig, FeedPipeline, ScoredPost};
pub use weighted::{FeedWeights, WeightedScorer};

use crate::Post;

/// Ranks posts with the default weights and boosts.
pub fn rank_feed(posts: Vec<Post>) -> Vec<Post> {
    FeedPipeline::default().rank_feed(posts)
}
