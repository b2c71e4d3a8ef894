use serde::{Deserialize, Serialize};

use crate::Rank;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankBoostConfig {
    pub pulse_legend: u64,
    pub influencer: u64,
    pub rising_star: u64,
}

impl Default for RankBoostConfig {
    fn default() -> Self {
        Self {
            pulse_legend: 20,
            influencer: 10,
            rising_star: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankBoostScorer {
    config: RankBoostConfig,
}

impl RankBoostScorer {
    pub fn new(config: RankBoostConfig) -> Self {
        Self { config }
    }

    /// Boost for a poster rank label. Labels match by containment so
    /// decorated labels like "Pulse Legend ⭐" boost the same as the bare name.
    pub fn boost(&self, user_rank: Option<&str>) -> u64 {
        match user_rank.and_then(Rank::from_label) {
            Some(Rank::PulseLegend) => self.config.pulse_legend,
            Some(Rank::Influencer) => self.config.influencer,
            Some(Rank::RisingStar) => self.config.rising_star,
            _ => 0,
        }
    }
}
