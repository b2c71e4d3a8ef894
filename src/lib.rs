pub mod browse;
pub mod cleanup;
pub mod config;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod media;
pub mod post;
pub mod scoring;
pub mod store;
pub mod text;
pub mod user;
pub mod validation;

use serde::{Deserialize, Serialize};

pub use error::{PulseError, Result, ValidationErrors};
pub use post::{Comment, Post};
pub use user::User;

/// Five-tier reputation label derived from a user's activity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    NewMember,
    Active,
    RisingStar,
    Influencer,
    PulseLegend,
}

impl Rank {
    const HIGHEST_FIRST: [Rank; 5] = [
        Rank::PulseLegend,
        Rank::Influencer,
        Rank::RisingStar,
        Rank::Active,
        Rank::NewMember,
    ];

    pub fn from_score(score: u64) -> Self {
        if score >= 5000 {
            Rank::PulseLegend
        } else if score >= 1000 {
            Rank::Influencer
        } else if score >= 250 {
            Rank::RisingStar
        } else if score >= 50 {
            Rank::Active
        } else {
            Rank::NewMember
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Rank::NewMember => "New Member",
            Rank::Active => "Active",
            Rank::RisingStar => "Rising Star",
            Rank::Influencer => "Influencer",
            Rank::PulseLegend => "Pulse Legend",
        }
    }

    /// The decorated label written to user documents.
    pub fn label(self) -> &'static str {
        match self {
            Rank::NewMember => "New Member 🟢",
            Rank::Active => "Active 🔹",
            Rank::RisingStar => "Rising Star 🔆",
            Rank::Influencer => "Influencer 💫",
            Rank::PulseLegend => "Pulse Legend ⭐",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Rank::RisingStar => "Rising",
            other => other.name(),
        }
    }

    /// Recovers a rank from a stored label by substring containment, so
    /// decorative suffixes and older label variants still match.
    pub fn from_label(label: &str) -> Option<Self> {
        Rank::HIGHEST_FIRST
            .into_iter()
            .find(|rank| label.contains(rank.marker()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    /// Accepts short names and MIME types (`video/mp4`).
    pub fn from_str(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        let head = lower.split('/').next().unwrap_or_default();
        match head {
            "image" | "photo" | "pic" => Some(MediaType::Image),
            "video" | "vid" => Some(MediaType::Video),
            "audio" | "voice" => Some(MediaType::Audio),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }

    /// Resource kind expected by the upload endpoint.
    pub fn resource_type(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "raw",
        }
    }
}

pub fn format_number(value: u64) -> String {
    let mut chars: Vec<char> = value.to_string().chars().collect();
    let mut result = String::new();
    let mut count = 0usize;

    while let Some(ch) = chars.pop() {
        if count == 3 {
            result.push(',');
            count = 0;
        }
        result.push(ch);
        count += 1;
    }

    result.chars().rev().collect()
}
