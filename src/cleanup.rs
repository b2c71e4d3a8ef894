use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::DocumentStore;
use crate::Post;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_minutes: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
        }
    }
}

pub fn is_media_expired(post: &Post, now: DateTime<Utc>) -> bool {
    post.media_expires_at
        .map(|expires_at| expires_at <= now)
        .unwrap_or(false)
}

/// Clears media fields on every post whose media has expired and returns the
/// ids that were touched.
pub fn clear_expired_media<'a>(
    posts: impl IntoIterator<Item = &'a mut Post>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut cleared = Vec::new();
    for post in posts {
        if is_media_expired(post, now) {
            post.media_url = None;
            post.media_type = None;
            post.media_expires_at = None;
            cleared.push(post.id.clone());
        }
    }
    cleared
}

pub async fn run_cleanup_once<S>(store: &S, now: DateTime<Utc>) -> Result<Vec<String>>
where
    S: DocumentStore + ?Sized,
{
    let cleared = store.clear_expired_media(now).await?;
    if !cleared.is_empty() {
        tracing::info!(count = cleared.len(), "expired media links removed");
    }
    Ok(cleared)
}

/// Runs the cleanup on a fixed interval until the task is dropped. Failures
/// are logged and the next tick retries.
pub async fn run_cleanup_schedule<S>(store: &S, config: &CleanupConfig)
where
    S: DocumentStore + ?Sized,
{
    let period = Duration::from_secs(config.interval_minutes.max(1) * 60);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = run_cleanup_once(store, Utc::now()).await {
            tracing::error!(error = %err, "media cleanup failed");
        }
    }
}
