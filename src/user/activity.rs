use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::user::profile::User;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub daily_bonus: u64,
    pub signup_bonus: u64,
    pub decay_after_days: i64,
    /// Minutes east of UTC used to decide which calendar day an instant falls on.
    pub day_offset_minutes: i32,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            daily_bonus: 15,
            signup_bonus: 20,
            decay_after_days: 14,
            day_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    AlreadyRewarded,
    Rewarded,
    Decayed,
}

/// Calendar day of `now` as `YYYY-MM-DD` in the given offset.
pub fn calendar_day(now: DateTime<Utc>, offset_minutes: i32) -> String {
    let offset = FixedOffset::east_opt(offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset).format("%Y-%m-%d").to_string()
}

/// Session-start reward: at most one bonus per calendar day, halving after a
/// long absence.
pub fn apply_daily_activity(user: &User, now: DateTime<Utc>, config: &ActivityConfig) -> User {
    evaluate_daily_activity(user, now, config).0
}

pub fn evaluate_daily_activity(
    user: &User,
    now: DateTime<Utc>,
    config: &ActivityConfig,
) -> (User, ActivityOutcome) {
    let today = calendar_day(now, config.day_offset_minutes);
    if user.last_active_date.as_deref() == Some(today.as_str()) {
        return (user.clone(), ActivityOutcome::AlreadyRewarded);
    }

    let mut updated = user.clone();

    if let Some(last_active_at) = user.last_active_at {
        let away = now.signed_duration_since(last_active_at);
        if away >= Duration::days(config.decay_after_days) {
            updated.set_activity_score(user.activity_score / 2);
            updated.streak_days = 0;
            updated.last_active_date = Some(today);
            updated.last_active_at = Some(now);
            tracing::info!(
                uid = %user.uid,
                days_away = away.num_days(),
                from = user.activity_score,
                to = updated.activity_score,
                "activity decayed"
            );
            return (updated, ActivityOutcome::Decayed);
        }
    }

    updated.set_activity_score(user.activity_score.saturating_add(config.daily_bonus));
    updated.streak_days = user.streak_days.saturating_add(1);
    updated.last_active_date = Some(today);
    updated.last_active_at = Some(now);
    tracing::debug!(
        uid = %user.uid,
        score = updated.activity_score,
        streak = updated.streak_days,
        "daily activity rewarded"
    );
    (updated, ActivityOutcome::Rewarded)
}
