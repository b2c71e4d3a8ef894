use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::activity::{calendar_day, ActivityConfig};
use crate::validation::{ProfileEdit, SignupForm};
use crate::Rank;

pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub username: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub posts_count: u64,
    #[serde(default)]
    pub likes_received: u64,
    #[serde(default)]
    pub activity_score: u64,
    #[serde(default = "default_rank_label")]
    pub rank: String,
    #[serde(default)]
    pub streak_days: u32,
    #[serde(default)]
    pub last_active_date: Option<String>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn default_rank_label() -> String {
    Rank::NewMember.label().to_string()
}

impl User {
    /// Builds the account document written right after sign-up. The form is
    /// expected to have passed `SignupForm::validate`.
    pub fn new_member(
        uid: String,
        form: &SignupForm,
        profile_picture: Option<String>,
        now: DateTime<Utc>,
        config: &ActivityConfig,
    ) -> Self {
        let username = form.username.trim().to_string();
        let mut user = Self {
            uid,
            display_name: username.clone(),
            username,
            email: form.normalized_email(),
            phone: form.normalized_phone(),
            profile_picture,
            bio: String::new(),
            followers_count: 0,
            following_count: 0,
            posts_count: 0,
            likes_received: 0,
            activity_score: 0,
            rank: String::new(),
            streak_days: 1,
            last_active_date: Some(calendar_day(now, config.day_offset_minutes)),
            last_active_at: Some(now),
            created_at: now,
        };
        user.set_activity_score(config.signup_bonus);
        user
    }

    /// The only way activity score changes; keeps `rank` in step with it.
    pub fn set_activity_score(&mut self, score: u64) {
        self.activity_score = score;
        self.rank = Rank::from_score(score).label().to_string();
    }

    pub fn adjust_activity_score(&mut self, delta: i64) {
        let score = apply_delta(self.activity_score, delta);
        self.set_activity_score(score);
    }

    /// Applies the fields present in a validated edit. Blank display names are
    /// ignored.
    pub fn apply_profile_edit(&mut self, edit: &ProfileEdit) {
        if let Some(name) = edit.display_name.as_deref().map(str::trim) {
            if !name.is_empty() {
                self.display_name = name.to_string();
            }
        }
        if let Some(username) = edit.normalized_username() {
            self.username = username;
        }
        if let Some(bio) = &edit.bio {
            self.bio = bio.trim().to_string();
        }
        if let Some(picture) = &edit.profile_picture {
            self.profile_picture = Some(picture.clone());
        }
    }

    pub fn current_rank(&self) -> Rank {
        Rank::from_score(self.activity_score)
    }

    pub fn name(&self) -> &str {
        if !self.display_name.trim().is_empty() {
            &self.display_name
        } else if !self.username.trim().is_empty() {
            &self.username
        } else {
            ANONYMOUS
        }
    }
}

pub(crate) fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form() -> SignupForm {
        SignupForm {
            username: "  nova ".to_string(),
            email: " Nova@Example.COM ".to_string(),
            phone: "555 123-4567".to_string(),
            password: "hunter2hunter2".to_string(),
            confirm_password: "hunter2hunter2".to_string(),
            terms_accepted: true,
        }
    }

    #[test]
    fn new_member_gets_signup_grant() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let user = User::new_member(
            "u1".to_string(),
            &form(),
            None,
            now,
            &ActivityConfig::default(),
        );

        assert_eq!(user.activity_score, 20);
        assert_eq!(user.rank, Rank::NewMember.label());
        assert_eq!(user.streak_days, 1);
        assert_eq!(user.username, "nova");
        assert_eq!(user.display_name, "nova");
        assert_eq!(user.email, "nova@example.com");
        assert_eq!(user.phone.as_deref(), Some("+5551234567"));
        assert_eq!(user.last_active_date.as_deref(), Some("2026-03-01"));
        assert_eq!(user.last_active_at, Some(now));
    }

    #[test]
    fn adjusting_score_recomputes_rank_and_clamps() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let mut user = User::new_member(
            "u1".to_string(),
            &form(),
            None,
            now,
            &ActivityConfig::default(),
        );

        user.adjust_activity_score(30);
        assert_eq!(user.activity_score, 50);
        assert_eq!(user.rank, Rank::Active.label());

        user.adjust_activity_score(-500);
        assert_eq!(user.activity_score, 0);
        assert_eq!(user.rank, Rank::NewMember.label());
    }

    #[test]
    fn name_falls_back_to_anonymous() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let mut user = User::new_member(
            "u1".to_string(),
            &form(),
            None,
            now,
            &ActivityConfig::default(),
        );
        user.display_name.clear();
        assert_eq!(user.name(), "nova");
        user.username.clear();
        assert_eq!(user.name(), ANONYMOUS);
    }

    #[test]
    fn profile_edit_touches_only_given_fields() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let mut user = User::new_member(
            "u1".to_string(),
            &form(),
            None,
            now,
            &ActivityConfig::default(),
        );
        user.apply_profile_edit(&ProfileEdit {
            display_name: Some("   ".to_string()),
            username: Some(" Nova_X ".to_string()),
            bio: Some(" builder of things ".to_string()),
            profile_picture: None,
        });

        assert_eq!(user.display_name, "nova");
        assert_eq!(user.username, "nova_x");
        assert_eq!(user.bio, "builder of things");
        assert_eq!(user.profile_picture, None);
        assert_eq!(user.activity_score, 20);
    }
}
