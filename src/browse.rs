use serde::Serialize;

use crate::{Post, User};

/// Video posts newest first. When `focus` names one of them it is moved to
/// the front so a shared reel link opens on that video.
pub fn reels(posts: &[Post], focus: Option<&str>) -> Vec<Post> {
    let mut videos: Vec<Post> = posts.iter().filter(|post| post.is_video()).cloned().collect();
    videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if let Some(focus) = focus {
        if let Some(index) = videos.iter().position(|post| post.id == focus) {
            let selected = videos.remove(index);
            videos.insert(0, selected);
        }
    }
    videos
}

pub fn tag_posts(posts: &[Post], tag: &str) -> Vec<Post> {
    let tag = tag.trim_start_matches('#');
    let mut tagged: Vec<Post> = posts
        .iter()
        .filter(|post| post.hashtags.iter().any(|candidate| candidate == tag))
        .cloned()
        .collect();
    tagged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    tagged
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub users: Vec<User>,
    pub posts: Vec<Post>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.posts.is_empty()
    }
}

/// Case-insensitive substring search over usernames and post text.
pub fn search(users: &[User], posts: &[Post], query: &str) -> SearchResults {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return SearchResults::default();
    }

    SearchResults {
        users: users
            .iter()
            .filter(|user| user.username.to_lowercase().contains(&needle))
            .cloned()
            .collect(),
        posts: posts
            .iter()
            .filter(|post| post.content.to_lowercase().contains(&needle))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::ActivityConfig;
    use crate::validation::SignupForm;
    use crate::MediaType;
    use chrono::{Duration, TimeZone, Utc};

    fn post(id: &str, content: &str, video: bool, minutes_ago: i64) -> Post {
        let base = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        Post {
            id: id.to_string(),
            user_id: "u".to_string(),
            user_name: "U".to_string(),
            profile_picture: None,
            content: content.to_string(),
            media_url: video.then(|| format!("https://cdn.example/{}.mp4", id)),
            media_type: video.then_some(MediaType::Video),
            media_expires_at: None,
            hashtags: crate::text::extract_hashtags(content),
            likes: 0,
            likes_users: Vec::new(),
            comments_count: 0,
            views: 0,
            user_rank: None,
            created_at: base - Duration::minutes(minutes_ago),
        }
    }

    fn user(username: &str) -> User {
        let form = SignupForm {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            ..SignupForm::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        User::new_member(username.to_string(), &form, None, now, &ActivityConfig::default())
    }

    #[test]
    fn reels_are_videos_newest_first_with_focus() {
        let posts = vec![
            post("old", "", true, 30),
            post("text", "", false, 0),
            post("new", "", true, 1),
            post("mid", "", true, 10),
        ];

        let ids: Vec<String> = reels(&posts, None).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let ids: Vec<String> = reels(&posts, Some("old")).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["old", "new", "mid"]);

        let ids: Vec<String> = reels(&posts, Some("text")).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn tag_page_filters_exact_tags() {
        let posts = vec![
            post("a", "morning #run", false, 20),
            post("b", "evening #run #gym", false, 5),
            post("c", "#running late", false, 1),
        ];
        let ids: Vec<String> = tag_posts(&posts, "#run").into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn search_is_case_insensitive_and_blank_is_empty() {
        let users = vec![user("RustFan"), user("gopher")];
        let posts = vec![post("a", "Learning RUST today", false, 0), post("b", "nope", false, 0)];

        let results = search(&users, &posts, "rust");
        assert_eq!(results.users.len(), 1);
        assert_eq!(results.posts.len(), 1);
        assert!(search(&users, &posts, "   ").is_empty());
    }
}
