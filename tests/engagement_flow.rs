use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use pulse_feed::cleanup::run_cleanup_once;
use pulse_feed::engagement::{CommentAuthor, CommentThread, LikeContext, LikeOperation};
use pulse_feed::feed::FeedSession;
use pulse_feed::store::{DocumentStore, JsonStore, StoreEvent};
use pulse_feed::user::{evaluate_daily_activity, ActivityConfig};
use pulse_feed::validation::{MediaAttachment, PostDraft, ProfileEdit, SignupForm};
use pulse_feed::{Comment, MediaType, Post, PulseError, Rank, Result, User};
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 2, 18, 30, 0).unwrap()
}

fn member(uid: &str) -> User {
    let form = SignupForm {
        username: uid.to_string(),
        email: format!("{}@example.com", uid),
        password: "correct horse".to_string(),
        confirm_password: "correct horse".to_string(),
        terms_accepted: true,
        ..SignupForm::default()
    };
    User::new_member(uid.to_string(), &form, None, now(), &ActivityConfig::default())
}

fn text_post(id: &str, author: &User, text: &str) -> Post {
    let draft = PostDraft {
        text: text.to_string(),
        media: None,
    };
    Post::from_draft(id.to_string(), author, &draft, None, None, now())
}

async fn seeded_store() -> (TempDir, JsonStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::load(dir.path().join("pulse.json")).await.unwrap();
    let owner = member("owner");
    store.put_user(owner.clone()).await.unwrap();
    store.put_user(member("fan")).await.unwrap();
    store
        .insert_post(text_post("p1", &owner, "first pulse #hello"))
        .await
        .unwrap();
    (dir, store)
}

async fn user(store: &JsonStore, uid: &str) -> User {
    store.get_user(uid).await.unwrap().unwrap()
}

#[tokio::test]
async fn like_then_unlike_restores_post_and_owner() {
    let (_dir, store) = seeded_store().await;
    let mut session = FeedSession::default();
    session.reload(&store).await.unwrap();

    session
        .toggle_like(&store, "p1", "fan", LikeContext::Feed)
        .await
        .unwrap();
    let stored = store.get_post("p1").await.unwrap().unwrap();
    assert_eq!(stored.likes, 1);
    assert_eq!(stored.likes_users, vec!["fan".to_string()]);
    assert_eq!(session.get("p1").map(|post| post.likes), Some(1));
    let owner = user(&store, "owner").await;
    assert_eq!(owner.likes_received, 1);
    assert_eq!(owner.activity_score, 22);

    session
        .toggle_like(&store, "p1", "fan", LikeContext::Feed)
        .await
        .unwrap();
    let stored = store.get_post("p1").await.unwrap().unwrap();
    assert_eq!(stored.likes, 0);
    assert!(stored.likes_users.is_empty());
    let owner = user(&store, "owner").await;
    assert_eq!(owner.likes_received, 0);
    assert_eq!(owner.activity_score, 20);
    assert_eq!(owner.rank, Rank::NewMember.label());
}

#[tokio::test]
async fn post_page_likes_leave_activity_alone() {
    let (_dir, store) = seeded_store().await;
    let mut session = FeedSession::default();
    session.reload(&store).await.unwrap();

    session
        .toggle_like(&store, "p1", "fan", LikeContext::PostPage)
        .await
        .unwrap();
    let owner = user(&store, "owner").await;
    assert_eq!(owner.likes_received, 1);
    assert_eq!(owner.activity_score, 20);
}

#[tokio::test]
async fn feed_like_recomputes_owner_rank() {
    let (_dir, store) = seeded_store().await;
    let mut owner = user(&store, "owner").await;
    owner.set_activity_score(999);
    store.put_user(owner).await.unwrap();

    let mut session = FeedSession::default();
    session.reload(&store).await.unwrap();
    session
        .toggle_like(&store, "p1", "fan", LikeContext::Feed)
        .await
        .unwrap();

    let owner = user(&store, "owner").await;
    assert_eq!(owner.activity_score, 1001);
    assert_eq!(owner.rank, Rank::Influencer.label());
}

#[tokio::test]
async fn store_survives_reload_from_disk() {
    let (dir, store) = seeded_store().await;
    store.set_follow("fan", "owner", true).await.unwrap();
    drop(store);

    let reopened = JsonStore::load(dir.path().join("pulse.json")).await.unwrap();
    let posts = reopened.list_posts().await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].hashtags, vec!["hello".to_string()]);
    assert_eq!(user(&reopened, "owner").await.posts_count, 1);
    assert_eq!(user(&reopened, "owner").await.followers_count, 1);
    // Follow edges persist too, so repeating the follow is a no-op.
    assert!(!reopened.set_follow("fan", "owner", true).await.unwrap());
}

#[tokio::test]
async fn writes_are_announced_to_subscribers() {
    let (_dir, store) = seeded_store().await;
    let mut changes = store.subscribe();
    let owner = user(&store, "owner").await;
    store
        .insert_post(text_post("p2", &owner, "second"))
        .await
        .unwrap();

    assert_eq!(
        changes.recv().await.unwrap(),
        StoreEvent::PostChanged {
            post_id: "p2".to_string()
        }
    );
}

#[tokio::test]
async fn follow_moves_both_counters_once() {
    let (_dir, store) = seeded_store().await;

    assert!(store.set_follow("fan", "owner", true).await.unwrap());
    assert!(!store.set_follow("fan", "owner", true).await.unwrap());
    assert_eq!(user(&store, "owner").await.followers_count, 1);
    assert_eq!(user(&store, "fan").await.following_count, 1);

    assert!(store.set_follow("fan", "owner", false).await.unwrap());
    assert!(!store.set_follow("fan", "owner", false).await.unwrap());
    assert_eq!(user(&store, "owner").await.followers_count, 0);
    assert_eq!(user(&store, "fan").await.following_count, 0);

    assert!(matches!(
        store.set_follow("fan", "fan", true).await,
        Err(PulseError::Forbidden(_))
    ));
    assert!(matches!(
        store.set_follow("fan", "ghost", true).await,
        Err(PulseError::NotFound(_))
    ));
}

#[tokio::test]
async fn comments_confirm_and_delete() {
    let (_dir, store) = seeded_store().await;
    let post = store.get_post("p1").await.unwrap().unwrap();
    let author = CommentAuthor::from_user(&user(&store, "fan").await);
    let mut thread = CommentThread::new(post, Vec::new());

    let stored = thread
        .submit_comment(&store, &author, "  nice one  ", now())
        .await
        .unwrap();
    assert!(!stored.is_pending());
    assert_eq!(stored.content, "nice one");
    assert_eq!(thread.comments, vec![stored.clone()]);
    assert_eq!(thread.post.comments_count, 1);
    assert_eq!(
        store.get_post("p1").await.unwrap().unwrap().comments_count,
        1
    );

    thread.delete_comment(&store, &stored.id).await.unwrap();
    assert!(thread.comments.is_empty());
    assert_eq!(thread.post.comments_count, 0);
    assert!(store.list_comments("p1").await.unwrap().is_empty());
    assert_eq!(
        store.get_post("p1").await.unwrap().unwrap().comments_count,
        0
    );
}

#[tokio::test]
async fn only_the_owner_deletes_a_post() {
    let (_dir, store) = seeded_store().await;
    assert!(matches!(
        store.delete_post("p1", "fan").await,
        Err(PulseError::Forbidden(_))
    ));

    store.delete_post("p1", "owner").await.unwrap();
    assert!(store.get_post("p1").await.unwrap().is_none());
    assert_eq!(user(&store, "owner").await.posts_count, 0);
    assert!(matches!(
        store.delete_post("p1", "owner").await,
        Err(PulseError::NotFound(_))
    ));
}

#[tokio::test]
async fn cleanup_clears_only_expired_media() {
    let (_dir, store) = seeded_store().await;
    let owner = user(&store, "owner").await;
    let draft = PostDraft {
        text: String::new(),
        media: Some(MediaAttachment {
            kind: MediaType::Video,
            size_bytes: 1_024,
        }),
    };
    let clip = Post::from_draft(
        "clip".to_string(),
        &owner,
        &draft,
        Some("https://cdn.example/clip.mp4".to_string()),
        Some(Duration::hours(1)),
        now(),
    );
    store.insert_post(clip).await.unwrap();

    let early = run_cleanup_once(&store, now() + Duration::minutes(30))
        .await
        .unwrap();
    assert!(early.is_empty());

    let cleared = run_cleanup_once(&store, now() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(cleared, vec!["clip".to_string()]);
    let clip = store.get_post("clip").await.unwrap().unwrap();
    assert_eq!(clip.media_url, None);
    assert_eq!(clip.media_type, None);
    assert_eq!(clip.media_expires_at, None);
}

/// Delegates to a real store but fails every write that goes through the
/// engagement paths.
struct OfflineStore {
    inner: JsonStore,
}

#[async_trait]
impl DocumentStore for OfflineStore {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        self.inner.list_posts().await
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        self.inner.get_post(post_id).await
    }

    async fn insert_post(&self, post: Post) -> Result<Post> {
        self.inner.insert_post(post).await
    }

    async fn delete_post(&self, post_id: &str, requester: &str) -> Result<()> {
        self.inner.delete_post(post_id, requester).await
    }

    async fn apply_like(&self, _operation: &LikeOperation) -> Result<Post> {
        Err(PulseError::Store("offline".to_string()))
    }

    async fn add_comment(&self, _comment: Comment) -> Result<Comment> {
        Err(PulseError::Store("offline".to_string()))
    }

    async fn delete_comment(&self, post_id: &str, comment_id: &str) -> Result<()> {
        self.inner.delete_comment(post_id, comment_id).await
    }

    async fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.inner.list_comments(post_id).await
    }

    async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        self.inner.get_user(uid).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users().await
    }

    async fn put_user(&self, user: User) -> Result<User> {
        self.inner.put_user(user).await
    }

    async fn update_profile(&self, uid: &str, edit: &ProfileEdit) -> Result<User> {
        self.inner.update_profile(uid, edit).await
    }

    async fn set_follow(&self, follower: &str, target: &str, follow: bool) -> Result<bool> {
        self.inner.set_follow(follower, target, follow).await
    }

    async fn list_followers(&self, uid: &str) -> Result<Vec<User>> {
        self.inner.list_followers(uid).await
    }

    async fn list_following(&self, uid: &str) -> Result<Vec<User>> {
        self.inner.list_following(uid).await
    }

    async fn clear_expired_media(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.inner.clear_expired_media(now).await
    }
}

#[tokio::test]
async fn failed_like_rolls_back_local_state() {
    let (_dir, inner) = seeded_store().await;
    let store = OfflineStore { inner };
    let mut session = FeedSession::default();
    session.reload(&store).await.unwrap();
    let before = session.get("p1").cloned().unwrap();

    let result = session
        .toggle_like(&store, "p1", "fan", LikeContext::Feed)
        .await;
    assert!(matches!(result, Err(PulseError::Store(_))));
    assert_eq!(session.get("p1"), Some(&before));
    assert!(!session.is_in_flight("p1"));

    let owner = store.get_user("owner").await.unwrap().unwrap();
    assert_eq!(owner.likes_received, 0);
    assert_eq!(owner.activity_score, 20);
}

#[tokio::test]
async fn failed_comment_hands_back_the_draft() {
    let (_dir, inner) = seeded_store().await;
    let store = OfflineStore { inner };
    let post = store.get_post("p1").await.unwrap().unwrap();
    let author = CommentAuthor::from_user(&store.get_user("fan").await.unwrap().unwrap());
    let mut thread = CommentThread::new(post, Vec::new());

    let (err, draft) = thread
        .submit_comment(&store, &author, "lost in transit", now())
        .await
        .unwrap_err();
    assert!(matches!(err, PulseError::Store(_)));
    assert_eq!(draft, "lost in transit");
    assert!(thread.comments.is_empty());
    assert_eq!(thread.post.comments_count, 0);
}

/// Swaps the store file for a non-empty directory so the final rename of
/// every later write fails.
fn block_store_file(dir: &TempDir) {
    let path = dir.path().join("pulse.json");
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), b"x").unwrap();
}

#[tokio::test]
async fn failed_write_leaves_user_untouched() {
    let (dir, store) = seeded_store().await;
    let before = user(&store, "owner").await;
    block_store_file(&dir);

    let later = now() + Duration::days(1);
    let (updated, _) = evaluate_daily_activity(&before, later, &ActivityConfig::default());
    assert_eq!(updated.activity_score, 35);
    assert!(store.put_user(updated).await.is_err());

    let after = user(&store, "owner").await;
    assert_eq!(after, before);
    assert_eq!(after.activity_score, 20);
    assert_eq!(after.streak_days, 1);
}

#[tokio::test]
async fn failed_like_write_keeps_store_and_session_aligned() {
    let (dir, store) = seeded_store().await;
    let mut session = FeedSession::default();
    session.reload(&store).await.unwrap();
    block_store_file(&dir);

    let result = session
        .toggle_like(&store, "p1", "fan", LikeContext::Feed)
        .await;
    assert!(matches!(result, Err(PulseError::Io(_))));
    assert_eq!(session.get("p1").map(|post| post.likes), Some(0));

    let stored = store.get_post("p1").await.unwrap().unwrap();
    assert_eq!(stored.likes, 0);
    assert!(stored.likes_users.is_empty());
    let owner = user(&store, "owner").await;
    assert_eq!(owner.likes_received, 0);
    assert_eq!(owner.activity_score, 20);

    // A retry still tries to write instead of treating the like as stored.
    let retry = session
        .toggle_like(&store, "p1", "fan", LikeContext::Feed)
        .await;
    assert!(retry.is_err());
    assert_eq!(store.get_post("p1").await.unwrap().unwrap().likes, 0);
}

#[tokio::test]
async fn failed_write_leaves_follows_and_posts_untouched() {
    let (dir, store) = seeded_store().await;
    block_store_file(&dir);

    assert!(store.set_follow("fan", "owner", true).await.is_err());
    assert_eq!(user(&store, "owner").await.followers_count, 0);
    assert!(store.list_followers("owner").await.unwrap().is_empty());

    assert!(store.delete_post("p1", "owner").await.is_err());
    assert!(store.get_post("p1").await.unwrap().is_some());
    assert_eq!(user(&store, "owner").await.posts_count, 1);
}

#[tokio::test]
async fn profile_edit_is_validated_and_stored() {
    let (dir, store) = seeded_store().await;
    let edit = ProfileEdit {
        display_name: Some("The Owner".to_string()),
        username: Some("  TopOwner ".to_string()),
        bio: Some(" posting daily ".to_string()),
        profile_picture: Some("https://cdn.example/a.png".to_string()),
    };
    let updated = store.update_profile("owner", &edit).await.unwrap();
    assert_eq!(updated.display_name, "The Owner");
    assert_eq!(updated.username, "topowner");
    assert_eq!(updated.bio, "posting daily");
    assert_eq!(updated.activity_score, 20);

    let taken = ProfileEdit {
        username: Some("TOPOWNER".to_string()),
        ..ProfileEdit::default()
    };
    match store.update_profile("fan", &taken).await {
        Err(PulseError::Validation(errors)) => assert!(errors.get("username").is_some()),
        other => panic!("expected a username error, got {:?}", other),
    }
    assert!(matches!(
        store.update_profile("fan", &ProfileEdit::default()).await,
        Err(PulseError::Validation(_))
    ));
    assert!(matches!(
        store
            .update_profile(
                "ghost",
                &ProfileEdit {
                    bio: Some("hi".to_string()),
                    ..ProfileEdit::default()
                }
            )
            .await,
        Err(PulseError::NotFound(_))
    ));

    drop(store);
    let reopened = JsonStore::load(dir.path().join("pulse.json")).await.unwrap();
    assert_eq!(user(&reopened, "owner").await.username, "topowner");
}

#[tokio::test]
async fn follower_lists_follow_the_edges() {
    let (_dir, store) = seeded_store().await;
    store.put_user(member("third")).await.unwrap();
    store.set_follow("fan", "owner", true).await.unwrap();
    store.set_follow("third", "owner", true).await.unwrap();
    store.set_follow("owner", "fan", true).await.unwrap();

    let followers: Vec<String> = store
        .list_followers("owner")
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.uid)
        .collect();
    assert_eq!(followers, vec!["fan", "third"]);

    let following: Vec<String> = store
        .list_following("owner")
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.uid)
        .collect();
    assert_eq!(following, vec!["fan"]);

    store.set_follow("third", "owner", false).await.unwrap();
    assert_eq!(store.list_followers("owner").await.unwrap().len(), 1);
    assert!(store.list_following("third").await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_likers_are_repaired_on_load() {
    let (dir, store) = seeded_store().await;
    drop(store);

    let path = dir.path().join("pulse.json");
    let mut raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    raw["posts"]["p1"]["likes_users"] = serde_json::json!(["fan", "fan", "owner"]);
    raw["posts"]["p1"]["likes"] = serde_json::json!(3);
    std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

    let reopened = JsonStore::load(path).await.unwrap();
    let post = reopened.get_post("p1").await.unwrap().unwrap();
    assert_eq!(post.likes_users, vec!["fan", "owner"]);
    assert_eq!(post.likes, 2);
}
