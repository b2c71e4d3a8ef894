use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tower_http::services::{ServeDir, ServeFile};

use crate::api::{
    ApiCheckinResponse, ApiCommentRequest, ApiCreatePostRequest, ApiError, ApiFeedEntry,
    ApiFollowRequest, ApiLikeRequest,
};
use pulse_feed::browse::{reels, search, tag_posts, SearchResults};
use pulse_feed::cleanup::run_cleanup_schedule;
use pulse_feed::config::PulseConfig;
use pulse_feed::engagement::{toggle_like, CommentAuthor, LikeContext};
use pulse_feed::post::join_authors;
use pulse_feed::scoring::FeedPipeline;
use pulse_feed::store::{new_document_id, DocumentStore, JsonStore};
use pulse_feed::user::{evaluate_daily_activity, ActivityOutcome};
use pulse_feed::validation::{validate_comment, ProfileEdit};
use pulse_feed::{Comment, Post, PulseError, User};

#[derive(Clone)]
struct AppState {
    store: Arc<JsonStore>,
    config: Arc<PulseConfig>,
    pipeline: FeedPipeline,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Deserialize)]
struct ReelsQuery {
    focus: Option<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct DeleteQuery {
    user_id: String,
}

pub async fn serve(args: crate::ServeArgs, config: PulseConfig, store: JsonStore) -> pulse_feed::Result<()> {
    let state = AppState {
        store: Arc::new(store),
        pipeline: config.pipeline(),
        config: Arc::new(config),
    };

    let cleanup_store = state.store.clone();
    let cleanup_config = state.config.cleanup.clone();
    tokio::spawn(async move {
        run_cleanup_schedule(cleanup_store.as_ref(), &cleanup_config).await;
    });

    let mut app = Router::new()
        .route("/api/health", get(health))
        .route("/api/feed", get(feed_handler))
        .route("/api/feed/stream", get(feed_stream_handler))
        .route("/api/reels", get(reels_handler))
        .route("/api/tags/:tag", get(tag_handler))
        .route("/api/search", get(search_handler))
        .route("/api/posts", post(create_post_handler))
        .route("/api/posts/:id", delete(delete_post_handler))
        .route("/api/posts/:id/like", post(like_handler))
        .route(
            "/api/posts/:id/comments",
            get(list_comments_handler).post(add_comment_handler),
        )
        .route("/api/users/:uid/checkin", post(checkin_handler))
        .route("/api/users/:uid/follow", post(follow_handler))
        .route("/api/users/:uid/profile", patch(update_profile_handler))
        .route("/api/users/:uid/followers", get(followers_handler))
        .route("/api/users/:uid/following", get(following_handler))
        .with_state(state);

    if let Some(web_root) = args.web_root {
        let index_path = format!("{}/index.html", web_root.trim_end_matches('/'));
        let static_service =
            ServeDir::new(web_root).not_found_service(ServeFile::new(index_path));
        app = app.fallback_service(static_service);
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|err| PulseError::Config(format!("invalid bind address: {}", err)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "pulse server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn feed_handler(State(state): State<AppState>) -> ApiResult<Vec<ApiFeedEntry>> {
    let feed = ranked_feed(&state).await.map_err(error_response)?;
    Ok(Json(feed))
}

/// Streams the full re-ranked feed once on connect and again after every
/// store change.
async fn feed_stream_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let receiver = state.store.subscribe();
    let initial = tokio_stream::once(Ok::<_, tokio_stream::wrappers::errors::BroadcastStreamRecvError>(None));
    let changes = BroadcastStream::new(receiver).map(|event| event.map(Some));

    let stream = initial.chain(changes).then(move |event| {
        let state = state.clone();
        async move {
            let name = match event {
                Ok(Some(event)) => {
                    tracing::debug!(?event, "feed change");
                    "change"
                }
                Ok(None) => "snapshot",
                Err(_) => "resync",
            };
            match ranked_feed(&state).await {
                Ok(feed) => {
                    let data = serde_json::to_string(&feed).unwrap_or_default();
                    Ok(Event::default().event(name).data(data))
                }
                Err(err) => Ok(Event::default().event("error").data(err.to_string())),
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn reels_handler(
    State(state): State<AppState>,
    Query(query): Query<ReelsQuery>,
) -> ApiResult<Vec<Post>> {
    let posts = joined_posts(&state).await.map_err(error_response)?;
    Ok(Json(reels(&posts, query.focus.as_deref())))
}

async fn tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<Vec<Post>> {
    let posts = joined_posts(&state).await.map_err(error_response)?;
    Ok(Json(tag_posts(&posts, &tag)))
}

async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<SearchResults> {
    let users = state.store.list_users().await.map_err(error_response)?;
    let posts = joined_posts(&state).await.map_err(error_response)?;
    Ok(Json(search(&users, &posts, query.q.as_deref().unwrap_or(""))))
}

async fn create_post_handler(
    State(state): State<AppState>,
    Json(request): Json<ApiCreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), (StatusCode, Json<ApiError>)> {
    let (user_id, draft, media_url) = request
        .into_draft()
        .map_err(|errors| error_response(errors.into()))?;
    draft.validate().map_err(error_response)?;
    let author = require_user(&state, &user_id).await.map_err(error_response)?;

    let post = Post::from_draft(
        new_document_id(),
        &author,
        &draft,
        media_url,
        state.config.media.retention(),
        Utc::now(),
    );
    let stored = state.store.insert_post(post).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn delete_post_handler(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state
        .store
        .delete_post(&post_id, &query.user_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_handler(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(request): Json<ApiLikeRequest>,
) -> ApiResult<Post> {
    let post = state
        .store
        .get_post(&post_id)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(PulseError::NotFound(format!("post {}", post_id))))?;
    let context = request.context.unwrap_or(LikeContext::Feed);
    let toggle = toggle_like(&post, &request.user_id, context);
    let stored = state
        .store
        .apply_like(&toggle.operation)
        .await
        .map_err(error_response)?;
    Ok(Json(stored))
}

async fn list_comments_handler(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<Vec<Comment>> {
    let comments = state
        .store
        .list_comments(&post_id)
        .await
        .map_err(error_response)?;
    Ok(Json(comments))
}

async fn add_comment_handler(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(request): Json<ApiCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), (StatusCode, Json<ApiError>)> {
    let content = validate_comment(&request.content).map_err(error_response)?;
    let author = require_user(&state, &request.user_id)
        .await
        .map_err(error_response)?;
    let author = CommentAuthor::from_user(&author);
    let comment = Comment {
        id: String::new(),
        post_id,
        user_id: author.user_id,
        user_name: author.user_name,
        profile_picture: author.profile_picture,
        content,
        created_at: Utc::now(),
    };
    let stored = state
        .store
        .add_comment(comment)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn checkin_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<ApiCheckinResponse> {
    let user = require_user(&state, &uid).await.map_err(error_response)?;
    let (updated, outcome) = evaluate_daily_activity(&user, Utc::now(), &state.config.activity);
    let updated = match outcome {
        ActivityOutcome::AlreadyRewarded => updated,
        _ => state.store.put_user(updated).await.map_err(error_response)?,
    };
    Ok(Json(ApiCheckinResponse::new(outcome, updated)))
}

async fn follow_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(request): Json<ApiFollowRequest>,
) -> ApiResult<User> {
    state
        .store
        .set_follow(&uid, &request.target, request.follow.unwrap_or(true))
        .await
        .map_err(error_response)?;
    let user = require_user(&state, &uid).await.map_err(error_response)?;
    Ok(Json(user))
}

async fn update_profile_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(edit): Json<ProfileEdit>,
) -> ApiResult<User> {
    let user = state
        .store
        .update_profile(&uid, &edit)
        .await
        .map_err(error_response)?;
    Ok(Json(user))
}

async fn followers_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Vec<User>> {
    require_user(&state, &uid).await.map_err(error_response)?;
    let users = state.store.list_followers(&uid).await.map_err(error_response)?;
    Ok(Json(users))
}

async fn following_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Vec<User>> {
    require_user(&state, &uid).await.map_err(error_response)?;
    let users = state.store.list_following(&uid).await.map_err(error_response)?;
    Ok(Json(users))
}

async fn joined_posts(state: &AppState) -> pulse_feed::Result<Vec<Post>> {
    let mut posts = state.store.list_posts().await?;
    let users: HashMap<String, User> = state
        .store
        .list_users()
        .await?
        .into_iter()
        .map(|user| (user.uid.clone(), user))
        .collect();
    join_authors(&mut posts, &users);
    Ok(posts)
}

async fn ranked_feed(state: &AppState) -> pulse_feed::Result<Vec<ApiFeedEntry>> {
    let posts = joined_posts(state).await?;
    Ok(state
        .pipeline
        .rank(posts)
        .into_iter()
        .map(ApiFeedEntry::from)
        .collect())
}

async fn require_user(state: &AppState, uid: &str) -> pulse_feed::Result<User> {
    state
        .store
        .get_user(uid)
        .await?
        .ok_or_else(|| PulseError::NotFound(format!("user {}", uid)))
}

fn error_response(err: PulseError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        PulseError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PulseError::NotFound(_) => StatusCode::NOT_FOUND,
        PulseError::Forbidden(_) => StatusCode::FORBIDDEN,
        PulseError::LikeInFlight(_) => StatusCode::CONFLICT,
        PulseError::Store(_) => StatusCode::BAD_REQUEST,
        PulseError::Upload(_) | PulseError::Request(_) => StatusCode::BAD_GATEWAY,
        PulseError::Config(_) | PulseError::Io(_) | PulseError::Json(_) => {
            tracing::error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let fields = match &err {
        PulseError::Validation(errors) => Some(errors.clone()),
        _ => None,
    };
    (
        status,
        Json(ApiError {
            error: err.to_string(),
            fields,
        }),
    )
}
