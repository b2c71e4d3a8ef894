mod api;
mod server;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

use pulse_feed::cleanup::{run_cleanup_once, run_cleanup_schedule};
use pulse_feed::config::PulseConfig;
use pulse_feed::engagement::{CommentAuthor, CommentThread, LikeContext};
use pulse_feed::feed::FeedSession;
use pulse_feed::media::{describe_file, MediaUploader};
use pulse_feed::store::{new_document_id, DocumentStore, JsonStore};
use pulse_feed::user::{evaluate_daily_activity, ActivityOutcome};
use pulse_feed::validation::{PostDraft, ProfileEdit, SignupForm};
use pulse_feed::{format_number, MediaType, Post, PulseError, Result, User};

#[derive(Parser)]
#[command(name = "pulse", about = "Pulse feed ranking and activity engine")]
struct Cli {
    /// Config file (defaults to PULSE_CONFIG_PATH or config/pulse.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the JSON store location.
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    Feed(FeedArgs),
    Checkin(CheckinArgs),
    Signup(SignupArgs),
    Post(PostArgs),
    Like(LikeArgs),
    Comment(CommentArgs),
    Follow(FollowArgs),
    Followers(FollowListArgs),
    Profile(ProfileArgs),
    Cleanup(CleanupArgs),
    Serve(ServeArgs),
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Writes the default configuration.
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct FeedArgs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
    #[arg(long)]
    details: bool,
}

impl Default for FeedArgs {
    fn default() -> Self {
        Self {
            limit: 20,
            details: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct CheckinArgs {
    #[arg(long)]
    user: String,
}

#[derive(Args, Debug, Clone)]
struct SignupArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    email: String,
    #[arg(long, default_value = "")]
    phone: String,
    #[arg(long)]
    password: String,
    /// Defaults to --password.
    #[arg(long)]
    confirm_password: Option<String>,
    #[arg(long)]
    accept_terms: bool,
    #[arg(long)]
    profile_picture: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct PostArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    media: Option<PathBuf>,
    /// image, video or audio; guessed from the extension when omitted.
    #[arg(long)]
    media_type: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct LikeArgs {
    #[arg(long)]
    post: String,
    #[arg(long)]
    user: String,
    /// Like from the single-post page (does not move the poster's activity score).
    #[arg(long)]
    page: bool,
}

#[derive(Args, Debug, Clone)]
struct CommentArgs {
    #[arg(long)]
    post: String,
    #[arg(long)]
    user: String,
    #[arg(long, conflicts_with = "delete")]
    text: Option<String>,
    #[arg(long)]
    delete: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct FollowArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    target: String,
    #[arg(long)]
    undo: bool,
}

#[derive(Args, Debug, Clone)]
struct FollowListArgs {
    #[arg(long)]
    user: String,
    /// List the accounts the user follows instead of their followers.
    #[arg(long)]
    following: bool,
}

#[derive(Args, Debug, Clone)]
struct ProfileArgs {
    #[arg(long)]
    user: String,
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    bio: Option<String>,
    /// Local image uploaded as the new avatar.
    #[arg(long)]
    avatar: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct CleanupArgs {
    /// Keep running on the configured interval.
    #[arg(long)]
    watch: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 8787)]
    port: u16,
    #[arg(long)]
    web_root: Option<String>,
}

#[tokio::main]
async fn main() {
    load_dotenv();
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Feed(FeedArgs::default()));

    if let Command::Config {
        command: ConfigCommand::Init { path, force },
    } = command
    {
        return init_config(path.or(cli.config), force);
    }

    let (mut config, config_path) = PulseConfig::load(cli.config)?;
    if let Some(store_path) = cli.store {
        config.store.path = store_path;
    }
    tracing::debug!(
        config = ?config_path.as_ref().map(|path| path.display().to_string()),
        store = %config.store.path.display(),
        "configuration loaded"
    );
    let store = JsonStore::load(config.store.path.clone()).await?;

    match command {
        Command::Feed(args) => run_feed(&store, &config, args).await,
        Command::Checkin(args) => run_checkin(&store, &config, args).await,
        Command::Signup(args) => run_signup(&store, &config, args).await,
        Command::Post(args) => run_post(&store, &config, args).await,
        Command::Like(args) => run_like(&store, &config, args).await,
        Command::Comment(args) => run_comment(&store, args).await,
        Command::Follow(args) => run_follow(&store, args).await,
        Command::Followers(args) => run_follow_list(&store, args).await,
        Command::Profile(args) => run_profile(&store, &config, args).await,
        Command::Cleanup(args) => run_cleanup(&store, &config, args).await,
        Command::Serve(args) => server::serve(args, config, store).await,
        Command::Config { .. } => Ok(()),
    }
}

async fn run_feed(store: &JsonStore, config: &PulseConfig, args: FeedArgs) -> Result<()> {
    let pipeline = config.pipeline();
    let mut session = FeedSession::new(pipeline.clone());
    session.reload(store).await?;

    if session.posts().is_empty() {
        println!("No posts yet.");
        return Ok(());
    }

    for (index, post) in session.posts().iter().take(args.limit).enumerate() {
        let scored = pipeline.score_post(post.clone());
        println!(
            "#{} score {} | {} [{}] {}",
            index + 1,
            format_number(scored.score),
            post.user_name,
            post.user_rank.as_deref().unwrap_or("-"),
            preview(&post.content)
        );
        if args.details {
            println!(
                "    id {} | likes {} | comments {} | engagement {} | rank boost {}",
                post.id,
                format_number(post.likes),
                format_number(post.comments_count),
                format_number(scored.engagement_score),
                format_number(scored.rank_boost)
            );
            if let (Some(url), Some(kind)) = (&post.media_url, post.media_type) {
                println!("    {} {}", kind.as_str(), url);
            }
        }
    }
    Ok(())
}

async fn run_checkin(store: &JsonStore, config: &PulseConfig, args: CheckinArgs) -> Result<()> {
    let user = require_user(store, &args.user).await?;
    let (updated, outcome) = evaluate_daily_activity(&user, Utc::now(), &config.activity);

    let updated = match outcome {
        ActivityOutcome::AlreadyRewarded => updated,
        _ => store.put_user(updated).await?,
    };

    match outcome {
        ActivityOutcome::AlreadyRewarded => println!("Already checked in today."),
        ActivityOutcome::Rewarded => println!(
            "+{} activity, streak {} day(s).",
            config.activity.daily_bonus, updated.streak_days
        ),
        ActivityOutcome::Decayed => println!(
            "Welcome back. Activity score halved after {}+ days away.",
            config.activity.decay_after_days
        ),
    }
    print_user(&updated);
    Ok(())
}

async fn run_signup(store: &JsonStore, config: &PulseConfig, args: SignupArgs) -> Result<()> {
    let form = SignupForm {
        username: args.username,
        email: args.email,
        phone: args.phone,
        confirm_password: args
            .confirm_password
            .unwrap_or_else(|| args.password.clone()),
        password: args.password,
        terms_accepted: args.accept_terms,
    };
    form.validate()?;

    let user = User::new_member(
        new_document_id(),
        &form,
        args.profile_picture,
        Utc::now(),
        &config.activity,
    );
    let user = store.put_user(user).await?;
    println!("Created user {}", user.uid);
    print_user(&user);
    Ok(())
}

async fn run_post(store: &JsonStore, config: &PulseConfig, args: PostArgs) -> Result<()> {
    let author = require_user(store, &args.user).await?;

    let kind = match args.media_type.as_deref() {
        Some(value) => Some(
            MediaType::from_str(value)
                .ok_or_else(|| PulseError::Config(format!("invalid media type: {}", value)))?,
        ),
        None => None,
    };
    let attachment = match args.media.as_deref() {
        Some(path) => Some(describe_file(path, kind).await?),
        None => None,
    };
    let text = match args.text {
        Some(text) => text,
        None if attachment.is_none() => read_stdin()?,
        None => String::new(),
    };

    let draft = PostDraft {
        text,
        media: attachment,
    };
    draft.validate()?;

    let media_url = match (args.media.as_deref(), attachment) {
        (Some(path), Some(attachment)) => {
            let uploader = MediaUploader::from_config(&config.media)?;
            Some(uploader.upload_file(path, attachment.kind).await?)
        }
        _ => None,
    };

    let post = Post::from_draft(
        new_document_id(),
        &author,
        &draft,
        media_url,
        config.media.retention(),
        Utc::now(),
    );
    let post = store.insert_post(post).await?;
    println!("Posted {}", post.id);
    if !post.hashtags.is_empty() {
        println!("Tags: {}", post.hashtags.join(", "));
    }
    Ok(())
}

async fn run_like(store: &JsonStore, config: &PulseConfig, args: LikeArgs) -> Result<()> {
    require_user(store, &args.user).await?;
    let context = if args.page {
        LikeContext::PostPage
    } else {
        LikeContext::Feed
    };

    let mut session = FeedSession::new(config.pipeline());
    session.reload(store).await?;
    session
        .toggle_like(store, &args.post, &args.user, context)
        .await?;

    if let Some(post) = session.get(&args.post) {
        let verb = if post.is_liked_by(&args.user) {
            "Liked"
        } else {
            "Unliked"
        };
        println!("{} {} (likes {})", verb, post.id, format_number(post.likes));
    }
    Ok(())
}

async fn run_comment(store: &JsonStore, args: CommentArgs) -> Result<()> {
    let author = require_user(store, &args.user).await?;
    let post = store
        .get_post(&args.post)
        .await?
        .ok_or_else(|| PulseError::NotFound(format!("post {}", args.post)))?;
    let comments = store.list_comments(&post.id).await?;
    let mut thread = CommentThread::new(post, comments);

    if let Some(comment_id) = args.delete {
        thread.delete_comment(store, &comment_id).await?;
        println!(
            "Deleted comment {} ({} left)",
            comment_id, thread.post.comments_count
        );
        return Ok(());
    }

    let text = match args.text {
        Some(text) => text,
        None => read_stdin()?,
    };
    let comment = thread
        .submit_comment(store, &CommentAuthor::from_user(&author), &text, Utc::now())
        .await
        .map_err(|(err, _draft)| err)?;
    println!(
        "Commented {} on {} ({} total)",
        comment.id, thread.post.id, thread.post.comments_count
    );
    Ok(())
}

async fn run_follow(store: &JsonStore, args: FollowArgs) -> Result<()> {
    let changed = store.set_follow(&args.user, &args.target, !args.undo).await?;
    let action = if args.undo { "unfollowed" } else { "followed" };
    if changed {
        println!("{} {} {}", args.user, action, args.target);
    } else {
        println!("{} already {} {}", args.user, action, args.target);
    }
    Ok(())
}

async fn run_follow_list(store: &JsonStore, args: FollowListArgs) -> Result<()> {
    let user = require_user(store, &args.user).await?;
    let (users, title) = if args.following {
        (store.list_following(&user.uid).await?, "Following")
    } else {
        (store.list_followers(&user.uid).await?, "Followers")
    };

    println!("{} of {} ({})", title, user.name(), users.len());
    for other in users {
        println!("- {} (@{}) {}", other.name(), other.username, other.rank);
    }
    Ok(())
}

async fn run_profile(store: &JsonStore, config: &PulseConfig, args: ProfileArgs) -> Result<()> {
    let mut edit = ProfileEdit {
        display_name: args.display_name,
        username: args.username,
        bio: args.bio,
        profile_picture: None,
    };
    edit.validate()?;

    if let Some(path) = args.avatar.as_deref() {
        let attachment = describe_file(path, Some(MediaType::Image)).await?;
        PostDraft {
            text: String::new(),
            media: Some(attachment),
        }
        .validate()?;
        let uploader = MediaUploader::from_config(&config.media)?;
        edit.profile_picture = Some(uploader.upload_file(path, MediaType::Image).await?);
    }

    let user = store.update_profile(&args.user, &edit).await?;
    println!("Profile updated.");
    print_user(&user);
    Ok(())
}

async fn run_cleanup(store: &JsonStore, config: &PulseConfig, args: CleanupArgs) -> Result<()> {
    if args.watch {
        tracing::info!(
            interval_minutes = config.cleanup.interval_minutes,
            "media cleanup scheduled"
        );
        run_cleanup_schedule(store, &config.cleanup).await;
        return Ok(());
    }

    let cleared = run_cleanup_once(store, Utc::now()).await?;
    println!("Cleared media on {} post(s)", cleared.len());
    for post_id in cleared {
        println!("- {}", post_id);
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("config/pulse.toml"));
    if path.exists() && !force {
        return Err(PulseError::Config(format!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        )));
    }
    PulseConfig::default().write(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn require_user(store: &JsonStore, uid: &str) -> Result<User> {
    store
        .get_user(uid)
        .await?
        .ok_or_else(|| PulseError::NotFound(format!("user {}", uid)))
}

fn print_user(user: &User) {
    println!(
        "{} (@{}) {} | activity {} | streak {} | followers {} | likes received {}",
        user.name(),
        user.username,
        user.rank,
        format_number(user.activity_score),
        user.streak_days,
        format_number(user.followers_count),
        format_number(user.likes_received)
    );
}

fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or("");
    let mut preview: String = line.chars().take(60).collect();
    if line.chars().count() > 60 || content.lines().count() > 1 {
        preview.push_str("...");
    }
    preview
}

fn read_stdin() -> Result<String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(PulseError::Config(
            "missing text: pass --text or pipe stdin".to_string(),
        ));
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    Ok(buffer.trim().to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_dotenv() {
    let _ = dotenvy::dotenv();
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let manifest_path = Path::new(manifest_dir).join(".env");
    let _ = dotenvy::from_path(manifest_path);
}
