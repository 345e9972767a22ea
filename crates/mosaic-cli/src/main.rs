use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use mosaic_core::factories::{create_backend, create_engine, open_conversation_repository};
use mosaic_core::logging::init_tracing;
use mosaic_core::models::{
    ChatSession, ImageMeta, Message, MessageRenderer, NoticeLevel, NotificationStore, Part,
};
use mosaic_core::services::format_bytes;
use mosaic_core::settings::{EngineSettings, SettingsJsonRepository, SettingsRepository};
use mosaic_core::{ConversationLifecycleController, ListTab};

#[derive(Parser, Debug)]
#[command(
    name = "mosaic",
    version,
    about = "Multimodal chat with persistent, editable conversations"
)]
struct Cli {
    /// Settings file (defaults to <config dir>/mosaic/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lowercase")]
enum Tab {
    #[default]
    All,
    Favorites,
    Pinned,
}

impl From<Tab> for ListTab {
    fn from(tab: Tab) -> Self {
        match tab {
            Tab::All => ListTab::All,
            Tab::Favorites => ListTab::Favorites,
            Tab::Pinned => ListTab::Pinned,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List conversations
    List {
        #[arg(long, value_enum, default_value_t = Tab::All)]
        tab: Tab,
        /// Only conversations whose title or text contains this
        #[arg(long)]
        search: Option<String>,
    },
    /// Print a conversation transcript
    Show { id: String },
    /// Send a message, starting a new conversation unless one is given
    Chat {
        #[arg(long)]
        conversation: Option<String>,
        /// Image file to attach; may be repeated
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        #[arg(default_value = "")]
        text: String,
    },
    /// Replace the text of a message (0-based position)
    Edit { id: String, position: usize, text: String },
    /// Delete a message; deleting a user message drops everything after it
    DeleteMessage { id: String, position: usize },
    /// Replace a model message with a fresh reply
    Regenerate { id: String, position: usize },
    Rename { id: String, title: String },
    /// Toggle favorite
    Favorite { id: String },
    /// Toggle pinned
    Pin { id: String },
    Delete { id: String },
    /// Delete every conversation
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Show storage used per conversation
    Usage,
}

/// Prints transcripts to stdout
struct TerminalRenderer;

impl MessageRenderer for TerminalRenderer {
    fn clear(&mut self) {}

    fn render_message(&mut self, index: usize, message: &Message) {
        let images = message.image_count();
        let attachment = match images {
            0 => String::new(),
            1 => " [1 image]".to_string(),
            n => format!(" [{} images]", n),
        };
        println!("[{}] {}{}:", index, message.role, attachment);
        for line in message.text().lines() {
            println!("    {}", line);
        }
    }
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn image_mime_type(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    Ok(match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        other => bail!("unsupported image type {:?} for {}", other, path.display()),
    })
}

async fn image_data_url(path: &Path) -> Result<(String, ImageMeta)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let mime_type = image_mime_type(path)?;
    let meta = ImageMeta {
        name: path.file_name().map(|n| n.to_string_lossy().to_string()),
        size: Some(bytes.len() as u64),
    };
    Ok((format!("data:{};base64,{}", mime_type, STANDARD.encode(&bytes)), meta))
}

async fn load_settings(config: Option<PathBuf>) -> Result<EngineSettings> {
    let repository = match config {
        Some(path) => SettingsJsonRepository::with_path(path),
        None => SettingsJsonRepository::new().context("Failed to locate settings")?,
    };
    repository
        .load()
        .await
        .with_context(|| format!("Failed to load settings from {}", repository.storage_path()))
}

fn print_notices(notifications: &NotificationStore) {
    for notice in notifications.drain() {
        let label = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        eprintln!("{}: {}", label, notice.message);
    }
}

async fn open_session(
    controller: &mut ConversationLifecycleController,
    id: &str,
) -> Result<ChatSession> {
    let mut session = ChatSession::new();
    controller
        .open_conversation(id, &mut session)
        .await
        .with_context(|| format!("Failed to open conversation {}", id))?;
    Ok(session)
}

fn print_reply(session: &ChatSession) {
    if let Some(message) = session.get_chat_history().last() {
        println!("{}", message.text());
    }
}

async fn run(command: Command, controller: &mut ConversationLifecycleController) -> Result<()> {
    match command {
        Command::List { tab, search } => {
            let rows = match search {
                Some(query) => controller.search(&query, tab.into()),
                None => controller.list(tab.into()),
            };
            for row in rows {
                let marks = format!(
                    "{}{}",
                    if row.pinned { "P" } else { " " },
                    if row.favorite { "*" } else { " " }
                );
                println!(
                    "{} {}  {:>3} msgs  {}  {}",
                    marks,
                    row.id,
                    row.message_count,
                    format_timestamp(row.last_updated),
                    row.title
                );
            }
        }
        Command::Show { id } => {
            let conversation = controller
                .get(&id)
                .cloned()
                .with_context(|| format!("No conversation {}", id))?;
            println!("{}", conversation.title);
            let mut session = ChatSession::with_renderer(Box::new(TerminalRenderer));
            session.render_stored_messages(&conversation.messages);
        }
        Command::Chat {
            conversation,
            images,
            text,
        } => {
            let mut session = match conversation {
                Some(id) => open_session(controller, &id).await?,
                None => ChatSession::new(),
            };
            for path in &images {
                let (data_url, meta) = image_data_url(path).await?;
                session.add_image_to_chat(&data_url, meta)?;
            }

            controller.send_message(&mut session, &text).await?;
            print_reply(&session);
            if let Some(id) = session.conversation_id() {
                info!(conv_id = %id, "Message sent");
                eprintln!("conversation: {}", id);
            }
        }
        Command::Edit { id, position, text } => {
            let mut session = open_session(controller, &id).await?;
            let role = session
                .store()
                .get(position)
                .map(|m| m.role)
                .with_context(|| format!("No message at position {}", position))?;

            let parts = vec![Part::text(text)];
            match role {
                mosaic_core::Role::User => {
                    controller.edit_user_message(&mut session, position, parts).await?;
                    print_reply(&session);
                }
                mosaic_core::Role::Model => {
                    controller.edit_ai_message(&mut session, position, parts).await?;
                }
            }
        }
        Command::DeleteMessage { id, position } => {
            let mut session = open_session(controller, &id).await?;
            let outcome = controller.delete_message(&mut session, position).await?;
            if outcome.emptied {
                println!("Conversation {} is now empty and was deleted", id);
            } else {
                println!("Removed {} message(s)", outcome.removed);
            }
        }
        Command::Regenerate { id, position } => {
            let mut session = open_session(controller, &id).await?;
            controller.regenerate_model_message(&mut session, position).await?;
            print_reply(&session);
        }
        Command::Rename { id, title } => {
            controller.rename(&id, &title).await?;
        }
        Command::Favorite { id } => {
            let favorite = controller.toggle_favorite(&id).await?;
            println!("{} favorite: {}", id, favorite);
        }
        Command::Pin { id } => {
            let pinned = controller.toggle_pin(&id).await?;
            println!("{} pinned: {}", id, pinned);
        }
        Command::Delete { id } => {
            let mut session = ChatSession::new();
            controller.delete(&id, &mut session).await?;
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to delete every conversation without --yes");
            }
            let mut session = ChatSession::new();
            controller.clear_all(&mut session).await?;
        }
        Command::Usage => {
            let report = controller.storage_usage();
            for usage in &report.conversations {
                println!("{:>12}  {}  {}", format_bytes(usage.bytes, 2), usage.id, usage.title);
            }
            println!(
                "{} conversation(s), {} total",
                report.count(),
                report.formatted_total()
            );
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config).await?;
    init_tracing(&settings.log_level);
    debug!(storage = ?settings.storage, "Settings loaded");

    let notifications = Arc::new(NotificationStore::new(settings.notification_capacity));
    let repository = open_conversation_repository(&settings).await;
    let engine = create_engine(&settings, create_backend(&settings));
    let mut controller =
        ConversationLifecycleController::new(repository, engine, notifications.clone()).await;

    let result = run(cli.command, &mut controller).await;
    print_notices(&notifications);
    result
}
