mod app;
mod editor;
mod handler;
mod tui;
mod ui;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aichat_core::{Config, ConversationStore};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, AppOptions};
use tui::{EventHandler, Tui};

/// Chat with OpenAI-compatible models from the terminal
#[derive(Parser, Debug)]
#[command(name = "aichat", version, about)]
struct Cli {
    /// Config file (default: <config dir>/aichat/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Conversation history file (default: ~/.aichat/conversations.json)
    #[arg(long, value_name = "PATH")]
    history: Option<PathBuf>,

    /// Model to use for this session, without changing the saved setting
    #[arg(long, value_name = "NAME", env = "AICHAT_MODEL")]
    model: Option<String>,

    /// Log file (default: <data dir>/aichat/aichat.log)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

/// Log to a file; the terminal belongs to the UI
fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aichat=info,aichat_core=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}

fn default_log_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("aichat")
        .join("aichat.log")
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_file.clone().unwrap_or_else(default_log_path))?;

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::get_config_path()?,
    };
    let history_path = match cli.history {
        Some(path) => path,
        None => ConversationStore::default_path().context("Could not determine home directory")?,
    };
    info!(
        config = %config_path.display(),
        history = %history_path.display(),
        "starting aichat v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut events = EventHandler::new();
    let mut app = App::new(
        AppOptions {
            config_path,
            history_path,
            model_override: cli.model,
        },
        events.sender(),
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    app.shutdown();
    tui::restore()?;
    info!("exiting");

    result
}
