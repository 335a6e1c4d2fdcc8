use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyEventKind};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

mod actions;
mod agents;
mod app;
mod config;
mod discovery;
mod history;
mod reconcile;
mod state;
mod sync;
mod tmux;
mod watch;
mod workspace;

use actions::Action;
use agents::AgentRegistry;
use app::App;
use config::Config;
use discovery::Discovery;
use state::StateStore;
use tmux::TmuxClient;

#[derive(Parser, Debug)]
#[command(name = "agent-mux", version, about = "Track which tmux panes running AI agents need you")]
struct Cli {
    /// Steady-state daemon poll interval in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background watch daemon
    Watch,
    /// Restart the background watch daemon
    Restart,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if std::env::var_os("TMUX").is_none() {
        eprintln!("error: agent-mux must be run inside tmux");
        std::process::exit(1);
    }

    init_logging(&config::state_dir_from_env().join(config::LOG_FILE_NAME));

    let mut config = Config::from_env();
    if let Some(ms) = cli.interval_ms {
        config.watch_interval = Duration::from_millis(ms.max(1));
    }

    let registry = AgentRegistry::new(config.agent_names());
    let discovery = Discovery::new(
        TmuxClient::with_path(config.tmux_path.clone()),
        registry,
        &config,
    );

    match cli.command {
        Some(Command::Watch) => run_watch(&config, discovery).await,
        Some(Command::Restart) => watch::restart(&config).await,
        None => run_viewer(&config, discovery).await,
    }
}

/// Log to the state directory; the viewer owns the terminal and the daemon
/// has none.
fn init_logging(log_path: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let file = log_path
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
        });
    let writer = match file {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(_) => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();
}

async fn run_watch(config: &Config, discovery: Discovery) -> Result<()> {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
        tracing::info!("Shutdown signal received");
        token.cancel();
    });

    watch::run(config, discovery, cancel).await
}

async fn run_viewer(config: &Config, discovery: Discovery) -> Result<()> {
    let discovery = Arc::new(discovery);

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Input thread; crossterm's poll blocks
    let input_tx = tx.clone();
    std::thread::spawn(move || loop {
        if event::poll(Duration::from_millis(100)).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err() {
                    break;
                }
            }
        } else if input_tx.is_closed() {
            break;
        }
    });

    // Spawn discovery poller
    let poll_tx = tx.clone();
    let poller = Arc::clone(&discovery);
    let interval = config.viewer_interval;
    tokio::spawn(async move {
        loop {
            let action = match poller.discover().await {
                Ok(panes) => Action::PanesUpdated(panes),
                Err(e) => Action::Error(format!("tmux: {:#}", e)),
            };
            if poll_tx.send(action).is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    });

    let mut app = App::new(StateStore::new(config.state_path()));

    // Main event loop
    let result: Result<()> = 'outer: loop {
        // Render
        if let Err(e) = terminal.draw(|f| app.render(f)) {
            break Err(anyhow::Error::new(e).context("Failed to draw terminal"));
        }

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::SwitchToPane(target) => {
                    match discovery.client().switch_to_pane(&target).await {
                        Ok(()) => break 'outer Ok(()),
                        Err(e) => {
                            app.error_message = Some(format!("Failed to switch: {}", e));
                        }
                    }
                }
                Action::KillPane(target) => match discovery.client().kill_pane(&target).await {
                    Ok(()) => {
                        tracing::info!(pane = %target, "Killed pane");
                        app.error_message = Some(format!("Killed '{}'", target));
                    }
                    Err(e) => {
                        app.error_message = Some(format!("Failed to kill: {}", e));
                    }
                },
                Action::LoadPreview(target) => {
                    let preview_tx = tx.clone();
                    let loader = Arc::clone(&discovery);
                    let lines = config.preview_lines;
                    tokio::spawn(async move {
                        // A failed capture leaves the previous preview in place
                        if let Ok(content) = loader.client().capture_pane(&target, lines, false).await {
                            let _ = preview_tx.send(Action::PreviewLoaded { target, content });
                        }
                    });
                }
                Action::RestartDaemon => {
                    // The old daemon may take a cycle to exit; keep drawing meanwhile
                    let status_tx = tx.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let msg = match watch::restart(&config).await {
                            Ok(()) => "Watch daemon restarted".to_string(),
                            Err(e) => format!("Restart failed: {:#}", e),
                        };
                        let _ = status_tx.send(Action::Status(msg));
                    });
                }
                _ => {}
            }
        }

        // Handle events from channel
        match rx.recv().await {
            Some(action) => match app.handle_action(action) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            },
            None => break Ok(()),
        }
    };

    // Restore terminal
    ratatui::restore();
    result
}
