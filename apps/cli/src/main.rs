//! zher: join a LAN chat room from the terminal.

mod commands;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use zher_connection::{ChatSession, ConnectionState, ReconnectConfig, SessionConfig, SessionEvent};
use zher_protocol::{ChatMessage, MessageBody};
use zher_settings::{
    AlertQueue, ClientConfig, JsonFileStore, KeyValueStore, NameEditor, QrImage, SaveOutcome,
    Theme, session_id, share_url,
};
use zher_transfer::{Aggregator, JobStatus, RawSelection, format_file_size, pick_folder};

use commands::{Command, HELP};

#[derive(Debug, Parser)]
#[command(name = "zher", version, about = "Chat and share files with everyone in a LAN room")]
struct Args {
    /// Room server URL, e.g. http://192.168.1.5:4836
    #[arg(long)]
    server: Option<String>,

    /// Room code, when the server asks for one
    #[arg(long)]
    room: Option<String>,

    /// Directory downloads are written to
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Print a QR code of the room link after joining
    #[arg(long)]
    qr: bool,

    /// Files or folders to offer right after joining
    paths: Vec<PathBuf>,
}

impl Args {
    fn apply(self, mut config: ClientConfig) -> (ClientConfig, bool, Vec<PathBuf>) {
        if let Some(server) = self.server {
            config.server_url = server;
        }
        if let Some(room) = self.room {
            config.room_code = Some(room);
        }
        if let Some(dir) = self.download_dir {
            config.download_dir = dir;
        }
        (config, self.qr, self.paths)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,zher=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, show_qr, initial_paths) = Args::parse().apply(ClientConfig::load());
    debug!(?config, "configuration");

    let store: Arc<dyn KeyValueStore> = Arc::new(
        JsonFileStore::open(config.storage_path.clone())
            .with_context(|| format!("opening {}", config.storage_path.display()))?,
    );
    let mut theme = Theme::load(store.clone());

    let session = ChatSession::new(SessionConfig {
        server_url: config.server_url.clone(),
        room_code: config.room_code.clone(),
        session_id: session_id(store.as_ref()).context("loading session id")?,
        download_dir: config.download_dir.clone(),
        reconnect: ReconnectConfig::default(),
    });
    let events = session
        .take_events()
        .await
        .context("session events already taken")?;
    let (notices_tx, mut notices_rx) = mpsc::unbounded_channel::<Notice>();
    tokio::spawn(print_events(events, notices_tx));

    let welcome = session
        .connect()
        .await
        .with_context(|| format!("joining {}", config.server_url))?;
    println!(
        "joined as {} ({} in the room){}",
        welcome.user.name,
        welcome.all_users.len(),
        if theme.is_dark() { " [dark]" } else { "" }
    );

    if show_qr {
        let base = if welcome.server_url.is_empty() {
            config.server_url.as_str()
        } else {
            welcome.server_url.as_str()
        };
        let url = share_url(base, config.room_code.as_deref(), config.room_code.is_some());
        match QrImage::generate(&url) {
            Ok(qr) => println!("{}\n{}", qr.text, qr.url),
            Err(e) => warn!("QR code unavailable: {e}"),
        }
    }

    let aggregator = Aggregator::new(config.temp_dir.clone());
    tokio::spawn(print_progress(aggregator.clone()));

    if !initial_paths.is_empty() {
        let raw = RawSelection::dropped_paths(&initial_paths).await;
        offer(&session, &aggregator, raw).await;
    }

    let mut alerts = AlertQueue::new();
    let mut name_editor = NameEditor::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("type /help for commands");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(notice) = notices_rx.recv() => {
                match notice {
                    Notice::Alert(message) => {
                        alerts.push(message);
                        while let Some(alert) = alerts.acknowledge() {
                            println!("! {}", alert.message);
                        }
                    }
                    Notice::Renamed(name) => name_editor.finish(&name),
                }
                continue;
            }
        };
        let Some(line) = line else { break };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Text(text) => {
                if let Err(e) = session.send_text(&text).await {
                    println!("! not sent: {e}");
                }
            }
            Command::Send(paths) => {
                let raw = RawSelection::dropped_paths(&paths).await;
                offer(&session, &aggregator, raw).await;
            }
            Command::Folder(dir) => {
                let root = dir.clone();
                match tokio::task::spawn_blocking(move || pick_folder(&root)).await {
                    Ok(Ok(files)) => offer(&session, &aggregator, RawSelection::Picked(files)).await,
                    Ok(Err(e)) => println!("! {}: {e}", dir.display()),
                    Err(e) => warn!("folder listing task failed: {e}"),
                }
            }
            Command::Name(name) => {
                let current = session
                    .current_user()
                    .await
                    .map(|u| u.name)
                    .unwrap_or_default();
                name_editor.start(&current);
                name_editor.set_input(name);
                match name_editor.save(&current) {
                    SaveOutcome::Cancelled => println!("name unchanged"),
                    SaveOutcome::Request(name) => {
                        session.set_editing_name(true).await;
                        if let Err(e) = session.request_name_change(&name).await {
                            println!("! {e}");
                        }
                    }
                }
            }
            Command::Get(file_id) => download(&session, &file_id).await,
            Command::Users => {
                for user in session.users().await {
                    println!("  {} ({})", user.name, user.device);
                }
            }
            Command::Dark => match theme.toggle() {
                Ok(dark) => println!("dark mode {}", if dark { "on" } else { "off" }),
                Err(e) => println!("! {e}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Invalid(reason) => println!("! {reason}"),
            Command::Quit => break,
        }
    }

    session.disconnect().await;
    info!("bye");
    Ok(())
}

/// Aggregates a selection and offers the result to the room.
async fn offer(session: &ChatSession, aggregator: &Aggregator, raw: RawSelection) {
    let Some(artifact) = aggregator.aggregate(raw).await.artifact else {
        debug!("selection produced no artifact");
        return;
    };
    match session.send_artifact(artifact).await {
        Ok(message) => {
            if let Some(meta) = message.file() {
                println!(
                    "offered {} ({}) as {}",
                    meta.file_name,
                    format_file_size(meta.file_size),
                    meta.file_id
                );
            }
        }
        Err(e) => println!("! not offered: {e}"),
    }
}

/// Downloads a file offered in the chat history.
async fn download(session: &ChatSession, file_id: &str) {
    let offered = session
        .messages()
        .await
        .into_iter()
        .find_map(|m| m.file().filter(|f| f.file_id == file_id).cloned());
    let Some(meta) = offered else {
        println!("! no file {file_id} in this chat");
        return;
    };
    match session.download(&meta.file_id, &meta.file_name).await {
        Ok(path) => println!("saved {}", path.display()),
        Err(e) => println!("! download failed: {e}"),
    }
}

fn render_message(message: &ChatMessage) -> String {
    match &message.body {
        MessageBody::Text { text } => format!("{}: {text}", message.sender_name),
        MessageBody::File(meta) => format!(
            "{} offers {} ({}), /get {}",
            message.sender_name,
            meta.file_name,
            format_file_size(meta.file_size),
            meta.file_id
        ),
        MessageBody::Unknown => format!("{}: (unsupported message)", message.sender_name),
    }
}

/// What the event printer hands back to the input loop.
enum Notice {
    Alert(String),
    Renamed(String),
}

async fn print_events(mut events: mpsc::Receiver<SessionEvent>, notices: mpsc::UnboundedSender<Notice>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Message(message) => println!("{}", render_message(&message)),
            SessionEvent::UsersChanged(users) => println!("* {} in the room", users.len()),
            SessionEvent::NameChanged(name) => {
                println!("* you are now {name}");
                let _ = notices.send(Notice::Renamed(name));
            }
            SessionEvent::Alert(message) => {
                let _ = notices.send(Notice::Alert(message));
            }
            SessionEvent::StateChanged(ConnectionState::Disconnected) => println!("* disconnected"),
            SessionEvent::Reconnecting {
                attempt,
                next_retry_secs,
            } => println!("* reconnecting (attempt {attempt}, in {next_retry_secs:.1}s)"),
            SessionEvent::UploadFinished { file_id, bytes, .. } => {
                println!("* sent {file_id} ({})", format_file_size(bytes));
            }
            SessionEvent::UploadFailed { file_id, error, .. } => {
                let _ = notices.send(Notice::Alert(format!("upload of {file_id} failed: {error}")));
            }
            other => debug!(?other, "session event"),
        }
    }
}

async fn print_progress(aggregator: Aggregator) {
    let mut rx = aggregator.job().subscribe();
    while rx.changed().await.is_ok() {
        let job = rx.borrow_and_update().clone();
        match job.status {
            JobStatus::Zipping => eprint!(
                "\rzipping {} {:>3}% {}",
                job.archive_name,
                job.percent,
                short(&job.current_entry)
            ),
            JobStatus::Completed => eprintln!("\rzipped {}{:>40}", job.archive_name, ""),
            JobStatus::Failed => eprintln!("\rzipping {} failed", job.archive_name),
            JobStatus::Idle => {}
        }
    }
}

/// Last path segment, for a one-line progress display.
fn short(entry: &str) -> &str {
    Path::new(entry)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(entry)
}
