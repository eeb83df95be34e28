//! Chat session: one client in one room.
//!
//! Owns the socket, applies server events to [`SessionState`], sends text
//! and file offers, serves upload requests from the [`SharedFileStore`] and
//! reconnects with backoff when the transport drops.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use zher_protocol::{ChatMessage, ConnectAuth, EventName, FileMeta, MessageBody, User, Welcome};
use zher_transfer::{Downloader, SharedFileStore, TransferArtifact, TransferError, Uploader};

use crate::reconnection::{
    SessionContext, cancel_reconnect, dispatch_loop, notify, open_client, set_connection,
};
use crate::state::SessionState;
use crate::types::{ConnectionState, ReconnectConfig, SessionEvent};
use crate::ws_client::WsError;

/// Errors returned by [`ChatSession`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("socket error: {0}")]
    Ws(#[from] WsError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("not connected")]
    NotConnected,
}

/// Where and how to join.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP origin of the room server, e.g. `http://192.168.1.5:4836`.
    pub server_url: String,
    /// Room code, when the server requires one.
    pub room_code: Option<String>,
    /// Persistent client id so the server can recognise us across reloads.
    pub session_id: String,
    /// Where downloads are written.
    pub download_dir: PathBuf,
    pub reconnect: ReconnectConfig,
}

/// A client's membership in a chat room.
pub struct ChatSession {
    ctx: SessionContext,
    download_dir: PathBuf,
    downloader: Downloader,
    events_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<crate::reconnection::Inbound>>>,
    dispatcher: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Milliseconds since the epoch, used as the id of locally echoed messages.
fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

impl ChatSession {
    /// Creates a disconnected session.
    pub fn new(config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let http = reqwest::Client::new();

        let ctx = SessionContext {
            server_url: config.server_url.clone(),
            auth: ConnectAuth {
                session_id: config.session_id,
                room_code: config.room_code.filter(|c| !c.trim().is_empty()),
            },
            state: Arc::new(RwLock::new(SessionState::default())),
            client: Arc::new(Mutex::new(None)),
            store: Arc::new(SharedFileStore::new()),
            uploader: Uploader::new(http.clone(), config.server_url.clone()),
            events_tx,
            inbound_tx,
            reconnect_cancel: Arc::new(std::sync::Mutex::new(None)),
            manual_disconnect: Arc::new(AtomicBool::new(false)),
            reconnect_config: config.reconnect,
        };

        Self {
            ctx,
            download_dir: config.download_dir,
            downloader: Downloader::new(http, config.server_url),
            events_rx: Mutex::new(Some(events_rx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            dispatcher: Mutex::new(None),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Connects and waits for the server's welcome.
    ///
    /// A wrong room code surfaces as [`WsError::ConnectRejected`] and as a
    /// [`SessionEvent::Alert`].
    pub async fn connect(&self) -> Result<Welcome, SessionError> {
        cancel_reconnect(&self.ctx.reconnect_cancel);
        self.ctx.manual_disconnect.store(false, Ordering::Relaxed);
        self.ensure_dispatcher().await;

        if let Some(old) = self.ctx.client.lock().await.take() {
            old.close().await;
        }

        set_connection(&self.ctx, ConnectionState::Connecting).await;
        info!(server = %self.ctx.server_url, "connecting to room");

        match open_client(&self.ctx).await {
            Ok(welcome) => Ok(welcome),
            Err(e) => {
                warn!(error = %e, "connection failed");
                set_connection(&self.ctx, ConnectionState::Disconnected).await;
                if let WsError::ConnectRejected(reason) = &e {
                    notify(
                        &self.ctx.events_tx,
                        SessionEvent::Alert(format!("Connection rejected: {reason}")),
                    );
                }
                Err(e.into())
            }
        }
    }

    async fn ensure_dispatcher(&self) {
        let mut dispatcher = self.dispatcher.lock().await;
        if dispatcher.is_some() {
            return;
        }
        if let Some(inbound_rx) = self.inbound_rx.lock().await.take() {
            *dispatcher = Some(tokio::spawn(dispatch_loop(self.ctx.clone(), inbound_rx)));
        }
    }

    /// Leaves the room. No reconnect follows.
    pub async fn disconnect(&self) {
        self.ctx.manual_disconnect.store(true, Ordering::Relaxed);
        cancel_reconnect(&self.ctx.reconnect_cancel);

        let client = self.ctx.client.lock().await.take();
        match client {
            Some(client) => {
                client.close().await;
                info!("left the room");
            }
            None => set_connection(&self.ctx, ConnectionState::Disconnected).await,
        }
    }

    async fn emit<T: serde::Serialize>(&self, event: EventName, data: &T) -> Result<(), SessionError> {
        let guard = self.ctx.client.lock().await;
        let client = guard
            .as_ref()
            .filter(|c| c.is_open())
            .ok_or(SessionError::NotConnected)?;
        client.emit(event, data).await?;
        Ok(())
    }

    /// Our profile, with blank fields left as the server sent them.
    async fn author(&self) -> User {
        self.ctx
            .state
            .read()
            .await
            .current_user
            .clone()
            .unwrap_or_else(|| User {
                id: String::new(),
                name: String::new(),
                color: String::new(),
                device: String::new(),
            })
    }

    /// Sends a text message and echoes it into the local history.
    ///
    /// Blank input (whitespace only) is not sent and yields `Ok(None)`. The
    /// text goes out untrimmed.
    pub async fn send_text(&self, text: &str) -> Result<Option<ChatMessage>, SessionError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        self.emit(EventName::TextMessage, &text).await?;

        let message = ChatMessage::from_user(
            now_millis(),
            &self.author().await,
            MessageBody::Text { text: text.into() },
        );
        self.ctx.state.write().await.push_message(message.clone());
        debug!(id = message.id, "text sent");
        Ok(Some(message))
    }

    /// Offers an artifact to the room: registers it for upload requests,
    /// announces it with `file-meta`, and echoes the offer locally.
    pub async fn send_artifact(&self, artifact: TransferArtifact) -> Result<ChatMessage, SessionError> {
        let file = artifact.into_file();
        let meta = FileMeta {
            file_id: String::new(),
            file_name: file.name().to_string(),
            file_size: file.size(),
            file_type: file.content_type().to_string(),
        };
        let file_id = self.ctx.store.register(file);
        let meta = FileMeta { file_id, ..meta };

        if let Err(e) = self.emit(EventName::FileMeta, &meta).await {
            self.ctx.store.remove(&meta.file_id);
            return Err(e);
        }

        info!(file_id = %meta.file_id, name = %meta.file_name, size = meta.file_size, "file offered");
        let message = ChatMessage::from_user(now_millis(), &self.author().await, MessageBody::File(meta));
        self.ctx.state.write().await.push_message(message.clone());
        Ok(message)
    }

    /// Asks the server to rename us. The outcome arrives as
    /// [`SessionEvent::NameChanged`] or [`SessionEvent::Alert`].
    pub async fn request_name_change(&self, name: &str) -> Result<(), SessionError> {
        debug!(name, "requesting name change");
        self.emit(EventName::RequestNameChange, &name).await
    }

    /// Downloads an offered file into the download directory.
    pub async fn download(&self, file_id: &str, file_name: &str) -> Result<PathBuf, SessionError> {
        Ok(self
            .downloader
            .download(file_id, file_name, &self.download_dir)
            .await?)
    }

    pub async fn users(&self) -> Vec<User> {
        self.ctx.state.read().await.users.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.ctx.state.read().await.current_user.clone()
    }

    /// Shareable server URL from the welcome; empty before it.
    pub async fn server_url(&self) -> String {
        self.ctx.state.read().await.server_url.clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.ctx.state.read().await.connection.clone()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.ctx.state.read().await.messages.clone()
    }

    pub async fn is_editing_name(&self) -> bool {
        self.ctx.state.read().await.editing_name
    }

    pub async fn set_editing_name(&self, editing: bool) {
        self.ctx.state.write().await.editing_name = editing;
    }

    /// Files offered in this session.
    pub fn store(&self) -> &Arc<SharedFileStore> {
        &self.ctx.store
    }

    pub fn session_id(&self) -> &str {
        &self.ctx.auth.session_id
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.ctx.manual_disconnect.store(true, Ordering::Relaxed);
        cancel_reconnect(&self.ctx.reconnect_cancel);
        if let Ok(mut client) = self.ctx.client.try_lock() {
            client.take();
        }
        if let Ok(mut dispatcher) = self.dispatcher.try_lock()
            && let Some(handle) = dispatcher.take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{WebSocketStream, accept_async};

    use super::*;
    use crate::reconnection::handle_start_upload;
    use crate::ws_client::tests::{OPEN, fake_server, recv_text, send_text, welcome_frame};
    use zher_protocol::StartUpload;
    use zher_transfer::FileHandle;

    type Ws = WebSocketStream<tokio::net::TcpStream>;

    fn config(server_url: String) -> SessionConfig {
        SessionConfig {
            server_url,
            room_code: None,
            session_id: "sess-1".into(),
            download_dir: std::env::temp_dir(),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(50),
                backoff_factor: 2.0,
                max_attempts: Some(3),
            },
        }
    }

    async fn greet(ws: &mut Ws) {
        send_text(ws, OPEN).await;
        recv_text(ws).await;
        send_text(ws, r#"40{"sid":"sock-1"}"#).await;
        send_text(ws, &welcome_frame("me")).await;
    }

    async fn next_matching<F>(rx: &mut mpsc::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let session = ChatSession::new(config("http://127.0.0.1:9".into()));
        assert!(matches!(
            session.send_text("hi").await,
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.request_name_change("neo").await,
            Err(SessionError::NotConnected)
        ));

        let artifact = TransferArtifact::Passthrough(FileHandle::from_bytes("a.txt", b"a".to_vec()));
        assert!(session.send_artifact(artifact).await.is_err());
        assert!(session.store().is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_not_sent() {
        let session = ChatSession::new(config("http://127.0.0.1:9".into()));
        assert!(session.send_text("   \n\t").await.unwrap().is_none());
        assert!(session.messages().await.is_empty());
    }

    #[tokio::test]
    async fn chat_round_trip() {
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        let base = fake_server(move |mut ws| async move {
            greet(&mut ws).await;
            for _ in 0..3 {
                let frame = recv_text(&mut ws).await;
                let _ = frames_tx.send(frame);
            }
            // Server echo of our own text, then a message from someone else.
            send_text(
                &mut ws,
                r#"42["message",{"id":1,"senderId":"me","type":"text","text":" hi "}]"#,
            )
            .await;
            send_text(
                &mut ws,
                r##"42["message",{"id":2,"senderId":"u-2","senderName":"bob","senderColor":"#f00","senderDevice":"mobile","type":"text","text":"yo"}]"##,
            )
            .await;
            send_text(&mut ws, r#"42["name-change-success","neo"]"#).await;
            while ws.next().await.is_some() {}
        })
        .await;

        let session = ChatSession::new(config(base));
        let mut events = session.take_events().await.unwrap();
        assert!(session.take_events().await.is_none());

        let welcome = session.connect().await.unwrap();
        assert_eq!(welcome.user.id, "me");
        assert_eq!(session.connection_state().await, ConnectionState::Connected);

        let sent = session.send_text(" hi ").await.unwrap().unwrap();
        assert_eq!(sent.text(), Some(" hi "));
        assert_eq!(sent.sender_id, "me");

        let artifact =
            TransferArtifact::Passthrough(FileHandle::from_bytes("notes.txt", b"abc".to_vec()));
        let offer = session.send_artifact(artifact).await.unwrap();
        let meta = offer.file().unwrap().clone();
        assert_eq!(meta.file_name, "notes.txt");
        assert_eq!(meta.file_size, 3);
        assert_eq!(meta.file_id.len(), 9);
        assert!(session.store().get(&meta.file_id).is_some());

        session.set_editing_name(true).await;
        session.request_name_change("neo").await.unwrap();

        assert_eq!(frames_rx.recv().await.unwrap(), r#"42["text-message"," hi "]"#);
        let file_frame = frames_rx.recv().await.unwrap();
        assert!(file_frame.starts_with(r#"42["file-meta",{"fileId":""#));
        assert!(file_frame.contains(r#""fileName":"notes.txt""#));
        assert_eq!(
            frames_rx.recv().await.unwrap(),
            r#"42["request-name-change","neo"]"#
        );

        let incoming = next_matching(&mut events, |e| matches!(e, SessionEvent::Message(_))).await;
        match incoming {
            SessionEvent::Message(m) => assert_eq!(m.text(), Some("yo")),
            other => panic!("unexpected {other:?}"),
        }
        next_matching(&mut events, |e| matches!(e, SessionEvent::NameChanged(_))).await;

        // Local echoes plus bob's message; the server's copy of ours is dropped.
        let history = session.messages().await;
        assert_eq!(history.len(), 3);
        assert_eq!(session.current_user().await.unwrap().name, "neo");
        assert!(!session.is_editing_name().await);

        session.disconnect().await;
        next_matching(&mut events, |e| {
            matches!(e, SessionEvent::StateChanged(ConnectionState::Disconnected))
        })
        .await;
    }

    #[tokio::test]
    async fn wrong_room_code_is_rejected() {
        let base = fake_server(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            recv_text(&mut ws).await;
            send_text(&mut ws, r#"40{"sid":"sock-1"}"#).await;
            send_text(&mut ws, "41").await;
        })
        .await;

        let mut cfg = config(base);
        cfg.room_code = Some("0000".into());
        let session = ChatSession::new(cfg);
        let mut events = session.take_events().await.unwrap();

        let result = session.connect().await;
        assert!(matches!(
            result,
            Err(SessionError::Ws(WsError::ConnectRejected(_)))
        ));
        assert_eq!(
            session.connection_state().await,
            ConnectionState::Disconnected
        );

        let alert = next_matching(&mut events, |e| matches!(e, SessionEvent::Alert(_))).await;
        assert!(matches!(alert, SessionEvent::Alert(m) if m.starts_with("Connection rejected")));
    }

    #[tokio::test]
    async fn welcome_is_applied_when_connect_returns() {
        let base = fake_server(|mut ws| async move {
            greet(&mut ws).await;
            while ws.next().await.is_some() {}
        })
        .await;

        let session = ChatSession::new(config(base));
        let mut events = session.take_events().await.unwrap();
        session.connect().await.unwrap();

        let me = session.current_user().await.expect("profile after connect");
        assert_eq!(me.id, "me");
        assert_eq!(session.users().await.len(), 1);
        assert_eq!(session.server_url().await, "http://192.168.1.5:4836");

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::StateChanged(ConnectionState::Connecting))
        ));
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Welcome { user, .. }) if user.id == "me"
        ));
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::StateChanged(ConnectionState::Connected))
        ));

        let sent = session.send_text("first").await.unwrap().unwrap();
        assert_eq!(sent.sender_id, "me");
        assert_eq!(sent.sender_name, "a1b2");
        session.disconnect().await;
    }

    #[tokio::test]
    async fn idle_listener_does_not_stall_dispatch() {
        let base = fake_server(|mut ws| async move {
            greet(&mut ws).await;
            for id in 0..300 {
                let frame = format!(
                    r#"42["message",{{"id":{id},"senderId":"u-2","type":"text","text":"m"}}]"#
                );
                send_text(&mut ws, &frame).await;
            }
            send_text(
                &mut ws,
                r##"42["user-joined",{"id":"u-9","name":"late","color":"#0f0","device":"mobile"}]"##,
            )
            .await;
            while ws.next().await.is_some() {}
        })
        .await;

        let session = ChatSession::new(config(base));
        // Held but never read.
        let _events = session.take_events().await.unwrap();
        session.connect().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !session.users().await.iter().any(|u| u.id == "u-9") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("join applied despite a full event channel");
        assert_eq!(session.messages().await.len(), 300);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn reconnects_after_transport_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // First socket dies right after the welcome, the second stays up.
            for round in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                greet(&mut ws).await;
                if round == 0 {
                    drop(ws);
                } else {
                    tokio::spawn(async move { while ws.next().await.is_some() {} });
                }
            }
        });

        let session = ChatSession::new(config(format!("http://{addr}")));
        let mut events = session.take_events().await.unwrap();
        session.connect().await.unwrap();

        let reconnecting =
            next_matching(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
        assert!(matches!(reconnecting, SessionEvent::Reconnecting { attempt: 1, .. }));

        next_matching(&mut events, |e| {
            matches!(e, SessionEvent::StateChanged(ConnectionState::Connected))
        })
        .await;
        assert_eq!(session.connection_state().await, ConnectionState::Connected);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn server_disconnect_is_not_retried() {
        let base = fake_server(|mut ws| async move {
            greet(&mut ws).await;
            send_text(&mut ws, "41").await;
            while ws.next().await.is_some() {}
        })
        .await;

        let session = ChatSession::new(config(base));
        let mut events = session.take_events().await.unwrap();
        session.connect().await.unwrap();

        let alert = next_matching(&mut events, |e| matches!(e, SessionEvent::Alert(_))).await;
        assert!(matches!(alert, SessionEvent::Alert(m) if m.contains("server")));
        assert_eq!(
            session.connection_state().await,
            ConnectionState::Disconnected
        );
    }

    /// Accepts one HTTP request, returns its raw bytes after answering 200.
    async fn one_shot_http() -> (String, tokio::sync::oneshot::Receiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if raw.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            let _ = tx.send(raw);
        });
        (format!("http://{addr}"), rx)
    }

    #[tokio::test]
    async fn start_upload_streams_requested_slice() {
        let (base, request) = one_shot_http().await;
        let session = ChatSession::new(config(base));
        let mut events = session.take_events().await.unwrap();

        let file_id = session
            .store()
            .register(FileHandle::from_bytes("data.bin", b"0123456789".to_vec()));

        handle_start_upload(
            session.ctx.clone(),
            StartUpload {
                file_id: file_id.clone(),
                transfer_id: "t-1".into(),
                offset: 2,
                end: Some(5),
            },
        )
        .await;

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::UploadStarted { .. })
        ));
        match events.recv().await {
            Some(SessionEvent::UploadFinished { bytes, transfer_id, .. }) => {
                assert_eq!(bytes, 4);
                assert_eq!(transfer_id, "t-1");
            }
            other => panic!("expected finished upload, got {other:?}"),
        }

        let raw = String::from_utf8_lossy(&request.await.unwrap()).to_string();
        assert!(raw.starts_with("POST /api/upload/t-1 "));
        assert!(raw.contains("2345"));
        assert!(!raw.contains("0123"));
    }

    #[tokio::test]
    async fn download_writes_into_download_dir() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            assert!(raw.starts_with(b"GET /api/download/f-1 "));
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello")
                .await
                .unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(format!("http://{addr}"));
        cfg.download_dir = dir.path().to_path_buf();
        let session = ChatSession::new(cfg);

        let path = session.download("f-1", "greeting.txt").await.unwrap();
        assert_eq!(path, dir.path().join("greeting.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn start_upload_for_unknown_file_is_ignored() {
        let session = ChatSession::new(config("http://127.0.0.1:9".into()));
        let mut events = session.take_events().await.unwrap();

        handle_start_upload(
            session.ctx.clone(),
            StartUpload {
                file_id: "missing".into(),
                transfer_id: "t".into(),
                offset: 0,
                end: None,
            },
        )
        .await;

        assert!(events.try_recv().is_err());
    }
}
