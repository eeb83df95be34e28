//! Socket.IO client over a WebSocket transport.
//!
//! Performs the Engine.IO open, the Socket.IO namespace connect with auth,
//! and waits for the server's `welcome` before handing the socket over to
//! the read/write pumps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use zher_protocol::constants::{
    DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT, ENGINE_IO_VERSION, SOCKET_IO_PATH,
    WS_CONNECT_TIMEOUT, WS_MAX_MESSAGE_SIZE,
};
use zher_protocol::{ConnectAuth, EventName, HandshakeData, Packet, ProtocolError, Welcome};

use crate::types::DisconnectReason;

/// Errors from the socket client.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connect timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("connection rejected: {0}")]
    ConnectRejected(String),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Callback for inbound Socket.IO events. The packet is always
/// [`Packet::Event`].
pub type EventCallback = Arc<dyn Fn(EventName, Packet) + Send + Sync>;

/// Callback fired once when the socket goes away.
pub type DisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Builds the WebSocket URL of the Socket.IO endpoint from an HTTP base URL.
///
/// `http://host:port` becomes
/// `ws://host:port/socket.io/?EIO=4&transport=websocket`.
pub fn socket_url(server_url: &str) -> Result<String, WsError> {
    let trimmed = server_url.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return Err(WsError::InvalidUrl(server_url.to_string()));
    };

    if ws_base.ends_with("//") || ws_base.ends_with(':') {
        return Err(WsError::InvalidUrl(server_url.to_string()));
    }

    Ok(format!(
        "{ws_base}{SOCKET_IO_PATH}?EIO={ENGINE_IO_VERSION}&transport=websocket"
    ))
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// A socket that completed the handshake and got its `welcome`, but whose
/// pumps are not running yet. Nothing is read from it until
/// [`PendingSocket::start`], so the caller can adopt the welcome first.
pub struct PendingSocket {
    ws_stream: WsStream,
    handshake: HandshakeData,
}

impl PendingSocket {
    /// Connects, authenticates and waits for the server's `welcome`.
    ///
    /// Fails with [`WsError::ConnectRejected`] when the server refuses the
    /// namespace connect or drops it before greeting us (wrong room code).
    pub async fn open(url: &str, auth: &ConnectAuth) -> Result<(Self, Welcome), WsError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        let connect = async {
            let (mut ws_stream, _) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
            let (handshake, welcome) = handshake(&mut ws_stream, auth).await?;
            Ok::<_, WsError>((ws_stream, handshake, welcome))
        };
        let (ws_stream, handshake, welcome) = tokio::time::timeout(WS_CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| WsError::Timeout)??;

        debug!(sid = %handshake.sid, user = %welcome.user.id, "welcome received");
        Ok((
            Self {
                ws_stream,
                handshake,
            },
            welcome,
        ))
    }

    /// Spawns the read and write pumps. Events after the welcome go to
    /// `on_event`.
    pub fn start(self, on_event: EventCallback, on_disconnect: DisconnectCallback) -> SocketClient {
        let Self {
            ws_stream,
            handshake,
        } = self;
        let liveness = liveness_window(&handshake);
        let (write, read) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let manual_close = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        // Exits on cancel once queued frames are flushed.
        tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel.clone()));

        let read_handle = {
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            let manual_close = manual_close.clone();
            let on_disconnect: DisconnectCallback = Arc::new(move |reason| {
                if manual_close.load(Ordering::Relaxed) {
                    on_disconnect(DisconnectReason::Manual);
                } else {
                    on_disconnect(reason);
                }
            });
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                liveness,
                on_event,
                on_disconnect,
                write_tx,
                cancel,
            ))
        };

        info!(sid = %handshake.sid, "socket connected");

        SocketClient {
            write_tx,
            sid: handshake.sid,
            manual_close,
            read_handle,
            cancel,
        }
    }
}

/// Socket connected to the room server's default namespace.
pub struct SocketClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    sid: String,
    manual_close: Arc<AtomicBool>,
    read_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl SocketClient {
    /// Opens a socket and starts its pumps right away.
    ///
    /// The welcome is returned, not passed to `on_event`.
    pub async fn connect(
        url: &str,
        auth: &ConnectAuth,
        on_event: EventCallback,
        on_disconnect: DisconnectCallback,
    ) -> Result<(Self, Welcome), WsError> {
        let (pending, welcome) = PendingSocket::open(url, auth).await?;
        Ok((pending.start(on_event, on_disconnect), welcome))
    }

    /// Engine.IO session id assigned by the server.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Emits an event with a payload.
    pub async fn emit<T: Serialize>(&self, event: EventName, data: &T) -> Result<(), WsError> {
        self.send_packet(Packet::event(event, Some(data))?).await
    }

    async fn send_packet(&self, packet: Packet) -> Result<(), WsError> {
        let text = packet.encode();
        trace!(frame = %text, "sending");
        self.write_tx
            .send(tungstenite::Message::Text(text.into()))
            .await
            .map_err(|_| WsError::Closed)
    }

    /// Returns `true` while both pumps are running.
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Leaves the namespace and closes the connection. The disconnect
    /// callback reports [`DisconnectReason::Manual`].
    pub async fn close(&self) {
        self.manual_close.store(true, Ordering::Relaxed);
        let _ = self.send_packet(Packet::Disconnect).await;
        self.cancel.cancel();
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.manual_close.store(true, Ordering::Relaxed);
        self.cancel.cancel();
        self.read_handle.abort();
    }
}

/// Liveness window: the server pings every `pingInterval` and expects a pong
/// within `pingTimeout`.
fn liveness_window(handshake: &HandshakeData) -> Duration {
    let interval = match handshake.ping_interval {
        0 => DEFAULT_PING_INTERVAL,
        ms => Duration::from_millis(ms),
    };
    let timeout = match handshake.ping_timeout {
        0 => DEFAULT_PING_TIMEOUT,
        ms => Duration::from_millis(ms),
    };
    interval + timeout
}

/// Runs the connect sequence on a fresh WebSocket.
async fn handshake<S>(ws: &mut S, auth: &ConnectAuth) -> Result<(HandshakeData, Welcome), WsError>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
        + Sink<tungstenite::Message, Error = tungstenite::Error>
        + Unpin,
{
    let handshake = loop {
        match next_packet(ws).await? {
            Packet::Open(hs) => break hs,
            other => trace!(?other, "ignoring packet before open"),
        }
    };
    debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine open");

    send(ws, Packet::connect(auth)?).await?;

    loop {
        match next_packet(ws).await? {
            Packet::Connect(_) => break,
            Packet::ConnectError(message) => return Err(WsError::ConnectRejected(message)),
            Packet::Disconnect | Packet::Close => {
                return Err(WsError::ConnectRejected("server closed the connection".into()));
            }
            Packet::Ping => send(ws, Packet::Pong).await?,
            other => trace!(?other, "ignoring packet before connect ack"),
        }
    }

    loop {
        let packet = next_packet(ws).await?;
        if matches!(
            packet,
            Packet::Event {
                event: EventName::Welcome,
                ..
            }
        ) {
            let welcome: Welcome = packet
                .parse_data()?
                .ok_or_else(|| WsError::ConnectRejected("empty welcome".into()))?;
            return Ok((handshake, welcome));
        }

        match packet {
            Packet::Disconnect | Packet::Close => {
                return Err(WsError::ConnectRejected(
                    "disconnected by server before welcome (invalid room code?)".into(),
                ));
            }
            Packet::ConnectError(message) => return Err(WsError::ConnectRejected(message)),
            Packet::Ping => send(ws, Packet::Pong).await?,
            other => debug!(?other, "dropping packet before welcome"),
        }
    }
}

async fn send<S>(ws: &mut S, packet: Packet) -> Result<(), WsError>
where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    ws.send(tungstenite::Message::Text(packet.encode().into()))
        .await?;
    Ok(())
}

async fn next_packet<S>(ws: &mut S) -> Result<Packet, WsError>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => return Ok(Packet::decode(&text)?),
            Some(Ok(tungstenite::Message::Close(_))) => return Ok(Packet::Close),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(WsError::Closed),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    pub(crate) const OPEN: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

    pub(crate) fn welcome_frame(user_id: &str) -> String {
        format!(
            r##"42["welcome",{{"user":{{"id":"{user_id}","name":"a1b2","color":"#123","device":"desktop"}},"allUsers":[{{"id":"{user_id}","name":"a1b2","color":"#123","device":"desktop"}}],"serverUrl":"http://192.168.1.5:4836"}}]"##
        )
    }

    /// Spawns a one-connection server running `script` and returns its
    /// `http://` base URL.
    pub(crate) async fn fake_server<F, Fut>(script: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            script(ws).await;
        });
        format!("http://{addr}")
    }

    pub(crate) async fn recv_text(
        ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    ) -> String {
        loop {
            match ws.next().await {
                Some(Ok(tungstenite::Message::Text(t))) => return t.to_string(),
                Some(Ok(_)) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }

    pub(crate) async fn send_text(
        ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
        text: &str,
    ) {
        ws.send(tungstenite::Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    fn noop_callbacks() -> (EventCallback, DisconnectCallback) {
        (Arc::new(|_, _| {}), Arc::new(|_| {}))
    }

    fn auth(room: Option<&str>) -> ConnectAuth {
        ConnectAuth {
            session_id: "sess-1".into(),
            room_code: room.map(String::from),
        }
    }

    #[test]
    fn ws_error_display() {
        assert_eq!(WsError::Timeout.to_string(), "connect timed out");
        assert_eq!(WsError::Closed.to_string(), "connection closed");
        assert_eq!(
            WsError::ConnectRejected("bad code".into()).to_string(),
            "connection rejected: bad code"
        );
    }

    #[test]
    fn socket_url_from_http() {
        assert_eq!(
            socket_url("http://192.168.1.5:4836").unwrap(),
            "ws://192.168.1.5:4836/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_url("https://chat.example/").unwrap(),
            "wss://chat.example/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_url("ws://h:1").unwrap(),
            "ws://h:1/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn socket_url_rejects_other_schemes() {
        assert!(matches!(socket_url("ftp://h"), Err(WsError::InvalidUrl(_))));
        assert!(matches!(socket_url("localhost:4836"), Err(WsError::InvalidUrl(_))));
        assert!(matches!(socket_url("http://"), Err(WsError::InvalidUrl(_))));
    }

    #[test]
    fn liveness_defaults_when_zero() {
        let hs = HandshakeData {
            sid: "s".into(),
            upgrades: Vec::new(),
            ping_interval: 0,
            ping_timeout: 0,
            max_payload: 0,
        };
        assert_eq!(liveness_window(&hs), DEFAULT_PING_INTERVAL + DEFAULT_PING_TIMEOUT);

        let hs = HandshakeData {
            ping_interval: 1000,
            ping_timeout: 500,
            ..hs
        };
        assert_eq!(liveness_window(&hs), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn connect_sends_auth_and_returns_welcome() {
        let (auth_tx, auth_rx) = tokio::sync::oneshot::channel();
        let base = fake_server(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            let connect = recv_text(&mut ws).await;
            let _ = auth_tx.send(connect);
            send_text(&mut ws, r#"40{"sid":"sock-1"}"#).await;
            send_text(&mut ws, &welcome_frame("u-1")).await;
            // Keep the socket open until the client goes away.
            while ws.next().await.is_some() {}
        })
        .await;

        let (on_event, on_disconnect) = noop_callbacks();
        let (client, welcome) = SocketClient::connect(
            &socket_url(&base).unwrap(),
            &auth(Some("4321")),
            on_event,
            on_disconnect,
        )
        .await
        .unwrap();

        assert_eq!(client.sid(), "eio-1");
        assert!(client.is_open());
        assert_eq!(welcome.user.id, "u-1");
        assert_eq!(welcome.server_url, "http://192.168.1.5:4836");
        assert_eq!(
            auth_rx.await.unwrap(),
            r#"40{"sessionId":"sess-1","roomCode":"4321"}"#
        );
        client.close().await;
    }

    #[tokio::test]
    async fn connect_error_is_rejected() {
        let base = fake_server(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            recv_text(&mut ws).await;
            send_text(&mut ws, r#"44{"message":"not allowed"}"#).await;
        })
        .await;

        let (on_event, on_disconnect) = noop_callbacks();
        let result =
            SocketClient::connect(&socket_url(&base).unwrap(), &auth(None), on_event, on_disconnect)
                .await;
        match result {
            Err(WsError::ConnectRejected(m)) => assert_eq!(m, "not allowed"),
            Err(e) => panic!("expected rejection, got {e}"),
            Ok(_) => panic!("expected rejection, got a connection"),
        }
    }

    #[tokio::test]
    async fn disconnect_before_welcome_is_rejected() {
        let base = fake_server(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            recv_text(&mut ws).await;
            send_text(&mut ws, r#"40{"sid":"sock-1"}"#).await;
            send_text(&mut ws, "41").await;
        })
        .await;

        let (on_event, on_disconnect) = noop_callbacks();
        let result = SocketClient::connect(
            &socket_url(&base).unwrap(),
            &auth(Some("wrong")),
            on_event,
            on_disconnect,
        )
        .await;
        assert!(matches!(result, Err(WsError::ConnectRejected(_))));
    }

    #[tokio::test]
    async fn events_reach_callback_and_close_reports_manual() {
        let base = fake_server(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            recv_text(&mut ws).await;
            send_text(&mut ws, r#"40{"sid":"sock-1"}"#).await;
            send_text(&mut ws, &welcome_frame("u-1")).await;
            send_text(&mut ws, r#"42["user-left","u-9"]"#).await;
            // Echo the client's emit back as a message event.
            let frame = recv_text(&mut ws).await;
            assert_eq!(frame, r#"42["text-message","hello"]"#);
            while ws.next().await.is_some() {}
        })
        .await;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let on_event: EventCallback = Arc::new(move |name, _| {
            let _ = event_tx.send(name);
        });
        let (dc_tx, mut dc_rx) = mpsc::unbounded_channel();
        let on_disconnect: DisconnectCallback = Arc::new(move |reason| {
            let _ = dc_tx.send(reason);
        });

        let (client, _) =
            SocketClient::connect(&socket_url(&base).unwrap(), &auth(None), on_event, on_disconnect)
                .await
                .unwrap();

        // The welcome is returned by connect, not dispatched.
        assert_eq!(event_rx.recv().await, Some(EventName::UserLeft));
        client.emit(EventName::TextMessage, &"hello").await.unwrap();

        client.close().await;
        assert_eq!(dc_rx.recv().await, Some(DisconnectReason::Manual));
    }

    #[tokio::test]
    async fn server_disconnect_after_welcome() {
        let base = fake_server(|mut ws| async move {
            send_text(&mut ws, OPEN).await;
            recv_text(&mut ws).await;
            send_text(&mut ws, r#"40{"sid":"sock-1"}"#).await;
            send_text(&mut ws, &welcome_frame("u-1")).await;
            send_text(&mut ws, "41").await;
            while ws.next().await.is_some() {}
        })
        .await;

        let (dc_tx, mut dc_rx) = mpsc::unbounded_channel();
        let on_disconnect: DisconnectCallback = Arc::new(move |reason| {
            let _ = dc_tx.send(reason);
        });
        let (client, _) = SocketClient::connect(
            &socket_url(&base).unwrap(),
            &auth(None),
            Arc::new(|_, _| {}),
            on_disconnect,
        )
        .await
        .unwrap();

        assert_eq!(dc_rx.recv().await, Some(DisconnectReason::ServerDisconnect));
        assert!(!client.is_open());
    }
}
