//! WebSocket read pump: answers heartbeats and dispatches Socket.IO events.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use zher_protocol::Packet;
use zher_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::types::DisconnectReason;
use crate::ws_client::{DisconnectCallback, EventCallback};

/// Reads frames from the WebSocket and dispatches them.
///
/// Any inbound frame resets the liveness deadline. If nothing arrives within
/// `liveness` (the server's ping interval plus ping timeout) the connection
/// is considered dead. The disconnect callback fires once on exit, and the
/// cancel token is triggered so the write pump stops too.
pub(crate) async fn read_pump<S>(
    mut read: S,
    liveness: Duration,
    on_event: EventCallback,
    on_disconnect: DisconnectCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(liveness);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break DisconnectReason::Manual,

            () = &mut deadline => {
                warn!("no frame within {liveness:?}, connection dead");
                break DisconnectReason::PingTimeout;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + liveness);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                if let Some(reason) = handle_text(&text, &on_event, &write_tx).await {
                                    break reason;
                                }
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break DisconnectReason::TransportClose;
                            }
                            _ => {} // WS-level ping/pong and binary
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break DisconnectReason::TransportClose;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break DisconnectReason::TransportClose;
                    }
                }
            }
        }
    };

    cancel.cancel();
    on_disconnect(reason);
}

/// Handles one text frame. Returns a reason when the frame ends the
/// connection.
async fn handle_text(
    text: &str,
    on_event: &EventCallback,
    write_tx: &mpsc::Sender<tungstenite::Message>,
) -> Option<DisconnectReason> {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return None;
    }

    let packet = match Packet::decode(text) {
        Ok(p) => p,
        Err(e) => {
            warn!("failed to decode packet: {e}");
            return None;
        }
    };

    match packet {
        Packet::Ping => {
            trace!("received ping, sending pong");
            let _ = write_tx
                .send(tungstenite::Message::Text(Packet::Pong.encode().into()))
                .await;
            None
        }
        Packet::Event { event, .. } => {
            trace!(%event, "received event");
            on_event(event, packet);
            None
        }
        Packet::Disconnect => {
            debug!("server disconnected the namespace");
            Some(DisconnectReason::ServerDisconnect)
        }
        Packet::Close => {
            debug!("server closed the transport");
            Some(DisconnectReason::TransportClose)
        }
        other => {
            trace!(?other, "ignoring packet");
            None
        }
    }
}
