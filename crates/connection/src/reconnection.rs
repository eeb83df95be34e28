//! Socket lifecycle shared by the session and its background tasks.
//!
//! Contains the shared [`SessionContext`], the socket callbacks, the inbound
//! event dispatcher, and the reconnect loop.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use zher_protocol::{ConnectAuth, EventName, Packet, StartUpload, Welcome};
use zher_transfer::{SharedFileStore, Uploader};

use crate::state::SessionState;
use crate::types::{Applied, ConnectionState, DisconnectReason, ReconnectConfig, SessionEvent};
use crate::ws_client::{
    DisconnectCallback, EventCallback, PendingSocket, SocketClient, WsError, socket_url,
};

/// Inbound event as handed over by the read pump.
pub(crate) type Inbound = (EventName, Packet);

/// Shared state passed to free functions for callback setup, dispatch and
/// reconnection.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) server_url: String,
    pub(crate) auth: ConnectAuth,
    pub(crate) state: Arc<RwLock<SessionState>>,
    pub(crate) client: Arc<Mutex<Option<SocketClient>>>,
    pub(crate) store: Arc<SharedFileStore>,
    pub(crate) uploader: Uploader,
    pub(crate) events_tx: mpsc::Sender<SessionEvent>,
    pub(crate) inbound_tx: mpsc::UnboundedSender<Inbound>,
    pub(crate) reconnect_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    pub(crate) manual_disconnect: Arc<AtomicBool>,
    pub(crate) reconnect_config: ReconnectConfig,
}

/// Cancels the active reconnect loop, if any.
pub(crate) fn cancel_reconnect(reconnect_cancel: &std::sync::Mutex<Option<CancellationToken>>) {
    if let Ok(mut guard) = reconnect_cancel.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

/// Hands an event to the listener without waiting. A listener that falls
/// behind loses events rather than stalling the session.
pub(crate) fn notify(events_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match events_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!(?event, "event channel full, dropping event"),
        Err(TrySendError::Closed(_)) => trace!("no event listener"),
    }
}

/// Updates the connection state and tells listeners.
pub(crate) async fn set_connection(ctx: &SessionContext, state: ConnectionState) {
    let mut guard = ctx.state.write().await;
    guard.connection = state.clone();
    notify(&ctx.events_tx, SessionEvent::StateChanged(state));
}

/// Builds the socket callbacks. Events go to the dispatcher; unexpected
/// disconnects start the reconnect loop.
pub(crate) fn socket_callbacks(ctx: &SessionContext) -> (EventCallback, DisconnectCallback) {
    let inbound_tx = ctx.inbound_tx.clone();
    let on_event: EventCallback = Arc::new(move |event, packet| {
        trace!(%event, "queueing inbound event");
        if inbound_tx.send((event, packet)).is_err() {
            warn!(%event, "dispatcher gone, dropping event");
        }
    });

    let ctx_dc = ctx.clone();
    let on_disconnect: DisconnectCallback = Arc::new(move |reason| {
        let manual = ctx_dc.manual_disconnect.load(Ordering::Relaxed);
        if manual || !reason.should_reconnect() {
            info!(?reason, "socket closed");
            let ctx = ctx_dc.clone();
            tokio::spawn(async move {
                set_connection(&ctx, ConnectionState::Disconnected).await;
                if reason == DisconnectReason::ServerDisconnect && !manual {
                    notify(
                        &ctx.events_tx,
                        SessionEvent::Alert("Disconnected by the server".into()),
                    );
                }
            });
            return;
        }

        warn!(?reason, "socket lost, scheduling reconnect");
        let cancel = CancellationToken::new();
        cancel_reconnect(&ctx_dc.reconnect_cancel);
        if let Ok(mut guard) = ctx_dc.reconnect_cancel.lock() {
            *guard = Some(cancel.clone());
        }
        tokio::spawn(reconnect_loop(ctx_dc.clone(), cancel));
    });

    (on_event, on_disconnect)
}

/// Connects a new socket, adopts its welcome and installs it as the
/// session's client.
pub(crate) async fn open_client(ctx: &SessionContext) -> Result<Welcome, WsError> {
    let url = socket_url(&ctx.server_url)?;
    let (pending, welcome) = PendingSocket::open(&url, &ctx.auth).await?;
    let (on_event, on_disconnect) = socket_callbacks(ctx);

    // Pumps start under the state lock: the dispatcher and a racing
    // disconnect both wait for the welcome to be applied.
    let client: SocketClient = {
        let mut state = ctx.state.write().await;
        let greeting = state.apply_welcome(welcome.clone());
        let client = pending.start(on_event, on_disconnect);
        state.connection = ConnectionState::Connected;
        notify(&ctx.events_tx, greeting);
        notify(
            &ctx.events_tx,
            SessionEvent::StateChanged(ConnectionState::Connected),
        );
        client
    };

    // Replacing the slot drops any dead client left by a previous socket.
    *ctx.client.lock().await = Some(client);
    Ok(welcome)
}

/// Reconnection loop with exponential backoff.
///
/// Returns a boxed future to break the recursive type cycle with
/// [`socket_callbacks`], which spawns this function from its disconnect
/// callback.
pub(crate) fn reconnect_loop(
    ctx: SessionContext,
    cancel: CancellationToken,
) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        set_connection(&ctx, ConnectionState::Disconnected).await;

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            if ctx
                .reconnect_config
                .max_attempts
                .is_some_and(|max| attempt > max)
            {
                warn!(attempts = attempt - 1, "giving up on reconnect");
                set_connection(&ctx, ConnectionState::Disconnected).await;
                notify(&ctx.events_tx, SessionEvent::Alert("Connection lost".into()));
                break;
            }

            let delay = ctx.reconnect_config.delay_for_attempt(attempt);
            let delay_secs = delay.as_secs_f64();
            set_connection(&ctx, ConnectionState::Reconnecting { attempt }).await;
            notify(
                &ctx.events_tx,
                SessionEvent::Reconnecting {
                    attempt,
                    next_retry_secs: delay_secs,
                },
            );

            info!(
                attempt,
                delay_secs = format_args!("{delay_secs:.1}"),
                "reconnecting"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            if cancel.is_cancelled() {
                return;
            }

            match open_client(&ctx).await {
                Ok(_) => {
                    info!(attempt, "reconnected");
                    break;
                }
                Err(WsError::ConnectRejected(reason)) => {
                    warn!(%reason, "server refused reconnect, stopping");
                    set_connection(&ctx, ConnectionState::Disconnected).await;
                    notify(
                        &ctx.events_tx,
                        SessionEvent::Alert(format!("Connection rejected: {reason}")),
                    );
                    break;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                }
            }

            if cancel.is_cancelled() {
                return;
            }
        }

        // A newer loop cancels ours before storing its own token.
        if !cancel.is_cancelled()
            && let Ok(mut guard) = ctx.reconnect_cancel.lock()
        {
            *guard = None;
        }
    })
}

/// Applies inbound events in arrival order until every sender is gone.
///
/// Never waits on the event listener, so state and upload requests keep
/// flowing while the listener is slow.
pub(crate) async fn dispatch_loop(ctx: SessionContext, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    while let Some((event, packet)) = inbound.recv().await {
        let applied = ctx.state.write().await.apply_event(event, &packet);
        match applied {
            Ok(Applied::Events(events)) => {
                for e in events {
                    notify(&ctx.events_tx, e);
                }
            }
            Ok(Applied::StartUpload(request)) => {
                tokio::spawn(handle_start_upload(ctx.clone(), request));
            }
            Err(e) => warn!(%event, "bad event payload: {e}"),
        }
    }
    debug!("dispatcher stopped");
}

/// Streams a requested file to the upload endpoint. Unknown ids are ignored.
pub(crate) async fn handle_start_upload(ctx: SessionContext, request: StartUpload) {
    let StartUpload {
        file_id,
        transfer_id,
        offset,
        end,
    } = request;

    let Some(file) = ctx.store.get(&file_id) else {
        warn!(file_id = %file_id, transfer_id = %transfer_id, "upload requested for unknown file");
        return;
    };

    notify(
        &ctx.events_tx,
        SessionEvent::UploadStarted {
            file_id: file_id.clone(),
            transfer_id: transfer_id.clone(),
        },
    );

    let event = match ctx.uploader.upload(&transfer_id, &file, offset, end).await {
        Ok(bytes) => SessionEvent::UploadFinished {
            file_id,
            transfer_id,
            bytes,
        },
        Err(e) => {
            error!(file_id = %file_id, transfer_id = %transfer_id, "upload failed: {e}");
            SessionEvent::UploadFailed {
                file_id,
                transfer_id,
                error: e.to_string(),
            }
        }
    };
    notify(&ctx.events_tx, event);
}
