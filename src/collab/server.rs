use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Extension, OriginalUri, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info, warn};

use super::room::{RoomId, OUTBOUND_QUEUE_FRAMES};
use super::session::{Session, SessionError};
use crate::models::ErrorResponse;
use crate::services::auth_service::AuthenticatedUser;
use crate::utils::scope_guard::ScopeGuard;
use crate::AppState;

/// Why a socket stopped being served.
#[derive(Debug)]
enum CloseReason {
    ClientClosed,
    StreamEnded,
    Transport(String),
    WriterStopped,
}

/// Room id from a request path under the collaboration prefix.
pub fn room_id_from_path(prefix: &str, path: &str) -> Result<RoomId, SessionError> {
    let rest = path.strip_prefix(prefix).ok_or(SessionError::MissingRoom)?;
    if !rest.is_empty() && !rest.starts_with('/') && !rest.starts_with('?') {
        // `/collaborationXYZ` is a different path, not a room.
        return Err(SessionError::MissingRoom);
    }
    RoomId::parse(rest)
}

/// Upgrade endpoint: one socket per editor per note.
pub async fn collaboration_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    user: Option<Extension<AuthenticatedUser>>,
    ws: WebSocketUpgrade,
) -> Response {
    let room_id = match room_id_from_path(&state.config.collab_path, uri.path()) {
        Ok(room_id) => room_id,
        Err(e) => {
            warn!("Rejecting collaboration upgrade for {}: {}", uri.path(), e);
            return ErrorResponse::reply(StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let user = user.map(|Extension(u)| u.subject);
    let ping_interval = state.config.ping_interval();
    debug!("Upgrading collaboration socket for room {}", room_id);
    ws.on_failed_upgrade(|e| error!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| handle_socket(socket, state, room_id, user, ping_interval))
}

/// Drives one socket from join to close.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    room_id: RoomId,
    user: Option<String>,
    ping_interval: Option<Duration>,
) {
    let _open = state.sockets.enter();

    let mut session = match Session::connect(state.registry.clone(), room_id.as_str(), user).await {
        Ok(session) => session,
        Err(e) => {
            error!("Could not open session for room {}: {}", room_id, e);
            return;
        }
    };

    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE_FRAMES);
    if let Err(e) = session.start(tx).await {
        error!("Could not start session {}: {}", session.id(), e);
        session.close().await;
        return;
    }

    let awaiting_pong = Arc::new(AtomicBool::new(false));
    let mut write_task = tokio::spawn(write_loop(sink, rx, ping_interval, awaiting_pong.clone()));
    let writer = write_task.abort_handle();
    // aborts the writer on every exit path, unwinding included
    let _stop_writer = ScopeGuard::new(move || writer.abort());

    let reason = tokio::select! {
        reason = read_loop(&mut stream, &mut session, &awaiting_pong) => reason,
        _ = &mut write_task => CloseReason::WriterStopped,
    };

    match &reason {
        CloseReason::Transport(e) => warn!("Session {} transport error: {}", session.id(), e),
        other => debug!("Session {} ended: {:?}", session.id(), other),
    }
    session.close().await;
}

async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    session: &mut Session,
    awaiting_pong: &AtomicBool,
) -> CloseReason {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(WsMessage::Binary(frame)) => {
                session.handle_frame(&frame).await;
            }
            Ok(WsMessage::Text(text)) => {
                debug!(
                    "Dropping {} byte text frame from session {}",
                    text.len(),
                    session.id()
                );
            }
            Ok(WsMessage::Pong(_)) => awaiting_pong.store(false, Ordering::Relaxed),
            // Answered by the transport itself.
            Ok(WsMessage::Ping(_)) => {}
            Ok(WsMessage::Close(_)) => return CloseReason::ClientClosed,
            Err(e) => return CloseReason::Transport(e.to_string()),
        }
    }
    CloseReason::StreamEnded
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    ping_interval: Option<Duration>,
    awaiting_pong: Arc<AtomicBool>,
) {
    let mut ticker = ping_interval.map(|every| interval_at(Instant::now() + every, every));
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(WsMessage::Binary(frame)).await.is_err() {
                    break;
                }
            }
            _ = next_tick(&mut ticker) => {
                if awaiting_pong.swap(true, Ordering::Relaxed) {
                    info!("Peer did not answer ping, closing socket");
                    break;
                }
                if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
