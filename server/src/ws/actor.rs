use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::lifecycle::{Admission, CloseReason, ConnectionManager};
use super::{ConnectionHandle, ConnectionReceiver};
use crate::state::HeartbeatConfig;

/// Close code sent when the server drops a connection without queueing a
/// more specific close frame first (e.g. its queue was full).
const CLOSE_POLICY: u16 = 1008;

/// Run the actor-per-connection pattern for an admitted WebSocket.
///
/// - Writer task: owns the sink, drains the outbound queue with a per-frame
///   write timeout.
/// - Heartbeat task: pings periodically and forces close on a missing pong.
/// - Reader loop (this task): answers pings, records pongs, watches for the
///   client going away.
///
/// Any of them can end the connection by cancelling the shared token; the
/// lifecycle manager's close runs once on the way out.
pub async fn run_connection(
    socket: WebSocket,
    manager: Arc<ConnectionManager>,
    admission: Admission,
    heartbeat: HeartbeatConfig,
) {
    let Admission { session, outbound } = admission;
    let conn_id = session.id().clone();
    let user_id = session.user_id().clone();
    let shutdown = session.handle().shutdown_token();

    let (ws_sender, mut ws_receiver) = socket.split();
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();

    tracing::info!(user_id = %user_id, conn_id = %conn_id, "WebSocket actor started");

    let writer_handle = tokio::spawn(writer_task(
        ws_sender,
        outbound,
        shutdown.clone(),
        heartbeat,
    ));
    let mut heartbeat_handle = tokio::spawn(heartbeat_task(
        session.handle().clone(),
        pong_rx,
        heartbeat,
    ));

    let reason = loop {
        tokio::select! {
            biased;
            cause = &mut heartbeat_handle => {
                break cause.unwrap_or(CloseReason::Forced);
            }
            _ = shutdown.cancelled() => break CloseReason::Forced,
            next = ws_receiver.next() => match next {
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.send(());
                }
                Some(Ok(Message::Ping(data))) => {
                    if session.handle().push(Message::Pong(data)).is_err() {
                        break CloseReason::Forced;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(
                        conn_id = %conn_id,
                        "Ignoring client text frame: {}",
                        text.as_str().chars().take(100).collect::<String>()
                    );
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(conn_id = %conn_id, bytes = data.len(), "Ignoring client binary frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(conn_id = %conn_id, reason = ?frame, "Client initiated close");
                    break CloseReason::ClientClosed;
                }
                Some(Err(e)) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break CloseReason::TransportError;
                }
                None => break CloseReason::ClientClosed,
            },
        }
    };
    heartbeat_handle.abort();

    if reason.close_frame().is_none() {
        // Peer already closed or the socket failed: nothing more to write.
        writer_handle.abort();
    }
    let _ = manager.close(&conn_id, reason);
    // close cancelled the token; the writer flushes what it can and exits
    let _ = writer_handle.await;

    tracing::info!(user_id = %user_id, conn_id = %conn_id, %reason, "WebSocket actor stopped");
}

/// Drains the outbound queue into the socket until the connection is cancelled
/// or the socket fails.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: ConnectionReceiver,
    shutdown: CancellationToken,
    heartbeat: HeartbeatConfig,
) {
    loop {
        let msg = tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = shutdown.cancelled() => {
                let frame = CloseFrame {
                    code: CLOSE_POLICY,
                    reason: "connection closed by server".into(),
                };
                let _ = timeout(heartbeat.write_timeout, ws_sender.send(Message::Close(Some(frame)))).await;
                break;
            }
        };

        let is_close = matches!(msg, Message::Close(_));
        match timeout(heartbeat.write_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) if !is_close => {}
            Ok(Ok(())) => break,
            Ok(Err(_)) | Err(_) => {
                // Socket broken or peer not reading: treat as stuck.
                shutdown.cancel();
                break;
            }
        }
    }
}

/// Sends periodic pings through the outbound queue and waits for the pong.
/// Returns when the connection should end, with the cause.
async fn heartbeat_task(
    handle: Arc<ConnectionHandle>,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    heartbeat: HeartbeatConfig,
) -> CloseReason {
    let mut ticker = interval(heartbeat.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if handle.push(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            return CloseReason::Forced;
        }

        match timeout(heartbeat.pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {
                // Drop pongs that arrived early so the next round waits for a fresh one
                while pong_rx.try_recv().is_ok() {}
            }
            _ => {
                tracing::warn!(conn_id = %handle.id(), "Pong timeout, closing connection");
                return CloseReason::HeartbeatTimeout;
            }
        }
    }
}
