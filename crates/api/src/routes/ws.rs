//! Live event viewers over WebSocket.

use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use hub::HubHandle;
use tokio::time::Instant;

/// How often a viewer is pinged.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A viewer that sends nothing (not even a pong) for this long is dropped.
pub const READ_DEADLINE: Duration = Duration::from_secs(60);

pub fn router(hub: HubHandle) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(hub)
}

/// GET /ws
pub async fn upgrade(State(hub): State<HubHandle>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_viewer(socket, hub))
}

async fn serve_viewer(socket: WebSocket, hub: HubHandle) {
    let mut subscription = match hub.register().await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(error = %e, "hub unavailable, closing viewer");
            return;
        }
    };
    let client = subscription.id();
    metrics::counter!("ws_sessions_total").increment(1);
    tracing::info!(client = %client, "viewer connected");

    let (mut sink, mut stream) = socket.split();
    let mut ping = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let deadline = tokio::time::sleep(READ_DEADLINE);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            message = subscription.recv() => {
                // None: the hub dropped this viewer for falling behind.
                let Some(message) = message else { break };
                if sink.send(Message::Text(message.to_string().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => deadline.as_mut().reset(Instant::now() + READ_DEADLINE),
            },
            () = &mut deadline => {
                tracing::debug!(client = %client, "viewer missed read deadline");
                break;
            }
        }
    }

    let _ = sink.close().await;
    tracing::info!(client = %client, "viewer disconnected");
}
