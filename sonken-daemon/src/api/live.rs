//! WebSocket endpoint forwarding every broadcast message to the browser.

use super::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{sink::SinkExt, stream::StreamExt};
use sonken_core::LiveClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(super) async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before the upgrade completes so no event is missed.
    let client = state.manager.broadcaster().subscribe();
    ws.on_upgrade(move |socket| forward(socket, client, state.shutdown))
}

/// Pump messages to one socket until either side goes away.
async fn forward(socket: WebSocket, mut client: LiveClient, shutdown: CancellationToken) {
    let (mut sender, mut receiver) = socket.split();
    info!("Live client connected");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                sender.send(Message::Close(None)).await.ok();
                break;
            }
            message = client.recv() => {
                let Some(text) = message else { break };
                if sender.send(Message::Text(text.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients have nothing to say on this channel.
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Live client disconnected");
}
