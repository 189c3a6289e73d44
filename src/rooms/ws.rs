use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use super::{msg::ClientEvent, relay::SignalingRelay};

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(relay): State<Arc<SignalingRelay>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve(relay, stream))
}

/// Pump one socket until it closes, then disconnect it from the relay.
///
/// Inbound events are handled one at a time, so a connection's join, chat
/// and disconnect are always applied in the order the client sent them.
async fn serve(relay: Arc<SignalingRelay>, stream: WebSocket) {
    let (id, mut outbox) = relay.connect().await;
    let (mut sender, mut receiver) = stream.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(%error, "unencodable event skipped");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event = match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => event,
            Err(error) => {
                tracing::debug!(connection_id = %id, %error, "unparseable frame skipped");
                continue;
            }
        };

        // a panicking handler takes down its own task, not the socket
        let handler = tokio::spawn({
            let relay = relay.clone();
            let id = id.clone();
            async move { relay.handle(&id, event).await }
        });
        if let Err(error) = handler.await {
            tracing::error!(connection_id = %id, %error, "event handler failed");
        }
    }

    relay.disconnect(&id).await;

    tokio::select! {
        _ = &mut send_task => {},
        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => send_task.abort(),
    };
}
