use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    dto::ws::ClientMessage,
    error::ServiceError,
    services::round_service,
    state::{ConnectionId, SharedState},
};

/// Handle the full lifecycle of a player or operator WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (connection_id, mut outbound_rx) = state.register_connection();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, event = message.event_name(), "failed to serialize outbound message");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    info!(%connection_id, "websocket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection_id, payload = %text, "received websocket message");
                dispatch(&state, connection_id, &text).await;
            }
            Ok(Message::Close(_)) => {
                info!(%connection_id, "websocket closed by client");
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    finalize(&state, connection_id, writer_task).await;
}

/// Parse one inbound frame and route it to the round engine.
///
/// Invalid frames and failed events are logged and dropped; the connection
/// stays open either way.
async fn dispatch(state: &SharedState, connection_id: ConnectionId, text: &str) {
    let message = match ClientMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            info!(%connection_id, error = %err, "dropping invalid websocket message");
            return;
        }
    };

    let room = message.room_code();
    let result = match &message {
        ClientMessage::JoinLobby(request) => round_service::join_lobby(state, connection_id, request)
            .await
            .map(|outcome| debug!(%connection_id, ?outcome, "join handled")),
        ClientMessage::StartRound(request) => round_service::start_round(state, request)
            .await
            .map(|outcome| debug!(%connection_id, ?outcome, "start handled")),
        ClientMessage::SubmitAnswer(request) => round_service::submit_answer(state, request)
            .await
            .map(|outcome| debug!(%connection_id, ?outcome, "submission handled")),
        ClientMessage::ShowAnswers(request) => round_service::reveal_answers(state, request)
            .await
            .map(|outcome| debug!(%connection_id, ?outcome, "reveal handled")),
        ClientMessage::Unknown => {
            debug!(%connection_id, "ignoring message with unknown type");
            Ok(())
        }
    };

    if let Err(err) = result {
        log_event_failure(connection_id, room.as_ref().map(|code| code.as_str()), &err);
    }
}

fn log_event_failure(connection_id: ConnectionId, room: Option<&str>, err: &ServiceError) {
    match err {
        ServiceError::Unavailable(_) | ServiceError::Degraded => {
            warn!(%connection_id, room, error = %err, "event abandoned: storage failure")
        }
        _ => info!(%connection_id, room, error = %err, "event rejected"),
    }
}

/// Unbind the connection, then let the writer task wind down.
async fn finalize(state: &SharedState, connection_id: ConnectionId, writer_task: JoinHandle<()>) {
    state.unregister_connection(connection_id);
    round_service::leave(state, connection_id).await;
    // Dropping the registry entry closed the last sender, so the writer drains and exits.
    let _ = writer_task.await;
    info!(%connection_id, "websocket disconnected");
}

