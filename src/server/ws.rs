use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};

use crate::{
    game_loop::commands::{handle_command, ClientCommand, ServerMessage},
    AppState,
};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut statuses = state.statuses.subscribe();

    // Single writer: replies to this client and statuses for everyone.
    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
                status = statuses.recv() => match status {
                    Ok(status) => ServerMessage::Status(status),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("WebSocket client lagged, skipped {skipped} statuses");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    log::error!("Failed to serialize message: {err}");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut started_here = false;
    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply = match serde_json::from_str::<ClientCommand>(&text) {
            Ok(command) => {
                let is_start = matches!(command, ClientCommand::Start);
                let reply = handle_command(&state, command).await;
                if is_start && matches!(reply, ServerMessage::Ack(_)) {
                    started_here = true;
                }
                reply
            }
            Err(err) => ServerMessage::Error(format!("invalid command: {err}")),
        };
        if reply_tx.send(reply).is_err() {
            break;
        }
    }

    drop(reply_tx);
    writer.abort();

    if started_here && state.controller.is_running().await {
        log::info!("Client that started the loop disconnected, stopping");
        if let Err(err) = state.controller.stop().await {
            log::error!("Stop after disconnect failed: {err:#}");
        }
    }
}
