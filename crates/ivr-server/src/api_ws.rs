//! WebSocket transport for caller sessions.
//!
//! One socket carries one caller. Incoming text frames are JSON
//! [`CallerEvent`]s from the speech pipeline; every [`AgentEvent`] the
//! session produces goes back as a JSON text frame.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use ivr_dialogue::{AgentEvent, CallerEvent, DialogueSession, TurnScheduler};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Buffered events per direction before the producer waits.
const EVENT_BUFFER: usize = 64;

/// Maximum accepted length of recognized caller text (2 KiB).
const MAX_CALLER_TEXT_LEN: usize = 2_048;

/// Handler for `GET /ws/session`.
pub async fn ws_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs one caller session over the socket until either side ends it.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = DialogueSession::new(state.engine.clone());
    let session_id = session.id();

    let (mut sender, mut receiver) = socket.split();
    let (events_tx, events_rx) = mpsc::channel::<CallerEvent>(EVENT_BUFFER);
    let (out_tx, mut out_rx) = mpsc::channel::<AgentEvent>(EVENT_BUFFER);

    let scheduler = TurnScheduler::new(
        session,
        state.scheduler.clone(),
        events_rx,
        out_tx,
        state.shutdown.child_token(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    // Forward agent events until the session ends, then close the socket.
    let send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(%session_id, "failed to serialize agent event: {}", e);
                    continue;
                }
            };
            if sender.send(AxumMessage::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(AxumMessage::Close(None)).await;
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Text(text) => {
                let event = match serde_json::from_str::<CallerEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(%session_id, error = %e, "failed to parse caller event");
                        continue;
                    }
                };
                if let CallerEvent::Utterance(utterance) = &event {
                    if utterance.text.len() > MAX_CALLER_TEXT_LEN {
                        tracing::warn!(
                            %session_id,
                            len = utterance.text.len(),
                            "caller text too long, ignoring"
                        );
                        continue;
                    }
                }
                if events_tx.send(event).await.is_err() {
                    // The session has already ended.
                    break;
                }
            }
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    // Fails harmlessly if the session ended first.
    let _ = events_tx.send(CallerEvent::Disconnect).await;
    drop(events_tx);

    match scheduler_task.await {
        Ok(session) => tracing::debug!(
            %session_id,
            close_reason = ?session.close_reason(),
            "session task finished"
        ),
        Err(e) => tracing::error!(%session_id, "session task failed: {}", e),
    }
    let _ = send_task.await;
}
