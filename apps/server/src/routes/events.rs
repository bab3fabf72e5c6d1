//! WebSocket job event stream
//!
//! `GET /jobs/:id/events` upgrades to a WebSocket and forwards the
//! job's pub/sub events as JSON text frames until the client leaves or
//! the job's channel closes.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::sync::JobEvent;

use super::jobs::JobsState;

pub async fn job_events_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<JobsState>,
) -> Response {
    // Unknown jobs are rejected before the upgrade.
    if let Err(e) = state.service.get(id).await {
        return e.into_response();
    }

    let rx = state.service.subscribe(id).await;

    ws.on_upgrade(move |socket| forward_events(socket, id, rx))
}

async fn forward_events(mut socket: WebSocket, job_id: Uuid, mut rx: broadcast::Receiver<JobEvent>) {
    tracing::debug!(job_id = %job_id, "Job event stream opened");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize job event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                    // Terminal events end the stream.
                    if matches!(event, JobEvent::Completed { .. } | JobEvent::Error { .. }) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %job_id, skipped, "Job event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                // Pings are answered by axum; other frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = socket.close().await;
    tracing::debug!(job_id = %job_id, "Job event stream closed");
}
