// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket gateway for live build log streaming.
//!
//! Each connection subscribes to one build's live log subject and forwards
//! entries as text frames. There is no historical replay here; the `/logs`
//! and `/logs/{buildId}/history` endpoints serve history.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::StreamExt;
use tracing::{debug, info, warn};

use mira_common::broker::BrokerClient;
use mira_common::types::LogEntry;

use crate::server::AppState;

/// `GET /logs/{buildId}` - upgrade to a WebSocket log stream.
pub async fn stream_logs(
    ws: WebSocketUpgrade,
    Path(build_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state.broker.clone(), build_id))
}

async fn run_session(mut socket: WebSocket, broker: BrokerClient, build_id: String) {
    info!(build_id = %build_id, "log stream session started");

    let mut subscription = match broker.subscribe_logs(&build_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(build_id = %build_id, error = %e, "log stream subscription failed");
            let frame = format!(r#"{{"error":"Failed to subscribe to logs: {e}"}}"#);
            let _ = socket.send(Message::Text(frame.into())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let confirmation = format!(r#"{{"message":"Connected to log stream for build {build_id}"}}"#);
    if socket
        .send(Message::Text(confirmation.into()))
        .await
        .is_err()
    {
        let _ = subscription.unsubscribe().await;
        return;
    }

    loop {
        tokio::select! {
            published = subscription.next() => {
                match published {
                    Some(message) => {
                        // Re-encode through the wire type so subscribers only
                        // ever see well-formed log records.
                        let entry: LogEntry = match serde_json::from_slice(&message.payload) {
                            Ok(entry) => entry,
                            Err(e) => {
                                warn!(build_id = %build_id, error = %e, "skipping malformed log frame");
                                continue;
                            }
                        };
                        let frame = match serde_json::to_string(&entry) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(build_id = %build_id, error = %e, "failed to encode log frame");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            debug!(build_id = %build_id, "client write failed, closing stream");
                            break;
                        }
                    }
                    // Subscription ended: unrecoverable broker-side error.
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = socket.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(other)) => {
                        debug!(build_id = %build_id, message = ?other, "ignoring client message");
                    }
                    Some(Err(e)) => {
                        debug!(build_id = %build_id, error = %e, "client read failed");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = subscription.unsubscribe().await {
        warn!(build_id = %build_id, error = %e, "failed to release log subscription");
    }
    info!(build_id = %build_id, "log stream session ended");
}
