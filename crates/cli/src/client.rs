// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! A thin WebSocket client for the same protocol `hubd` serves to
//! interactive clients (spec §6). No correlation ids exist on the wire, so
//! a request's responses are collected by type/project rather than matched
//! one-to-one; list-style requests (`project_list`) are drained with an
//! idle window since the server never signals "that's everything".

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hub_core::{MessageRecord, ProjectId, ProjectStatus, SessionId};
use hub_wire::ClientFrame;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not connect to hubd at {0}: {1}")]
    Connect(String, #[source] tokio_tungstenite::tungstenite::Error),
    #[error("connection to hubd dropped")]
    Disconnected,
    #[error("malformed response from hubd: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

/// A project's status as reported by `project_state`, the only thing the
/// CLI needs out of the full broadcast envelope.
#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub status: ProjectStatus,
    pub session_id: SessionId,
}

/// The idle window used to decide a fan-out list response is complete:
/// once no new record has arrived for this long, assume the server is done.
const LIST_IDLE_WINDOW: Duration = Duration::from_millis(250);

pub struct HubClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl HubClient {
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let url = format!("ws://{addr}/");
        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| ClientError::Connect(addr.to_string(), e))?;
        Ok(Self { ws })
    }

    /// Sends a WebSocket ping and waits for the server's pong, returning the
    /// round-trip time. Uses the transport's own liveness frames rather than
    /// a protocol-level request (there is no `ping` entry in the wire
    /// contract — see spec §6).
    pub async fn ping(&mut self) -> Result<Duration, ClientError> {
        let start = Instant::now();
        self.ws.send(Message::Ping(Vec::new().into())).await?;
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Pong(_))) => return Ok(start.elapsed()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ClientError::Disconnected),
            }
        }
    }

    /// Sends `project_list` and drains `project_state` records until the
    /// server goes quiet for [`LIST_IDLE_WINDOW`].
    pub async fn list_projects(&mut self) -> Result<Vec<ProjectSummary>, ClientError> {
        self.send_frame("project_list", None, serde_json::Value::Null).await?;

        let mut out = Vec::new();
        loop {
            match tokio::time::timeout(LIST_IDLE_WINDOW, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    let record: MessageRecord = serde_json::from_str(&text)?;
                    if let Some(summary) = project_summary(&record) {
                        out.push(summary);
                    }
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(None) => return Err(ClientError::Disconnected),
                Err(_elapsed) => break,
            }
        }
        Ok(out)
    }

    async fn send_frame(
        &mut self,
        kind: &str,
        project_id: Option<ProjectId>,
        data: serde_json::Value,
    ) -> Result<(), ClientError> {
        let frame = ClientFrame {
            kind: kind.to_string(),
            project_id,
            data,
        };
        let text = serde_json::to_string(&frame)?;
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

fn project_summary(record: &MessageRecord) -> Option<ProjectSummary> {
    if record.kind != hub_core::RecordKind::ProjectState {
        return None;
    }
    let id = record.project_id?;
    let status: ProjectStatus = serde_json::from_value(record.data.get("status")?.clone()).ok()?;
    let session_id: SessionId = serde_json::from_value(record.data.get("session_id")?.clone()).ok()?;
    Some(ProjectSummary { id, status, session_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::RecordKind;

    #[test]
    fn project_summary_extracts_status_and_session() {
        let id = ProjectId::new();
        let record = MessageRecord::new(
            RecordKind::ProjectState,
            id,
            serde_json::json!({"status": "idle", "session_id": "sess-1"}),
            chrono::Utc::now(),
        );
        let summary = project_summary(&record).expect("project_state should decode");
        assert_eq!(summary.id, id);
        assert_eq!(summary.status, ProjectStatus::Idle);
        assert_eq!(summary.session_id, SessionId::new("sess-1"));
    }

    #[test]
    fn non_project_state_records_are_ignored() {
        let record = MessageRecord::new(RecordKind::Error, ProjectId::new(), serde_json::json!({}), chrono::Utc::now());
        assert!(project_summary(&record).is_none());
    }
}
