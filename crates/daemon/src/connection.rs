// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The Connection Handler: one WebSocket client, one task tree.
//!
//! A connection owns its own outbound queue and socket half (see the data
//! model's ownership rule); the Subscription Hub never touches either
//! directly; it only holds a `Sender` this module handed it at `subscribe`
//! time. Everything this connection currently has joined is torn down on
//! disconnect, whichever side initiated it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hub_core::{Clock, ConnectionId, MessageRecord, ProjectId};
use hub_wire::{ClientFrame, Request};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;

/// Shared, per-connection configuration. Cheap to clone (all `Arc`s).
pub struct ConnectionCtx<C: Clock> {
    pub registry: Arc<Registry<C>>,
    pub clock: C,
    pub heartbeat_interval: Duration,
    pub max_message_bytes: usize,
}

/// Missed heartbeat ticks tolerated before a connection is presumed dead.
/// One missed tick is forgiven (the peer's `Pong` may simply be in flight);
/// a second confirms it.
const MAX_MISSED_HEARTBEATS: u32 = 2;

/// Drives one accepted TCP connection from WebSocket handshake through
/// teardown. Never returns early on a single bad frame: only a transport
/// error, a client-initiated close, or `shutdown` ends the loop.
pub async fn handle<C: Clock>(ctx: Arc<ConnectionCtx<C>>, stream: TcpStream, conn_id: ConnectionId, shutdown: CancellationToken) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(error) => {
            tracing::debug!(%conn_id, %error, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let conn_close = CancellationToken::new();
    let forwarders: Mutex<HashMap<ProjectId, tokio::task::JoinHandle<()>>> = Mutex::new(HashMap::new());

    let mut heartbeat = tokio::time::interval(ctx.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut missed_heartbeats: u32 = 0;

    loop {
        tokio::select! {
            biased;

            // The Supervisor broadcasts `server_shutdown` to every project
            // through the Registry; this connection's own forwarders
            // deliver it if it is joined to any. Nothing to send here.
            _ = shutdown.cancelled() => break,
            _ = conn_close.cancelled() => break,
            _ = heartbeat.tick() => {
                if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                    tracing::debug!(%conn_id, "closing connection: missed heartbeats");
                    break;
                }
                missed_heartbeats += 1;
                if out_tx.send(Message::Ping(Vec::new().into())).is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > ctx.max_message_bytes {
                            let record = hub_wire::error(ProjectId::new(), hub_core::ErrorCode::MessageTooLarge, "frame exceeds the maximum message size", ctx.clock.now_utc());
                            send_record(&out_tx, &record);
                            continue;
                        }
                        handle_frame(&ctx, conn_id, &text, &out_tx, &forwarders, &conn_close).await;
                    }
                    // Incoming pings are answered by tungstenite itself on
                    // the next write; a pong of our own proves the peer is
                    // alive and clears the missed-heartbeat count.
                    Some(Ok(Message::Pong(_))) => {
                        missed_heartbeats = 0;
                    }
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::debug!(%conn_id, %error, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    for (_, handle) in forwarders.lock().drain() {
        handle.abort();
    }
    ctx.registry.unsubscribe_connection(conn_id);
    writer.abort();
}

async fn handle_frame<C: Clock>(
    ctx: &Arc<ConnectionCtx<C>>,
    conn_id: ConnectionId,
    text: &str,
    out_tx: &mpsc::UnboundedSender<Message>,
    forwarders: &Mutex<HashMap<ProjectId, tokio::task::JoinHandle<()>>>,
    conn_close: &CancellationToken,
) {
    let now = ctx.clock.now_utc();
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(error) => {
            let record = hub_wire::error(ProjectId::new(), hub_core::ErrorCode::SchemaViolation, error.to_string(), now);
            send_record(out_tx, &record);
            return;
        }
    };

    let request = match Request::try_from(frame) {
        Ok(r) => r,
        Err(error) => {
            let record = hub_wire::error(ProjectId::new(), error.code(), error.to_string(), now);
            send_record(out_tx, &record);
            return;
        }
    };

    dispatch(ctx, conn_id, request, out_tx, forwarders, conn_close);
}

fn dispatch<C: Clock>(
    ctx: &Arc<ConnectionCtx<C>>,
    conn_id: ConnectionId,
    request: Request,
    out_tx: &mpsc::UnboundedSender<Message>,
    forwarders: &Mutex<HashMap<ProjectId, tokio::task::JoinHandle<()>>>,
    conn_close: &CancellationToken,
) {
    let registry = Arc::clone(&ctx.registry);
    let now = ctx.clock.now_utc();

    match request {
        Request::ProjectCreate { path } => reply_state(&registry.create_project(path), out_tx, now),
        Request::ProjectDelete { project_id, purge } => {
            if let Some(handle) = forwarders.lock().remove(&project_id) {
                handle.abort();
            }
            if let Err(error) = registry.delete_project(project_id, purge) {
                send_record(out_tx, &hub_wire::error(project_id, error.code(), error.to_string(), now));
            }
        }
        Request::ProjectList => {
            for descriptor in registry.list_projects() {
                send_record(
                    out_tx,
                    &hub_wire::project_state(descriptor.id, descriptor.status, descriptor.session_id, now),
                );
            }
        }
        Request::ProjectJoin { project_id, since, limit } => {
            match registry.join_project(project_id, conn_id, since, limit) {
                Ok((descriptor, replay, rx, close)) => {
                    send_record(
                        out_tx,
                        &hub_wire::project_state(descriptor.id, descriptor.status, descriptor.session_id, now),
                    );
                    for record in replay {
                        send_record(out_tx, &record);
                    }
                    let handle = spawn_forwarder(project_id, rx, close, out_tx.clone(), conn_close.clone());
                    forwarders.lock().insert(project_id, handle);
                }
                Err(error) => send_record(out_tx, &hub_wire::error(project_id, error.code(), error.to_string(), now)),
            }
        }
        Request::ProjectLeave { project_id } => {
            registry.leave_project(project_id, conn_id);
            if let Some(handle) = forwarders.lock().remove(&project_id) {
                handle.abort();
            }
        }
        Request::Execute { project_id, prompt, options, new_session } => {
            if let Err(error) = registry.execute(project_id, prompt, options, new_session) {
                send_record(out_tx, &hub_wire::error(project_id, error.code(), error.to_string(), now));
            }
        }
        Request::AgentKill { project_id } => {
            if let Err(error) = registry.kill_agent(project_id) {
                send_record(out_tx, &hub_wire::error(project_id, error.code(), error.to_string(), now));
            }
        }
        Request::NewSession { project_id } => reply_state(&registry.new_session(project_id), out_tx, now),
        Request::GetMessages { project_id, since, limit } => match registry.get_messages(project_id, since, limit) {
            Ok(records) => {
                for record in records {
                    send_record(out_tx, &record);
                }
            }
            Err(error) => send_record(out_tx, &hub_wire::error(project_id, error.code(), error.to_string(), now)),
        },
    }
}

fn reply_state(
    result: &Result<hub_core::ProjectDescriptor, crate::registry::RegistryError>,
    out_tx: &mpsc::UnboundedSender<Message>,
    now: chrono::DateTime<chrono::Utc>,
) {
    match result {
        Ok(descriptor) => send_record(
            out_tx,
            &hub_wire::project_state(descriptor.id, descriptor.status, descriptor.session_id.clone(), now),
        ),
        Err(error) => send_record(out_tx, &hub_wire::error(ProjectId::new(), error.code(), error.to_string(), now)),
    }
}

fn spawn_forwarder(
    project_id: ProjectId,
    mut rx: mpsc::Receiver<MessageRecord>,
    close: CancellationToken,
    out_tx: mpsc::UnboundedSender<Message>,
    conn_close: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = close.cancelled() => {
                    conn_close.cancel();
                    break;
                }
                record = rx.recv() => {
                    match record {
                        Some(record) => {
                            let _ = project_id;
                            if out_tx.send(to_message(&record)).is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    })
}

fn send_record(out_tx: &mpsc::UnboundedSender<Message>, record: &MessageRecord) {
    let _ = out_tx.send(to_message(record));
}

fn to_message(record: &MessageRecord) -> Message {
    match serde_json::to_string(record) {
        Ok(text) => Message::Text(text.into()),
        Err(_) => {
            Message::Text(r#"{"type":"error","data":{"code":"internal","message":"failed to encode record"}}"#.into())
        }
    }
}
