// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The Server Supervisor: owns the listening socket, the per-connection
//! task tree, and the shutdown sequence (stop accepting, broadcast
//! `server_shutdown`, wait up to a grace deadline, then force-close
//! whatever is left).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use hub_core::{Clock, ConnectionId};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::connection::{self, ConnectionCtx};

pub struct Supervisor<C: Clock> {
    ctx: Arc<ConnectionCtx<C>>,
    max_connections: usize,
    shutdown_grace: Duration,
    active: Arc<AtomicUsize>,
}

impl<C: Clock> Supervisor<C> {
    pub fn new(ctx: Arc<ConnectionCtx<C>>, max_connections: usize, shutdown_grace: Duration) -> Self {
        Self {
            ctx,
            max_connections,
            shutdown_grace,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Accepts connections until `shutdown` fires, then stops accepting,
    /// lets `connection::handle` push `server_shutdown` to every joined
    /// project, and waits up to `shutdown_grace` for tasks to drain before
    /// returning (any stragglers are left to die with the process).
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) {
        let mut tasks = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if self.active.load(Ordering::Relaxed) >= self.max_connections {
                                tracing::warn!(%peer, "rejecting connection: at max_connections");
                                spawn_reject_overflow(Arc::clone(&self.ctx), stream, peer);
                                continue;
                            }
                            let _ = stream.set_nodelay(true);
                            let conn_id = ConnectionId::new();
                            let ctx = Arc::clone(&self.ctx);
                            let conn_shutdown = shutdown.clone();
                            let active = Arc::clone(&self.active);
                            active.fetch_add(1, Ordering::Relaxed);
                            tasks.spawn(async move {
                                connection::handle(ctx, stream, conn_id, conn_shutdown).await;
                                active.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                        }
                    }
                }
            }
        }

        self.ctx.registry.cancel_all_executions();
        self.ctx.registry.shutdown_all(self.ctx.clock.now_utc());

        tracing::info!(grace_secs = self.shutdown_grace.as_secs(), "draining connections");
        let drain = tokio::time::timeout(self.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        });
        if drain.await.is_err() {
            tracing::warn!(
                remaining = self.active.load(Ordering::Relaxed),
                "shutdown grace period elapsed; force-closing remaining connections"
            );
            tasks.shutdown().await;
        }
    }
}

/// Completes the WebSocket handshake for a connection that arrived over
/// `max_connections`, sends a typed error frame explaining the rejection,
/// then closes. The handshake still has to happen: an overflow peer has no
/// other way to receive a frame from us.
fn spawn_reject_overflow<C: Clock>(ctx: Arc<ConnectionCtx<C>>, stream: TcpStream, peer: SocketAddr) {
    tokio::spawn(async move {
        let mut ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(error) => {
                tracing::debug!(%peer, %error, "handshake failed while rejecting overflow connection");
                return;
            }
        };
        let record = hub_wire::error(
            hub_core::ProjectId::new(),
            hub_core::ErrorCode::ConnectionLimit,
            "server is at max_connections",
            ctx.clock.now_utc(),
        );
        if let Ok(text) = serde_json::to_string(&record) {
            let _ = ws.send(Message::Text(text.into())).await;
        }
        let _ = ws.close(None).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::registry::{Registry, RegistryLimits};
    use hub_core::FakeClock;
    use serial_test::serial;

    fn ctx() -> Arc<ConnectionCtx<FakeClock>> {
        let clock = FakeClock::new();
        let hub = Arc::new(Hub::new(clock.clone(), 32, Duration::from_secs(5)));
        let launcher = crate::executor::AgentLauncher::new(std::path::PathBuf::from("/bin/true"));
        let limits = RegistryLimits {
            max_projects: 16,
            max_prompt_chars: 1024,
            execute_timeout: Duration::from_secs(30),
            max_record_bytes: 262_144,
            cancel_grace: Duration::from_secs(5),
            log_rotate_bytes: 8 * 1024 * 1024,
            log_retention_days: 30,
        };
        let root = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(Registry::new(root.path().to_path_buf(), clock.clone(), limits, launcher, hub));
        Arc::new(ConnectionCtx {
            registry,
            clock,
            heartbeat_interval: Duration::from_secs(15),
            max_message_bytes: 1 << 20,
        })
    }

    #[tokio::test]
    #[serial]
    async fn shutdown_token_stops_the_accept_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let supervisor = Supervisor::new(ctx(), 8, Duration::from_millis(50));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(2), supervisor.run(listener, shutdown))
            .await
            .expect("run should return promptly once already-cancelled");
    }
}
