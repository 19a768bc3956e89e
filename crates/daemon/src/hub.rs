// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The Subscription Hub: fans a project's `MessageRecord`s out to every
//! connection currently joined to it.
//!
//! Ownership is by id, not by direct handle (see the data model): the Hub
//! holds a bounded `mpsc::Sender` per subscriber, never the connection
//! itself or its socket. A slow subscriber only ever hurts itself — a full
//! queue is handled here, in the Hub, not by blocking the broadcaster.

use std::collections::HashMap;
use std::time::Duration;

use hub_core::{Clock, ConnectionId, MessageRecord, ProjectId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Subscriber {
    tx: mpsc::Sender<MessageRecord>,
    close: CancellationToken,
    lagging_since: Option<std::time::Instant>,
    /// Set once a `lagged` marker has failed to enqueue because the queue
    /// was already full. Retried ahead of every subsequent record until it
    /// actually lands, so it is never silently dropped.
    pending_lagged: bool,
    dropped: u64,
}

/// All live subscriptions, keyed first by project then by connection.
pub struct Hub<C: Clock> {
    clock: C,
    queue_depth: usize,
    lag_grace: Duration,
    subscribers: Mutex<HashMap<ProjectId, HashMap<ConnectionId, Subscriber>>>,
}

impl<C: Clock> Hub<C> {
    pub fn new(clock: C, queue_depth: usize, lag_grace: Duration) -> Self {
        Self {
            clock,
            queue_depth,
            lag_grace,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `conn_id` as a subscriber of `project_id`, returning the
    /// receiving half of its outbound queue and a token the Hub cancels if
    /// the connection must be force-closed for lagging too long.
    pub fn subscribe(
        &self,
        project_id: ProjectId,
        conn_id: ConnectionId,
    ) -> (mpsc::Receiver<MessageRecord>, CancellationToken) {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let close = CancellationToken::new();
        self.subscribers.lock().entry(project_id).or_default().insert(
            conn_id,
            Subscriber {
                tx,
                close: close.clone(),
                lagging_since: None,
                pending_lagged: false,
                dropped: 0,
            },
        );
        (rx, close)
    }

    pub fn unsubscribe(&self, project_id: ProjectId, conn_id: ConnectionId) {
        let mut subs = self.subscribers.lock();
        if let Some(per_project) = subs.get_mut(&project_id) {
            per_project.remove(&conn_id);
            if per_project.is_empty() {
                subs.remove(&project_id);
            }
        }
    }

    /// Drops every subscription belonging to `conn_id`, across all
    /// projects. Called once when a connection closes.
    pub fn unsubscribe_all(&self, conn_id: ConnectionId) {
        let mut subs = self.subscribers.lock();
        subs.retain(|_, per_project| {
            per_project.remove(&conn_id);
            !per_project.is_empty()
        });
    }

    /// Drops the whole project's subscriber set. Called once when a
    /// project is deleted.
    pub fn unsubscribe_all_for_project(&self, project_id: ProjectId) {
        self.subscribers.lock().remove(&project_id);
    }

    pub fn subscriber_count(&self, project_id: ProjectId) -> usize {
        self.subscribers
            .lock()
            .get(&project_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Fans `record` out to every subscriber of its project. A subscriber
    /// whose queue is full is marked lagging on first sight; the `lagged`
    /// marker it owes is retried ahead of every later record until the
    /// queue actually has room for it, so it is enqueued exactly once
    /// rather than best-effort into a queue already known to be full. A
    /// subscriber still full after `lag_grace` has elapsed since the mark
    /// is force-closed. A subscriber whose receiver has already dropped is
    /// pruned on the spot.
    pub fn broadcast(&self, project_id: ProjectId, record: MessageRecord) {
        let mut subs = self.subscribers.lock();
        let Some(per_project) = subs.get_mut(&project_id) else {
            return;
        };

        let now = self.clock.now();
        per_project.retain(|_, sub| {
            if sub.pending_lagged {
                let marker = hub_wire::lagged(project_id, sub.dropped, record.timestamp);
                match sub.tx.try_send(marker) {
                    Ok(()) => {
                        sub.pending_lagged = false;
                        sub.dropped = 0;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return false,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        sub.dropped += 1;
                        let since = *sub.lagging_since.get_or_insert(now);
                        if now.duration_since(since) >= self.lag_grace {
                            sub.close.cancel();
                            return false;
                        }
                        return true;
                    }
                }
            }

            match sub.tx.try_send(record.clone()) {
                Ok(()) => {
                    sub.lagging_since = None;
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.pending_lagged = true;
                    sub.dropped += 1;
                    let since = *sub.lagging_since.get_or_insert(now);
                    if now.duration_since(since) >= self.lag_grace {
                        sub.close.cancel();
                        false
                    } else {
                        true
                    }
                }
            }
        });

        if per_project.is_empty() {
            subs.remove(&project_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::{FakeClock, RecordKind};
    use serde_json::json;

    fn rec(project_id: ProjectId) -> MessageRecord {
        MessageRecord::new(RecordKind::AgentMessage, project_id, json!({"text": "hi"}), chrono::Utc::now())
    }

    #[tokio::test]
    async fn subscriber_receives_broadcast_records() {
        let hub = Hub::new(FakeClock::new(), 8, Duration::from_secs(5));
        let project_id = ProjectId::new();
        let (mut rx, _close) = hub.subscribe(project_id, ConnectionId::new());

        hub.broadcast(project_id, rec(project_id));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.project_id, Some(project_id));
    }

    #[tokio::test]
    async fn unrelated_project_receives_nothing() {
        let hub = Hub::new(FakeClock::new(), 8, Duration::from_secs(5));
        let project_id = ProjectId::new();
        let other = ProjectId::new();
        let (mut rx, _close) = hub.subscribe(project_id, ConnectionId::new());

        hub.broadcast(other, rec(other));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn lagging_subscriber_is_closed_after_grace_period() {
        let clock = FakeClock::new();
        let hub = Hub::new(clock.clone(), 1, Duration::from_secs(5));
        let project_id = ProjectId::new();
        let (_rx, close) = hub.subscribe(project_id, ConnectionId::new());

        // Fill the single-slot queue, then overflow it repeatedly without
        // ever draining, crossing the grace period.
        hub.broadcast(project_id, rec(project_id));
        hub.broadcast(project_id, rec(project_id));
        assert!(!close.is_cancelled());

        clock.advance(Duration::from_secs(6));
        hub.broadcast(project_id, rec(project_id));
        assert!(close.is_cancelled());
        assert_eq!(hub.subscriber_count(project_id), 0);
    }

    #[tokio::test]
    async fn unsubscribe_all_clears_every_project() {
        let hub = Hub::new(FakeClock::new(), 8, Duration::from_secs(5));
        let conn_id = ConnectionId::new();
        let p1 = ProjectId::new();
        let p2 = ProjectId::new();
        hub.subscribe(p1, conn_id);
        hub.subscribe(p2, conn_id);

        hub.unsubscribe_all(conn_id);
        assert_eq!(hub.subscriber_count(p1), 0);
        assert_eq!(hub.subscriber_count(p2), 0);
    }
}
