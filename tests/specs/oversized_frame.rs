//! S6: a frame over the configured max message size gets `message_too_large`
//! and the connection stays open for the next, well-formed request.

use std::time::Duration;

use crate::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn oversized_frame_is_rejected_without_closing_the_connection() {
    let harness = Harness::start_with_agent(AGENT_HELLO_WORLD).await;
    let mut ws = harness.connect().await;

    let padding = "x".repeat(8192);
    let oversized = json!({"type": "project_list", "data": {"padding": padding}}).to_string();
    ws.send(Message::Text(oversized.into())).await.expect("send oversized frame");

    let rejected = next_record(&mut ws).await;
    assert_eq!(rejected["type"], "error");
    assert_eq!(rejected["data"]["code"], "message_too_large");

    // The connection is still usable: a well-formed request gets no reply
    // (no projects exist), so prove liveness with a ping/pong instead.
    send_frame(&mut ws, "project_list", None, json!(null)).await;
    ws.send(Message::Ping(Vec::new().into())).await.expect("ping after oversized frame");

    let pong = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Pong(payload))) => return payload,
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("websocket error: {e}"),
                None => panic!("connection closed unexpectedly"),
            }
        }
    })
    .await
    .expect("timed out waiting for pong");
    assert!(pong.is_empty());
}
