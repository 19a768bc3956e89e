//! S1: nesting rejection and `project_list` accuracy.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn sibling_accepted_nested_rejected_list_shows_one() {
    let harness = Harness::start_with_agent(AGENT_HELLO_WORLD).await;
    let parent = tempfile::tempdir().expect("tempdir parent");
    let mut ws = harness.connect().await;

    send_frame(&mut ws, "project_create", None, json!({"path": parent.path()})).await;
    let created = next_record(&mut ws).await;
    assert_eq!(created["type"], "project_state");

    let nested = parent.path().join("sub");
    std::fs::create_dir(&nested).expect("mkdir nested");
    send_frame(&mut ws, "project_create", None, json!({"path": nested})).await;
    let rejected = next_record(&mut ws).await;
    assert_eq!(rejected["type"], "error");
    assert_eq!(rejected["data"]["code"], "project_nesting");

    send_frame(&mut ws, "project_list", None, json!(null)).await;
    let listed = next_record(&mut ws).await;
    assert_eq!(listed["type"], "project_state");
    assert_eq!(listed["project_id"], created["project_id"]);
}
