//! S2: execute drives project_state(executing) -> agent_message* ->
//! project_state(idle), and get_messages replays the same agent records.

use crate::prelude::*;
use serde_json::json;

#[tokio::test]
async fn execute_streams_agent_output_then_returns_to_idle() {
    let harness = Harness::start_with_agent(AGENT_HELLO_WORLD).await;
    let project_dir = tempfile::tempdir().expect("tempdir project");
    let mut ws = harness.connect().await;

    send_frame(&mut ws, "project_create", None, json!({"path": project_dir.path()})).await;
    let created = next_record(&mut ws).await;
    let project_id = created["project_id"].as_str().expect("project id").to_string();

    send_frame(&mut ws, "project_join", Some(&project_id), json!({})).await;
    let joined = next_record(&mut ws).await;
    assert_eq!(joined["type"], "project_state");
    assert_eq!(joined["data"]["status"], "idle");

    send_frame(&mut ws, "execute", Some(&project_id), json!({"prompt": "hi"})).await;

    let executing = next_record(&mut ws).await;
    assert_eq!(executing["type"], "project_state");
    assert_eq!(executing["data"]["status"], "executing");

    let mut texts = Vec::new();
    loop {
        let record = next_record(&mut ws).await;
        if record["type"] == "project_state" {
            assert_eq!(record["data"]["status"], "idle");
            assert_eq!(record["data"]["session_id"], "sess-1");
            break;
        }
        assert_eq!(record["type"], "agent_message");
        if let Some(text) = record["data"]["text"].as_str() {
            texts.push(text.to_string());
        }
    }
    assert_eq!(texts, vec!["Hello".to_string(), "world".to_string()]);

    send_frame(&mut ws, "get_messages", Some(&project_id), json!({"limit": 1000})).await;
    let replayed = next_record(&mut ws).await;
    assert_eq!(replayed["type"], "agent_message");
    assert_eq!(replayed["data"]["session_id"], "sess-1");
}
