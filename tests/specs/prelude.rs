//! Shared harness for the end-to-end specs: spawns a real `hubd` binary
//! against a scratch data root and a scripted fake agent, then drives it
//! over the same WebSocket protocol a real client would use.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Child, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub struct Harness {
    child: Child,
    pub addr: String,
    _data_root: TempDir,
    _agent_dir: TempDir,
}

/// Picks a free TCP port by binding to port 0 and immediately releasing it.
/// A second process can still win the race before `hubd` binds; tests that
/// hit this should retry, but in practice it is not flaky in CI isolation.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local_addr").port()
}

/// Writes a fake agent script honoring the process contract in spec §6:
/// reads `--prompt` off argv (ignored beyond presence) and emits
/// newline-delimited JSON records, one carrying `session_id`.
fn write_fake_agent(dir: &std::path::Path, script: &str) -> PathBuf {
    let path = dir.join("fake-agent");
    let mut file = std::fs::File::create(&path).expect("create fake agent script");
    file.write_all(script.as_bytes()).expect("write fake agent script");
    let mut perms = file.metadata().expect("stat fake agent script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod fake agent script");
    path
}

pub const AGENT_HELLO_WORLD: &str = r#"#!/bin/sh
echo '{"session_id": "sess-1", "kind": "system"}'
echo '{"text": "Hello"}'
echo '{"text": "world"}'
exit 0
"#;

pub const AGENT_HANGS: &str = r#"#!/bin/sh
sleep 30
"#;

impl Harness {
    pub async fn start_with_agent(agent_script: &str) -> Self {
        let data_root = tempfile::tempdir().expect("tempdir data_root");
        let agent_dir = tempfile::tempdir().expect("tempdir agent_dir");
        let agent_path = write_fake_agent(agent_dir.path(), agent_script);

        let port = free_port();
        let bin = assert_cmd::cargo::cargo_bin("hubd");
        let child = std::process::Command::new(bin)
            .env("HUB_DATA_ROOT", data_root.path())
            .env("HUB_AGENT_BIN", &agent_path)
            .env("HUB_LISTEN_ADDR", "127.0.0.1")
            .env("HUB_LISTEN_PORT", port.to_string())
            .env("HUB_EXECUTE_TIMEOUT_SECS", "2")
            .env("HUB_MAX_MESSAGE_BYTES", "4096")
            .env("HUB_LOG_LEVEL", "warn")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn hubd");

        let addr = format!("127.0.0.1:{port}");
        wait_for_ready(&addr).await;

        Self { child, addr, _data_root: data_root, _agent_dir: agent_dir }
    }

    pub async fn connect(&self) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
        let url = format!("ws://{}/", self.addr);
        let (ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect to hubd");
        ws
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Polls the listen address until a TCP connect succeeds or times out.
async fn wait_for_ready(addr: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("hubd did not become reachable at {addr} in time");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn send(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>, kind: &str, project_id: Option<&str>, data: Value) -> Message {
    let frame = serde_json::json!({ "type": kind, "project_id": project_id, "data": data });
    Message::Text(frame.to_string().into())
}

pub async fn send_frame(
    ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    kind: &str,
    project_id: Option<&str>,
    data: Value,
) {
    let msg = send(ws, kind, project_id, data);
    ws.send(msg).await.expect("send frame");
}

/// Reads the next `Message::Text` frame, decoded as JSON, skipping
/// WebSocket control frames.
pub async fn next_record(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> Value {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).expect("valid JSON record"),
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => panic!("websocket error: {e}"),
            Ok(None) => panic!("connection closed unexpectedly"),
            Err(_) => panic!("timed out waiting for a record"),
        }
    }
}
