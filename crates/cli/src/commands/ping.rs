// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

use anyhow::Result;

use crate::client::HubClient;
use crate::output::{format_or_json, OutputFormat};

pub async fn handle(addr: &str, format: OutputFormat) -> Result<()> {
    let mut client = match HubClient::connect(addr).await {
        Ok(c) => c,
        Err(error) => {
            println!("hubd at {addr} is not reachable: {error}");
            std::process::exit(1);
        }
    };

    let rtt = client.ping().await?;
    format_or_json(
        format,
        &serde_json::json!({ "addr": addr, "rtt_ms": rtt.as_millis() }),
        || println!("{} {} ({} ms)", crate::color::header("pong"), crate::color::muted(addr), rtt.as_millis()),
    )
}
