// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

use anyhow::Result;
use serde::Serialize;

use crate::client::HubClient;
use crate::output::{format_or_json, OutputFormat};

#[derive(Serialize)]
struct Row {
    id: String,
    status: String,
    session_id: String,
}

pub async fn handle(addr: &str, format: OutputFormat) -> Result<()> {
    let mut client = HubClient::connect(addr).await?;
    let projects = client.list_projects().await?;

    let rows: Vec<Row> = projects
        .iter()
        .map(|p| Row {
            id: p.id.to_string(),
            status: p.status.as_str().to_string(),
            session_id: if p.session_id.is_empty() { "-".to_string() } else { p.session_id.to_string() },
        })
        .collect();

    format_or_json(format, &rows, || {
        if rows.is_empty() {
            println!("No projects");
            return;
        }
        for row in &rows {
            println!("{}  {}  {}", crate::color::header(&row.id), row.status, crate::color::muted(&row.session_id));
        }
    })
}
