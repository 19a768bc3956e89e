// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

use anyhow::Result;
use hub_core::ProjectStatus;
use serde::Serialize;

use crate::client::HubClient;
use crate::output::{format_or_json, OutputFormat};

#[derive(Serialize)]
struct StatusSummary {
    projects: usize,
    idle: usize,
    executing: usize,
    error: usize,
}

pub async fn handle(addr: &str, format: OutputFormat) -> Result<()> {
    let mut client = match HubClient::connect(addr).await {
        Ok(c) => c,
        Err(_) => {
            println!("Daemon is not running at {addr}");
            return Ok(());
        }
    };

    let projects = client.list_projects().await?;
    let summary = StatusSummary {
        projects: projects.len(),
        idle: projects.iter().filter(|p| p.status == ProjectStatus::Idle).count(),
        executing: projects.iter().filter(|p| p.status == ProjectStatus::Executing).count(),
        error: projects.iter().filter(|p| p.status == ProjectStatus::Error).count(),
    };

    format_or_json(format, &summary, || {
        println!("{}", crate::color::header(&format!("hubd at {addr}")));
        println!("  projects: {}", summary.projects);
        println!("  idle: {}  executing: {}  error: {}", summary.idle, summary.executing, summary.error);
    })
}
