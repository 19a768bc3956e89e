// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The client->server envelope and its typed `data` payloads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use hub_core::validator::AgentOptions;
use hub_core::{ErrorCode, ProjectId};
use serde::{Deserialize, Serialize};

/// The envelope as it arrives off the wire, before its `data` payload has
/// been interpreted against its `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ProjectCreateData {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectDeleteData {
    #[serde(default)]
    purge: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectJoinData {
    #[serde(default)]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ExecuteData {
    prompt: String,
    #[serde(default)]
    options: AgentOptions,
    #[serde(default)]
    new_session: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GetMessagesData {
    #[serde(default)]
    since: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: Option<u32>,
}

/// A decoded, type-dispatched client request. This is what the Connection
/// Handler's read loop hands to the Project Registry / Subscription Hub.
#[derive(Debug, Clone)]
pub enum Request {
    ProjectCreate {
        path: PathBuf,
    },
    ProjectDelete {
        project_id: ProjectId,
        purge: bool,
    },
    ProjectList,
    ProjectJoin {
        project_id: ProjectId,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    },
    ProjectLeave {
        project_id: ProjectId,
    },
    Execute {
        project_id: ProjectId,
        prompt: String,
        options: AgentOptions,
        new_session: bool,
    },
    AgentKill {
        project_id: ProjectId,
    },
    NewSession {
        project_id: ProjectId,
    },
    GetMessages {
        project_id: ProjectId,
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("unrecognized frame type: {0:?}")]
    UnknownType(String),
    #[error("{0} requires project_id")]
    MissingProjectId(&'static str),
    #[error("invalid data payload: {0}")]
    InvalidData(#[from] serde_json::Error),
}

impl RequestError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SchemaViolation
    }
}

fn require_project_id(frame: &ClientFrame, kind: &'static str) -> Result<ProjectId, RequestError> {
    frame.project_id.ok_or(RequestError::MissingProjectId(kind))
}

impl TryFrom<ClientFrame> for Request {
    type Error = RequestError;

    fn try_from(frame: ClientFrame) -> Result<Self, Self::Error> {
        match frame.kind.as_str() {
            "project_create" => {
                let data: ProjectCreateData = serde_json::from_value(frame.data)?;
                Ok(Request::ProjectCreate { path: data.path })
            }
            "project_delete" => {
                let project_id = require_project_id(&frame, "project_delete")?;
                let data: ProjectDeleteData = if frame.data.is_null() {
                    ProjectDeleteData::default()
                } else {
                    serde_json::from_value(frame.data)?
                };
                Ok(Request::ProjectDelete {
                    project_id,
                    purge: data.purge,
                })
            }
            "project_list" => Ok(Request::ProjectList),
            "project_join" => {
                let project_id = require_project_id(&frame, "project_join")?;
                let data: ProjectJoinData = if frame.data.is_null() {
                    ProjectJoinData::default()
                } else {
                    serde_json::from_value(frame.data)?
                };
                Ok(Request::ProjectJoin {
                    project_id,
                    since: data.since,
                    limit: data.limit,
                })
            }
            "project_leave" => Ok(Request::ProjectLeave {
                project_id: require_project_id(&frame, "project_leave")?,
            }),
            "execute" => {
                let project_id = require_project_id(&frame, "execute")?;
                let data: ExecuteData = serde_json::from_value(frame.data)?;
                Ok(Request::Execute {
                    project_id,
                    prompt: data.prompt,
                    options: data.options,
                    new_session: data.new_session,
                })
            }
            "agent_kill" => Ok(Request::AgentKill {
                project_id: require_project_id(&frame, "agent_kill")?,
            }),
            "new_session" => Ok(Request::NewSession {
                project_id: require_project_id(&frame, "new_session")?,
            }),
            "get_messages" => {
                let project_id = require_project_id(&frame, "get_messages")?;
                let data: GetMessagesData = if frame.data.is_null() {
                    GetMessagesData::default()
                } else {
                    serde_json::from_value(frame.data)?
                };
                Ok(Request::GetMessages {
                    project_id,
                    since: data.since,
                    limit: data.limit,
                })
            }
            other => Err(RequestError::UnknownType(other.to_string())),
        }
    }
}
