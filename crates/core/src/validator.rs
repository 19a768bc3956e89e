// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! Pure validation functions. No I/O beyond `Path::canonicalize` and
//! `Path::is_dir`, which both touch the filesystem but perform no mutation.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

const MAX_PATH_LEN: usize = 4096;

const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const RESTRICTED_PREFIXES: &[&str] = &[
    "/etc", "/proc", "/sys", "/dev", "/boot", "/usr", "/bin", "/sbin", "/lib", "/lib64", "/run",
    "/var/run",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path exceeds the maximum length")]
    TooLong,
    #[error("path contains a traversal segment")]
    Traversal,
    #[error("path contains a disallowed character")]
    InvalidChars,
    #[error("path is not absolute")]
    NotAbsolute,
    #[error("path is under a restricted system directory")]
    Restricted,
    #[error("path is not a directory")]
    NotADirectory,
    #[error("path does not exist")]
    NotFound,
}

impl PathError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PathError::Traversal => ErrorCode::PathTraversal,
            _ => ErrorCode::InvalidPath,
        }
    }
}

fn is_restricted(p: &Path) -> bool {
    RESTRICTED_PREFIXES.iter().any(|prefix| {
        let prefix = Path::new(prefix);
        p == prefix || p.starts_with(prefix)
    })
}

/// Validates a project path: rejects traversal and tilde-prefixed input
/// before ever touching the filesystem, then canonicalizes and re-checks
/// the result against the same restrictions.
pub fn validate_path(p: &Path) -> Result<PathBuf, PathError> {
    let raw = p.to_string_lossy();
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if raw.len() > MAX_PATH_LEN {
        return Err(PathError::TooLong);
    }
    if raw.starts_with('~') {
        return Err(PathError::Traversal);
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathError::Traversal);
    }
    if raw
        .chars()
        .any(|c| c == '\0' || (c as u32) <= 0x1F || INVALID_PATH_CHARS.contains(&c))
    {
        return Err(PathError::InvalidChars);
    }
    if !p.is_absolute() {
        return Err(PathError::NotAbsolute);
    }
    if is_restricted(p) {
        return Err(PathError::Restricted);
    }

    let canonical = p.canonicalize().map_err(|_| PathError::NotFound)?;

    if !canonical.is_absolute() {
        return Err(PathError::NotAbsolute);
    }
    if is_restricted(&canonical) {
        return Err(PathError::Restricted);
    }
    if !canonical.is_dir() {
        return Err(PathError::NotADirectory);
    }

    Ok(canonical)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NestingError {
    #[error("a project already exists at this path")]
    Exists,
    #[error("path is an ancestor or descendant of an existing project")]
    Nests,
}

impl NestingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            NestingError::Exists => ErrorCode::ProjectExists,
            NestingError::Nests => ErrorCode::ProjectNesting,
        }
    }
}

fn with_trailing_sep(p: &Path) -> String {
    let mut s = p.to_string_lossy().into_owned();
    if !s.ends_with(std::path::MAIN_SEPARATOR) {
        s.push(std::path::MAIN_SEPARATOR);
    }
    s
}

/// `(I1)`/`(I2)`: rejects an exact duplicate canonical path (`Exists`) and
/// rejects any ancestor/descendant relationship with an existing project
/// (`Nests`), judged by segment-prefix with a trailing separator appended
/// to both sides so `/tmp/p1` does not falsely prefix-match `/tmp/p10`.
pub fn validate_nesting(new: &Path, existing: &[PathBuf]) -> Result<(), NestingError> {
    for ex in existing {
        if ex == new {
            return Err(NestingError::Exists);
        }
    }
    let new_sep = with_trailing_sep(new);
    for ex in existing {
        let ex_sep = with_trailing_sep(ex);
        if new_sep.starts_with(&ex_sep) || ex_sep.starts_with(&new_sep) {
            return Err(NestingError::Nests);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SizeError {
    #[error("record exceeds the per-record size cap")]
    RecordTooLarge,
    #[error("batch exceeds the total size cap")]
    BatchTooLarge,
}

impl SizeError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::MessageTooLarge
    }
}

pub fn validate_message_size(bytes: usize, cap: usize) -> Result<(), SizeError> {
    if bytes > cap {
        Err(SizeError::RecordTooLarge)
    } else {
        Ok(())
    }
}

/// Fail-fast running sum: stops at the first record that pushes the total
/// over `total_cap`, rather than summing the whole batch first.
pub fn validate_batch(record_sizes: &[usize], total_cap: usize) -> Result<(), SizeError> {
    let mut sum: usize = 0;
    for &len in record_sizes {
        sum = sum.saturating_add(len);
        if sum > total_cap {
            return Err(SizeError::BatchTooLarge);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("prompt is empty")]
    Empty,
    #[error("prompt exceeds the maximum length")]
    TooLong,
    #[error("prompt contains a disallowed control character")]
    ControlChar,
}

impl PromptError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SchemaViolation
    }
}

pub fn validate_prompt(s: &str, max_chars: usize) -> Result<(), PromptError> {
    if s.is_empty() {
        return Err(PromptError::Empty);
    }
    if s.chars().count() > max_chars {
        return Err(PromptError::TooLong);
    }
    if s.chars().any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t')) {
        return Err(PromptError::ControlChar);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOptions {
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    #[serde(default)]
    pub add_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OptionsError {
    #[error("add_dirs entry failed path validation: {0}")]
    InvalidAddDir(#[source] PathError),
}

impl OptionsError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SchemaViolation
    }
}

/// `permission_mode` is enforced by typed deserialization (unset or one of
/// the enum's variants); this only has to recheck `add_dirs`, since those
/// arrive as plain strings.
pub fn validate_agent_options(options: &AgentOptions) -> Result<(), OptionsError> {
    for dir in &options.add_dirs {
        validate_path(dir).map_err(OptionsError::InvalidAddDir)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String,
    Integer,
    Bool,
    Object,
    Array,
    StringEnum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    pub name: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {reason}")]
pub struct SchemaError {
    pub path: String,
    pub reason: String,
}

impl SchemaError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SchemaViolation
    }
}

/// Schema-based checks over a `data` payload: required fields, primitive
/// types, and string enums, collecting one error per offending field path
/// rather than stopping at the first.
pub fn validate_json_schema(
    message_type: &str,
    payload: &serde_json::Value,
    schema: &[FieldSchema],
) -> Result<(), Vec<SchemaError>> {
    let obj = match payload.as_object() {
        Some(o) => o,
        None => {
            return Err(vec![SchemaError {
                path: message_type.to_string(),
                reason: "data must be a JSON object".to_string(),
            }]);
        }
    };

    let mut errors = Vec::new();
    for field in schema {
        let path = format!("{message_type}.{}", field.name);
        match obj.get(field.name) {
            None => {
                if field.required {
                    errors.push(SchemaError {
                        path,
                        reason: "missing required field".to_string(),
                    });
                }
            }
            Some(value) => {
                let ok = match field.kind {
                    FieldKind::String => value.is_string(),
                    FieldKind::Integer => value.is_i64() || value.is_u64(),
                    FieldKind::Bool => value.is_boolean(),
                    FieldKind::Object => value.is_object(),
                    FieldKind::Array => value.is_array(),
                    FieldKind::StringEnum(allowed) => {
                        value.as_str().is_some_and(|s| allowed.contains(&s))
                    }
                };
                if !ok {
                    errors.push(SchemaError {
                        path,
                        reason: "does not match the expected type".to_string(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
