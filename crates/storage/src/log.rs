// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! The per-project message log: append-only, rotating, crash-recoverable.
//!
//! Each file in a project's `messages/` directory is named after its first
//! record's timestamp (RFC 3339, millisecond precision, `:` replaced with
//! `-` so the name is filesystem-safe and still sorts chronologically).
//! There is no separately named "current" pointer file: the current file is
//! simply the one with the lexicographically greatest name.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use hub_core::clock::{Clock, SystemClock};
use hub_core::MessageRecord;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("log quota exceeded")]
    QuotaExceeded,
    #[error("log is closed")]
    Closed,
}

impl LogError {
    pub fn code(&self) -> hub_core::ErrorCode {
        hub_core::ErrorCode::Internal
    }
}

/// Thresholds governing rotation and retention; resource caps from the
/// environment configuration.
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    pub rotate_bytes: u64,
    pub retention: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            rotate_bytes: 8 * 1024 * 1024,
            retention: Duration::days(30),
        }
    }
}

fn format_filename_ts(ts: DateTime<Utc>) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}-{:02}-{:02}.{:03}Z",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.timestamp_subsec_millis()
    )
}

fn parse_filename_ts(stem: &str) -> Option<DateTime<Utc>> {
    let stem = stem.strip_suffix('Z')?;
    let (date, time) = stem.split_once('T')?;
    let mut date_parts = date.split('-');
    let year: i32 = date_parts.next()?.parse().ok()?;
    let month: u32 = date_parts.next()?.parse().ok()?;
    let day: u32 = date_parts.next()?.parse().ok()?;
    let (time_main, millis_str) = time.split_once('.')?;
    let mut time_parts = time_main.split('-');
    let hour: u32 = time_parts.next()?.parse().ok()?;
    let minute: u32 = time_parts.next()?.parse().ok()?;
    let second: u32 = time_parts.next()?.parse().ok()?;
    let millis: u32 = millis_str.parse().ok()?;
    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    let time = chrono::NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(time), Utc))
}

fn filename_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let stem = path.file_stem()?.to_str()?;
    if path.extension()?.to_str()? != "jsonl" {
        return None;
    }
    parse_filename_ts(stem)
}

struct FileEntry {
    path: PathBuf,
    first_ts: DateTime<Utc>,
}

fn snapshot_files(dir: &Path) -> io::Result<Vec<FileEntry>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if let Some(first_ts) = filename_timestamp(&path) {
            out.push(FileEntry { path, first_ts });
        }
    }
    out.sort_by_key(|f| f.first_ts);
    Ok(out)
}

fn rotate_backups(path: &Path) -> io::Result<()> {
    let bak1 = path.with_extension("bak");
    let bak2 = path.with_extension("bak.2");
    let bak3 = path.with_extension("bak.3");
    if bak3.exists() {
        fs::remove_file(&bak3)?;
    }
    if bak2.exists() {
        fs::rename(&bak2, &bak3)?;
    }
    if bak1.exists() {
        fs::rename(&bak1, &bak2)?;
    }
    Ok(())
}

struct RecoveredFile {
    size: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// `(L3)`: scans the tail of `path` and, if the trailing content is not a
/// sequence of complete, valid JSON lines, rotates the whole file to `.bak`
/// (shifting up to two prior backups) and rewrites `path` with only the
/// valid prefix.
fn recover_current(path: &Path) -> Result<RecoveredFile, LogError> {
    if !path.exists() {
        return Ok(RecoveredFile { size: 0, last_timestamp: None });
    }
    let bytes = fs::read(path)?;
    let text = match std::str::from_utf8(&bytes) {
        Ok(t) => t,
        Err(_) => {
            rotate_backups(path)?;
            fs::rename(path, path.with_extension("bak"))?;
            fs::write(path, b"")?;
            return Ok(RecoveredFile { size: 0, last_timestamp: None });
        }
    };

    let mut valid_end = 0usize;
    let mut last_timestamp = None;
    let mut corrupt = false;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n');
        if trimmed.is_empty() {
            valid_end += line.len();
            continue;
        }
        match MessageRecord::from_log_line(trimmed) {
            Ok(rec) => {
                last_timestamp = Some(rec.timestamp);
                valid_end += line.len();
            }
            Err(_) => {
                corrupt = true;
                break;
            }
        }
    }

    if corrupt || valid_end < bytes.len() {
        let clean = &bytes[..valid_end];
        rotate_backups(path)?;
        fs::rename(path, path.with_extension("bak"))?;
        fs::write(path, clean)?;
    }

    Ok(RecoveredFile {
        size: valid_end as u64,
        last_timestamp,
    })
}

fn read_file_records(path: &Path) -> io::Result<Vec<MessageRecord>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let text = match std::str::from_utf8(&bytes) {
        Ok(t) => t,
        Err(_) => return Ok(Vec::new()),
    };
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match MessageRecord::from_log_line(line) {
            Ok(rec) => out.push(rec),
            // A reader never blocks on a writer mid-append: an unparsable
            // trailing line just means "stop here", not an error.
            Err(_) => break,
        }
    }
    Ok(out)
}

/// Per-project append-only log. Not `Clone`; callers serialize access
/// through their own lock (the Registry's project-owned instance).
pub struct MessageLog<C: Clock = SystemClock> {
    dir: PathBuf,
    config: LogConfig,
    clock: C,
    writer: Option<BufWriter<File>>,
    current_path: PathBuf,
    current_first_ts: DateTime<Utc>,
    current_size: u64,
    last_timestamp: DateTime<Utc>,
    closed: bool,
}

impl MessageLog<SystemClock> {
    pub fn open(dir: impl Into<PathBuf>, config: LogConfig) -> Result<Self, LogError> {
        Self::open_with_clock(dir, config, SystemClock)
    }
}

impl<C: Clock> MessageLog<C> {
    pub fn open_with_clock(dir: impl Into<PathBuf>, config: LogConfig, clock: C) -> Result<Self, LogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let files = snapshot_files(&dir)?;

        let (current_path, current_first_ts, recovered) = match files.last() {
            Some(entry) => {
                let recovered = recover_current(&entry.path)?;
                (entry.path.clone(), entry.first_ts, recovered)
            }
            None => {
                let now = clock.now_utc();
                let path = dir.join(format!("{}.jsonl", format_filename_ts(now)));
                fs::write(&path, b"")?;
                (path, now, RecoveredFile { size: 0, last_timestamp: None })
            }
        };

        let file = OpenOptions::new().create(true).append(true).open(&current_path)?;
        let last_timestamp = recovered.last_timestamp.unwrap_or(current_first_ts);

        Ok(Self {
            dir,
            config,
            clock,
            writer: Some(BufWriter::new(file)),
            current_path,
            current_first_ts,
            current_size: recovered.size,
            last_timestamp,
            closed: false,
        })
    }

    /// `(I4)`-style clamp for the log: if `record`'s timestamp regresses
    /// relative to the last appended record, it keeps the previous record's
    /// timestamp instead, preserving append-order monotonicity.
    pub fn append(&mut self, mut record: MessageRecord) -> Result<MessageRecord, LogError> {
        if self.closed {
            return Err(LogError::Closed);
        }
        if record.timestamp < self.last_timestamp {
            record.timestamp = self.last_timestamp;
        } else {
            self.last_timestamp = record.timestamp;
        }

        self.maybe_rotate_for(record.timestamp)?;

        let line = record
            .to_log_line()
            .map_err(|e| LogError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let writer = self.writer.as_mut().ok_or(LogError::Closed)?;
        writer.write_all(line.as_bytes()).map_err(|e| {
            if e.raw_os_error() == Some(28) {
                LogError::QuotaExceeded
            } else {
                LogError::Io(e)
            }
        })?;
        writer.flush()?;
        self.current_size += line.len() as u64;

        Ok(record)
    }

    fn maybe_rotate_for(&mut self, next_ts: DateTime<Utc>) -> Result<(), LogError> {
        if self.current_size == 0 {
            return Ok(());
        }
        let age = self.clock.now_utc() - self.current_first_ts;
        if self.current_size >= self.config.rotate_bytes || age >= self.config.retention {
            self.rotate_to(next_ts)?;
        }
        Ok(())
    }

    fn rotate_to(&mut self, first_ts: DateTime<Utc>) -> Result<(), LogError> {
        if let Some(w) = self.writer.as_mut() {
            w.flush()?;
            w.get_ref().sync_data()?;
        }
        self.writer = None;
        let new_path = self.dir.join(format!("{}.jsonl", format_filename_ts(first_ts)));
        let file = OpenOptions::new().create(true).append(true).open(&new_path)?;
        self.writer = Some(BufWriter::new(file));
        self.current_path = new_path;
        self.current_first_ts = first_ts;
        self.current_size = 0;
        Ok(())
    }

    /// May be invoked by a periodic sweeper to rotate purely on age, with no
    /// pending append driving it. No-op if thresholds are not exceeded.
    pub fn rotate_if_needed(&mut self) -> Result<bool, LogError> {
        if self.closed {
            return Err(LogError::Closed);
        }
        if self.current_size == 0 {
            return Ok(false);
        }
        let age = self.clock.now_utc() - self.current_first_ts;
        if self.current_size >= self.config.rotate_bytes || age >= self.config.retention {
            self.rotate_to(self.clock.now_utc())?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Deletes rotated files (never the current file) older than retention.
    /// Safe to call concurrently with appends: it never touches the current
    /// file and never blocks on the writer.
    pub fn sweep_expired(&self) -> Result<Vec<PathBuf>, LogError> {
        let now = self.clock.now_utc();
        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == self.current_path {
                continue;
            }
            if let Some(ts) = filename_timestamp(&path) {
                if now - ts >= self.config.retention && fs::remove_file(&path).is_ok() {
                    removed.push(path);
                }
            }
        }
        Ok(removed)
    }

    /// Snapshots the file list at call time (`(L2)`); records appended
    /// after the snapshot are not guaranteed to appear.
    pub fn read_since(&self, since: Option<DateTime<Utc>>, limit: usize) -> Result<Vec<MessageRecord>, LogError> {
        if self.closed {
            return Err(LogError::Closed);
        }
        let since = since.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let files = snapshot_files(&self.dir)?;
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut start_idx = files.len() - 1;
        for (i, f) in files.iter().enumerate() {
            if f.first_ts >= since {
                start_idx = i.saturating_sub(1);
                break;
            }
        }

        let mut out = Vec::new();
        for f in &files[start_idx..] {
            for rec in read_file_records(&f.path)? {
                if rec.timestamp >= since {
                    out.push(rec);
                    if out.len() >= limit {
                        return Ok(out);
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn close(&mut self) -> Result<(), LogError> {
        if self.closed {
            return Ok(());
        }
        if let Some(w) = self.writer.as_mut() {
            w.flush()?;
            w.get_ref().sync_data()?;
        }
        self.writer = None;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
