//! Append-only log file that periodically drops lines older than a retention
//! window.
//!
//! # Line format
//!
//! Every line starts with a 20-character UTC RFC 3339 timestamp
//! (`2024-05-01T12:00:00Z`) followed by the payload. Compaction keeps a line
//! only if that prefix parses and is newer than the cutoff; anything else is
//! dropped.
//!
//! # Concurrency
//!
//! A single mutex guards the append handle. Appends take it for one
//! `write_all`; compaction holds it across read, filter, atomic replace, and
//! handle reopen. An append racing a compaction therefore lands either before
//! the read (and is filtered like any other line) or after the swap (in the
//! new file); it can never be written to the file being replaced.
//!
//! Nothing in this module may emit a `tracing` event while the mutex is held:
//! the process log sink appends through the same mutex.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use switchwatch_utils::AtomicWriteOptions;
use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// `strftime` pattern for the line prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
/// Byte length of a formatted line prefix.
pub const TIMESTAMP_LEN: usize = 20;

#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse the leading timestamp of a log line.
#[must_use]
pub fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let prefix = line.get(..TIMESTAMP_LEN)?;
    DateTime::parse_from_rfc3339(prefix)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Counts from one compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionReport {
    pub kept: usize,
    pub expired: usize,
    pub malformed: usize,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

impl CompactionReport {
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.expired + self.malformed
    }
}

/// Keep the lines of `content` whose timestamp is strictly after `cutoff`.
///
/// Empty lines vanish without being counted. Every kept line is terminated by
/// `\n` in the output, so running this on its own output is a no-op.
#[must_use]
pub fn compact_lines(content: &str, cutoff: DateTime<Utc>) -> (String, CompactionReport) {
    let mut kept = String::with_capacity(content.len());
    let mut report = CompactionReport {
        bytes_before: content.len(),
        ..CompactionReport::default()
    };

    for line in content.split('\n') {
        if line.is_empty() {
            continue;
        }
        match line_timestamp(line) {
            Some(at) if at > cutoff => {
                kept.push_str(line);
                kept.push('\n');
                report.kept += 1;
            }
            Some(_) => report.expired += 1,
            None => report.malformed += 1,
        }
    }

    report.bytes_after = kept.len();
    (kept, report)
}

/// `now - retention`, saturating at the earliest representable instant.
#[must_use]
pub fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(retention)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug)]
pub struct RetentionStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl RetentionStore {
    /// Open `path` for appending, creating the parent directory and the file
    /// if they are missing.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // Every write is a single `write_all` on an `O_APPEND` handle, so a panic
    // elsewhere cannot leave the handle in a state worth refusing.
    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one line, adding the trailing newline if it is missing.
    pub fn append(&self, line: &str) -> io::Result<()> {
        if line.ends_with('\n') {
            self.append_bytes(line.as_bytes())
        } else {
            let mut buf = String::with_capacity(line.len() + 1);
            buf.push_str(line);
            buf.push('\n');
            self.append_bytes(buf.as_bytes())
        }
    }

    /// Append raw bytes as-is. Used by the tracing sink, whose buffers are
    /// already newline-terminated.
    pub fn append_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        self.lock().write_all(bytes)
    }

    /// Drop every line not newer than `now - retention`.
    ///
    /// The file is replaced atomically and only when something changes. The
    /// new append handle is opened before the swap, so an error leaves the
    /// original file and handle in place. A store file that was deleted or
    /// replaced underneath us is reattached first.
    pub fn compact(&self, now: DateTime<Utc>, retention: Duration) -> io::Result<CompactionReport> {
        let cutoff = retention_cutoff(now, retention);
        let mut handle = self.lock();

        if !is_attached(&handle, &self.path) {
            *handle = open_append(&self.path)?;
        }

        let raw = fs::read(&self.path)?;
        let content = String::from_utf8_lossy(&raw);
        let (kept, report) = compact_lines(&content, cutoff);

        if kept.as_bytes() == raw.as_slice() {
            return Ok(report);
        }

        *handle = switchwatch_utils::atomic_write_and_open(
            &self.path,
            kept.as_bytes(),
            AtomicWriteOptions::default(),
            OpenOptions::new().append(true),
        )?;
        Ok(report)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Whether `file` is still the file found at `path`.
#[cfg(unix)]
fn is_attached(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(open), Ok(current)) => open.dev() == current.dev() && open.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_attached(_file: &File, path: &Path) -> bool {
    path.exists()
}

/// Compact `store` every `interval` until `cancel` fires.
///
/// The first pass runs one interval after start. Failures are logged and the
/// next pass starts from scratch.
pub async fn run_compactor(
    store: Arc<RetentionStore>,
    interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
) {
    let start = Instant::now() + interval;
    let mut ticks = time::interval_at(start, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        path = %store.path().display(),
        interval_secs = interval.as_secs(),
        retention_secs = retention.as_secs(),
        "Log compaction scheduled"
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let pass_store = Arc::clone(&store);
        let outcome =
            task::spawn_blocking(move || pass_store.compact(Utc::now(), retention)).await;

        match outcome {
            Ok(Ok(report)) => tracing::info!(
                kept = report.kept,
                expired = report.expired,
                malformed = report.malformed,
                bytes_before = report.bytes_before,
                bytes_after = report.bytes_after,
                "Log compaction finished"
            ),
            Ok(Err(e)) => tracing::warn!(
                path = %store.path().display(),
                "Log compaction failed; retrying next cycle: {e}"
            ),
            Err(e) => tracing::error!("Log compaction task panicked: {e}"),
        }
    }

    tracing::debug!("Log compactor stopped");
}
