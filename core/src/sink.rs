//! `tracing_subscriber` glue that routes formatted events into the
//! [`RetentionStore`].
//!
//! [`LogTimestamp`] makes every event start with the 20-character prefix the
//! compactor understands; [`RetentionSink`] hands each formatted event to
//! [`RetentionStore::append_bytes`] in one call. [`file_filter`] keeps switch
//! transitions in the file whatever `RUST_LOG` says.

use std::fmt;
use std::io;
use std::sync::Arc;

use chrono::Utc;
use tracing::{Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{FilterExt, Targets};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::Filter;
use tracing_subscriber::registry::LookupSpan;

use crate::monitor;
use crate::retention::{RetentionStore, TIMESTAMP_FORMAT};

/// UTC, second precision, `Z` suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTimestamp;

impl FormatTime for LogTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Utc::now().format(TIMESTAMP_FORMAT))
    }
}

#[derive(Debug, Clone)]
pub struct RetentionSink {
    store: Arc<RetentionStore>,
}

impl RetentionSink {
    #[must_use]
    pub fn new(store: Arc<RetentionStore>) -> Self {
        Self { store }
    }
}

pub struct RetentionWriter<'a> {
    store: &'a RetentionStore,
}

impl io::Write for RetentionWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.store.append_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RetentionSink {
    type Writer = RetentionWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RetentionWriter {
            store: &self.store,
        }
    }
}

/// Per-layer filter for the log file: `directives`, plus every `info` or
/// louder event from the edge monitor.
pub fn file_filter<S>(directives: EnvFilter) -> impl Filter<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    directives.or(Targets::new().with_target(monitor::LOG_TARGET, Level::INFO))
}
