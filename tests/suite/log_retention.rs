//! Retention store fed by the tracing sink, compacted while writers run.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use switchwatch_core::retention::format_timestamp;
use switchwatch_core::{LogTimestamp, RetentionSink, RetentionStore};
use tracing::subscriber::with_default;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

fn store_in(dir: &tempfile::TempDir) -> Arc<RetentionStore> {
    Arc::new(RetentionStore::open(dir.path().join("logs").join("switchwatch.log")).unwrap())
}

#[test]
fn expired_and_malformed_lines_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.append("2023-01-01T00:00:00Z hello").unwrap();
    store.append("").unwrap();
    store.append("not-a-timestamp-but-20chars!!").unwrap();

    let cutoff = Utc.with_ymd_and_hms(2022, 12, 31, 0, 0, 0).unwrap();
    let now = cutoff + chrono::Duration::hours(24);
    let report = store.compact(now, Duration::from_secs(24 * 60 * 60)).unwrap();

    assert_eq!(report.kept, 1);
    assert_eq!(
        fs::read_to_string(store.path()).unwrap(),
        "2023-01-01T00:00:00Z hello\n"
    );
}

#[test]
fn traced_events_survive_compaction() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    let old = format_timestamp(Utc::now() - chrono::Duration::days(3));
    store.append(&format!("{old}  INFO switchwatch: stale entry")).unwrap();

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_ansi(false)
            .with_timer(LogTimestamp)
            .with_writer(RetentionSink::new(Arc::clone(&store))),
    );
    with_default(subscriber, || {
        tracing::info!("Switch state changed to: true");
    });

    let report = store
        .compact(Utc::now(), Duration::from_secs(24 * 60 * 60))
        .unwrap();
    assert_eq!(report.expired, 1);

    let content = fs::read_to_string(store.path()).unwrap();
    assert!(!content.contains("stale entry"));
    assert!(content.contains("Switch state changed to: true"));

    // Appends after the swap go to the new file.
    store.append(&format!("{} after", format_timestamp(Utc::now()))).unwrap();
    assert!(fs::read_to_string(store.path()).unwrap().ends_with(" after\n"));
}

#[test]
fn appends_racing_compaction_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..200 {
                    let line = format!("{} writer={writer} n={n}", format_timestamp(Utc::now()));
                    store.append(&line).unwrap();
                }
            })
        })
        .collect();

    let compactor = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..20 {
                store
                    .compact(Utc::now(), Duration::from_secs(60 * 60))
                    .unwrap();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    compactor.join().unwrap();

    let content = fs::read_to_string(store.path()).unwrap();
    assert_eq!(content.lines().count(), 800);
    for writer in 0..4 {
        assert!(content.contains(&format!("writer={writer} n=199")));
    }
}
