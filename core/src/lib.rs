//! Runtime pieces of switchwatch.
//!
//! - [`gpio`]: the [`InputPin`] seam plus sysfs and scripted pins
//! - [`monitor`]: polling edge detector feeding the registry and the dispatch queue
//! - [`registry`]: shared switch state and opt-in set
//! - [`dispatch`]: bounded queue and the task that drains it into a notifier
//! - [`retention`]: append-only log file with time-based compaction
//! - [`sink`]: `tracing_subscriber` writer and timer for the retention store

pub mod dispatch;
pub mod gpio;
pub mod monitor;
pub mod registry;
pub mod retention;
pub mod sink;

pub use dispatch::{DISPATCH_QUEUE_CAPACITY, DispatchQueue, dispatch_queue, run_dispatcher};
pub use gpio::{Edge, InputPin, PinConfig, PinError, ScriptedPin, SysfsPin};
pub use monitor::{EdgeMonitor, Observation};
pub use registry::StateRegistry;
pub use retention::{CompactionReport, RetentionStore, compact_lines, run_compactor};
pub use sink::{LogTimestamp, RetentionSink, file_filter};
