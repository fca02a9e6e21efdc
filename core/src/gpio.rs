//! Digital input pins.
//!
//! [`InputPin`] is the only capability the monitor needs. [`SysfsPin`] drives
//! the Linux `/sys/class/gpio` interface; [`ScriptedPin`] replays a fixed
//! sequence of readings.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use switchwatch_types::Level;
use thiserror::Error;

/// Which edges the kernel should report for an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    None,
    Rising,
    Falling,
    #[default]
    Both,
}

impl Edge {
    #[must_use]
    pub const fn as_sysfs(self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }
}

/// One-time input configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub pull_up: bool,
    pub edge: Edge,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            pull_up: true,
            edge: Edge::Both,
        }
    }
}

#[derive(Debug, Error)]
pub enum PinError {
    #[error("GPIO {path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("GPIO {path}: unexpected value {raw:?}", path = .path.display())]
    InvalidValue { path: PathBuf, raw: String },
    #[error("GPIO line {line} did not appear after export")]
    ExportTimeout { line: u32 },
    #[error("scripted pin: {0}")]
    Scripted(String),
}

pub trait InputPin: Send {
    /// Human-readable identifier for log fields.
    fn name(&self) -> String;

    fn configure(&mut self, config: PinConfig) -> Result<(), PinError>;

    fn read(&mut self) -> Result<Level, PinError>;
}

// ============================================================================
// sysfs
// ============================================================================

const EXPORT_POLL_ATTEMPTS: u32 = 20;
const EXPORT_POLL_DELAY: Duration = Duration::from_millis(50);

/// A GPIO line exposed through `/sys/class/gpio/gpioN`.
#[derive(Debug, Clone)]
pub struct SysfsPin {
    root: PathBuf,
    line: u32,
}

impl SysfsPin {
    pub fn new(root: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            root: root.into(),
            line,
        }
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.line))
    }

    fn value_path(&self) -> PathBuf {
        self.line_dir().join("value")
    }

    fn write_attr(path: &Path, value: &str) -> Result<(), PinError> {
        fs::write(path, value).map_err(|source| PinError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn export(&self) -> Result<(), PinError> {
        Self::write_attr(&self.root.join("export"), &self.line.to_string())?;

        // udev applies permissions asynchronously after export.
        let direction = self.line_dir().join("direction");
        for _ in 0..EXPORT_POLL_ATTEMPTS {
            if direction.exists() {
                return Ok(());
            }
            thread::sleep(EXPORT_POLL_DELAY);
        }
        Err(PinError::ExportTimeout { line: self.line })
    }
}

impl InputPin for SysfsPin {
    fn name(&self) -> String {
        format!("GPIO{}", self.line)
    }

    fn configure(&mut self, config: PinConfig) -> Result<(), PinError> {
        if !self.line_dir().exists() {
            self.export()?;
        }

        Self::write_attr(&self.line_dir().join("direction"), "in")?;

        let edge_path = self.line_dir().join("edge");
        if edge_path.exists() {
            Self::write_attr(&edge_path, config.edge.as_sysfs())?;
        } else {
            tracing::warn!(pin = %self.name(), "GPIO line has no edge attribute; polling only");
        }

        if config.pull_up {
            tracing::info!(
                pin = %self.name(),
                "sysfs cannot set line bias; pull-up must come from the board or device tree"
            );
        }

        Ok(())
    }

    fn read(&mut self) -> Result<Level, PinError> {
        let path = self.value_path();
        let raw = fs::read_to_string(&path).map_err(|source| PinError::Io {
            path: path.clone(),
            source,
        })?;
        Level::from_ascii(&raw).ok_or_else(|| PinError::InvalidValue {
            path,
            raw: raw.trim().to_string(),
        })
    }
}

// ============================================================================
// Scripted
// ============================================================================

/// Replays a queue of readings, then holds the last successful level.
///
/// A `None` entry produces a read error.
#[derive(Debug, Clone)]
pub struct ScriptedPin {
    readings: VecDeque<Option<Level>>,
    hold: Option<Level>,
    reads: usize,
}

impl ScriptedPin {
    pub fn from_levels(levels: impl IntoIterator<Item = Level>) -> Self {
        Self::from_readings(levels.into_iter().map(Some))
    }

    pub fn from_readings(readings: impl IntoIterator<Item = Option<Level>>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            hold: None,
            reads: 0,
        }
    }

    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl InputPin for ScriptedPin {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn configure(&mut self, _config: PinConfig) -> Result<(), PinError> {
        Ok(())
    }

    fn read(&mut self) -> Result<Level, PinError> {
        self.reads += 1;
        match self.readings.pop_front() {
            Some(Some(level)) => {
                self.hold = Some(level);
                Ok(level)
            }
            Some(None) => Err(PinError::Scripted(format!("injected failure on read {}", self.reads))),
            None => self
                .hold
                .ok_or_else(|| PinError::Scripted("no readings scripted".to_string())),
        }
    }
}
