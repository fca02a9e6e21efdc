//! Switch levels, logical state, and transitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw electrical level read from a digital input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Parse the ASCII value exposed by kernel GPIO interfaces (`"0"` / `"1"`).
    #[must_use]
    pub fn from_ascii(raw: &str) -> Option<Self> {
        match raw.trim() {
            "0" => Some(Level::Low),
            "1" => Some(Level::High),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => f.write_str("low"),
            Level::High => f.write_str("high"),
        }
    }
}

/// Last observed logical state of the switch.
///
/// The input is wired with a pull-up, so a closed switch pulls the line to
/// ground: `Low` means "on".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchState(bool);

impl SwitchState {
    pub const ON: Self = Self(true);
    pub const OFF: Self = Self(false);

    #[must_use]
    pub const fn new(on: bool) -> Self {
        Self(on)
    }

    #[must_use]
    pub const fn from_level(level: Level) -> Self {
        Self(matches!(level, Level::Low))
    }

    #[must_use]
    pub const fn is_on(self) -> bool {
        self.0
    }
}

impl From<bool> for SwitchState {
    fn from(value: bool) -> Self {
        Self(value)
    }
}

impl From<SwitchState> for bool {
    fn from(value: SwitchState) -> Self {
        value.0
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A genuine change between two consecutive polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub level: Level,
    pub state: SwitchState,
}

impl Transition {
    #[must_use]
    pub const fn to_level(level: Level) -> Self {
        Self {
            level,
            state: SwitchState::from_level(level),
        }
    }

    /// Human-readable notification text.
    #[must_use]
    pub fn message(&self) -> String {
        format!("Switch state changed to: {}", self.state)
    }
}
