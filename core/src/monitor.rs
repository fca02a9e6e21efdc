//! Polling edge detector.
//!
//! The first successful read establishes a baseline and publishes it to the
//! registry without notifying anyone. Every later level change becomes a
//! [`Transition`]: the registry is updated, the message is logged, and the
//! same text goes to the dispatch queue.

use std::sync::Arc;
use std::time::Duration;

use switchwatch_types::{Level, SwitchState, Transition};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatch::DispatchQueue;
use crate::gpio::InputPin;
use crate::registry::StateRegistry;

/// Target of every event this module emits.
pub const LOG_TARGET: &str = module_path!();

/// Outcome of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Baseline(SwitchState),
    Unchanged,
    Changed(Transition),
    ReadFailed,
}

pub struct EdgeMonitor<P> {
    pin: P,
    registry: Arc<StateRegistry>,
    last_level: Option<Level>,
    read_failing: bool,
}

impl<P: InputPin> EdgeMonitor<P> {
    pub fn new(pin: P, registry: Arc<StateRegistry>) -> Self {
        Self {
            pin,
            registry,
            last_level: None,
            read_failing: false,
        }
    }

    #[must_use]
    pub fn last_level(&self) -> Option<Level> {
        self.last_level
    }

    /// Read the pin once and apply the result to the registry.
    pub fn poll_once(&mut self) -> Observation {
        let current = match self.pin.read() {
            Ok(level) => level,
            Err(e) => {
                if !self.read_failing {
                    tracing::warn!(pin = %self.pin.name(), error = %e, "Failed to read switch input");
                    self.read_failing = true;
                }
                return Observation::ReadFailed;
            }
        };

        if self.read_failing {
            tracing::info!(pin = %self.pin.name(), "Switch input readable again");
            self.read_failing = false;
        }

        match self.last_level {
            None => {
                self.last_level = Some(current);
                let state = SwitchState::from_level(current);
                self.registry.set(state);
                tracing::info!(pin = %self.pin.name(), level = %current, "Initial switch state: {state}");
                Observation::Baseline(state)
            }
            Some(previous) if previous == current => Observation::Unchanged,
            Some(_) => {
                self.last_level = Some(current);
                let transition = Transition::to_level(current);
                self.registry.set(transition.state);
                Observation::Changed(transition)
            }
        }
    }

    /// Poll every `poll_interval` until `cancel` fires.
    pub async fn run(
        mut self,
        poll_interval: Duration,
        queue: DispatchQueue,
        cancel: CancellationToken,
    ) {
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            pin = %self.pin.name(),
            interval_ms = poll_interval.as_millis(),
            "Edge monitor started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Observation::Changed(transition) = self.poll_once() {
                let message = transition.message();
                tracing::info!("{message}");
                queue.submit(message);
            }
        }

        tracing::info!("Edge monitor stopped");
    }
}
