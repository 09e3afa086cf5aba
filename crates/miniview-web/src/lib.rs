#![forbid(unsafe_code)]

//! `miniview-web` runs the launch display-mode negotiation for MiniView.
//!
//! Design goals:
//! - **Host-driven I/O**: the embedding environment pushes host events.
//! - **Deterministic time**: the host advances a monotonic clock explicitly.
//! - **No blocking / no threads**: suitable for `wasm32-unknown-unknown`.
//!
//! This crate does not bind to `wasm-bindgen`. `miniview-wasm` wraps it with
//! the JS API and a real Telegram host adapter.

pub mod logging;
pub mod negotiator;
pub mod scripted_host;
pub mod session_record;
pub mod step_launch;
pub mod telemetry;

use core::time::Duration;
use std::collections::VecDeque;

use miniview_core::HostEvent;

pub use logging::TracingSink;
pub use negotiator::{
    DisplayMode, NegotiationError, NegotiationState, Negotiator, Phase, TargetMode,
};
pub use scripted_host::{HostCall, HostProfile, ScriptedHost};
pub use step_launch::{StepLaunch, StepResult};
pub use telemetry::{
    DecisionReason, FallbackTrigger, FanoutSink, NegotiationEvent, NullSink, TelemetrySink,
};

/// Deterministic monotonic clock controlled by the host.
#[derive(Debug, Default, Clone)]
pub struct DeterministicClock {
    now: Duration,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    /// Set current monotonic time.
    pub fn set(&mut self, now: Duration) {
        self.now = now;
    }

    /// Advance monotonic time by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }

    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }
}

/// Host events waiting to be delivered, stamped with their arrival time.
#[derive(Debug, Default, Clone)]
pub struct HostEventQueue {
    queue: VecDeque<(Duration, HostEvent)>,
}

impl HostEventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event that arrived at `at`.
    pub fn push(&mut self, at: Duration, event: HostEvent) {
        self.queue.push_back((at, event));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain all pending events in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = (Duration, HostEvent)> + '_ {
        self.queue.drain(..)
    }
}
