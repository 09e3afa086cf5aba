#![forbid(unsafe_code)]

//! Step-based launch runner.
//!
//! [`StepLaunch`] drives a [`Negotiator`] without threads, timers or
//! blocking. The host controls the loop:
//!
//! 1. Call [`StepLaunch::launch`] once.
//! 2. Push host events via [`StepLaunch::push_event`].
//! 3. Advance time via [`StepLaunch::advance_time`].
//! 4. Call [`StepLaunch::step`] to deliver queued events and fire the timer.
//!
//! Within a step, the timer is checked at each event's arrival time before
//! the event is delivered. A success signal that arrives on the same
//! millisecond as the deadline therefore loses to the timeout.
//!
//! # Example
//!
//! ```
//! use core::time::Duration;
//! use miniview_core::{HostEvent, NegotiatorConfig, Signals};
//! use miniview_web::negotiator::{DisplayMode, Phase};
//! use miniview_web::scripted_host::{HostProfile, ScriptedHost};
//! use miniview_web::step_launch::StepLaunch;
//! use miniview_web::telemetry::NullSink;
//!
//! let host = ScriptedHost::new(HostProfile::telegram("android", "9.0"));
//! let mut launch = StepLaunch::new(host, NegotiatorConfig::default()).with_sink(NullSink);
//! launch.launch(Signals::new(390, "Android Mobile")).unwrap();
//!
//! launch.advance_time(Duration::from_millis(120));
//! launch.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
//! let result = launch.step();
//!
//! assert!(result.settled_now);
//! assert_eq!(result.phase, Phase::Settled);
//! assert_eq!(launch.negotiator().settled_mode(), DisplayMode::Fullscreen);
//! ```

use core::time::Duration;

use miniview_core::{HostAdapter, HostEvent, NegotiatorConfig, Signals};

use crate::negotiator::{DisplayMode, NegotiationError, Negotiator, Phase, TargetMode};
use crate::telemetry::TelemetrySink;
use crate::{DeterministicClock, HostEventQueue};

/// Result of a single [`StepLaunch::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    /// Phase after the step.
    pub phase: Phase,
    /// Number of host events delivered during this step.
    pub events_processed: u32,
    /// Whether this step moved the negotiation into `Settled`.
    pub settled_now: bool,
}

/// Host-driven negotiation runner.
pub struct StepLaunch<H: HostAdapter> {
    negotiator: Negotiator<H>,
    clock: DeterministicClock,
    events: HostEventQueue,
}

impl<H: HostAdapter> StepLaunch<H> {
    #[must_use]
    pub fn new(host: H, config: NegotiatorConfig) -> Self {
        Self::with_negotiator(Negotiator::new(host, config))
    }

    /// Wrap an already configured negotiator.
    #[must_use]
    pub fn with_negotiator(negotiator: Negotiator<H>) -> Self {
        Self {
            negotiator,
            clock: DeterministicClock::new(),
            events: HostEventQueue::new(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.negotiator = self.negotiator.with_sink(sink);
        self
    }

    /// Start the negotiation at the current clock time.
    pub fn launch(&mut self, signals: Signals) -> Result<Phase, NegotiationError> {
        self.negotiator.launch(signals, self.clock.now())
    }

    /// Queue a host event stamped with the current clock time.
    pub fn push_event(&mut self, event: HostEvent) {
        self.events.push(self.clock.now(), event);
    }

    /// Advance the clock by `dt`.
    pub fn advance_time(&mut self, dt: Duration) {
        self.clock.advance(dt);
    }

    /// Set the clock to an absolute time.
    pub fn set_time(&mut self, now: Duration) {
        self.clock.set(now);
    }

    /// Deliver queued events and fire the safety timer if due.
    pub fn step(&mut self) -> StepResult {
        let before = self.negotiator.phase();
        let mut events_processed: u32 = 0;

        for (at, event) in self.events.drain() {
            self.negotiator.tick(at);
            self.negotiator.handle_event(event, at);
            events_processed = events_processed.saturating_add(1);
        }
        self.negotiator.tick(self.clock.now());

        let phase = self.negotiator.phase();
        StepResult {
            phase,
            events_processed,
            settled_now: before != Phase::Settled && phase == Phase::Settled,
        }
    }

    /// When the host must call [`step`](Self::step) next, if a timer is armed.
    #[must_use]
    pub fn next_wakeup(&self) -> Option<Duration> {
        self.negotiator.deadline()
    }

    /// Manual mode request at the current clock time.
    pub fn request_mode(&mut self, mode: TargetMode) -> Result<(), NegotiationError> {
        self.negotiator.request_mode(mode, self.clock.now())
    }

    pub fn on_settled(&mut self, callback: impl FnOnce(DisplayMode) + 'static) {
        self.negotiator.on_settled(callback);
    }

    /// Abort at the current clock time. Queued events are dropped.
    pub fn abort(&mut self) {
        self.events.drain().for_each(drop);
        self.negotiator.abort(self.clock.now());
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn negotiator(&self) -> &Negotiator<H> {
        &self.negotiator
    }
}
