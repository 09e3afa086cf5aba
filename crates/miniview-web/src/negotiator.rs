#![forbid(unsafe_code)]

//! Launch display-mode negotiation.
//!
//! [`Negotiator`] decides, once per launch, whether to ask the host for
//! fullscreen or settle for the windowed expanded mode, and guarantees the
//! launch always ends in a definite mode.
//!
//! # State Machine
//!
//! ```text
//!            desktop, or no fullscreen support
//!   Idle ───────────────────────────────────────────────► Settled(expanded)
//!    │
//!    │ mobile/tablet/unknown on a capable host
//!    ▼
//!   Requested ── fullscreenChanged(true) ───────────────► Settled(fullscreen)
//!    │
//!    │ fullscreenFailed | request error | deadline
//!    ▼
//!   Fallback ── expand() ───────────────────────────────► Settled(expanded)
//! ```
//!
//! A capable host that already reports fullscreen at launch settles
//! `fullscreen` straight from `Idle` without a request.
//!
//! # Invariants
//!
//! 1. **Single exit from `Requested`**: every path out checks the phase
//!    first. Unsubscribing listeners is cleanup, not the guard.
//! 2. **Settlement is final**: once `Settled`, `settled_mode` never changes.
//! 3. **Fallback converges**: `Fallback` becomes `Settled(expanded)` in the
//!    same call that entered it, with exactly one `expand()`.
//! 4. **Desktop never requests fullscreen** during launch.
//! 5. **Silence is failure**: the deadline falls back, it never assumes
//!    success.
//! 6. **No automatic retry** after fallback within a launch.
//!
//! # Time
//!
//! The negotiator never reads a clock. Callers pass host monotonic time to
//! every entry point and fire [`Negotiator::tick`] at or after
//! [`Negotiator::deadline`].

use core::time::Duration;
use std::fmt;

use miniview_core::launch_override::{capabilities_with_overrides, classify_with_overrides};
use miniview_core::{
    CapabilitySet, Classification, HostAdapter, HostEvent, HostEventKind, NegotiatorConfig,
    Signals, SubscriptionId, probe,
};
use serde::{Deserialize, Serialize};

use crate::logging::TracingSink;
use crate::telemetry::{
    DecisionReason, FallbackTrigger, NegotiationEvent, TelemetrySink, millis,
};

/// Mode the negotiator is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    Fullscreen,
    Expanded,
}

impl TargetMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fullscreen => "fullscreen",
            Self::Expanded => "expanded",
        }
    }

    /// Parse `"fullscreen"` / `"expanded"`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "fullscreen" => Some(Self::Fullscreen),
            "expanded" => Some(Self::Expanded),
            _ => None,
        }
    }
}

/// Negotiation lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Requested,
    Settled,
    Fallback,
}

impl Phase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requested => "requested",
            Self::Settled => "settled",
            Self::Fallback => "fallback",
        }
    }
}

/// A display mode as observed by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Fullscreen,
    Expanded,
    Unknown,
}

impl DisplayMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fullscreen => "fullscreen",
            Self::Expanded => "expanded",
            Self::Unknown => "unknown",
        }
    }
}

impl From<TargetMode> for DisplayMode {
    fn from(mode: TargetMode) -> Self {
        match mode {
            TargetMode::Fullscreen => Self::Fullscreen,
            TargetMode::Expanded => Self::Expanded,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative negotiation record for one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationState {
    pub target_mode: TargetMode,
    pub phase: Phase,
    pub settled_mode: DisplayMode,
    pub started_at: Duration,
}

impl Default for NegotiationState {
    fn default() -> Self {
        Self {
            target_mode: TargetMode::Expanded,
            phase: Phase::Idle,
            settled_mode: DisplayMode::Unknown,
            started_at: Duration::ZERO,
        }
    }
}

/// Misuse of the negotiator API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationError {
    /// `launch` runs once per negotiator.
    AlreadyLaunched,
    /// Manual requests are only accepted after settlement.
    NotSettled,
    /// The launch was aborted.
    Aborted,
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyLaunched => write!(f, "negotiation already launched"),
            Self::NotSettled => write!(f, "display mode has not settled yet"),
            Self::Aborted => write!(f, "negotiation was aborted"),
        }
    }
}

impl std::error::Error for NegotiationError {}

type SettledCallback = Box<dyn FnOnce(DisplayMode)>;

/// Launch display-mode negotiator over an injected host.
pub struct Negotiator<H: HostAdapter> {
    host: H,
    config: NegotiatorConfig,
    state: NegotiationState,
    launched: bool,
    aborted: bool,
    classification: Option<Classification>,
    capabilities: Option<CapabilitySet>,
    subscriptions: Vec<SubscriptionId>,
    deadline: Option<Duration>,
    manual_pending: bool,
    current_mode: DisplayMode,
    settled_callbacks: Vec<SettledCallback>,
    sink: Box<dyn TelemetrySink>,
}

impl<H: HostAdapter> fmt::Debug for Negotiator<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("state", &self.state)
            .field("classification", &self.classification)
            .field("capabilities", &self.capabilities)
            .field("deadline", &self.deadline)
            .field("manual_pending", &self.manual_pending)
            .field("current_mode", &self.current_mode)
            .finish_non_exhaustive()
    }
}

impl<H: HostAdapter> Negotiator<H> {
    /// Create an idle negotiator that logs transitions through `tracing`.
    #[must_use]
    pub fn new(host: H, config: NegotiatorConfig) -> Self {
        Self {
            host,
            config,
            state: NegotiationState::default(),
            launched: false,
            aborted: false,
            classification: None,
            capabilities: None,
            subscriptions: Vec::new(),
            deadline: None,
            manual_pending: false,
            current_mode: DisplayMode::Unknown,
            settled_callbacks: Vec::new(),
            sink: Box::new(TracingSink),
        }
    }

    /// Replace the telemetry sink.
    #[must_use]
    pub fn with_sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    // --- Accessors ---

    #[must_use]
    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// The launch verdict; `Unknown` until settled.
    #[must_use]
    pub fn settled_mode(&self) -> DisplayMode {
        self.state.settled_mode
    }

    /// The mode last requested or confirmed, including manual overrides.
    #[must_use]
    pub fn current_mode(&self) -> DisplayMode {
        self.current_mode
    }

    #[must_use]
    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    #[must_use]
    pub fn capabilities(&self) -> Option<&CapabilitySet> {
        self.capabilities.as_ref()
    }

    /// When [`tick`](Self::tick) must next be called, if a timer is armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    #[must_use]
    pub fn config(&self) -> &NegotiatorConfig {
        &self.config
    }

    #[must_use]
    pub fn is_manual_pending(&self) -> bool {
        self.manual_pending
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Register a callback for settlement. Runs immediately when the launch
    /// has already settled; otherwise exactly once on settlement.
    pub fn on_settled(&mut self, callback: impl FnOnce(DisplayMode) + 'static) {
        if self.state.phase == Phase::Settled {
            callback(self.state.settled_mode);
        } else if !self.aborted {
            self.settled_callbacks.push(Box::new(callback));
        }
    }

    // --- Launch ---

    /// Classify, probe and issue the launch request.
    ///
    /// The host platform is read from the adapter when `signals` does not
    /// carry one.
    pub fn launch(&mut self, mut signals: Signals, now: Duration) -> Result<Phase, NegotiationError> {
        if self.launched {
            return Err(NegotiationError::AlreadyLaunched);
        }
        self.launched = true;
        self.state.started_at = now;
        self.host.ready();

        if signals.host_platform.is_none() {
            signals.host_platform = self.host.platform();
        }
        let classification = classify_with_overrides(&signals, self.config.mobile_breakpoint_px);
        let capabilities = capabilities_with_overrides(probe(Some(&self.host), &self.config));
        self.emit(NegotiationEvent::Launched {
            at_ms: millis(now),
            classification,
            capabilities: capabilities.clone(),
        });

        let supports_fullscreen = capabilities.supports_fullscreen;
        self.classification = Some(classification);
        self.capabilities = Some(capabilities);

        if classification.device.is_desktop() {
            self.decide(TargetMode::Expanded, DecisionReason::Desktop, now);
            self.expand_and_settle(now);
        } else if supports_fullscreen && self.host.is_fullscreen() {
            self.decide(TargetMode::Fullscreen, DecisionReason::AlreadyFullscreen, now);
            self.current_mode = DisplayMode::Fullscreen;
            self.settle(DisplayMode::Fullscreen, now);
        } else if supports_fullscreen {
            self.decide(TargetMode::Fullscreen, DecisionReason::FullscreenCapable, now);
            self.request_launch_fullscreen(now);
        } else {
            self.decide(TargetMode::Expanded, DecisionReason::FullscreenUnsupported, now);
            self.expand_and_settle(now);
        }
        Ok(self.state.phase)
    }

    fn decide(&mut self, target: TargetMode, reason: DecisionReason, now: Duration) {
        self.state.target_mode = target;
        self.emit(NegotiationEvent::Decided {
            at_ms: millis(now),
            target,
            reason,
        });
    }

    fn expand_and_settle(&mut self, now: Duration) {
        self.host.expand();
        self.current_mode = DisplayMode::Expanded;
        self.settle(DisplayMode::Expanded, now);
    }

    fn request_launch_fullscreen(&mut self, now: Duration) {
        self.state.phase = Phase::Requested;
        self.arm_listeners();
        self.deadline = Some(now.saturating_add(self.config.fullscreen_timeout));
        self.emit(NegotiationEvent::FullscreenRequested {
            at_ms: millis(now),
            manual: false,
        });
        if let Err(err) = self.host.request_fullscreen() {
            self.fall_back(
                FallbackTrigger::SyncRejected {
                    error: err.to_string(),
                },
                now,
            );
        }
    }

    // --- Signals ---

    /// Deliver a host event.
    pub fn handle_event(&mut self, event: HostEvent, now: Duration) {
        let kind = event.kind();
        if self.aborted {
            self.ignore(kind, now);
            return;
        }
        match (self.state.phase, event) {
            (Phase::Requested, HostEvent::FullscreenChanged { is_fullscreen: true }) => {
                self.release();
                self.current_mode = DisplayMode::Fullscreen;
                self.settle(DisplayMode::Fullscreen, now);
            }
            (Phase::Requested, HostEvent::FullscreenFailed { error }) => {
                self.fall_back(FallbackTrigger::HostFailed { error }, now);
            }
            (Phase::Settled, event) if self.manual_pending => self.handle_manual_event(event, now),
            _ => self.ignore(kind, now),
        }
    }

    /// Fire the safety timer. Harmless when nothing is pending.
    pub fn tick(&mut self, now: Duration) {
        if self.aborted || self.state.phase != Phase::Requested {
            return;
        }
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.fall_back(FallbackTrigger::Timeout, now);
        }
    }

    /// Release listeners and timers without settling (page unload).
    pub fn abort(&mut self, now: Duration) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.release();
        self.manual_pending = false;
        self.settled_callbacks.clear();
        self.emit(NegotiationEvent::Aborted {
            at_ms: millis(now),
            phase: self.state.phase,
        });
    }

    fn fall_back(&mut self, trigger: FallbackTrigger, now: Duration) {
        if self.state.phase != Phase::Requested {
            return;
        }
        self.state.phase = Phase::Fallback;
        self.emit(NegotiationEvent::Fallback {
            at_ms: millis(now),
            trigger,
        });
        self.release();
        self.expand_and_settle(now);
    }

    fn settle(&mut self, mode: DisplayMode, now: Duration) {
        debug_assert_ne!(self.state.phase, Phase::Settled, "settled twice");
        self.state.phase = Phase::Settled;
        self.state.settled_mode = mode;
        self.emit(NegotiationEvent::Settled {
            at_ms: millis(now),
            mode,
            elapsed_ms: millis(now.saturating_sub(self.state.started_at)),
        });
        for callback in std::mem::take(&mut self.settled_callbacks) {
            callback(mode);
        }
    }

    fn ignore(&mut self, kind: HostEventKind, now: Duration) {
        self.emit(NegotiationEvent::SignalIgnored {
            at_ms: millis(now),
            kind,
            phase: self.state.phase,
        });
    }

    // --- Manual override ---

    /// Ask for `mode` after the launch settled.
    ///
    /// Skips the desktop rule but keeps the fallback path: a fullscreen
    /// request that errors or is refused ends in `expand()`. There is no
    /// timeout for manual requests.
    pub fn request_mode(&mut self, mode: TargetMode, now: Duration) -> Result<(), NegotiationError> {
        if self.aborted {
            return Err(NegotiationError::Aborted);
        }
        if self.state.phase != Phase::Settled {
            return Err(NegotiationError::NotSettled);
        }
        self.emit(NegotiationEvent::ManualRequested {
            at_ms: millis(now),
            mode,
        });
        if self.manual_pending {
            self.release();
            self.manual_pending = false;
        }

        match mode {
            TargetMode::Expanded => {
                self.host.expand();
                self.resolve_manual(TargetMode::Expanded, false, now);
            }
            TargetMode::Fullscreen => {
                let supported = self
                    .capabilities
                    .as_ref()
                    .is_some_and(|caps| caps.supports_fullscreen);
                if !supported {
                    self.host.expand();
                    self.resolve_manual(TargetMode::Expanded, true, now);
                    return Ok(());
                }
                self.manual_pending = true;
                self.arm_listeners();
                self.emit(NegotiationEvent::FullscreenRequested {
                    at_ms: millis(now),
                    manual: true,
                });
                if self.host.request_fullscreen().is_err() {
                    self.release();
                    self.host.expand();
                    self.resolve_manual(TargetMode::Expanded, true, now);
                }
            }
        }
        Ok(())
    }

    fn handle_manual_event(&mut self, event: HostEvent, now: Duration) {
        match event {
            HostEvent::FullscreenChanged { is_fullscreen: true } => {
                self.release();
                self.resolve_manual(TargetMode::Fullscreen, false, now);
            }
            HostEvent::FullscreenFailed { .. } => {
                self.release();
                self.host.expand();
                self.resolve_manual(TargetMode::Expanded, true, now);
            }
            other => self.ignore(other.kind(), now),
        }
    }

    fn resolve_manual(&mut self, mode: TargetMode, fell_back: bool, now: Duration) {
        self.manual_pending = false;
        self.current_mode = mode.into();
        self.emit(NegotiationEvent::ManualResolved {
            at_ms: millis(now),
            mode,
            fell_back,
        });
    }

    // --- Listener bookkeeping ---

    fn arm_listeners(&mut self) {
        for &kind in HostEventKind::ALL {
            let id = self.host.subscribe(kind);
            self.subscriptions.push(id);
        }
    }

    fn release(&mut self) {
        for id in std::mem::take(&mut self.subscriptions) {
            self.host.unsubscribe(id);
        }
        self.deadline = None;
    }

    fn emit(&mut self, event: NegotiationEvent) {
        self.sink.record(&event);
    }
}
