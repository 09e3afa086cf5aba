#![forbid(unsafe_code)]

//! Structured negotiation telemetry.
//!
//! The negotiator reports every transition as a [`NegotiationEvent`] to a
//! [`TelemetrySink`]. Sinks decide what to do with them: [`TracingSink`]
//! forwards to `tracing`, session recording keeps them for replay, tests
//! collect them in a `Vec`.
//!
//! Timestamps are host monotonic milliseconds since the clock origin.
//!
//! [`TracingSink`]: crate::logging::TracingSink

use miniview_core::{CapabilitySet, Classification, HostEventKind};
use serde::{Deserialize, Serialize};

use crate::negotiator::{DisplayMode, Phase, TargetMode};

/// Why the launch decision picked its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Desktop clients are never offered fullscreen.
    Desktop,
    /// The host cannot do fullscreen.
    FullscreenUnsupported,
    /// Non-desktop client on a capable host.
    FullscreenCapable,
    /// The host was already fullscreen at launch; nothing to request.
    AlreadyFullscreen,
}

/// What sent a fullscreen request into fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum FallbackTrigger {
    /// The host emitted `fullscreenFailed`.
    HostFailed { error: Option<String> },
    /// The request call itself returned an error.
    SyncRejected { error: String },
    /// The safety timeout elapsed.
    Timeout,
}

/// One negotiation transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NegotiationEvent {
    Launched {
        at_ms: u64,
        classification: Classification,
        capabilities: CapabilitySet,
    },
    Decided {
        at_ms: u64,
        target: TargetMode,
        reason: DecisionReason,
    },
    FullscreenRequested {
        at_ms: u64,
        manual: bool,
    },
    Fallback {
        at_ms: u64,
        #[serde(flatten)]
        trigger: FallbackTrigger,
    },
    Settled {
        at_ms: u64,
        mode: DisplayMode,
        elapsed_ms: u64,
    },
    SignalIgnored {
        at_ms: u64,
        kind: HostEventKind,
        phase: Phase,
    },
    ManualRequested {
        at_ms: u64,
        mode: TargetMode,
    },
    ManualResolved {
        at_ms: u64,
        mode: TargetMode,
        fell_back: bool,
    },
    Aborted {
        at_ms: u64,
        phase: Phase,
    },
}

impl NegotiationEvent {
    /// Host time of the transition.
    #[must_use]
    pub const fn at_ms(&self) -> u64 {
        match self {
            Self::Launched { at_ms, .. }
            | Self::Decided { at_ms, .. }
            | Self::FullscreenRequested { at_ms, .. }
            | Self::Fallback { at_ms, .. }
            | Self::Settled { at_ms, .. }
            | Self::SignalIgnored { at_ms, .. }
            | Self::ManualRequested { at_ms, .. }
            | Self::ManualResolved { at_ms, .. }
            | Self::Aborted { at_ms, .. } => *at_ms,
        }
    }

    /// Short stable name, matching the serialized tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Launched { .. } => "launched",
            Self::Decided { .. } => "decided",
            Self::FullscreenRequested { .. } => "fullscreen_requested",
            Self::Fallback { .. } => "fallback",
            Self::Settled { .. } => "settled",
            Self::SignalIgnored { .. } => "signal_ignored",
            Self::ManualRequested { .. } => "manual_requested",
            Self::ManualResolved { .. } => "manual_resolved",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Receiver of negotiation telemetry.
pub trait TelemetrySink {
    fn record(&mut self, event: &NegotiationEvent);
}

impl<F> TelemetrySink for F
where
    F: FnMut(&NegotiationEvent),
{
    fn record(&mut self, event: &NegotiationEvent) {
        self(event);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&mut self, _event: &NegotiationEvent) {}
}

/// Fans one event out to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn TelemetrySink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&mut self, event: &NegotiationEvent) {
        for sink in &mut self.sinks {
            sink.record(event);
        }
    }
}

pub(crate) fn millis(d: core::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn closures_are_sinks() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let captured = Rc::clone(&seen);
        let mut sink = move |e: &NegotiationEvent| captured.borrow_mut().push(e.name());
        sink.record(&NegotiationEvent::Aborted {
            at_ms: 3,
            phase: Phase::Requested,
        });
        assert_eq!(*seen.borrow(), vec!["aborted"]);
    }

    #[test]
    fn fanout_preserves_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&seen);
        let b = Rc::clone(&seen);
        let mut sink = FanoutSink::new()
            .with(move |_: &NegotiationEvent| a.borrow_mut().push("a"))
            .with(NullSink)
            .with(move |_: &NegotiationEvent| b.borrow_mut().push("b"));
        sink.record(&NegotiationEvent::FullscreenRequested {
            at_ms: 0,
            manual: false,
        });
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn fallback_serializes_flat() {
        let event = NegotiationEvent::Fallback {
            at_ms: 1000,
            trigger: FallbackTrigger::Timeout,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"fallback","at_ms":1000,"trigger":"timeout"}"#);
        let back: NegotiationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn name_matches_tag() {
        let event = NegotiationEvent::Settled {
            at_ms: 200,
            mode: DisplayMode::Fullscreen,
            elapsed_ms: 200,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(value["mode"], "fullscreen");
        assert_eq!(event.at_ms(), 200);
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(core::time::Duration::from_millis(1500)), 1500);
        assert_eq!(millis(core::time::Duration::MAX), u64::MAX);
    }
}
