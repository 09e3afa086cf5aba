#![forbid(unsafe_code)]

//! Deterministic launch recording and replay.
//!
//! [`LaunchRecorder`] wraps a [`StepLaunch`] and records every input (launch
//! signals, host events, time steps, manual requests) together with the
//! negotiation transitions they caused. Any [`HostAdapter`] can be recorded:
//! the answers the host gives to queries the negotiator branches on are
//! stored as [`HostReply`] records. [`replay`] feeds the inputs through a
//! fresh negotiator over a [`ScriptedHost`], answers those queries from the
//! recorded replies, and checks that the same transitions come out.
//!
//! # Format
//!
//! Traces use the `launch-trace-v1` JSONL schema, one record per line:
//!
//! - **Header**: schema, host profile, negotiator options.
//! - **Launch**: classification signals at launch time.
//! - **Event**: a host event and its arrival time.
//! - **Advance**: explicit time advancement.
//! - **Step**: a step boundary and the phase it ended in.
//! - **ManualRequest**: a post-settlement mode request.
//! - **HostReply**: a version query, fullscreen flag or request outcome.
//! - **Transition**: a telemetry event emitted by the negotiator.
//! - **Summary**: final modes and transition count.
//!
//! # Determinism contract
//!
//! Timestamps are whole milliseconds; the recorder snaps its clock to the
//! millisecond so replay sees exactly what the recording saw. Given the same
//! trace and the same build, replay produces identical transitions.

use core::time::Duration;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use miniview_core::{
    ConfigError, HostAdapter, HostError, HostEvent, HostEventKind, NegotiatorConfig,
    NegotiatorOptions, Signals, SubscriptionId,
};
use serde::{Deserialize, Serialize};

use crate::logging::TracingSink;
use crate::negotiator::{DisplayMode, NegotiationError, Phase, TargetMode};
use crate::scripted_host::{HostProfile, ScriptedHost};
use crate::step_launch::{StepLaunch, StepResult};
use crate::telemetry::{FanoutSink, NegotiationEvent, millis};

/// Schema version for launch traces.
pub const SCHEMA_VERSION: &str = "launch-trace-v1";

/// A single record in a launch trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum TraceRecord {
    /// Trace header (must be first).
    Header {
        schema: String,
        host: HostProfile,
        options: NegotiatorOptions,
    },
    Launch {
        at_ms: u64,
        signals: Signals,
    },
    Event {
        at_ms: u64,
        event: HostEvent,
    },
    Advance {
        at_ms: u64,
    },
    Step {
        at_ms: u64,
        phase: Phase,
        events_processed: u32,
    },
    ManualRequest {
        at_ms: u64,
        mode: TargetMode,
    },
    HostReply {
        reply: HostReply,
    },
    Transition {
        event: NegotiationEvent,
    },
    /// Trace summary (must be last).
    Summary {
        settled_mode: DisplayMode,
        current_mode: DisplayMode,
        transitions: u64,
    },
}

impl TraceRecord {
    /// Input timestamp, for records that carry one.
    #[must_use]
    pub const fn at_ms(&self) -> Option<u64> {
        match self {
            Self::Launch { at_ms, .. }
            | Self::Event { at_ms, .. }
            | Self::Advance { at_ms }
            | Self::Step { at_ms, .. }
            | Self::ManualRequest { at_ms, .. } => Some(*at_ms),
            Self::Header { .. }
            | Self::HostReply { .. }
            | Self::Transition { .. }
            | Self::Summary { .. } => None,
        }
    }
}

/// A host answer the negotiator branched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum HostReply {
    VersionAtLeast { version: String, answer: Option<bool> },
    IsFullscreen { answer: bool },
    RequestFullscreen { outcome: RequestOutcome },
}

/// What a `request_fullscreen` call returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Accepted,
    Rejected(String),
    Unsupported,
    Absent,
}

impl RequestOutcome {
    fn of(result: &Result<(), HostError>) -> Self {
        match result {
            Ok(()) => Self::Accepted,
            Err(HostError::Rejected(message)) => Self::Rejected(message.clone()),
            Err(HostError::Unsupported(_)) => Self::Unsupported,
            Err(HostError::Absent) => Self::Absent,
        }
    }

    fn into_result(self) -> Result<(), HostError> {
        match self {
            Self::Accepted => Ok(()),
            Self::Rejected(message) => Err(HostError::Rejected(message)),
            Self::Unsupported => Err(HostError::Unsupported("requestFullscreen")),
            Self::Absent => Err(HostError::Absent),
        }
    }
}

/// A complete recorded launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchTrace {
    pub records: Vec<TraceRecord>,
}

impl LaunchTrace {
    /// Transition records in order.
    pub fn transitions(&self) -> impl Iterator<Item = &NegotiationEvent> {
        self.records.iter().filter_map(|r| match r {
            TraceRecord::Transition { event } => Some(event),
            _ => None,
        })
    }

    /// Final modes from the summary record.
    #[must_use]
    pub fn final_modes(&self) -> Option<(DisplayMode, DisplayMode)> {
        self.records.iter().rev().find_map(|r| match r {
            TraceRecord::Summary {
                settled_mode,
                current_mode,
                ..
            } => Some((*settled_mode, *current_mode)),
            _ => None,
        })
    }

    /// Validate structural invariants.
    ///
    /// This checks:
    /// - a single header with the expected schema is the first record
    /// - a single summary is the last record
    /// - exactly one launch, before any event, step, manual request or host
    ///   reply
    /// - input timestamps never go backwards
    /// - the summary transition count matches the transition records
    pub fn validate(&self) -> Result<(), TraceValidationError> {
        if self.records.is_empty() {
            return Err(TraceValidationError::EmptyTrace);
        }

        let mut header_count: usize = 0;
        let mut summary: Option<(usize, u64)> = None;
        let mut launched = false;
        let mut transitions: u64 = 0;
        let mut last_at: u64 = 0;

        for (idx, record) in self.records.iter().enumerate() {
            if let Some((summary_index, _)) = summary {
                return Err(TraceValidationError::SummaryNotLast { summary_index });
            }
            if let Some(at) = record.at_ms() {
                if at < last_at {
                    return Err(TraceValidationError::TimeWentBackwards {
                        index: idx,
                        previous_ms: last_at,
                        at_ms: at,
                    });
                }
                last_at = at;
            }
            match record {
                TraceRecord::Header { schema, .. } => {
                    if idx != 0 {
                        return Err(TraceValidationError::HeaderNotFirst);
                    }
                    if schema != SCHEMA_VERSION {
                        return Err(TraceValidationError::UnsupportedSchema(schema.clone()));
                    }
                    header_count += 1;
                }
                TraceRecord::Launch { .. } => {
                    if launched {
                        return Err(TraceValidationError::MultipleLaunches);
                    }
                    launched = true;
                }
                TraceRecord::Event { .. }
                | TraceRecord::Step { .. }
                | TraceRecord::ManualRequest { .. }
                | TraceRecord::HostReply { .. } => {
                    if !launched {
                        return Err(TraceValidationError::InputBeforeLaunch { index: idx });
                    }
                }
                TraceRecord::Advance { .. } => {}
                TraceRecord::Transition { .. } => {
                    transitions = transitions.saturating_add(1);
                }
                TraceRecord::Summary {
                    transitions: total, ..
                } => {
                    summary = Some((idx, *total));
                }
            }
        }

        if header_count == 0 {
            return Err(TraceValidationError::MissingHeader);
        }
        if !launched {
            return Err(TraceValidationError::MissingLaunch);
        }
        let Some((_, summary_transitions)) = summary else {
            return Err(TraceValidationError::MissingSummary);
        };
        if summary_transitions != transitions {
            return Err(TraceValidationError::SummaryTransitionCountMismatch {
                expected: transitions,
                actual: summary_transitions,
            });
        }
        Ok(())
    }

    /// Serialize as `launch-trace-v1` JSONL.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse a `launch-trace-v1` JSONL string. Blank lines are skipped.
    pub fn from_jsonl(input: &str) -> Result<Self, TraceParseError> {
        let mut records = Vec::new();
        for (line_num, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = serde_json::from_str(line).map_err(|err| TraceParseError {
                line: line_num + 1,
                message: err.to_string(),
            })?;
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Parse and validate.
    pub fn from_jsonl_validated(input: &str) -> Result<Self, TraceLoadError> {
        let trace = Self::from_jsonl(input)?;
        trace.validate()?;
        Ok(trace)
    }
}

/// Error parsing a JSONL trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for TraceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for TraceParseError {}

/// Typed validation failures for [`LaunchTrace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceValidationError {
    EmptyTrace,
    MissingHeader,
    HeaderNotFirst,
    UnsupportedSchema(String),
    MissingLaunch,
    MultipleLaunches,
    InputBeforeLaunch { index: usize },
    TimeWentBackwards { index: usize, previous_ms: u64, at_ms: u64 },
    MissingSummary,
    SummaryNotLast { summary_index: usize },
    SummaryTransitionCountMismatch { expected: u64, actual: u64 },
}

impl fmt::Display for TraceValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTrace => write!(f, "trace is empty"),
            Self::MissingHeader => write!(f, "trace is missing header"),
            Self::HeaderNotFirst => write!(f, "trace header is not the first record"),
            Self::UnsupportedSchema(schema) => write!(f, "unsupported trace schema {schema:?}"),
            Self::MissingLaunch => write!(f, "trace has no launch record"),
            Self::MultipleLaunches => write!(f, "trace contains multiple launch records"),
            Self::InputBeforeLaunch { index } => {
                write!(f, "record {index} precedes the launch record")
            }
            Self::TimeWentBackwards {
                index,
                previous_ms,
                at_ms,
            } => write!(
                f,
                "record {index} at {at_ms}ms is earlier than previous {previous_ms}ms"
            ),
            Self::MissingSummary => write!(f, "trace is missing summary"),
            Self::SummaryNotLast { summary_index } => write!(
                f,
                "trace summary at index {summary_index} is not the final record"
            ),
            Self::SummaryTransitionCountMismatch { expected, actual } => write!(
                f,
                "summary transition-count mismatch: expected {expected}, got {actual}"
            ),
        }
    }
}

impl std::error::Error for TraceValidationError {}

/// Combined load error for parse + validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLoadError {
    Parse(TraceParseError),
    Validation(TraceValidationError),
}

impl fmt::Display for TraceLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Validation(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TraceLoadError {}

impl From<TraceParseError> for TraceLoadError {
    fn from(value: TraceParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<TraceValidationError> for TraceLoadError {
    fn from(value: TraceValidationError) -> Self {
        Self::Validation(value)
    }
}

type Captured = Rc<RefCell<Vec<NegotiationEvent>>>;
type Replies = Rc<RefCell<Vec<HostReply>>>;

/// Forwards to the wrapped host and logs the answers replay depends on.
struct RecordingHost<H> {
    inner: H,
    replies: Replies,
}

impl<H: HostAdapter> HostAdapter for RecordingHost<H> {
    fn ready(&mut self) {
        self.inner.ready();
    }

    fn expand(&mut self) {
        self.inner.expand();
    }

    fn request_fullscreen(&mut self) -> Result<(), HostError> {
        let result = self.inner.request_fullscreen();
        self.replies.borrow_mut().push(HostReply::RequestFullscreen {
            outcome: RequestOutcome::of(&result),
        });
        result
    }

    fn has_request_fullscreen(&self) -> bool {
        self.inner.has_request_fullscreen()
    }

    fn is_version_at_least(&self, version: &str) -> Option<bool> {
        let answer = self.inner.is_version_at_least(version);
        self.replies.borrow_mut().push(HostReply::VersionAtLeast {
            version: version.to_owned(),
            answer,
        });
        answer
    }

    fn subscribe(&mut self, kind: HostEventKind) -> SubscriptionId {
        self.inner.subscribe(kind)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.inner.unsubscribe(id);
    }

    fn platform(&self) -> Option<String> {
        self.inner.platform()
    }

    fn version(&self) -> Option<String> {
        self.inner.version()
    }

    fn is_fullscreen(&self) -> bool {
        let answer = self.inner.is_fullscreen();
        self.replies
            .borrow_mut()
            .push(HostReply::IsFullscreen { answer });
        answer
    }
}

/// Scripted host that answers from recorded replies while they last.
///
/// Replay issues queries in the recorded order, so the next reply always
/// belongs to the current query. A reply of the wrong kind is left in place
/// and the profile answers instead; the resulting divergence shows up as a
/// transition mismatch.
struct ReplayHost {
    inner: ScriptedHost,
    replies: RefCell<VecDeque<HostReply>>,
}

impl ReplayHost {
    fn next<T>(&self, pick: impl FnOnce(&HostReply) -> Option<T>) -> Option<T> {
        let mut replies = self.replies.borrow_mut();
        let answer = replies.front().and_then(pick)?;
        replies.pop_front();
        Some(answer)
    }
}

impl HostAdapter for ReplayHost {
    fn ready(&mut self) {
        self.inner.ready();
    }

    fn expand(&mut self) {
        self.inner.expand();
    }

    fn request_fullscreen(&mut self) -> Result<(), HostError> {
        let scripted = self.inner.request_fullscreen();
        match self.next(|r| match r {
            HostReply::RequestFullscreen { outcome } => Some(outcome.clone()),
            _ => None,
        }) {
            Some(outcome) => outcome.into_result(),
            None => scripted,
        }
    }

    fn has_request_fullscreen(&self) -> bool {
        self.inner.has_request_fullscreen()
    }

    fn is_version_at_least(&self, version: &str) -> Option<bool> {
        self.next(|r| match r {
            HostReply::VersionAtLeast { answer, .. } => Some(*answer),
            _ => None,
        })
        .unwrap_or_else(|| self.inner.is_version_at_least(version))
    }

    fn subscribe(&mut self, kind: HostEventKind) -> SubscriptionId {
        self.inner.subscribe(kind)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.inner.unsubscribe(id);
    }

    fn platform(&self) -> Option<String> {
        self.inner.platform()
    }

    fn version(&self) -> Option<String> {
        self.inner.version()
    }

    fn is_fullscreen(&self) -> bool {
        self.next(|r| match r {
            HostReply::IsFullscreen { answer } => Some(*answer),
            _ => None,
        })
        .unwrap_or_else(|| self.inner.is_fullscreen())
    }
}

fn capturing_launch<H: HostAdapter>(host: H, config: NegotiatorConfig) -> (StepLaunch<H>, Captured) {
    let captured: Captured = Rc::new(RefCell::new(Vec::new()));
    let sink_log = Rc::clone(&captured);
    let sink = FanoutSink::new()
        .with(TracingSink)
        .with(move |event: &NegotiationEvent| sink_log.borrow_mut().push(event.clone()));
    (StepLaunch::new(host, config).with_sink(sink), captured)
}

/// Records a launch for deterministic replay.
pub struct LaunchRecorder<H: HostAdapter> {
    launch: StepLaunch<RecordingHost<H>>,
    captured: Captured,
    replies: Replies,
    records: Vec<TraceRecord>,
    transitions: u64,
}

impl LaunchRecorder<ScriptedHost> {
    /// Record against a scripted host built from `profile`.
    pub fn scripted(profile: HostProfile, options: NegotiatorOptions) -> Result<Self, ConfigError> {
        let host = ScriptedHost::new(profile.clone());
        Self::with_profile(host, profile, options)
    }
}

impl<H: HostAdapter> LaunchRecorder<H> {
    /// Record against any host. The header stores a capture of the host's
    /// static surface; its query answers are recorded as they happen.
    pub fn new(host: H, options: NegotiatorOptions) -> Result<Self, ConfigError> {
        let profile = HostProfile::capture(&host);
        Self::with_profile(host, profile, options)
    }

    fn with_profile(host: H, profile: HostProfile, options: NegotiatorOptions) -> Result<Self, ConfigError> {
        let config = NegotiatorConfig::default().apply_options(&options)?;
        let replies: Replies = Rc::new(RefCell::new(Vec::new()));
        let host = RecordingHost {
            inner: host,
            replies: Rc::clone(&replies),
        };
        let (launch, captured) = capturing_launch(host, config);
        Ok(Self {
            launch,
            captured,
            replies,
            records: vec![TraceRecord::Header {
                schema: SCHEMA_VERSION.to_owned(),
                host: profile,
                options,
            }],
            transitions: 0,
        })
    }

    fn now_ms(&self) -> u64 {
        millis(self.launch.now())
    }

    fn flush(&mut self) {
        for reply in self.replies.borrow_mut().drain(..) {
            self.records.push(TraceRecord::HostReply { reply });
        }
        for event in self.captured.borrow_mut().drain(..) {
            self.transitions = self.transitions.saturating_add(1);
            self.records.push(TraceRecord::Transition { event });
        }
    }

    pub fn launch(&mut self, signals: Signals) -> Result<Phase, NegotiationError> {
        self.records.push(TraceRecord::Launch {
            at_ms: self.now_ms(),
            signals: signals.clone(),
        });
        let result = self.launch.launch(signals);
        self.flush();
        result
    }

    pub fn push_event(&mut self, event: HostEvent) {
        self.records.push(TraceRecord::Event {
            at_ms: self.now_ms(),
            event: event.clone(),
        });
        self.launch.push_event(event);
    }

    /// Advance time; the clock is truncated to whole milliseconds.
    pub fn advance_time(&mut self, dt: Duration) {
        self.launch.advance_time(dt);
        let at_ms = self.now_ms();
        self.launch.set_time(Duration::from_millis(at_ms));
        self.records.push(TraceRecord::Advance { at_ms });
    }

    pub fn step(&mut self) -> StepResult {
        let result = self.launch.step();
        self.records.push(TraceRecord::Step {
            at_ms: self.now_ms(),
            phase: result.phase,
            events_processed: result.events_processed,
        });
        self.flush();
        result
    }

    pub fn request_mode(&mut self, mode: TargetMode) -> Result<(), NegotiationError> {
        self.records.push(TraceRecord::ManualRequest {
            at_ms: self.now_ms(),
            mode,
        });
        let result = self.launch.request_mode(mode);
        self.flush();
        result
    }

    /// Finish recording and return the trace.
    #[must_use]
    pub fn finish(mut self) -> LaunchTrace {
        self.flush();
        let negotiator = self.launch.negotiator();
        self.records.push(TraceRecord::Summary {
            settled_mode: negotiator.settled_mode(),
            current_mode: negotiator.current_mode(),
            transitions: self.transitions,
        });
        LaunchTrace {
            records: self.records,
        }
    }
}

/// Result of replaying a launch trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayResult {
    pub transitions: u64,
    pub settled_mode: DisplayMode,
    pub current_mode: DisplayMode,
    /// First transition that differs from the recording, if any.
    pub first_mismatch: Option<ReplayMismatch>,
}

impl ReplayResult {
    /// Whether replay reproduced the recording.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.first_mismatch.is_none()
    }
}

/// A transition that differs between recording and replay. `None` means the
/// side ran out of transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayMismatch {
    pub index: usize,
    pub expected: Option<NegotiationEvent>,
    pub actual: Option<NegotiationEvent>,
}

/// Errors that can occur during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The trace violates structural invariants.
    InvalidTrace(TraceValidationError),
    /// The header options do not form a valid configuration.
    Config(ConfigError),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTrace(e) => write!(f, "invalid trace: {e}"),
            Self::Config(e) => write!(f, "invalid trace options: {e}"),
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<ConfigError> for ReplayError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Replay a recorded trace against a fresh negotiator and scripted host.
pub fn replay(trace: &LaunchTrace) -> Result<ReplayResult, ReplayError> {
    trace.validate().map_err(ReplayError::InvalidTrace)?;
    let Some(TraceRecord::Header { host, options, .. }) = trace.records.first() else {
        return Err(ReplayError::InvalidTrace(TraceValidationError::MissingHeader));
    };
    let config = NegotiatorConfig::default().apply_options(options)?;
    let replies = trace
        .records
        .iter()
        .filter_map(|r| match r {
            TraceRecord::HostReply { reply } => Some(reply.clone()),
            _ => None,
        })
        .collect();
    let host = ReplayHost {
        inner: ScriptedHost::new(host.clone()),
        replies: RefCell::new(replies),
    };
    let (mut launch, captured) = capturing_launch(host, config);

    for record in &trace.records {
        match record {
            TraceRecord::Launch { at_ms, signals } => {
                launch.set_time(Duration::from_millis(*at_ms));
                // A rejected relaunch was rejected during recording too.
                let _ = launch.launch(signals.clone());
            }
            TraceRecord::Event { at_ms, event } => {
                launch.set_time(Duration::from_millis(*at_ms));
                launch.push_event(event.clone());
            }
            TraceRecord::Advance { at_ms } => {
                launch.set_time(Duration::from_millis(*at_ms));
            }
            TraceRecord::Step { at_ms, .. } => {
                launch.set_time(Duration::from_millis(*at_ms));
                launch.step();
            }
            TraceRecord::ManualRequest { at_ms, mode } => {
                launch.set_time(Duration::from_millis(*at_ms));
                let _ = launch.request_mode(*mode);
            }
            TraceRecord::Header { .. }
            | TraceRecord::HostReply { .. }
            | TraceRecord::Transition { .. }
            | TraceRecord::Summary { .. } => {}
        }
    }

    let expected: Vec<&NegotiationEvent> = trace.transitions().collect();
    let actual = captured.borrow();
    let first_mismatch = (0..expected.len().max(actual.len())).find_map(|index| {
        let want = expected.get(index).copied();
        let got = actual.get(index);
        (want != got).then(|| ReplayMismatch {
            index,
            expected: want.cloned(),
            actual: got.cloned(),
        })
    });

    let negotiator = launch.negotiator();
    Ok(ReplayResult {
        transitions: actual.len() as u64,
        settled_mode: negotiator.settled_mode(),
        current_mode: negotiator.current_mode(),
        first_mismatch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::FallbackTrigger;
    use pretty_assertions::assert_eq;

    const PHONE_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) Chrome/120.0 Mobile Safari/537.36";

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn record_timeout() -> LaunchTrace {
        let mut rec =
            LaunchRecorder::scripted(HostProfile::telegram("android", "8.1"), NegotiatorOptions::default())
                .unwrap();
        rec.launch(Signals::new(412, PHONE_UA)).unwrap();
        rec.advance_time(ms(600));
        rec.step();
        rec.advance_time(ms(400));
        rec.step();
        rec.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
        rec.advance_time(ms(1));
        rec.step();
        rec.finish()
    }

    #[test]
    fn recorded_timeout_is_valid_and_replays() {
        let trace = record_timeout();
        trace.validate().unwrap();
        assert_eq!(
            trace.final_modes(),
            Some((DisplayMode::Expanded, DisplayMode::Expanded))
        );
        assert!(trace.transitions().any(|e| matches!(
            e,
            NegotiationEvent::Fallback {
                at_ms: 1000,
                trigger: FallbackTrigger::Timeout,
            }
        )));

        let result = replay(&trace).unwrap();
        assert!(result.ok(), "mismatch: {:?}", result.first_mismatch);
        assert_eq!(result.settled_mode, DisplayMode::Expanded);
    }

    #[test]
    fn jsonl_round_trip_preserves_records() {
        let trace = record_timeout();
        let jsonl = trace.to_jsonl().unwrap();
        assert_eq!(jsonl.lines().count(), trace.records.len());
        assert!(jsonl.lines().next().unwrap().contains(SCHEMA_VERSION));
        let parsed = LaunchTrace::from_jsonl_validated(&jsonl).unwrap();
        assert_eq!(parsed, trace);
    }

    #[test]
    fn rejecting_host_replays_from_profile() {
        let profile = HostProfile::telegram("ios", "9.0").rejecting("boom");
        let mut rec = LaunchRecorder::scripted(profile, NegotiatorOptions::default()).unwrap();
        rec.launch(Signals::new(390, "iPhone")).unwrap();
        let trace = rec.finish();
        let result = replay(&trace).unwrap();
        assert!(result.ok());
        assert_eq!(result.settled_mode, DisplayMode::Expanded);
    }

    #[test]
    fn manual_request_is_recorded_and_replayed() {
        let mut rec =
            LaunchRecorder::scripted(HostProfile::telegram("macos", "9.0"), NegotiatorOptions::default())
                .unwrap();
        rec.launch(Signals::new(1440, "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0)")).unwrap();
        rec.advance_time(ms(3000));
        rec.request_mode(TargetMode::Fullscreen).unwrap();
        rec.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
        rec.step();
        let trace = rec.finish();
        assert_eq!(
            trace.final_modes(),
            Some((DisplayMode::Expanded, DisplayMode::Fullscreen))
        );
        assert!(replay(&trace).unwrap().ok());
    }

    /// A pre-release host: its version string does not parse locally, so
    /// the gate relies on the host's own comparison.
    struct BetaHost {
        reject: Option<String>,
        fullscreen: bool,
    }

    impl BetaHost {
        fn new() -> Self {
            Self {
                reject: None,
                fullscreen: false,
            }
        }
    }

    impl HostAdapter for BetaHost {
        fn ready(&mut self) {}
        fn expand(&mut self) {
            self.fullscreen = false;
        }
        fn request_fullscreen(&mut self) -> Result<(), HostError> {
            match &self.reject {
                Some(message) => Err(HostError::Rejected(message.clone())),
                None => Ok(()),
            }
        }
        fn has_request_fullscreen(&self) -> bool {
            true
        }
        fn is_version_at_least(&self, _version: &str) -> Option<bool> {
            Some(true)
        }
        fn subscribe(&mut self, _kind: HostEventKind) -> SubscriptionId {
            SubscriptionId(7)
        }
        fn unsubscribe(&mut self, _id: SubscriptionId) {}
        fn platform(&self) -> Option<String> {
            Some("android".into())
        }
        fn version(&self) -> Option<String> {
            Some("8.0-beta".into())
        }
        fn is_fullscreen(&self) -> bool {
            self.fullscreen
        }
    }

    fn replies(trace: &LaunchTrace) -> Vec<&HostReply> {
        trace
            .records
            .iter()
            .filter_map(|r| match r {
                TraceRecord::HostReply { reply } => Some(reply),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn host_version_answer_survives_replay() {
        let mut rec = LaunchRecorder::new(BetaHost::new(), NegotiatorOptions::default()).unwrap();
        assert_eq!(rec.launch(Signals::new(412, PHONE_UA)).unwrap(), Phase::Requested);
        rec.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
        rec.advance_time(ms(90));
        rec.step();
        let trace = rec.finish();

        assert_eq!(
            trace.final_modes(),
            Some((DisplayMode::Fullscreen, DisplayMode::Fullscreen))
        );
        assert_eq!(
            replies(&trace),
            vec![
                &HostReply::VersionAtLeast {
                    version: "8.0".into(),
                    answer: Some(true),
                },
                &HostReply::IsFullscreen { answer: false },
                &HostReply::RequestFullscreen {
                    outcome: RequestOutcome::Accepted,
                },
            ]
        );

        let parsed = LaunchTrace::from_jsonl_validated(&trace.to_jsonl().unwrap()).unwrap();
        let result = replay(&parsed).unwrap();
        assert!(result.ok(), "mismatch: {:?}", result.first_mismatch);
        assert_eq!(result.settled_mode, DisplayMode::Fullscreen);
    }

    #[test]
    fn synchronous_rejection_survives_replay() {
        let host = BetaHost {
            reject: Some("WebAppMethodUnsupported".into()),
            ..BetaHost::new()
        };
        let mut rec = LaunchRecorder::new(host, NegotiatorOptions::default()).unwrap();
        assert_eq!(rec.launch(Signals::new(412, PHONE_UA)).unwrap(), Phase::Settled);
        let trace = rec.finish();
        assert!(trace.transitions().any(|e| matches!(
            e,
            NegotiationEvent::Fallback {
                trigger: FallbackTrigger::SyncRejected { .. },
                ..
            }
        )));

        let result = replay(&trace).unwrap();
        assert!(result.ok(), "mismatch: {:?}", result.first_mismatch);
        assert_eq!(result.settled_mode, DisplayMode::Expanded);
    }

    #[test]
    fn host_reply_before_launch_is_invalid() {
        let mut trace = record_timeout();
        trace.records.insert(
            1,
            TraceRecord::HostReply {
                reply: HostReply::IsFullscreen { answer: true },
            },
        );
        assert_eq!(
            trace.validate(),
            Err(TraceValidationError::InputBeforeLaunch { index: 1 })
        );
    }

    #[test]
    fn request_outcome_maps_back_to_host_error() {
        for result in [
            Ok(()),
            Err(HostError::Rejected("nope".into())),
            Err(HostError::Unsupported("requestFullscreen")),
            Err(HostError::Absent),
        ] {
            assert_eq!(RequestOutcome::of(&result).into_result(), result);
        }
    }

    #[test]
    fn tampered_transition_is_reported() {
        let mut trace = record_timeout();
        let idx = trace
            .records
            .iter()
            .position(|r| matches!(r, TraceRecord::Transition { event: NegotiationEvent::Settled { .. } }))
            .unwrap();
        trace.records[idx] = TraceRecord::Transition {
            event: NegotiationEvent::Settled {
                at_ms: 1000,
                mode: DisplayMode::Fullscreen,
                elapsed_ms: 1000,
            },
        };
        let result = replay(&trace).unwrap();
        assert!(!result.ok());
    }

    #[test]
    fn validate_catches_structural_errors() {
        assert_eq!(
            LaunchTrace::default().validate(),
            Err(TraceValidationError::EmptyTrace)
        );

        let mut trace = record_timeout();
        trace.records.remove(0);
        assert_eq!(trace.validate(), Err(TraceValidationError::MissingHeader));

        let mut trace = record_timeout();
        trace.records.pop();
        assert_eq!(trace.validate(), Err(TraceValidationError::MissingSummary));

        let mut trace = record_timeout();
        let last = trace.records.len() - 1;
        trace.records.insert(last, TraceRecord::Advance { at_ms: 0 });
        assert!(matches!(
            trace.validate(),
            Err(TraceValidationError::TimeWentBackwards { .. })
        ));

        let mut trace = record_timeout();
        if let Some(TraceRecord::Header { schema, .. }) = trace.records.first_mut() {
            *schema = "golden-trace-v0".into();
        }
        assert_eq!(
            trace.validate(),
            Err(TraceValidationError::UnsupportedSchema("golden-trace-v0".into()))
        );
    }

    #[test]
    fn parse_error_reports_line() {
        let err = LaunchTrace::from_jsonl("\n{\"record\":\"nope\"}\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
