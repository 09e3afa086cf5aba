#![forbid(unsafe_code)]

//! Logging support.
//!
//! [`TracingSink`] is the default telemetry sink: it forwards negotiation
//! events to `tracing` under the `miniview::negotiation` target. Settlement
//! is `info`, fallbacks are `warn`, ignored signals are `trace`, everything
//! else is `debug`.
//!
//! With the `tracing-json` feature, [`init_json_logging`] installs a JSON
//! subscriber filtered by `MINIVIEW_LOG` (default `info`).

use crate::telemetry::{NegotiationEvent, TelemetrySink};

/// Environment variable holding the `tracing` filter directive.
pub const LOG_FILTER_ENV: &str = "MINIVIEW_LOG";

const TARGET: &str = "miniview::negotiation";

/// Forwards negotiation events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&mut self, event: &NegotiationEvent) {
        match event {
            NegotiationEvent::Launched {
                at_ms,
                classification,
                capabilities,
            } => tracing::debug!(
                target: TARGET,
                at_ms,
                device = classification.device.as_str(),
                platform = classification.platform.as_str(),
                supports_fullscreen = capabilities.supports_fullscreen,
                host_version = capabilities.host_version.as_deref().unwrap_or("none"),
                "launch"
            ),
            NegotiationEvent::Decided {
                at_ms,
                target,
                reason,
            } => tracing::debug!(
                target: TARGET,
                at_ms,
                target_mode = target.as_str(),
                reason = ?reason,
                "decided"
            ),
            NegotiationEvent::FullscreenRequested { at_ms, manual } => {
                tracing::debug!(target: TARGET, at_ms, manual, "fullscreen requested");
            }
            NegotiationEvent::Fallback { at_ms, trigger } => {
                tracing::warn!(target: TARGET, at_ms, trigger = ?trigger, "falling back to expanded");
            }
            NegotiationEvent::Settled {
                at_ms,
                mode,
                elapsed_ms,
            } => tracing::info!(
                target: TARGET,
                at_ms,
                mode = mode.as_str(),
                elapsed_ms,
                "display mode settled"
            ),
            NegotiationEvent::SignalIgnored { at_ms, kind, phase } => tracing::trace!(
                target: TARGET,
                at_ms,
                kind = kind.wire_name(),
                phase = phase.as_str(),
                "signal ignored"
            ),
            NegotiationEvent::ManualRequested { at_ms, mode } => {
                tracing::debug!(target: TARGET, at_ms, mode = mode.as_str(), "manual mode requested");
            }
            NegotiationEvent::ManualResolved {
                at_ms,
                mode,
                fell_back,
            } => tracing::debug!(
                target: TARGET,
                at_ms,
                mode = mode.as_str(),
                fell_back,
                "manual mode resolved"
            ),
            NegotiationEvent::Aborted { at_ms, phase } => {
                tracing::debug!(target: TARGET, at_ms, phase = phase.as_str(), "negotiation aborted");
            }
        }
    }
}

/// Subscriber installation failed.
#[cfg(feature = "tracing-json")]
#[derive(Debug)]
pub enum LoggingInitError {
    /// `MINIVIEW_LOG` is not a valid filter directive.
    InvalidFilter(String),
    /// A global subscriber is already installed.
    AlreadyInstalled(String),
}

#[cfg(feature = "tracing-json")]
impl std::fmt::Display for LoggingInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFilter(msg) => write!(f, "invalid {LOG_FILTER_ENV} directive: {msg}"),
            Self::AlreadyInstalled(msg) => write!(f, "tracing subscriber already set: {msg}"),
        }
    }
}

#[cfg(feature = "tracing-json")]
impl std::error::Error for LoggingInitError {}

/// Install a global JSON subscriber filtered by `MINIVIEW_LOG`.
#[cfg(feature = "tracing-json")]
pub fn init_json_logging() -> Result<(), LoggingInitError> {
    use tracing_subscriber::EnvFilter;

    let filter = match std::env::var(LOG_FILTER_ENV) {
        Ok(directive) => EnvFilter::try_new(directive)
            .map_err(|err| LoggingInitError::InvalidFilter(err.to_string()))?,
        Err(_) => EnvFilter::new("info"),
    };
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| LoggingInitError::AlreadyInstalled(err.to_string()))
}
