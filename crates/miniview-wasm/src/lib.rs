#![forbid(unsafe_code)]

//! WASM binding for MiniView.
//!
//! Exposes [`MiniViewport`] to JavaScript through `wasm-bindgen`. On
//! `wasm32` it binds `window.Telegram.WebApp` as the host adapter, drives the
//! negotiator from real `setTimeout` timers, and reports settlement to JS
//! callbacks.
//!
//! Pieces that do not touch JS ([`ViewportSnapshot`], timer arithmetic) are
//! plain Rust and tested natively.

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::MiniViewport;

use core::time::Duration;

use miniview_core::{CapabilitySet, Classification, HostAdapter};
use miniview_web::{DisplayMode, Negotiator, Phase};
use serde::Serialize;

/// Read-only view of the negotiation, as handed to JS by `snapshot()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportSnapshot {
    pub phase: Phase,
    pub settled_mode: DisplayMode,
    pub current_mode: DisplayMode,
    pub manual_pending: bool,
    pub classification: Option<Classification>,
    pub capabilities: Option<CapabilitySet>,
}

impl ViewportSnapshot {
    /// Snapshot before `launch()`.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            settled_mode: DisplayMode::Unknown,
            current_mode: DisplayMode::Unknown,
            manual_pending: false,
            classification: None,
            capabilities: None,
        }
    }

    #[must_use]
    pub fn of<H: HostAdapter>(negotiator: &Negotiator<H>) -> Self {
        Self {
            phase: negotiator.phase(),
            settled_mode: negotiator.settled_mode(),
            current_mode: negotiator.current_mode(),
            manual_pending: negotiator.is_manual_pending(),
            classification: negotiator.classification().copied(),
            capabilities: negotiator.capabilities().cloned(),
        }
    }
}

/// `setTimeout` delay for a deadline, rounded up to whole milliseconds so
/// the timer never fires before the deadline.
#[must_use]
pub fn timer_delay_ms(deadline: Duration, now: Duration) -> i32 {
    let remaining = deadline.saturating_sub(now).as_micros().div_ceil(1000);
    i32::try_from(remaining).unwrap_or(i32::MAX)
}

/// Native builds compile this crate as a stub so workspace checks stay green
/// on non-wasm targets.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default)]
pub struct MiniViewport;

#[cfg(not(target_arch = "wasm32"))]
impl MiniViewport {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}
