#![forbid(unsafe_code)]

//! Host capability probe.
//!
//! Fullscreen support needs two independent facts, and neither is enough
//! alone:
//!
//! 1. the host speaks a protocol version at or above the configured minimum,
//! 2. the adapter actually exposes the fullscreen operation as a callable.
//!
//! # Fail-Open Contract
//!
//! The probe never errors. Anything it cannot establish counts as "not
//! supported", which sends the negotiator down the expanded path:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | No adapter | `{ supports_fullscreen: false, host_version: None }` |
//! | Version string missing or malformed | ask the host's own comparison |
//! | Host comparison missing | version gate fails |
//! | Operation missing | `supports_fullscreen = false` |

use crate::config::NegotiatorConfig;
use crate::host::HostAdapter;
use crate::version::HostVersion;

/// Snapshot of what the host can do, taken once per negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CapabilitySet {
    pub supports_fullscreen: bool,
    pub host_version: Option<String>,
}

impl CapabilitySet {
    /// Capabilities of a missing host.
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            supports_fullscreen: false,
            host_version: None,
        }
    }
}

/// Probe `adapter` against `config`.
#[must_use]
pub fn probe<H: HostAdapter + ?Sized>(adapter: Option<&H>, config: &NegotiatorConfig) -> CapabilitySet {
    let Some(adapter) = adapter else {
        return CapabilitySet::absent();
    };

    let host_version = adapter.version().filter(|v| !v.trim().is_empty());
    let version_ok = version_gate(adapter, host_version.as_deref(), &config.min_fullscreen_version);
    let has_op = adapter.has_request_fullscreen();

    CapabilitySet {
        supports_fullscreen: version_ok && has_op,
        host_version,
    }
}

fn version_gate<H: HostAdapter + ?Sized>(
    adapter: &H,
    reported: Option<&str>,
    min: &HostVersion,
) -> bool {
    match reported.map(str::parse::<HostVersion>) {
        Some(Ok(version)) => version.is_at_least(min),
        _ => adapter
            .is_version_at_least(&min.to_string())
            .unwrap_or(false),
    }
}
