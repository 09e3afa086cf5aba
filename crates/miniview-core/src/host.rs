#![forbid(unsafe_code)]

//! Host SDK adapter contract.
//!
//! The embedding client (the Telegram mini-app runtime) is an opaque
//! collaborator. The negotiator only talks to it through [`HostAdapter`],
//! which lets tests substitute a scripted host and lets the wasm binding
//! wrap `window.Telegram.WebApp`.
//!
//! Events flow the other way as plain values: whoever owns the adapter
//! forwards [`HostEvent`]s into the negotiator. Subscriptions exist so the
//! real host can stop calling back once the outcome is known; they are
//! cleanup only and never the thing that prevents a double transition.

use std::fmt;

/// Opaque handle for a live event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Host events the negotiator listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum HostEventKind {
    FullscreenChanged,
    FullscreenFailed,
}

impl HostEventKind {
    /// Both kinds, in subscription order.
    pub const ALL: &'static [Self] = &[Self::FullscreenChanged, Self::FullscreenFailed];

    /// Event name on the host SDK.
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::FullscreenChanged => "fullscreenChanged",
            Self::FullscreenFailed => "fullscreenFailed",
        }
    }

    /// Inverse of [`wire_name`](Self::wire_name).
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.wire_name() == name)
    }
}

/// A host event delivered to the negotiator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum HostEvent {
    /// The host's fullscreen flag changed.
    FullscreenChanged { is_fullscreen: bool },
    /// The host refused or failed a fullscreen request.
    FullscreenFailed { error: Option<String> },
}

impl HostEvent {
    #[must_use]
    pub const fn kind(&self) -> HostEventKind {
        match self {
            Self::FullscreenChanged { .. } => HostEventKind::FullscreenChanged,
            Self::FullscreenFailed { .. } => HostEventKind::FullscreenFailed,
        }
    }
}

/// Errors raised by host operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The host threw while handling the call.
    Rejected(String),
    /// The operation does not exist on this host version.
    Unsupported(&'static str),
    /// No host runtime is present at all.
    Absent,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "host rejected call: {msg}"),
            Self::Unsupported(op) => write!(f, "host does not support {op}"),
            Self::Absent => write!(f, "no host runtime present"),
        }
    }
}

impl std::error::Error for HostError {}

/// Bridge to the embedding runtime.
///
/// Every method is synchronous and non-blocking. `request_fullscreen` only
/// issues the request; its outcome arrives later as a [`HostEvent`].
pub trait HostAdapter {
    /// Signal the host that the app is ready. Called once, before any
    /// viewport operation.
    fn ready(&mut self);

    /// Request windowed/expanded mode. Fire-and-forget.
    fn expand(&mut self);

    /// Request fullscreen mode. May fail synchronously.
    fn request_fullscreen(&mut self) -> Result<(), HostError>;

    /// Whether the fullscreen operation exists as a callable.
    fn has_request_fullscreen(&self) -> bool;

    /// Host-side dotted version comparison; `None` when the query itself is
    /// missing (old hosts).
    fn is_version_at_least(&self, version: &str) -> Option<bool>;

    /// Start delivering `kind` events.
    fn subscribe(&mut self, kind: HostEventKind) -> SubscriptionId;

    /// Stop delivering events for `id`. Unknown ids are ignored.
    fn unsubscribe(&mut self, id: SubscriptionId);

    /// Platform string reported by the host.
    fn platform(&self) -> Option<String>;

    /// Host protocol version string.
    fn version(&self) -> Option<String>;

    /// Current fullscreen flag.
    fn is_fullscreen(&self) -> bool;
}

impl<H: HostAdapter + ?Sized> HostAdapter for Box<H> {
    fn ready(&mut self) {
        (**self).ready();
    }

    fn expand(&mut self) {
        (**self).expand();
    }

    fn request_fullscreen(&mut self) -> Result<(), HostError> {
        (**self).request_fullscreen()
    }

    fn has_request_fullscreen(&self) -> bool {
        (**self).has_request_fullscreen()
    }

    fn is_version_at_least(&self, version: &str) -> Option<bool> {
        (**self).is_version_at_least(version)
    }

    fn subscribe(&mut self, kind: HostEventKind) -> SubscriptionId {
        (**self).subscribe(kind)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        (**self).unsubscribe(id);
    }

    fn platform(&self) -> Option<String> {
        (**self).platform()
    }

    fn version(&self) -> Option<String> {
        (**self).version()
    }

    fn is_fullscreen(&self) -> bool {
        (**self).is_fullscreen()
    }
}
