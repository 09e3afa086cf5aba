#![forbid(unsafe_code)]

//! Scripted host adapter.
//!
//! [`ScriptedHost`] answers capability queries from a [`HostProfile`] and
//! records every call the negotiator makes, so tests and trace replay can
//! assert on the exact call sequence. Host events are not generated here;
//! the driver pushes them explicitly.

use std::collections::BTreeMap;

use miniview_core::{HostAdapter, HostError, HostEventKind, HostVersion, SubscriptionId};
use serde::{Deserialize, Serialize};

/// Static description of a host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostProfile {
    pub platform: Option<String>,
    pub version: Option<String>,
    /// Whether `requestFullscreen` exists.
    pub has_request_fullscreen: bool,
    /// Whether `isVersionAtLeast` exists.
    pub version_query: bool,
    /// When set, `requestFullscreen` throws with this message.
    pub reject_fullscreen: Option<String>,
    pub is_fullscreen: bool,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            platform: None,
            version: None,
            has_request_fullscreen: true,
            version_query: true,
            reject_fullscreen: None,
            is_fullscreen: false,
        }
    }
}

impl HostProfile {
    /// A current host with every operation present.
    #[must_use]
    pub fn telegram(platform: &str, version: &str) -> Self {
        Self {
            platform: Some(platform.to_owned()),
            version: Some(version.to_owned()),
            ..Self::default()
        }
    }

    /// An old host without `requestFullscreen` or `isVersionAtLeast`.
    #[must_use]
    pub fn legacy(platform: &str, version: &str) -> Self {
        Self {
            has_request_fullscreen: false,
            version_query: false,
            ..Self::telegram(platform, version)
        }
    }

    /// Make `requestFullscreen` throw `message`.
    #[must_use]
    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject_fullscreen = Some(message.to_owned());
        self
    }

    /// Snapshot the static surface of another adapter.
    ///
    /// Synchronous rejection cannot be observed without calling the host, so
    /// `reject_fullscreen` is always `None`. Launch recordings keep the
    /// host's actual answers separately.
    #[must_use]
    pub fn capture<H: HostAdapter + ?Sized>(host: &H) -> Self {
        Self {
            platform: host.platform(),
            version: host.version(),
            has_request_fullscreen: host.has_request_fullscreen(),
            version_query: host.is_version_at_least("0").is_some(),
            reject_fullscreen: None,
            is_fullscreen: host.is_fullscreen(),
        }
    }
}

/// One call made on a [`ScriptedHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    Ready,
    Expand,
    RequestFullscreen,
    Subscribe(HostEventKind, SubscriptionId),
    Unsubscribe(SubscriptionId),
}

/// Host adapter driven by a [`HostProfile`].
#[derive(Debug, Clone)]
pub struct ScriptedHost {
    profile: HostProfile,
    calls: Vec<HostCall>,
    subscriptions: BTreeMap<SubscriptionId, HostEventKind>,
    next_id: u64,
    fullscreen: bool,
}

impl ScriptedHost {
    #[must_use]
    pub fn new(profile: HostProfile) -> Self {
        let fullscreen = profile.is_fullscreen;
        Self {
            profile,
            calls: Vec::new(),
            subscriptions: BTreeMap::new(),
            next_id: 1,
            fullscreen,
        }
    }

    #[must_use]
    pub fn profile(&self) -> &HostProfile {
        &self.profile
    }

    /// Every call in order.
    #[must_use]
    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.count(|c| matches!(c, HostCall::Ready))
    }

    #[must_use]
    pub fn expand_count(&self) -> usize {
        self.count(|c| matches!(c, HostCall::Expand))
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.count(|c| matches!(c, HostCall::RequestFullscreen))
    }

    /// Kinds with a live subscription, in subscription order.
    #[must_use]
    pub fn live_subscriptions(&self) -> Vec<HostEventKind> {
        self.subscriptions.values().copied().collect()
    }

    fn count(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl HostAdapter for ScriptedHost {
    fn ready(&mut self) {
        self.calls.push(HostCall::Ready);
    }

    fn expand(&mut self) {
        self.calls.push(HostCall::Expand);
        self.fullscreen = false;
    }

    fn request_fullscreen(&mut self) -> Result<(), HostError> {
        self.calls.push(HostCall::RequestFullscreen);
        if !self.profile.has_request_fullscreen {
            return Err(HostError::Unsupported("requestFullscreen"));
        }
        match &self.profile.reject_fullscreen {
            Some(message) => Err(HostError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    fn has_request_fullscreen(&self) -> bool {
        self.profile.has_request_fullscreen
    }

    fn is_version_at_least(&self, version: &str) -> Option<bool> {
        if !self.profile.version_query {
            return None;
        }
        let Ok(wanted) = version.parse::<HostVersion>() else {
            return Some(false);
        };
        let current = self
            .profile
            .version
            .as_deref()
            .and_then(|v| v.parse::<HostVersion>().ok());
        Some(current.is_some_and(|current| current >= wanted))
    }

    fn subscribe(&mut self, kind: HostEventKind) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.insert(id, kind);
        self.calls.push(HostCall::Subscribe(kind, id));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(&id);
        self.calls.push(HostCall::Unsubscribe(id));
    }

    fn platform(&self) -> Option<String> {
        self.profile.platform.clone()
    }

    fn version(&self) -> Option<String> {
        self.profile.version.clone()
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}
