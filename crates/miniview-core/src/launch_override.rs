#![forbid(unsafe_code)]

//! Thread-local launch overrides for tests and demos.
//!
//! Simulating a tablet on an old host normally means crafting a user agent
//! and a fake adapter. An override forces the verdicts directly:
//!
//! ```
//! use miniview_core::launch_override::{with_launch_override, LaunchOverride};
//! use miniview_core::device::{DeviceClass, Signals};
//!
//! with_launch_override(LaunchOverride::new().device(Some(DeviceClass::Tablet)), || {
//!     let c = miniview_core::launch_override::classify_with_overrides(&Signals::default(), 768);
//!     assert_eq!(c.device, DeviceClass::Tablet);
//! });
//! ```
//!
//! # Invariants
//!
//! 1. **Thread isolation**: overrides on one thread never affect another.
//! 2. **Stack ordering**: later pushes win; dropping a guard restores the
//!    previous state.
//! 3. **Cleanup guarantee**: guards pop on drop, including during unwinding.

use std::cell::RefCell;

use crate::capability::CapabilitySet;
use crate::device::{Classification, DeviceClass, Platform, Signals, classify_with_breakpoint};

/// Forced launch verdicts. `None` fields leave the computed value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOverride {
    pub device: Option<DeviceClass>,
    pub platform: Option<Platform>,
    pub supports_fullscreen: Option<bool>,
}

impl LaunchOverride {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            device: None,
            platform: None,
            supports_fullscreen: None,
        }
    }

    /// A capable phone.
    #[must_use]
    pub const fn capable_mobile() -> Self {
        Self {
            device: Some(DeviceClass::Mobile),
            platform: Some(Platform::Android),
            supports_fullscreen: Some(true),
        }
    }

    /// A browser-hosted desktop client.
    #[must_use]
    pub const fn web_desktop() -> Self {
        Self {
            device: Some(DeviceClass::Desktop),
            platform: Some(Platform::Web),
            supports_fullscreen: None,
        }
    }

    #[must_use]
    pub const fn device(mut self, value: Option<DeviceClass>) -> Self {
        self.device = value;
        self
    }

    #[must_use]
    pub const fn platform(mut self, value: Option<Platform>) -> Self {
        self.platform = value;
        self
    }

    #[must_use]
    pub const fn supports_fullscreen(mut self, value: Option<bool>) -> Self {
        self.supports_fullscreen = value;
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.device.is_none() && self.platform.is_none() && self.supports_fullscreen.is_none()
    }

    #[must_use]
    pub fn apply_to_classification(&self, mut c: Classification) -> Classification {
        if let Some(device) = self.device {
            c.device = device;
        }
        if let Some(platform) = self.platform {
            c.platform = platform;
        }
        c
    }

    #[must_use]
    pub fn apply_to_capabilities(&self, mut caps: CapabilitySet) -> CapabilitySet {
        if let Some(v) = self.supports_fullscreen {
            caps.supports_fullscreen = v;
        }
        caps
    }
}

thread_local! {
    static OVERRIDE_STACK: RefCell<Vec<LaunchOverride>> = const { RefCell::new(Vec::new()) };
}

/// Pops its override when dropped.
#[must_use]
pub struct OverrideGuard {
    _marker: std::marker::PhantomData<*const ()>,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        OVERRIDE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert!(popped.is_some(), "OverrideGuard dropped with empty stack");
        });
    }
}

/// Push an override for the current thread.
pub fn push_override(over: LaunchOverride) -> OverrideGuard {
    OVERRIDE_STACK.with(|stack| stack.borrow_mut().push(over));
    OverrideGuard {
        _marker: std::marker::PhantomData,
    }
}

/// Run `f` with `over` active.
pub fn with_launch_override<F, R>(over: LaunchOverride, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = push_override(over);
    f()
}

/// Classify, then apply the active override stack bottom to top.
#[must_use]
pub fn classify_with_overrides(signals: &Signals, breakpoint_px: u32) -> Classification {
    let base = classify_with_breakpoint(signals, breakpoint_px);
    OVERRIDE_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .fold(base, |c, over| over.apply_to_classification(c))
    })
}

/// Apply the active override stack to a probed capability set.
#[must_use]
pub fn capabilities_with_overrides(base: CapabilitySet) -> CapabilitySet {
    OVERRIDE_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .fold(base, |caps, over| over.apply_to_capabilities(caps))
    })
}

#[must_use]
pub fn override_depth() -> usize {
    OVERRIDE_STACK.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_override_is_plain_classification() {
        let signals = Signals::new(1400, "Mozilla/5.0 (Windows NT 10.0)");
        assert_eq!(override_depth(), 0);
        assert_eq!(
            classify_with_overrides(&signals, 768),
            classify_with_breakpoint(&signals, 768)
        );
    }

    #[test]
    fn nested_overrides_stack_and_restore() {
        let signals = Signals::new(1400, "Mozilla/5.0 (Windows NT 10.0)");
        let _outer = push_override(LaunchOverride::new().device(Some(DeviceClass::Tablet)));
        assert_eq!(classify_with_overrides(&signals, 768).device, DeviceClass::Tablet);
        {
            let _inner = push_override(LaunchOverride::web_desktop());
            let c = classify_with_overrides(&signals, 768);
            assert_eq!(c.device, DeviceClass::Desktop);
            assert_eq!(c.platform, Platform::Web);
            assert_eq!(override_depth(), 2);
        }
        assert_eq!(override_depth(), 1);
        assert_eq!(classify_with_overrides(&signals, 768).platform, Platform::Windows);
    }

    #[test]
    fn capability_override_only_touches_fullscreen_flag() {
        let base = CapabilitySet {
            supports_fullscreen: false,
            host_version: Some("7.0".into()),
        };
        let caps = with_launch_override(LaunchOverride::capable_mobile(), || {
            capabilities_with_overrides(base.clone())
        });
        assert!(caps.supports_fullscreen);
        assert_eq!(caps.host_version.as_deref(), Some("7.0"));
        assert_eq!(capabilities_with_overrides(base.clone()), base);
    }

    #[test]
    fn overrides_are_thread_local() {
        let _guard = push_override(LaunchOverride::capable_mobile());
        let depth = std::thread::spawn(override_depth).join().unwrap();
        assert_eq!(depth, 0);
    }

    #[test]
    fn empty_override() {
        assert!(LaunchOverride::new().is_empty());
        assert!(!LaunchOverride::web_desktop().is_empty());
    }
}
