//! Property-based invariant tests for classification and host versions.
//!
//! Verifies:
//! 1. Host `ios`/`android` always classify as mobile, whatever the UA/width
//! 2. Host `web` always classifies as desktop
//! 3. A recognised host platform is always the reported platform
//! 4. Narrow viewports without a host platform are always mobile
//! 5. Version ordering matches numeric component ordering (zero-padded)
//! 6. Version parse/display round-trips
//! 7. Classification is deterministic

use miniview_core::device::{
    DeviceClass, Platform, PlatformSource, Signals, classify, classify_with_breakpoint,
};
use miniview_core::version::HostVersion;
use proptest::prelude::*;

fn arb_user_agent() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148".to_owned()),
        Just("Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) Mobile/15E148".to_owned()),
        Just("Mozilla/5.0 (Linux; Android 14; Pixel 8) Chrome/120.0 Mobile Safari/537.36".to_owned()),
        Just("Mozilla/5.0 (Linux; Android 13; SM-X700) Chrome/120.0 Safari/537.36".to_owned()),
        Just("Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) Safari/605.1.15".to_owned()),
        Just("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0".to_owned()),
        Just("Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0".to_owned()),
        "[ -~]{0,80}",
    ]
}

fn arb_width() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), 1u32..=768, 769u32..=4000]
}

fn arb_version_parts() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..=120, 1..=4)
}

fn padded(parts: &[u32], len: usize) -> Vec<u32> {
    let mut out = parts.to_vec();
    out.resize(len, 0);
    out
}

proptest! {
    #[test]
    fn host_mobile_platforms_force_mobile(
        ua in arb_user_agent(),
        width in arb_width(),
        host in prop_oneof![Just("ios"), Just("android"), Just("android_x")],
    ) {
        let c = classify(&Signals::new(width, ua).with_host_platform(host));
        prop_assert_eq!(c.device, DeviceClass::Mobile);
        prop_assert_eq!(c.platform_source, PlatformSource::Host);
    }

    #[test]
    fn host_web_forces_desktop(
        ua in arb_user_agent(),
        width in arb_width(),
        host in prop_oneof![Just("web"), Just("weba"), Just("webk")],
    ) {
        let c = classify(&Signals::new(width, ua).with_host_platform(host));
        prop_assert_eq!(c.device, DeviceClass::Desktop);
        prop_assert_eq!(c.platform, Platform::Web);
    }

    #[test]
    fn recognised_host_platform_wins(ua in arb_user_agent(), width in arb_width()) {
        let c = classify(&Signals::new(width, ua).with_host_platform("macos"));
        prop_assert_eq!(c.platform, Platform::Macos);
    }

    #[test]
    fn narrow_viewport_is_mobile(
        ua in arb_user_agent(),
        width in 1u32..=2000,
        breakpoint in 1u32..=2000,
    ) {
        prop_assume!(width <= breakpoint);
        let c = classify_with_breakpoint(&Signals::new(width, ua), breakpoint);
        prop_assert_eq!(c.device, DeviceClass::Mobile);
    }

    #[test]
    fn classification_is_deterministic(ua in arb_user_agent(), width in arb_width()) {
        let signals = Signals::new(width, ua);
        prop_assert_eq!(classify(&signals), classify(&signals));
    }

    #[test]
    fn version_order_matches_padded_components(a in arb_version_parts(), b in arb_version_parts()) {
        let len = a.len().max(b.len());
        let expected = padded(&a, len).cmp(&padded(&b, len));
        let va = HostVersion::new(a);
        let vb = HostVersion::new(b);
        prop_assert_eq!(va.cmp(&vb), expected);
    }

    #[test]
    fn version_display_parses_back(parts in arb_version_parts()) {
        let version = HostVersion::new(parts.clone());
        let reparsed: HostVersion = version.to_string().parse().unwrap();
        prop_assert_eq!(reparsed.parts(), parts.as_slice());
    }

    #[test]
    fn double_digit_major_beats_single_digit(major in 10u32..=99, minor in 0u32..=99, low in 0u32..=9) {
        let high: HostVersion = format!("{major}.{minor}").parse().unwrap();
        let low: HostVersion = format!("{low}.99").parse().unwrap();
        prop_assert!(high > low);
    }
}
