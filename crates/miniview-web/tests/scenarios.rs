//! End-to-end launch scenarios over a scripted host.

use core::time::Duration;
use std::cell::RefCell;
use std::rc::Rc;

use miniview_core::launch_override::{LaunchOverride, with_launch_override};
use miniview_core::{DeviceClass, HostEvent, NegotiatorConfig, Signals};
use miniview_web::scripted_host::{HostCall, HostProfile, ScriptedHost};
use miniview_web::{
    DisplayMode, FallbackTrigger, NegotiationEvent, Phase, StepLaunch, TargetMode,
};
use pretty_assertions::assert_eq;

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) Chrome/120.0 Mobile Safari/537.36";
const MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15";

type Log = Rc<RefCell<Vec<NegotiationEvent>>>;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn runner(profile: HostProfile) -> (StepLaunch<ScriptedHost>, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let launch = StepLaunch::new(ScriptedHost::new(profile), NegotiatorConfig::default())
        .with_sink(move |e: &NegotiationEvent| sink.borrow_mut().push(e.clone()));
    (launch, log)
}

fn names(log: &Log) -> Vec<&'static str> {
    log.borrow().iter().map(NegotiationEvent::name).collect()
}

#[test]
fn scenario_a_capable_phone_goes_fullscreen() {
    let (mut launch, log) = runner(HostProfile::telegram("ios", "8.0"));
    launch.launch(Signals::new(390, IPHONE_UA)).unwrap();

    launch.advance_time(ms(200));
    launch.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
    let result = launch.step();

    assert!(result.settled_now);
    let n = launch.negotiator();
    assert_eq!(n.settled_mode(), DisplayMode::Fullscreen);
    assert_eq!(n.host().expand_count(), 0);
    assert!(n.host().live_subscriptions().is_empty());
    assert_eq!(
        names(&log),
        vec!["launched", "decided", "fullscreen_requested", "settled"]
    );
    assert!(matches!(
        log.borrow().last(),
        Some(NegotiationEvent::Settled { elapsed_ms: 200, .. })
    ));
}

#[test]
fn scenario_b_old_host_expands_without_request() {
    let (mut launch, _) = runner(HostProfile::legacy("android", "7.2"));
    assert_eq!(
        launch.launch(Signals::new(412, ANDROID_UA)).unwrap(),
        Phase::Settled
    );
    let n = launch.negotiator();
    assert_eq!(n.settled_mode(), DisplayMode::Expanded);
    assert_eq!(n.host().request_count(), 0);
    assert_eq!(n.host().expand_count(), 1);
    assert_eq!(launch.next_wakeup(), None);
}

#[test]
fn scenario_c_silent_host_times_out() {
    let (mut launch, log) = runner(HostProfile::telegram("android", "8.0"));
    launch.launch(Signals::new(412, ANDROID_UA)).unwrap();

    launch.advance_time(ms(999));
    assert_eq!(launch.step().phase, Phase::Requested);
    launch.advance_time(ms(1));
    let result = launch.step();

    assert!(result.settled_now);
    assert_eq!(launch.negotiator().settled_mode(), DisplayMode::Expanded);
    assert_eq!(launch.negotiator().host().expand_count(), 1);
    assert!(log.borrow().iter().any(|e| matches!(
        e,
        NegotiationEvent::Fallback {
            trigger: FallbackTrigger::Timeout,
            ..
        }
    )));
}

#[test]
fn scenario_c_late_success_is_ignored() {
    let (mut launch, log) = runner(HostProfile::telegram("android", "8.0"));
    launch.launch(Signals::new(412, ANDROID_UA)).unwrap();
    launch.advance_time(ms(1000));
    launch.step();

    launch.advance_time(ms(500));
    launch.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
    let result = launch.step();

    assert!(!result.settled_now);
    assert_eq!(launch.negotiator().settled_mode(), DisplayMode::Expanded);
    assert_eq!(launch.negotiator().host().expand_count(), 1);
    assert_eq!(names(&log).last(), Some(&"signal_ignored"));
}

#[test]
fn scenario_d_desktop_never_requests() {
    let (mut launch, _) = runner(HostProfile::telegram("macos", "9.1"));
    launch.launch(Signals::new(1512, MAC_UA)).unwrap();
    let n = launch.negotiator();
    assert_eq!(n.settled_mode(), DisplayMode::Expanded);
    assert_eq!(n.state().target_mode, TargetMode::Expanded);
    assert_eq!(n.host().request_count(), 0);
    assert!(
        !n.host()
            .calls()
            .iter()
            .any(|c| matches!(c, HostCall::Subscribe(..)))
    );
}

#[test]
fn web_client_on_a_phone_sized_window_stays_expanded() {
    let (mut launch, _) = runner(HostProfile::telegram("weba", "9.0"));
    launch.launch(Signals::new(375, ANDROID_UA)).unwrap();
    assert_eq!(launch.negotiator().host().request_count(), 0);
}

#[test]
fn failure_event_then_timer_fires_fallback_once() {
    let (mut launch, log) = runner(HostProfile::telegram("android", "8.0"));
    launch.launch(Signals::new(412, ANDROID_UA)).unwrap();
    launch.advance_time(ms(300));
    launch.push_event(HostEvent::FullscreenFailed {
        error: Some("UNSUPPORTED".into()),
    });
    launch.advance_time(ms(2000));
    launch.step();

    let fallbacks: Vec<_> = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            NegotiationEvent::Fallback { trigger, at_ms } => Some((trigger.clone(), *at_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(
        fallbacks,
        vec![(
            FallbackTrigger::HostFailed {
                error: Some("UNSUPPORTED".into())
            },
            300
        )]
    );
    assert_eq!(launch.negotiator().host().expand_count(), 1);
}

#[test]
fn success_and_failure_racing_in_one_step_first_wins() {
    let (mut launch, _) = runner(HostProfile::telegram("ios", "8.0"));
    launch.launch(Signals::new(390, IPHONE_UA)).unwrap();
    launch.advance_time(ms(100));
    launch.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
    launch.push_event(HostEvent::FullscreenFailed { error: None });
    launch.step();
    assert_eq!(launch.negotiator().settled_mode(), DisplayMode::Fullscreen);
    assert_eq!(launch.negotiator().host().expand_count(), 0);
}

#[test]
fn settled_callbacks_see_the_final_mode() {
    let (mut launch, _) = runner(HostProfile::telegram("android", "8.0"));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let early = Rc::clone(&seen);
    launch.on_settled(move |mode| early.borrow_mut().push(mode));
    launch.launch(Signals::new(412, ANDROID_UA)).unwrap();
    launch.advance_time(ms(1000));
    launch.step();
    launch.advance_time(ms(10));
    launch.step();
    assert_eq!(*seen.borrow(), vec![DisplayMode::Expanded]);
}

#[test]
fn manual_fullscreen_after_desktop_settle() {
    let (mut launch, log) = runner(HostProfile::telegram("macos", "9.1"));
    launch.launch(Signals::new(1512, MAC_UA)).unwrap();
    launch.advance_time(ms(4000));
    launch.request_mode(TargetMode::Fullscreen).unwrap();
    launch.push_event(HostEvent::FullscreenChanged { is_fullscreen: true });
    launch.step();

    let n = launch.negotiator();
    assert_eq!(n.settled_mode(), DisplayMode::Expanded);
    assert_eq!(n.current_mode(), DisplayMode::Fullscreen);
    assert!(matches!(
        log.borrow().last(),
        Some(NegotiationEvent::ManualResolved {
            mode: TargetMode::Fullscreen,
            fell_back: false,
            ..
        })
    ));
}

#[test]
fn override_forces_tablet_on_capable_host() {
    let (mut launch, _) = runner(HostProfile::telegram("macos", "9.1"));
    with_launch_override(
        LaunchOverride::new().device(Some(DeviceClass::Tablet)),
        || launch.launch(Signals::new(1512, MAC_UA)).unwrap(),
    );
    assert_eq!(launch.negotiator().phase(), Phase::Requested);
    assert_eq!(launch.negotiator().host().request_count(), 1);
}

#[test]
fn custom_timeout_is_honoured() {
    let config = NegotiatorConfig::default().with_fullscreen_timeout(ms(250));
    let mut launch = StepLaunch::new(ScriptedHost::new(HostProfile::telegram("ios", "8.0")), config);
    launch.launch(Signals::new(390, IPHONE_UA)).unwrap();
    assert_eq!(launch.next_wakeup(), Some(ms(250)));
    launch.set_time(ms(250));
    assert!(launch.step().settled_now);
}
