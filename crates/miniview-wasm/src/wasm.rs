#![forbid(unsafe_code)]

//! `wasm-bindgen` surface and the Telegram WebApp host adapter.
//!
//! ```text
//! WebApp.onEvent ──Closure──► Mailbox ──setTimeout(0)──► driver ──► Negotiator
//!                                                          ▲
//!                                      deadline setTimeout ┘
//! ```
//!
//! Host callbacks never touch the negotiator directly: they queue the event
//! and schedule the driver, so a host that fires synchronously from inside
//! `requestFullscreen` cannot re-enter the state machine. JS `onSettled`
//! callbacks are likewise deferred to their own task.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use js_sys::{Function, Reflect};
use miniview_core::{
    HostAdapter, HostError, HostEvent, HostEventKind, NegotiatorConfig, NegotiatorOptions,
    Signals, SubscriptionId,
};
use miniview_web::{DisplayMode, Negotiator, Phase, TargetMode};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_time::Instant;

use crate::{ViewportSnapshot, timer_delay_ms};

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn js_error_message(value: &JsValue) -> String {
    value
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .or_else(|| value.as_string())
        .unwrap_or_else(|| "unknown host error".to_owned())
}

fn set_timeout(callback: &Function, delay_ms: i32) -> Option<i32> {
    web_sys::window()?
        .set_timeout_with_callback_and_timeout_and_arguments_0(callback, delay_ms)
        .ok()
}

fn clear_timeout(id: i32) {
    if let Some(window) = web_sys::window() {
        window.clear_timeout_with_handle(id);
    }
}

/// Call a JS settlement callback on a fresh task.
fn defer_settled(callback: Function, mode: DisplayMode) {
    let task = Closure::once_into_js(move || {
        if let Err(err) = callback.call1(&JsValue::NULL, &JsValue::from_str(mode.as_str())) {
            tracing::warn!(error = %js_error_message(&err), "onSettled callback threw");
        }
    });
    if set_timeout(task.unchecked_ref(), 0).is_none() {
        tracing::warn!("no window; onSettled callback dropped");
    }
}

/// Host events waiting for the driver.
#[derive(Default)]
struct Mailbox {
    queue: RefCell<VecDeque<HostEvent>>,
    driver: RefCell<Option<Function>>,
    pump_timer: Cell<Option<i32>>,
}

impl Mailbox {
    fn post(&self, event: HostEvent) {
        self.queue.borrow_mut().push_back(event);
        if self.pump_timer.get().is_some() {
            return;
        }
        if let Some(driver) = self.driver.borrow().as_ref() {
            self.pump_timer.set(set_timeout(driver, 0));
        }
    }

    fn take(&self) -> Vec<HostEvent> {
        self.pump_timer.set(None);
        self.queue.borrow_mut().drain(..).collect()
    }

    fn close(&self) {
        if let Some(id) = self.pump_timer.take() {
            clear_timeout(id);
        }
        self.driver.borrow_mut().take();
        self.queue.borrow_mut().clear();
    }
}

struct Listener {
    kind: HostEventKind,
    callback: Closure<dyn FnMut(JsValue)>,
}

/// [`HostAdapter`] over `window.Telegram.WebApp`.
struct TelegramHost {
    webapp: JsValue,
    mailbox: Rc<Mailbox>,
    listeners: BTreeMap<SubscriptionId, Listener>,
    next_id: u64,
}

impl TelegramHost {
    fn from_window(mailbox: Rc<Mailbox>) -> Result<Self, HostError> {
        let window = web_sys::window().ok_or(HostError::Absent)?;
        let webapp = Reflect::get(window.as_ref(), &JsValue::from_str("Telegram"))
            .ok()
            .filter(JsValue::is_object)
            .and_then(|telegram| Reflect::get(&telegram, &JsValue::from_str("WebApp")).ok())
            .filter(JsValue::is_object)
            .ok_or(HostError::Absent)?;
        Ok(Self {
            webapp,
            mailbox,
            listeners: BTreeMap::new(),
            next_id: 1,
        })
    }

    fn prop(&self, name: &str) -> Option<JsValue> {
        Reflect::get(&self.webapp, &JsValue::from_str(name))
            .ok()
            .filter(|v| !v.is_undefined() && !v.is_null())
    }

    fn method(&self, name: &str) -> Option<Function> {
        self.prop(name)?.dyn_into::<Function>().ok()
    }

    fn call0(&self, name: &'static str) -> Result<JsValue, HostError> {
        let f = self.method(name).ok_or(HostError::Unsupported(name))?;
        f.call0(&self.webapp)
            .map_err(|err| HostError::Rejected(js_error_message(&err)))
    }

    fn off_event(&self, listener: &Listener) {
        if let Some(off) = self.method("offEvent") {
            let _ = off.call2(
                &self.webapp,
                &JsValue::from_str(listener.kind.wire_name()),
                listener.callback.as_ref(),
            );
        }
    }
}

impl HostAdapter for TelegramHost {
    fn ready(&mut self) {
        if let Err(err) = self.call0("ready") {
            tracing::warn!(error = %err, "WebApp.ready failed");
        }
    }

    fn expand(&mut self) {
        if let Err(err) = self.call0("expand") {
            tracing::warn!(error = %err, "WebApp.expand failed");
        }
    }

    fn request_fullscreen(&mut self) -> Result<(), HostError> {
        self.call0("requestFullscreen").map(|_| ())
    }

    fn has_request_fullscreen(&self) -> bool {
        self.method("requestFullscreen").is_some()
    }

    fn is_version_at_least(&self, version: &str) -> Option<bool> {
        let query = self.method("isVersionAtLeast")?;
        query
            .call1(&self.webapp, &JsValue::from_str(version))
            .ok()
            .and_then(|v| v.as_bool())
    }

    fn subscribe(&mut self, kind: HostEventKind) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let mailbox = Rc::clone(&self.mailbox);
        let webapp = self.webapp.clone();
        let callback = Closure::<dyn FnMut(JsValue)>::new(move |payload: JsValue| {
            let event = match kind {
                HostEventKind::FullscreenChanged => HostEvent::FullscreenChanged {
                    is_fullscreen: Reflect::get(&webapp, &JsValue::from_str("isFullscreen"))
                        .ok()
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                },
                HostEventKind::FullscreenFailed => HostEvent::FullscreenFailed {
                    error: Reflect::get(&payload, &JsValue::from_str("error"))
                        .ok()
                        .and_then(|v| v.as_string()),
                },
            };
            mailbox.post(event);
        });

        match self.method("onEvent") {
            Some(on) => {
                if let Err(err) = on.call2(
                    &self.webapp,
                    &JsValue::from_str(kind.wire_name()),
                    callback.as_ref(),
                ) {
                    tracing::warn!(event = kind.wire_name(), error = %js_error_message(&err), "onEvent failed");
                }
            }
            None => tracing::warn!(event = kind.wire_name(), "WebApp.onEvent missing"),
        }
        self.listeners.insert(id, Listener { kind, callback });
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(listener) = self.listeners.remove(&id) {
            self.off_event(&listener);
        }
    }

    fn platform(&self) -> Option<String> {
        self.prop("platform")?.as_string()
    }

    fn version(&self) -> Option<String> {
        self.prop("version")?.as_string()
    }

    fn is_fullscreen(&self) -> bool {
        self.prop("isFullscreen")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

impl Drop for TelegramHost {
    fn drop(&mut self) {
        for listener in std::mem::take(&mut self.listeners).into_values() {
            self.off_event(&listener);
        }
    }
}

struct Session {
    negotiator: Negotiator<TelegramHost>,
    origin: Instant,
    driver: Function,
    deadline_timer: Option<i32>,
}

impl Session {
    fn now(&self) -> core::time::Duration {
        self.origin.elapsed()
    }

    /// Re-arm the deadline timer to match the negotiator.
    fn sync_timer(&mut self) {
        if let Some(id) = self.deadline_timer.take() {
            clear_timeout(id);
        }
        if let Some(deadline) = self.negotiator.deadline() {
            let delay = timer_delay_ms(deadline, self.now());
            self.deadline_timer = set_timeout(&self.driver, delay);
        }
    }

    fn drive(&mut self, events: Vec<HostEvent>) {
        let now = self.now();
        for event in events {
            self.negotiator.tick(now);
            self.negotiator.handle_event(event, now);
        }
        self.negotiator.tick(now);
        self.sync_timer();
    }
}

fn run_driver(session: &Weak<RefCell<Session>>, mailbox: &Mailbox) {
    let events = mailbox.take();
    let Some(session) = session.upgrade() else {
        return;
    };
    let Ok(mut session) = session.try_borrow_mut() else {
        // Busy; requeue and try on the next task.
        for event in events {
            mailbox.post(event);
        }
        return;
    };
    session.drive(events);
}

/// Display-mode negotiation for a Telegram mini-app.
#[wasm_bindgen]
pub struct MiniViewport {
    config: NegotiatorConfig,
    mailbox: Rc<Mailbox>,
    session: Option<Rc<RefCell<Session>>>,
    driver: Option<Closure<dyn FnMut()>>,
    pending_callbacks: Vec<Function>,
    destroyed: bool,
}

#[wasm_bindgen]
impl MiniViewport {
    /// Accepts `{ fullscreenTimeoutMs, minFullscreenVersion, mobileBreakpointPx }`;
    /// every field is optional.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<MiniViewport, JsValue> {
        let options: NegotiatorOptions = if options.is_undefined() || options.is_null() {
            NegotiatorOptions::default()
        } else {
            serde_wasm_bindgen::from_value(options).map_err(js_error)?
        };
        let config = NegotiatorConfig::default()
            .apply_options(&options)
            .map_err(js_error)?;
        Ok(Self {
            config,
            mailbox: Rc::new(Mailbox::default()),
            session: None,
            driver: None,
            pending_callbacks: Vec::new(),
            destroyed: false,
        })
    }

    /// Start negotiation. Throws when `Telegram.WebApp` is missing.
    pub fn launch(&mut self) -> Result<String, JsValue> {
        if self.destroyed {
            return Err(js_error("viewport destroyed"));
        }
        if self.session.is_some() {
            return Err(js_error(miniview_web::NegotiationError::AlreadyLaunched));
        }
        let window = web_sys::window().ok_or_else(|| js_error(HostError::Absent))?;
        let host = TelegramHost::from_window(Rc::clone(&self.mailbox)).map_err(js_error)?;

        let viewport_width = window
            .inner_width()
            .ok()
            .and_then(|w| w.as_f64())
            .map_or(0, |w| w.max(0.0) as u32);
        let user_agent = window.navigator().user_agent().unwrap_or_default();
        let signals = Signals::new(viewport_width, user_agent);

        let session = Rc::new_cyclic(|weak: &Weak<RefCell<Session>>| {
            let weak = weak.clone();
            let mailbox = Rc::clone(&self.mailbox);
            let driver = Closure::<dyn FnMut()>::new(move || run_driver(&weak, &mailbox));
            let driver_fn: Function = driver.as_ref().unchecked_ref::<Function>().clone();
            self.driver = Some(driver);
            RefCell::new(Session {
                negotiator: Negotiator::new(host, self.config.clone()),
                origin: Instant::now(),
                driver: driver_fn,
                deadline_timer: None,
            })
        });

        let phase = {
            let mut s = session.borrow_mut();
            *self.mailbox.driver.borrow_mut() = Some(s.driver.clone());
            for callback in self.pending_callbacks.drain(..) {
                s.negotiator
                    .on_settled(move |mode| defer_settled(callback, mode));
            }
            let now = s.now();
            let phase = s.negotiator.launch(signals, now).map_err(js_error)?;
            s.sync_timer();
            phase
        };
        self.session = Some(session);
        Ok(phase.as_str().to_owned())
    }

    #[wasm_bindgen(js_name = settledMode)]
    pub fn settled_mode(&self) -> String {
        self.read(|n| n.settled_mode().as_str(), DisplayMode::Unknown.as_str())
            .to_owned()
    }

    #[wasm_bindgen(js_name = currentMode)]
    pub fn current_mode(&self) -> String {
        self.read(|n| n.current_mode().as_str(), DisplayMode::Unknown.as_str())
            .to_owned()
    }

    pub fn phase(&self) -> String {
        self.read(|n| n.phase().as_str(), Phase::Idle.as_str())
            .to_owned()
    }

    /// Full state as a plain JS object.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        let snap = self
            .session
            .as_ref()
            .and_then(|s| s.try_borrow().ok().map(|s| ViewportSnapshot::of(&s.negotiator)))
            .unwrap_or_else(ViewportSnapshot::idle);
        serde_wasm_bindgen::to_value(&snap).map_err(js_error)
    }

    /// Call `callback(mode)` once the launch settles; immediately (on the
    /// next task) if it already has.
    #[wasm_bindgen(js_name = onSettled)]
    pub fn on_settled(&mut self, callback: Function) {
        if self.destroyed {
            return;
        }
        match &self.session {
            Some(session) => match session.try_borrow_mut() {
                Ok(mut s) => s
                    .negotiator
                    .on_settled(move |mode| defer_settled(callback, mode)),
                Err(_) => tracing::warn!("onSettled during negotiation step ignored"),
            },
            None => self.pending_callbacks.push(callback),
        }
    }

    /// Switch to `"fullscreen"` or `"expanded"` after settlement.
    #[wasm_bindgen(js_name = requestMode)]
    pub fn request_mode(&mut self, mode: &str) -> Result<(), JsValue> {
        let mode = TargetMode::parse(mode)
            .ok_or_else(|| js_error(format!("unknown display mode {mode:?}")))?;
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| js_error(miniview_web::NegotiationError::NotSettled))?;
        let mut s = session.try_borrow_mut().map_err(js_error)?;
        let now = s.now();
        s.negotiator.request_mode(mode, now).map_err(js_error)
    }

    /// Release host listeners and timers. The viewport is inert afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.mailbox.close();
        if let Some(session) = self.session.take()
            && let Ok(mut s) = session.try_borrow_mut()
        {
            let now = s.now();
            s.negotiator.abort(now);
            if let Some(id) = s.deadline_timer.take() {
                clear_timeout(id);
            }
        }
        self.driver = None;
        self.pending_callbacks.clear();
    }
}

impl MiniViewport {
    fn read(
        &self,
        f: impl FnOnce(&Negotiator<TelegramHost>) -> &'static str,
        default: &'static str,
    ) -> &'static str {
        self.session
            .as_ref()
            .and_then(|s| s.try_borrow().ok().map(|s| f(&s.negotiator)))
            .unwrap_or(default)
    }
}

impl Drop for MiniViewport {
    fn drop(&mut self) {
        self.destroy();
    }
}
