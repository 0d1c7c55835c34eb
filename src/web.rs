//! Browser implementations of the capability traits.
//!
//! Frame, timer, intersection and media-query callbacks are routed to one
//! host-supplied dispatch closure as [`Wakeup`] values; the host forwards
//! each to the recorder, trigger, boundary or detector that owns the handle.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    Element, HtmlCanvasElement, IntersectionObserver, IntersectionObserverEntry,
    IntersectionObserverInit, MediaQueryList, MediaQueryListEvent, Window,
};

use crate::env::{Environment, FrameRateEstimate, Viewport};
use crate::error::{MotionError, MotionResult, SinkError};
use crate::intersection::{IntersectionEntry, ObserverHandle, ViewportObserver};
use crate::metrics::TARGET_FPS;
use crate::preference::{ListenerHandle, MediaQuery, REDUCED_MOTION_QUERY};
use crate::scheduler::{FrameHandle, Scheduler, TimerHandle, Wakeup};
use crate::sink::{AnalyticsSink, ErrorReport, ErrorTracker, Payload, PayloadValue};

/// Host callback receiving every wakeup.
pub type Dispatch = Rc<dyn Fn(Wakeup)>;

fn js_err(value: JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}

fn window() -> MotionResult<Window> {
    web_sys::window().ok_or_else(|| MotionError::unavailable("no window available"))
}

fn next_id(counter: &Cell<u64>) -> u64 {
    let id = counter.get() + 1;
    counter.set(id);
    id
}

/// [`Environment`] backed by `window`.
///
/// The frame-rate estimate is fed by a [`WebScheduler`] sharing
/// [`WebEnvironment::frame_rate`]; until it has samples the environment
/// reports [`TARGET_FPS`].
#[derive(Clone, Debug)]
pub struct WebEnvironment {
    window: Window,
    frame_rate: Rc<FrameRateEstimate>,
}

impl WebEnvironment {
    /// Bind to the global `window`.
    pub fn new() -> MotionResult<Self> {
        Ok(Self {
            window: window()?,
            frame_rate: Rc::new(FrameRateEstimate::new()),
        })
    }

    /// Shared estimate behind [`Environment::estimated_fps`].
    pub fn frame_rate(&self) -> Rc<FrameRateEstimate> {
        self.frame_rate.clone()
    }
}

impl Environment for WebEnvironment {
    fn now_ms(&self) -> f64 {
        self.window
            .performance()
            .map(|p| p.now())
            .unwrap_or_else(js_sys::Date::now)
    }

    fn viewport(&self) -> Viewport {
        let width = self.window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        let height = self.window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        Viewport::new(width, height)
    }

    fn prefers_reduced_motion(&self) -> bool {
        matches!(self.window.match_media(REDUCED_MOTION_QUERY), Ok(Some(list)) if list.matches())
    }

    fn supports_webgl(&self) -> bool {
        let Some(document) = self.window.document() else {
            return false;
        };
        let Ok(canvas) = document
            .create_element("canvas")
            .map_err(|_| ())
            .and_then(|el| el.dyn_into::<HtmlCanvasElement>().map_err(|_| ()))
        else {
            return false;
        };
        ["webgl", "experimental-webgl"]
            .iter()
            .any(|kind| matches!(canvas.get_context(kind), Ok(Some(_))))
    }

    fn memory_usage(&self) -> Option<f64> {
        // performance.memory is non-standard and absent outside Chromium
        let performance = self.window.performance()?;
        let memory = Reflect::get(&performance, &JsValue::from_str("memory")).ok()?;
        if memory.is_undefined() {
            return None;
        }
        Reflect::get(&memory, &JsValue::from_str("usedJSHeapSize"))
            .ok()?
            .as_f64()
    }

    fn user_agent(&self) -> Option<String> {
        self.window.navigator().user_agent().ok()
    }

    fn estimated_fps(&self) -> Option<f64> {
        Some(self.frame_rate.fps().unwrap_or(TARGET_FPS))
    }
}

type FrameCallback = Closure<dyn FnMut(f64)>;
type TimerCallback = Closure<dyn FnMut()>;

/// [`Scheduler`] on `requestAnimationFrame` and `setTimeout`.
///
/// Each pending callback is owned by its map entry, so cancelling a handle
/// frees the closure along with the browser registration.
pub struct WebScheduler {
    window: Window,
    dispatch: Dispatch,
    next_id: Cell<u64>,
    frames: Rc<RefCell<HashMap<u64, (i32, FrameCallback)>>>,
    timers: Rc<RefCell<HashMap<u64, (i32, TimerCallback)>>>,
    sampler: Option<Rc<FrameRateEstimate>>,
}

impl WebScheduler {
    /// Bind to the global `window`, routing wakeups to `dispatch`.
    pub fn new(dispatch: Dispatch) -> MotionResult<Self> {
        Ok(Self {
            window: window()?,
            dispatch,
            next_id: Cell::new(0),
            frames: Rc::new(RefCell::new(HashMap::new())),
            timers: Rc::new(RefCell::new(HashMap::new())),
            sampler: None,
        })
    }

    /// Record every delivered frame timestamp into `estimate`.
    pub fn with_frame_sampler(mut self, estimate: Rc<FrameRateEstimate>) -> Self {
        self.sampler = Some(estimate);
        self
    }

    /// Number of frame and timer callbacks still registered.
    pub fn pending(&self) -> usize {
        self.frames.borrow().len() + self.timers.borrow().len()
    }
}

impl Scheduler for WebScheduler {
    fn request_frame(&self) -> FrameHandle {
        let id = next_id(&self.next_id);
        let handle = FrameHandle(id);
        let dispatch = self.dispatch.clone();
        let sampler = self.sampler.clone();
        let frames: Weak<_> = Rc::downgrade(&self.frames);

        let callback: FrameCallback = Closure::once(move |timestamp: f64| {
            // keep the entry alive until dispatch returns
            let entry = frames.upgrade().and_then(|f| f.borrow_mut().remove(&id));
            if let Some(sampler) = &sampler {
                sampler.record(timestamp);
            }
            dispatch(Wakeup::Frame(handle));
            drop(entry);
        });
        match self.window.request_animation_frame(callback.as_ref().unchecked_ref()) {
            Ok(raf_id) => {
                self.frames.borrow_mut().insert(id, (raf_id, callback));
            }
            Err(err) => {
                tracing::debug!(error = %js_err(err), "requestAnimationFrame failed");
            }
        }
        handle
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        let entry = self.frames.borrow_mut().remove(&handle.0);
        if let Some((raf_id, _callback)) = entry {
            let _ = self.window.cancel_animation_frame(raf_id);
        }
    }

    fn set_timeout(&self, delay_ms: u32) -> TimerHandle {
        let id = next_id(&self.next_id);
        let handle = TimerHandle(id);
        let dispatch = self.dispatch.clone();
        let timers: Weak<_> = Rc::downgrade(&self.timers);

        let callback: TimerCallback = Closure::once(move || {
            let entry = timers.upgrade().and_then(|t| t.borrow_mut().remove(&id));
            dispatch(Wakeup::Timer(handle));
            drop(entry);
        });
        let delay = i32::try_from(delay_ms).unwrap_or(i32::MAX);
        let registered = self.window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            delay,
        );
        match registered {
            Ok(timeout_id) => {
                self.timers.borrow_mut().insert(id, (timeout_id, callback));
            }
            Err(err) => tracing::debug!(error = %js_err(err), "setTimeout failed"),
        }
        handle
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        let entry = self.timers.borrow_mut().remove(&handle.0);
        if let Some((timeout_id, _callback)) = entry {
            self.window.clear_timeout_with_handle(timeout_id);
        }
    }
}

type EntriesCallback = Closure<dyn FnMut(Array, IntersectionObserver)>;

/// [`ViewportObserver`] on `IntersectionObserver` for one element.
pub struct WebViewportObserver {
    element: Element,
    dispatch: Dispatch,
    next_id: Cell<u64>,
    observers: RefCell<HashMap<u64, (IntersectionObserver, EntriesCallback)>>,
}

impl WebViewportObserver {
    /// Observe `element`, routing entries to `dispatch`.
    pub fn new(element: Element, dispatch: Dispatch) -> Self {
        Self {
            element,
            dispatch,
            next_id: Cell::new(0),
            observers: RefCell::new(HashMap::new()),
        }
    }
}

impl ViewportObserver for WebViewportObserver {
    fn observe(&self, threshold: f64, root_margin: &str) -> MotionResult<ObserverHandle> {
        let handle = ObserverHandle(next_id(&self.next_id));
        let dispatch = self.dispatch.clone();

        let callback: EntriesCallback =
            Closure::new(move |entries: Array, _observer: IntersectionObserver| {
                let entries = entries
                    .iter()
                    .filter_map(|value| value.dyn_into::<IntersectionObserverEntry>().ok())
                    .map(|entry| IntersectionEntry {
                        is_intersecting: entry.is_intersecting(),
                        intersection_ratio: entry.intersection_ratio(),
                    })
                    .collect();
                dispatch(Wakeup::Intersection {
                    observer: handle,
                    entries,
                });
            });

        let init = IntersectionObserverInit::new();
        init.set_threshold(&JsValue::from_f64(threshold));
        init.set_root_margin(root_margin);

        let observer =
            IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)
                .map_err(|err| MotionError::observer(js_err(err)))?;
        observer.observe(&self.element);
        self.observers.borrow_mut().insert(handle.0, (observer, callback));
        Ok(handle)
    }

    fn disconnect(&self, handle: ObserverHandle) {
        if let Some((observer, _callback)) = self.observers.borrow_mut().remove(&handle.0) {
            observer.disconnect();
        }
    }
}

type ChangeCallback = Closure<dyn Fn(MediaQueryListEvent)>;

/// [`MediaQuery`] on `matchMedia("(prefers-reduced-motion: reduce)")`.
pub struct WebMediaQuery {
    list: MediaQueryList,
    dispatch: Dispatch,
    next_id: Cell<u64>,
    listeners: RefCell<HashMap<u64, ChangeCallback>>,
}

impl WebMediaQuery {
    /// Bind to the reduced-motion media query, routing changes to `dispatch`.
    pub fn reduced_motion(dispatch: Dispatch) -> MotionResult<Self> {
        let list = window()?
            .match_media(REDUCED_MOTION_QUERY)
            .map_err(|err| MotionError::unavailable(js_err(err)))?
            .ok_or_else(|| MotionError::unavailable("matchMedia returned null"))?;
        Ok(Self {
            list,
            dispatch,
            next_id: Cell::new(0),
            listeners: RefCell::new(HashMap::new()),
        })
    }
}

impl MediaQuery for WebMediaQuery {
    fn matches(&self) -> bool {
        self.list.matches()
    }

    fn subscribe(&self) -> ListenerHandle {
        let handle = ListenerHandle(next_id(&self.next_id));
        let dispatch = self.dispatch.clone();
        let callback: ChangeCallback = Closure::new(move |event: MediaQueryListEvent| {
            dispatch(Wakeup::ReducedMotion(event.matches()));
        });

        if let Err(err) = self
            .list
            .add_event_listener_with_callback("change", callback.as_ref().unchecked_ref())
        {
            tracing::debug!(error = %js_err(err), "matchMedia listener not attached");
        }
        self.listeners.borrow_mut().insert(handle.0, callback);
        handle
    }

    fn unsubscribe(&self, handle: ListenerHandle) {
        if let Some(callback) = self.listeners.borrow_mut().remove(&handle.0) {
            let _ = self
                .list
                .remove_event_listener_with_callback("change", callback.as_ref().unchecked_ref());
        }
    }
}

fn payload_value(value: &PayloadValue) -> JsValue {
    match value {
        PayloadValue::Str(s) => JsValue::from_str(s),
        PayloadValue::Num(n) => JsValue::from_f64(*n),
    }
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), SinkError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|err| SinkError::failed(js_err(err)))
}

fn payload_object(payload: &Payload) -> Result<Object, SinkError> {
    let object = Object::new();
    for (key, value) in payload.iter() {
        set(&object, key, &payload_value(value))?;
    }
    Ok(object)
}

/// Look up an optional global; `Ok(None)` when it is absent.
fn global(target: &JsValue, name: &str) -> Result<Option<JsValue>, SinkError> {
    let value = Reflect::get(target, &JsValue::from_str(name))
        .map_err(|err| SinkError::failed(js_err(err)))?;
    if value.is_undefined() || value.is_null() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

/// [`AnalyticsSink`] calling `window.gtag('event', name, params)`.
///
/// A page without `gtag` is a no-op.
#[derive(Clone, Debug)]
pub struct GtagSink {
    window: Window,
}

impl GtagSink {
    /// Bind to the global `window`.
    pub fn new() -> MotionResult<Self> {
        Ok(Self { window: window()? })
    }
}

impl AnalyticsSink for GtagSink {
    fn track(&self, event: &str, payload: &Payload) -> Result<(), SinkError> {
        let Some(gtag) = global(&self.window, "gtag")? else {
            return Ok(());
        };
        let gtag = gtag
            .dyn_into::<Function>()
            .map_err(|_| SinkError::malformed("window.gtag is not a function"))?;
        let params = payload_object(payload)?;
        let (kind, name) = (JsValue::from_str("event"), JsValue::from_str(event));
        gtag.call3(&JsValue::NULL, &kind, &name, &params)
            .map(|_| ())
            .map_err(|err| SinkError::failed(js_err(err)))
    }
}

/// [`ErrorTracker`] calling `window.Sentry.captureException(error, context)`
/// with tags, contexts, level and fingerprint in the capture context.
///
/// A page without Sentry is a no-op.
///
/// ```no_run
/// use std::rc::Rc;
/// use zoptal_motion_core::web::{SentryTracker, WebEnvironment, WebScheduler};
/// use zoptal_motion_core::Host;
///
/// let env = WebEnvironment::new()?;
/// let scheduler = WebScheduler::new(Rc::new(|_wakeup| {}))?
///     .with_frame_sampler(env.frame_rate());
/// let host = Host::new(Rc::new(env), Rc::new(scheduler))
///     .with_error_tracker(Rc::new(SentryTracker::new()?));
/// # let _ = host;
/// # Ok::<(), zoptal_motion_core::MotionError>(())
/// ```
#[derive(Clone, Debug)]
pub struct SentryTracker {
    window: Window,
}

impl SentryTracker {
    /// Bind to the global `window`.
    pub fn new() -> MotionResult<Self> {
        Ok(Self { window: window()? })
    }

    fn capture_context(report: &ErrorReport) -> Result<Object, SinkError> {
        let scope = &report.scope;

        let tags = Object::new();
        for (key, value) in &scope.tags {
            set(&tags, key, &JsValue::from_str(value))?;
        }

        let contexts = Object::new();
        for (name, payload) in &scope.contexts {
            let block = payload_object(payload)?;
            set(&contexts, name, &block)?;
        }

        let fingerprint: Array = scope.fingerprint.iter().map(|s| JsValue::from_str(s)).collect();

        let context = Object::new();
        set(&context, "tags", &tags)?;
        set(&context, "contexts", &contexts)?;
        set(&context, "level", &JsValue::from_str(scope.level.as_str()))?;
        set(&context, "fingerprint", &fingerprint)?;
        Ok(context)
    }
}

impl ErrorTracker for SentryTracker {
    fn capture(&self, report: &ErrorReport) -> Result<(), SinkError> {
        let Some(sentry) = global(&self.window, "Sentry")? else {
            return Ok(());
        };
        let capture = global(&sentry, "captureException")?
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| SinkError::malformed("Sentry.captureException is not a function"))?;

        let error = js_sys::Error::new(&report.error.message);
        error.set_name(&report.error.kind);
        let context = Self::capture_context(report)?;

        capture
            .call2(&sentry, &error, &context)
            .map(|_| ())
            .map_err(|err| SinkError::failed(js_err(err)))
    }
}
