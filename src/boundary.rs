//! Supervised rendering of animated subtrees with bounded retry.
//!
//! A subtree render is a `Result`: `Ok(content)` passes through, `Err` moves
//! the boundary into the failed phase, reports diagnostics, and from then on
//! the boundary renders a fallback until a retry, a reset-key change, or a
//! manual reset brings it back.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::host::Host;
use crate::metrics::TARGET_FPS;
use crate::scheduler::TimerHandle;
use crate::sink::{forward_event, forward_report, ErrorReport, Payload, Scope, Severity};

/// Analytics event name for a captured failure.
pub const ERROR_EVENT: &str = "animation_error";

/// First fingerprint element for failures caught by [`ErrorBoundary`].
pub const BOUNDARY_FINGERPRINT_TAG: &str = "animation-error-boundary";

/// First fingerprint element for failures reported through [`ErrorHandler`].
pub const HANDLER_FINGERPRINT_TAG: &str = "animation-error-handler";

const FINGERPRINT_MESSAGE_CHARS: usize = 50;
const BASE_RETRY_DELAY_MS: u32 = 100;
const MAX_RETRY_DELAY_MS: u32 = 1000;

/// Backoff before retry number `retry_count + 1`: `min(1000, 100 * 2^n)` ms.
///
/// ```rust
/// use zoptal_motion_core::retry_delay_ms;
///
/// let delays: Vec<u32> = (0..6).map(retry_delay_ms).collect();
/// assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
/// ```
pub fn retry_delay_ms(retry_count: u32) -> u32 {
    BASE_RETRY_DELAY_MS
        .saturating_mul(2u32.saturating_pow(retry_count))
        .min(MAX_RETRY_DELAY_MS)
}

/// A failure raised while rendering an animated subtree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedError {
    /// Error type name, used for grouping
    pub kind: String,
    pub message: String,
    /// Where in the component tree the failure happened
    pub component_stack: Option<String>,
}

impl CapturedError {
    /// Build an error from a kind and message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            component_stack: None,
        }
    }

    /// Attach the component stack of the failing subtree.
    pub fn with_component_stack(mut self, stack: impl Into<String>) -> Self {
        self.component_stack = Some(stack.into());
        self
    }

    /// Capture any error value, using its type name as the kind.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let full = std::any::type_name::<E>();
        let kind = full.rsplit("::").next().unwrap_or(full);
        Self::new(kind, err.to_string())
    }

    /// Capture a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::new("Panic", message)
    }

    /// Message cut to the length used in fingerprints.
    pub fn truncated_message(&self) -> String {
        self.message.chars().take(FINGERPRINT_MESSAGE_CHARS).collect()
    }
}

impl std::fmt::Display for CapturedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CapturedError {}

/// Boundary configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BoundaryConfig {
    pub animation_name: String,
    /// Automatic/manual retries allowed before the failure is terminal
    pub max_retries: u32,
    /// Reset when any reset key changes
    pub reset_on_props_change: bool,
    pub reset_keys: Vec<String>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            animation_name: "unknown".to_string(),
            max_retries: 1,
            reset_on_props_change: false,
            reset_keys: Vec::new(),
        }
    }
}

impl BoundaryConfig {
    /// Default config for one named animation.
    pub fn named(animation_name: impl Into<String>) -> Self {
        Self {
            animation_name: animation_name.into(),
            ..Self::default()
        }
    }
}

/// Coarse phase of a boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryPhase {
    Healthy,
    Failed,
}

/// State owned by one boundary instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorBoundaryState {
    pub has_error: bool,
    pub error: Option<CapturedError>,
    pub retry_count: u32,
    pub error_id: String,
}

impl ErrorBoundaryState {
    fn healthy(retry_count: u32) -> Self {
        Self {
            has_error: false,
            error: None,
            retry_count,
            error_id: new_error_id(),
        }
    }
}

fn new_error_id() -> String {
    format!("animation-error-{}", uuid::Uuid::new_v4())
}

/// Retry availability handed to a fallback renderer.
///
/// The fallback shows a control from this; activating it should call
/// [`ErrorBoundary::request_retry`] or [`ErrorBoundary::retry_now`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryTrigger {
    /// Retries performed so far
    pub retry_count: u32,
    pub max_retries: u32,
    /// Backoff the next retry would wait
    pub delay_ms: u32,
    /// A retry is already scheduled
    pub pending: bool,
}

impl RetryTrigger {
    #[inline]
    pub fn is_available(&self) -> bool {
        self.retry_count < self.max_retries && !self.pending
    }

    /// One-based number of the next attempt.
    #[inline]
    pub fn next_attempt(&self) -> u32 {
        self.retry_count + 1
    }
}

/// Manual retry control of the built-in fallback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryControl {
    pub attempt: u32,
    pub max: u32,
    pub label: String,
}

/// Accessible fallback rendered when no custom fallback is supplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltinFallback {
    /// ARIA role
    pub role: &'static str,
    pub title: String,
    pub message: String,
    /// Present only while retries remain
    pub retry: Option<RetryControl>,
}

/// What to render while failed, in priority order.
pub enum Fallback<T> {
    /// Called with the error and the retry availability
    Render(Box<dyn Fn(&CapturedError, &RetryTrigger) -> T>),
    Static(T),
    Builtin,
}

impl<T> Fallback<T> {
    /// Fallback built from the error and the retry trigger.
    pub fn render(f: impl Fn(&CapturedError, &RetryTrigger) -> T + 'static) -> Self {
        Fallback::Render(Box::new(f))
    }
}

impl<T> Default for Fallback<T> {
    fn default() -> Self {
        Fallback::Builtin
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fallback::Render(_) => f.write_str("Fallback::Render(..)"),
            Fallback::Static(value) => f.debug_tuple("Fallback::Static").field(value).finish(),
            Fallback::Builtin => f.write_str("Fallback::Builtin"),
        }
    }
}

/// Output of one supervised render pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rendered<T> {
    /// The subtree rendered normally
    Content(T),
    /// A caller-supplied fallback
    Fallback(T),
    Builtin(BuiltinFallback),
}

impl<T> Rendered<T> {
    #[inline]
    pub fn is_content(&self) -> bool {
        matches!(self, Rendered::Content(_))
    }
}

/// Build the error-tracker report for a captured failure.
fn diagnostic_report(
    host: &Host,
    component: &str,
    fingerprint_tag: &str,
    animation_name: &str,
    error: &CapturedError,
    retry_count: u32,
    error_id: &str,
) -> ErrorReport {
    let env = &host.env;
    let viewport = env.viewport();

    let mut scope = Scope {
        level: Severity::Error,
        fingerprint: vec![
            fingerprint_tag.to_string(),
            animation_name.to_string(),
            error.kind.clone(),
            error.truncated_message(),
        ],
        ..Scope::default()
    };
    scope.set_tag("component", component);
    scope.set_tag("animation", animation_name);
    scope.set_tag("error_boundary", "true");

    scope.set_context(
        "animation",
        Payload::new()
            .with_str("name", animation_name)
            .with_num("retry_count", f64::from(retry_count))
            .with_str("error_id", error_id)
            .with_str("component_stack", error.component_stack.clone().unwrap_or_default()),
    );

    let mut environment = Payload::new()
        .with_num("viewport_width", viewport.width)
        .with_num("viewport_height", viewport.height)
        .with_bool("webgl_supported", env.supports_webgl())
        .with_bool("reduced_motion", env.prefers_reduced_motion())
        .with_num("estimated_fps", env.estimated_fps().unwrap_or(TARGET_FPS));
    if let Some(ua) = env.user_agent() {
        environment = environment.with_str("user_agent", ua);
    }
    scope.set_context("environment", environment);

    ErrorReport {
        error: error.clone(),
        scope,
    }
}

fn error_event_payload(animation_name: &str, error: &CapturedError, retry_count: u32) -> Payload {
    Payload::new()
        .with_str("animation_name", animation_name)
        .with_str("error_type", error.kind.as_str())
        .with_str("error_message", error.truncated_message())
        .with_num("retry_count", f64::from(retry_count))
}

/// Forward a failure to both sinks. Never panics, never fails.
fn report_failure(
    host: &Host,
    component: &str,
    fingerprint_tag: &str,
    animation_name: &str,
    error: &CapturedError,
    retry_count: u32,
    error_id: &str,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let report = diagnostic_report(
            host,
            component,
            fingerprint_tag,
            animation_name,
            error,
            retry_count,
            error_id,
        );
        forward_report(host.errors.as_ref(), &report);
        forward_event(
            host.analytics.as_ref(),
            ERROR_EVENT,
            &error_event_payload(animation_name, error, retry_count),
        );
    }));
    if outcome.is_err() {
        tracing::debug!(
            animation = animation_name,
            original = %error,
            "collecting diagnostics panicked"
        );
    }
}

/// Supervises renders of one animated subtree.
///
/// ## Example
///
/// ```rust
/// use zoptal_motion_core::{
///     BoundaryConfig, CapturedError, ErrorBoundary, Fallback, Host, Rendered,
/// };
///
/// let mut boundary: ErrorBoundary<String> =
///     ErrorBoundary::new(BoundaryConfig::named("hero"), Fallback::Builtin, Host::default());
///
/// let out = boundary.render(|| Ok("<canvas/>".to_string()));
/// assert_eq!(out, Rendered::Content("<canvas/>".to_string()));
///
/// let out = boundary.render(|| Err(CapturedError::new("TypeError", "x is undefined")));
/// match out {
///     Rendered::Builtin(fallback) => assert!(fallback.retry.is_some()),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug)]
pub struct ErrorBoundary<T> {
    config: BoundaryConfig,
    fallback: Fallback<T>,
    host: Host,
    state: ErrorBoundaryState,
    pending_retry: Option<TimerHandle>,
    prev_reset_keys: Vec<String>,
}

impl<T> ErrorBoundary<T> {
    pub fn new(config: BoundaryConfig, fallback: Fallback<T>, host: Host) -> Self {
        let prev_reset_keys = config.reset_keys.clone();
        Self {
            config,
            fallback,
            host,
            state: ErrorBoundaryState::healthy(0),
            pending_retry: None,
            prev_reset_keys,
        }
    }

    #[inline]
    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> &ErrorBoundaryState {
        &self.state
    }

    #[inline]
    pub fn phase(&self) -> BoundaryPhase {
        if self.state.has_error {
            BoundaryPhase::Failed
        } else {
            BoundaryPhase::Healthy
        }
    }

    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.state.retry_count
    }

    #[inline]
    pub fn has_retry_pending(&self) -> bool {
        self.pending_retry.is_some()
    }

    /// Trigger the fallback can offer to the user.
    pub fn retry_trigger(&self) -> RetryTrigger {
        RetryTrigger {
            retry_count: self.state.retry_count,
            max_retries: self.config.max_retries,
            delay_ms: retry_delay_ms(self.state.retry_count),
            pending: self.pending_retry.is_some(),
        }
    }

    /// Whether a retry may still be requested.
    #[inline]
    pub fn can_retry(&self) -> bool {
        self.state.has_error && self.state.retry_count < self.config.max_retries
    }

    /// Record a failure from the subtree.
    ///
    /// Ignored while already failed; the first failure is the one reported.
    #[tracing::instrument(
        skip_all,
        fields(animation = %self.config.animation_name, kind = %error.kind)
    )]
    pub fn capture(&mut self, error: CapturedError) {
        if self.state.has_error {
            return;
        }

        self.state.has_error = true;
        self.state.error_id = new_error_id();
        report_failure(
            &self.host,
            "AnimationErrorBoundary",
            BOUNDARY_FINGERPRINT_TAG,
            &self.config.animation_name,
            &error,
            self.state.retry_count,
            &self.state.error_id,
        );
        self.state.error = Some(error);

        if self.state.retry_count >= self.config.max_retries {
            tracing::warn!(
                retry_count = self.state.retry_count,
                max_retries = self.config.max_retries,
                "animation retries exhausted"
            );
        }
    }

    /// Schedule a retry after the backoff delay.
    ///
    /// Returns the delay, or `None` if no retry is allowed right now.
    pub fn request_retry(&mut self) -> Option<u32> {
        if !self.can_retry() || self.pending_retry.is_some() {
            return None;
        }
        let delay = retry_delay_ms(self.state.retry_count);
        self.pending_retry = Some(self.host.scheduler.set_timeout(delay));
        Some(delay)
    }

    /// Handle a timer expiry. Returns true if a retry was applied.
    pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
        if self.pending_retry != Some(handle) {
            return false;
        }
        self.pending_retry = None;
        self.apply_retry()
    }

    /// Retry immediately, skipping the backoff.
    pub fn retry_now(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.cancel_pending();
        self.apply_retry()
    }

    fn apply_retry(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.state = ErrorBoundaryState::healthy(self.state.retry_count + 1);
        true
    }

    /// Feed the current reset keys.
    ///
    /// With `reset_on_props_change`, a failed boundary whose keys differ
    /// from the previous call resets unconditionally. Returns true on reset.
    pub fn update_reset_keys(&mut self, keys: Vec<String>) -> bool {
        let changed = keys != self.prev_reset_keys;
        self.prev_reset_keys = keys.clone();
        self.config.reset_keys = keys;

        if changed && self.config.reset_on_props_change && self.state.has_error {
            self.reset();
            return true;
        }
        false
    }

    /// Return to healthy with the retry budget restored.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.state = ErrorBoundaryState::healthy(0);
    }

    /// Release the pending retry timer, if any.
    pub fn unmount(&mut self) {
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        if let Some(timer) = self.pending_retry.take() {
            self.host.scheduler.clear_timeout(timer);
        }
    }
}

impl<T: Clone> ErrorBoundary<T> {
    /// Run one render pass.
    ///
    /// Children are evaluated only while healthy.
    pub fn render<F>(&mut self, children: F) -> Rendered<T>
    where
        F: FnOnce() -> Result<T, CapturedError>,
    {
        if !self.state.has_error {
            match children() {
                Ok(content) => return Rendered::Content(content),
                Err(error) => self.capture(error),
            }
        }
        self.render_fallback()
    }

    /// Like [`ErrorBoundary::render`], also converting a panic in the
    /// children into a captured error.
    pub fn render_catching<F>(&mut self, children: F) -> Rendered<T>
    where
        F: FnOnce() -> Result<T, CapturedError>,
    {
        self.render(|| {
            catch_unwind(AssertUnwindSafe(children))
                .unwrap_or_else(|payload| Err(CapturedError::from_panic(payload)))
        })
    }

    /// Fallback for the current failure.
    pub fn render_fallback(&self) -> Rendered<T> {
        let trigger = self.retry_trigger();
        match (&self.fallback, &self.state.error) {
            (Fallback::Render(f), Some(error)) => Rendered::Fallback(f(error, &trigger)),
            (Fallback::Static(value), _) => Rendered::Fallback(value.clone()),
            _ => Rendered::Builtin(self.builtin_fallback(&trigger)),
        }
    }

    fn builtin_fallback(&self, trigger: &RetryTrigger) -> BuiltinFallback {
        let retry = (trigger.retry_count < trigger.max_retries).then(|| RetryControl {
            attempt: trigger.next_attempt(),
            max: trigger.max_retries,
            label: format!("Try Again ({}/{})", trigger.next_attempt(), trigger.max_retries),
        });
        BuiltinFallback {
            role: "alert",
            title: "Animation unavailable".to_string(),
            message: "This animation could not be displayed. \
                      The rest of the page is still available."
                .to_string(),
            retry,
        }
    }
}

impl<T> Drop for ErrorBoundary<T> {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

/// Reports failures that happen outside a render pass (event handlers,
/// async work) with the same diagnostics a boundary sends.
#[derive(Debug)]
pub struct ErrorHandler {
    animation_name: String,
    host: Host,
    last_error: Option<CapturedError>,
}

impl ErrorHandler {
    pub fn new(animation_name: impl Into<String>, host: Host) -> Self {
        Self {
            animation_name: animation_name.into(),
            host,
            last_error: None,
        }
    }

    /// Report and remember a failure.
    pub fn report(&mut self, error: CapturedError) {
        report_failure(
            &self.host,
            "AnimationErrorHandler",
            HANDLER_FINGERPRINT_TAG,
            &self.animation_name,
            &error,
            0,
            &new_error_id(),
        );
        self.last_error = Some(error);
    }

    #[inline]
    pub fn last_error(&self) -> Option<&CapturedError> {
        self.last_error.as_ref()
    }

    /// Forget the last reported error.
    pub fn clear(&mut self) {
        self.last_error = None;
    }
}
