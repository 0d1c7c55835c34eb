//! Ambient runtime environment: clock, viewport and capability probes.

use std::cell::{Cell, RefCell};

/// Viewport dimensions in CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Create a new viewport.
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Read-only view of the environment an animation runs in.
///
/// Every probe is optional in practice: an implementation that cannot answer
/// returns the neutral value (no reduced motion, no WebGL, no memory figure).
pub trait Environment {
    /// Monotonic time in milliseconds.
    fn now_ms(&self) -> f64;

    /// Current viewport size.
    fn viewport(&self) -> Viewport;

    /// Whether the user asked the OS for reduced motion.
    fn prefers_reduced_motion(&self) -> bool;

    /// Whether a 3D rendering context can be acquired.
    fn supports_webgl(&self) -> bool {
        false
    }

    /// Used heap size in bytes, when the runtime exposes it.
    fn memory_usage(&self) -> Option<f64> {
        None
    }

    /// Browser user agent, when there is one.
    fn user_agent(&self) -> Option<String> {
        None
    }

    /// Coarse frame-rate estimate for diagnostics.
    fn estimated_fps(&self) -> Option<f64> {
        None
    }
}

/// Rolling frame-rate estimate fed from frame timestamps.
///
/// Each interval between consecutive timestamps is folded into an
/// exponential moving average.
///
/// ```rust
/// use zoptal_motion_core::FrameRateEstimate;
///
/// let estimate = FrameRateEstimate::new();
/// assert_eq!(estimate.fps(), None);
///
/// for i in 0..10 {
///     estimate.record(f64::from(i) * 20.0);
/// }
/// assert!((estimate.fps().unwrap() - 50.0).abs() < 1e-9);
/// ```
#[derive(Debug, Default)]
pub struct FrameRateEstimate {
    last_timestamp: Cell<Option<f64>>,
    fps: Cell<Option<f64>>,
}

impl FrameRateEstimate {
    /// Weight of the newest interval in the average.
    const SMOOTHING: f64 = 0.1;

    /// Create an estimate with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame timestamp in milliseconds.
    ///
    /// Non-increasing timestamps only move the reference point.
    pub fn record(&self, timestamp_ms: f64) {
        if let Some(last) = self.last_timestamp.get() {
            let delta = timestamp_ms - last;
            if delta > 0.0 {
                let sample = 1000.0 / delta;
                let next = match self.fps.get() {
                    Some(prev) => prev + (sample - prev) * Self::SMOOTHING,
                    None => sample,
                };
                self.fps.set(Some(next));
            }
        }
        self.last_timestamp.set(Some(timestamp_ms));
    }

    /// Current estimate, `None` before two timestamps were recorded.
    #[inline]
    pub fn fps(&self) -> Option<f64> {
        self.fps.get()
    }

    /// Forget all samples.
    pub fn reset(&self) {
        self.last_timestamp.set(None);
        self.fps.set(None);
    }
}

/// An [`Environment`] backed by plain values.
///
/// Used for server-side rendering, native hosts and tests. The clock only
/// moves when [`StaticEnvironment::advance`] or [`StaticEnvironment::set_now`]
/// is called.
#[derive(Debug, Default)]
pub struct StaticEnvironment {
    now: Cell<f64>,
    viewport: Cell<Viewport>,
    reduced_motion: Cell<bool>,
    webgl: Cell<bool>,
    memory: Cell<Option<f64>>,
    user_agent: RefCell<Option<String>>,
    fps: Cell<Option<f64>>,
}

impl StaticEnvironment {
    /// Create an environment with a 1280x720 viewport at time zero.
    pub fn new() -> Self {
        let env = Self::default();
        env.viewport.set(Viewport::new(1280.0, 720.0));
        env
    }

    /// Set the viewport size.
    pub fn with_viewport(self, width: f64, height: f64) -> Self {
        self.viewport.set(Viewport::new(width, height));
        self
    }

    /// Set the reduced-motion preference.
    pub fn with_reduced_motion(self, reduced: bool) -> Self {
        self.reduced_motion.set(reduced);
        self
    }

    /// Set the WebGL probe result.
    pub fn with_webgl(self, supported: bool) -> Self {
        self.webgl.set(supported);
        self
    }

    /// Report a used-heap figure in bytes.
    pub fn with_memory_usage(self, bytes: f64) -> Self {
        self.memory.set(Some(bytes));
        self
    }

    /// Set the user agent string.
    pub fn with_user_agent(self, ua: impl Into<String>) -> Self {
        *self.user_agent.borrow_mut() = Some(ua.into());
        self
    }

    /// Report a fixed frame-rate estimate.
    pub fn with_estimated_fps(self, fps: f64) -> Self {
        self.fps.set(Some(fps));
        self
    }

    /// Set the clock to an absolute time.
    pub fn set_now(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }

    /// Change the reduced-motion preference in place.
    pub fn set_reduced_motion(&self, reduced: bool) {
        self.reduced_motion.set(reduced);
    }
}

impl Environment for StaticEnvironment {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn viewport(&self) -> Viewport {
        self.viewport.get()
    }

    fn prefers_reduced_motion(&self) -> bool {
        self.reduced_motion.get()
    }

    fn supports_webgl(&self) -> bool {
        self.webgl.get()
    }

    fn memory_usage(&self) -> Option<f64> {
        self.memory.get()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.borrow().clone()
    }

    fn estimated_fps(&self) -> Option<f64> {
        self.fps.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_clock() {
        let env = StaticEnvironment::new();
        assert_eq!(env.now_ms(), 0.0);
        env.advance(16.5);
        env.advance(16.5);
        assert_eq!(env.now_ms(), 33.0);
        env.set_now(1000.0);
        assert_eq!(env.now_ms(), 1000.0);
    }

    #[test]
    fn test_builder_values() {
        let env = StaticEnvironment::new()
            .with_viewport(390.0, 844.0)
            .with_reduced_motion(true)
            .with_webgl(true)
            .with_user_agent("test-agent");

        assert_eq!(env.viewport(), Viewport::new(390.0, 844.0));
        assert!(env.prefers_reduced_motion());
        assert!(env.supports_webgl());
        assert_eq!(env.user_agent().as_deref(), Some("test-agent"));
        assert_eq!(env.memory_usage(), None);
    }

    #[test]
    fn test_frame_rate_estimate_smooths() {
        let estimate = FrameRateEstimate::new();
        estimate.record(100.0);
        assert_eq!(estimate.fps(), None);

        estimate.record(110.0);
        assert_eq!(estimate.fps(), Some(100.0));

        // one 50 fps interval moves the average a tenth of the way
        estimate.record(130.0);
        assert!((estimate.fps().unwrap() - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_rate_estimate_ignores_stalled_clock() {
        let estimate = FrameRateEstimate::new();
        estimate.record(50.0);
        estimate.record(50.0);
        estimate.record(40.0);
        assert_eq!(estimate.fps(), None);

        estimate.reset();
        estimate.record(0.0);
        estimate.record(25.0);
        assert_eq!(estimate.fps(), Some(40.0));
    }
}
