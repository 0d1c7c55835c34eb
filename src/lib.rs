//! # zoptal-motion-core
//!
//! Core lifecycle library for animated page decoration.
//!
//! This crate provides platform-agnostic state machines for:
//! - Detecting the reduced-motion accessibility preference
//! - Revealing elements as they enter the viewport (once or repeatedly)
//! - Measuring animation runs (duration, sampled frame rate, grading)
//! - Supervising animated subtrees with bounded, backed-off retry
//!
//! None of these types own an event loop. Capabilities (clock, scheduling,
//! analytics and error tracking) are injected through [`Host`], and the host
//! delivers frames, timers and observer callbacks back by handle.
//!
//! ## Features
//!
//! - `serde` - Enable serialization/deserialization for options and records
//! - `toml` - Load [`MotionConfig`] from TOML
//! - `web` - Browser implementations of every capability trait
//!
//! ## Example
//!
//! ```rust
//! use std::rc::Rc;
//! use zoptal_motion_core::{
//!     BoundaryConfig, ErrorBoundary, Fallback, Host, ManualScheduler, MetricsOptions,
//!     MetricsRecorder, Rendered, StaticEnvironment,
//! };
//!
//! let env = Rc::new(StaticEnvironment::new());
//! let scheduler = Rc::new(ManualScheduler::new());
//! let host = Host::new(env.clone(), scheduler.clone());
//!
//! let mut boundary: ErrorBoundary<&str> =
//!     ErrorBoundary::new(BoundaryConfig::named("hero"), Fallback::Static("poster"), host.clone());
//! let mut recorder = MetricsRecorder::new(MetricsOptions::named("hero"), host);
//!
//! recorder.start_tracking();
//! let out = boundary.render(|| Ok("animated hero"));
//! assert_eq!(out, Rendered::Content("animated hero"));
//!
//! env.advance(250.0);
//! let metrics = recorder.end_tracking().unwrap();
//! assert_eq!(metrics.duration, 250.0);
//! ```

mod boundary;
mod config;
mod env;
mod error;
mod host;
mod intersection;
mod metrics;
mod preference;
mod scheduler;
pub mod sink;

#[cfg(feature = "web")]
pub mod web;

pub use boundary::{
    retry_delay_ms, BoundaryConfig, BoundaryPhase, BuiltinFallback, CapturedError, ErrorBoundary,
    ErrorBoundaryState, ErrorHandler, Fallback, Rendered, RetryControl, RetryTrigger, ERROR_EVENT,
};
pub use config::MotionConfig;
pub use env::{Environment, FrameRateEstimate, StaticEnvironment, Viewport};
pub use error::{MotionError, MotionResult, SinkError};
pub use host::Host;
pub use intersection::{
    IntersectionEntry, IntersectionOptions, IntersectionState, IntersectionTrigger, ObserverHandle,
    ViewportObserver, Visibility,
};
pub use metrics::{
    dropped_frames, frames_per_second, AnimationRunMetrics, MetricsOptions, MetricsRecorder,
    PerformanceGrade, PERFORMANCE_EVENT, TARGET_FPS,
};
pub use preference::{
    should_reduce_motion, ListenerHandle, MediaQuery, MotionPreferenceDetector, MotionSettings,
    REDUCED_MOTION_QUERY,
};
pub use scheduler::{FrameHandle, ManualScheduler, Scheduler, TimerHandle, Wakeup};
pub use sink::{
    AnalyticsSink, ErrorReport, ErrorTracker, NoopSink, Payload, PayloadValue, RecordingSink, Scope,
    Severity,
};
