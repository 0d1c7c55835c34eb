//! Animation run metrics: duration, sampled frame rate and grading.

use crate::env::Viewport;
use crate::host::Host;
use crate::scheduler::FrameHandle;
use crate::sink::{forward_event, Payload};

/// Frame rate the dropped-frame estimate is measured against.
///
/// This is a fixed approximation, not the display's real refresh rate.
pub const TARGET_FPS: f64 = 60.0;

/// Analytics event name for a finished run.
pub const PERFORMANCE_EVENT: &str = "animation_performance";

/// Options for a [`MetricsRecorder`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MetricsOptions {
    /// Animation name used in summaries
    pub name: String,
    /// Count rendered frames while tracking
    pub track_fps: bool,
    /// Forward a graded summary to the analytics sink
    pub send_to_analytics: bool,
    /// Emit the summary as a tracing event
    pub log_summary: bool,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            name: "animation".to_string(),
            track_fps: true,
            send_to_analytics: true,
            log_summary: false,
        }
    }
}

impl MetricsOptions {
    /// Default options for one named animation.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Coarse performance grade of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PerformanceGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PerformanceGrade {
    /// Grade a run from its frame rate and dropped-frame count.
    ///
    /// ```rust
    /// use zoptal_motion_core::PerformanceGrade;
    ///
    /// assert_eq!(PerformanceGrade::grade(58.0, 1), PerformanceGrade::Excellent);
    /// assert_eq!(PerformanceGrade::grade(55.0, 5), PerformanceGrade::Good);
    /// assert_eq!(PerformanceGrade::grade(20.0, 0), PerformanceGrade::Poor);
    /// ```
    pub fn grade(fps: f64, dropped_frames: u32) -> Self {
        if fps >= 55.0 && dropped_frames <= 2 {
            PerformanceGrade::Excellent
        } else if fps >= 45.0 && dropped_frames <= 5 {
            PerformanceGrade::Good
        } else if fps >= 30.0 && dropped_frames <= 10 {
            PerformanceGrade::Fair
        } else {
            PerformanceGrade::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceGrade::Excellent => "excellent",
            PerformanceGrade::Good => "good",
            PerformanceGrade::Fair => "fair",
            PerformanceGrade::Poor => "poor",
        }
    }
}

/// Frames per second over `duration_ms`. Zero for an empty duration.
#[inline]
pub fn frames_per_second(frame_count: u32, duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        return 0.0;
    }
    f64::from(frame_count) / (duration_ms / 1000.0)
}

/// Frames missed against the fixed [`TARGET_FPS`].
#[inline]
pub fn dropped_frames(frame_count: u32, duration_ms: f64) -> u32 {
    let expected = (duration_ms.max(0.0) / 1000.0 * TARGET_FPS).round();
    (expected - f64::from(frame_count)).max(0.0) as u32
}

/// The finished record of one animation run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimationRunMetrics {
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    /// Duration in milliseconds
    pub duration: f64,
    pub frame_count: u32,
    pub dropped_frames: u32,
    pub fps: f64,
    pub viewport: Viewport,
    pub reduced_motion: bool,
    /// Used heap in bytes, when available
    pub memory_usage: Option<f64>,
    pub user_agent: Option<String>,
}

impl AnimationRunMetrics {
    #[inline]
    pub fn grade(&self) -> PerformanceGrade {
        PerformanceGrade::grade(self.fps, self.dropped_frames)
    }

    /// Flat analytics payload for this run.
    pub fn summary_payload(&self) -> Payload {
        Payload::new()
            .with_str("animation_name", self.name.as_str())
            .with_num("duration", self.duration.round())
            .with_num("fps", self.fps.round())
            .with_num("dropped_frames", f64::from(self.dropped_frames))
            .with_str("performance_grade", self.grade().as_str())
            .with_bool("reduced_motion", self.reduced_motion)
            .with_num("viewport_width", self.viewport.width)
            .with_num("viewport_height", self.viewport.height)
    }
}

#[derive(Clone, Debug)]
struct Run {
    start_time: f64,
    frame_count: u32,
    viewport: Viewport,
    reduced_motion: bool,
    user_agent: Option<String>,
}

/// Measures one animation run at a time.
///
/// `start_tracking` and `end_tracking` are expected to be paired; a second
/// `start_tracking` discards the run in progress. While frame tracking is
/// enabled the recorder keeps exactly one frame request outstanding and the
/// host reports it back through [`MetricsRecorder::on_frame`].
///
/// ## Example
///
/// ```rust
/// use std::rc::Rc;
/// use zoptal_motion_core::{
///     Host, ManualScheduler, MetricsOptions, MetricsRecorder, StaticEnvironment,
/// };
///
/// let env = Rc::new(StaticEnvironment::new());
/// let scheduler = Rc::new(ManualScheduler::new());
/// let host = Host::new(env.clone(), scheduler.clone());
///
/// let mut recorder = MetricsRecorder::new(MetricsOptions::named("hero"), host);
/// recorder.start_tracking();
/// for _ in 0..60 {
///     env.advance(1000.0 / 60.0);
///     for frame in scheduler.take_frames() {
///         recorder.on_frame(frame);
///     }
/// }
///
/// let metrics = recorder.end_tracking().unwrap();
/// assert_eq!(metrics.frame_count, 60);
/// assert_eq!(metrics.dropped_frames, 0);
/// ```
#[derive(Debug)]
pub struct MetricsRecorder {
    options: MetricsOptions,
    host: Host,
    run: Option<Run>,
    pending_frame: Option<FrameHandle>,
}

impl MetricsRecorder {
    pub fn new(options: MetricsOptions, host: Host) -> Self {
        Self {
            options,
            host,
            run: None,
            pending_frame: None,
        }
    }

    #[inline]
    pub fn options(&self) -> &MetricsOptions {
        &self.options
    }

    #[inline]
    pub fn is_tracking(&self) -> bool {
        self.run.is_some()
    }

    /// Begin a run, discarding any run in progress.
    pub fn start_tracking(&mut self) {
        self.cancel_frame();

        let env = &self.host.env;
        self.run = Some(Run {
            start_time: env.now_ms(),
            frame_count: 0,
            viewport: env.viewport(),
            reduced_motion: env.prefers_reduced_motion(),
            user_agent: env.user_agent(),
        });

        if self.options.track_fps {
            self.pending_frame = Some(self.host.scheduler.request_frame());
        }
    }

    /// Count one rendered frame and request the next.
    ///
    /// Returns false for stale handles.
    pub fn on_frame(&mut self, handle: FrameHandle) -> bool {
        if self.pending_frame != Some(handle) {
            return false;
        }
        let Some(run) = self.run.as_mut() else {
            self.pending_frame = None;
            return false;
        };
        run.frame_count += 1;
        self.pending_frame = Some(self.host.scheduler.request_frame());
        true
    }

    /// Finish the run and return its record.
    ///
    /// Returns `None` when nothing is being tracked.
    pub fn end_tracking(&mut self) -> Option<AnimationRunMetrics> {
        let run = self.run.take()?;
        self.cancel_frame();

        let end_time = self.host.env.now_ms();
        let mut metrics = Self::assemble(&self.options.name, &run, end_time);
        metrics.memory_usage = self.host.env.memory_usage();

        if self.options.log_summary {
            tracing::info!(
                animation = %metrics.name,
                duration_ms = metrics.duration,
                fps = metrics.fps,
                dropped_frames = metrics.dropped_frames,
                grade = metrics.grade().as_str(),
                "animation run finished"
            );
        }

        if self.options.send_to_analytics {
            let payload = metrics.summary_payload();
            forward_event(self.host.analytics.as_ref(), PERFORMANCE_EVENT, &payload);
        }

        Some(metrics)
    }

    /// Snapshot of the run in progress, measured against now.
    pub fn current_metrics(&self) -> Option<AnimationRunMetrics> {
        let run = self.run.as_ref()?;
        Some(Self::assemble(&self.options.name, run, self.host.env.now_ms()))
    }

    /// Stop without producing a record.
    pub fn cancel(&mut self) {
        self.run = None;
        self.cancel_frame();
    }

    fn assemble(name: &str, run: &Run, end_time: f64) -> AnimationRunMetrics {
        let duration = (end_time - run.start_time).max(0.0);
        AnimationRunMetrics {
            name: name.to_string(),
            start_time: run.start_time,
            end_time,
            duration,
            frame_count: run.frame_count,
            dropped_frames: dropped_frames(run.frame_count, duration),
            fps: frames_per_second(run.frame_count, duration),
            viewport: run.viewport,
            reduced_motion: run.reduced_motion,
            memory_usage: None,
            user_agent: run.user_agent.clone(),
        }
    }

    fn cancel_frame(&mut self) {
        if let Some(handle) = self.pending_frame.take() {
            self.host.scheduler.cancel_frame(handle);
        }
    }
}

impl Drop for MetricsRecorder {
    fn drop(&mut self) {
        self.cancel_frame();
    }
}
