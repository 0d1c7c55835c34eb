//! Reduced-motion preference detection.

use crate::env::Environment;

/// Media query that reports the reduced-motion accessibility setting.
pub const REDUCED_MOTION_QUERY: &str = "(prefers-reduced-motion: reduce)";

/// Identifies one change-listener registration on a [`MediaQuery`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

/// A live system media-feature query.
///
/// Change notifications reach the detector through
/// [`MotionPreferenceDetector::handle_change`].
pub trait MediaQuery {
    /// Whether the query matches right now.
    fn matches(&self) -> bool;

    /// Register a change listener.
    fn subscribe(&self) -> ListenerHandle;

    /// Remove a listener. Unknown handles are ignored.
    fn unsubscribe(&self, handle: ListenerHandle);
}

/// One-shot reduced-motion read, for callers that do not need updates.
pub fn should_reduce_motion(env: &dyn Environment) -> bool {
    env.prefers_reduced_motion()
}

/// Reactive reduced-motion flag for one mounted component.
///
/// Starts as `false` (motion allowed) so server and first client render
/// agree; the real value arrives with [`MotionPreferenceDetector::mount`].
///
/// ## Example
///
/// ```rust
/// use std::cell::Cell;
/// use zoptal_motion_core::{ListenerHandle, MediaQuery, MotionPreferenceDetector};
///
/// struct Fixed(bool, Cell<u64>);
///
/// impl MediaQuery for Fixed {
///     fn matches(&self) -> bool { self.0 }
///     fn subscribe(&self) -> ListenerHandle {
///         self.1.set(self.1.get() + 1);
///         ListenerHandle(self.1.get())
///     }
///     fn unsubscribe(&self, _handle: ListenerHandle) {}
/// }
///
/// let query = Fixed(true, Cell::new(0));
/// let mut detector = MotionPreferenceDetector::new();
/// assert!(!detector.prefers_reduced_motion());
///
/// detector.mount(&query);
/// assert!(detector.prefers_reduced_motion());
/// ```
#[derive(Clone, Debug, Default)]
pub struct MotionPreferenceDetector {
    reduced: bool,
    listener: Option<ListenerHandle>,
}

impl MotionPreferenceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current value and subscribe to changes.
    ///
    /// Subscribes at most once per mount.
    pub fn mount(&mut self, query: &dyn MediaQuery) {
        self.reduced = query.matches();
        if self.listener.is_none() {
            self.listener = Some(query.subscribe());
        }
    }

    /// Apply a change notification. Returns true if the value changed.
    pub fn handle_change(&mut self, matches: bool) -> bool {
        let changed = self.reduced != matches;
        self.reduced = matches;
        changed
    }

    /// Drop the change subscription.
    pub fn unmount(&mut self, query: &dyn MediaQuery) {
        if let Some(handle) = self.listener.take() {
            query.unsubscribe(handle);
        }
    }

    #[inline]
    pub fn prefers_reduced_motion(&self) -> bool {
        self.reduced
    }

    #[inline]
    pub fn is_subscribed(&self) -> bool {
        self.listener.is_some()
    }

    /// Motion settings matching the current preference.
    pub fn settings(&self) -> MotionSettings {
        MotionSettings::for_preference(self.reduced)
    }
}

/// Transition parameters adjusted for the motion preference.
///
/// With reduced motion, durations and travel distances collapse to zero and
/// only opacity changes remain, so content still appears without movement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionSettings {
    /// Whether the preference is reduced
    pub reduced: bool,
    duration_scale: f64,
    distance_scale: f64,
}

impl MotionSettings {
    /// Tuning for the given reduced-motion preference.
    pub fn for_preference(reduced: bool) -> Self {
        if reduced {
            Self {
                reduced,
                duration_scale: 0.0,
                distance_scale: 0.0,
            }
        } else {
            Self {
                reduced,
                duration_scale: 1.0,
                distance_scale: 1.0,
            }
        }
    }

    /// Effective duration for a transition of `base_ms`.
    #[inline]
    pub fn duration_ms(&self, base_ms: f64) -> f64 {
        base_ms * self.duration_scale
    }

    /// Effective travel distance (slide/offset) for `base_px`.
    #[inline]
    pub fn distance_px(&self, base_px: f64) -> f64 {
        base_px * self.distance_scale
    }

    /// Effective stagger between children.
    #[inline]
    pub fn stagger_ms(&self, base_ms: f64) -> f64 {
        self.duration_ms(base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::StaticEnvironment;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeQuery {
        matches: Cell<bool>,
        next: Cell<u64>,
        active: RefCell<Vec<ListenerHandle>>,
    }

    impl MediaQuery for FakeQuery {
        fn matches(&self) -> bool {
            self.matches.get()
        }

        fn subscribe(&self) -> ListenerHandle {
            self.next.set(self.next.get() + 1);
            let handle = ListenerHandle(self.next.get());
            self.active.borrow_mut().push(handle);
            handle
        }

        fn unsubscribe(&self, handle: ListenerHandle) {
            self.active.borrow_mut().retain(|h| *h != handle);
        }
    }

    #[test]
    fn test_default_allows_motion() {
        let detector = MotionPreferenceDetector::new();
        assert!(!detector.prefers_reduced_motion());
        assert!(!detector.is_subscribed());
    }

    #[test]
    fn test_mount_subscribes_once() {
        let query = FakeQuery::default();
        query.matches.set(true);

        let mut detector = MotionPreferenceDetector::new();
        detector.mount(&query);
        detector.mount(&query);

        assert!(detector.prefers_reduced_motion());
        assert_eq!(query.active.borrow().len(), 1);

        detector.unmount(&query);
        detector.unmount(&query);
        assert!(query.active.borrow().is_empty());
    }

    #[test]
    fn test_handle_change() {
        let query = FakeQuery::default();
        let mut detector = MotionPreferenceDetector::new();
        detector.mount(&query);

        assert!(detector.handle_change(true));
        assert!(!detector.handle_change(true));
        assert!(detector.prefers_reduced_motion());
        assert!(detector.handle_change(false));
    }

    #[test]
    fn test_should_reduce_motion() {
        let env = StaticEnvironment::new().with_reduced_motion(true);
        assert!(should_reduce_motion(&env));
    }

    #[test]
    fn test_reduced_settings_collapse_motion() {
        let reduced = MotionSettings::for_preference(true);
        assert_eq!(reduced.duration_ms(600.0), 0.0);
        assert_eq!(reduced.distance_px(40.0), 0.0);

        let full = MotionSettings::for_preference(false);
        assert_eq!(full.duration_ms(600.0), 600.0);
        assert_eq!(full.stagger_ms(100.0), 100.0);
    }
}
