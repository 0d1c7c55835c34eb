//! Viewport-driven reveal trigger.

use crate::error::MotionResult;
use crate::scheduler::{Scheduler, TimerHandle};

/// Identifies one attached viewport observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverHandle(pub u64);

/// One observation for the watched element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntersectionEntry {
    pub is_intersecting: bool,
    /// Visible fraction of the element (0.0 - 1.0)
    pub intersection_ratio: f64,
}

impl IntersectionEntry {
    /// An intersecting entry at `ratio`.
    pub fn entering(ratio: f64) -> Self {
        Self {
            is_intersecting: true,
            intersection_ratio: ratio,
        }
    }

    /// A non-intersecting entry.
    pub fn leaving() -> Self {
        Self {
            is_intersecting: false,
            intersection_ratio: 0.0,
        }
    }
}

/// Viewport intersection observation primitive for one element.
///
/// Entry batches are delivered back through
/// [`IntersectionTrigger::on_entries`] with the handle returned here.
pub trait ViewportObserver {
    /// Start observing with the given threshold and root margin.
    fn observe(&self, threshold: f64, root_margin: &str) -> MotionResult<ObserverHandle>;

    /// Stop the observer behind `handle`. Unknown handles are ignored.
    fn disconnect(&self, handle: ObserverHandle);
}

/// Options for an [`IntersectionTrigger`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IntersectionOptions {
    /// Fraction of the element that must be visible (0.0 - 1.0)
    pub threshold: f64,
    /// Viewport inset, CSS margin syntax
    pub root_margin: String,
    /// Reveal only the first time
    pub once: bool,
    /// Delay before revealing, in milliseconds
    pub delay_ms: u32,
    pub disabled: bool,
}

impl Default for IntersectionOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            root_margin: "0px".to_string(),
            once: true,
            delay_ms: 0,
            disabled: false,
        }
    }
}

impl IntersectionOptions {
    /// Threshold clamped to 0.0 - 1.0; NaN falls back to the default 0.1.
    #[inline]
    pub fn clamped_threshold(&self) -> f64 {
        if self.threshold.is_nan() {
            Self::default().threshold
        } else {
            self.threshold.clamp(0.0, 1.0)
        }
    }

    fn observer_differs(&self, other: &IntersectionOptions) -> bool {
        self.clamped_threshold() != other.clamped_threshold()
            || self.root_margin != other.root_margin
            || self.disabled != other.disabled
    }
}

/// Target state of the controlled animation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
}

/// Observable state of one trigger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntersectionState {
    pub in_view: bool,
    /// Latches once the element has been revealed
    pub has_triggered: bool,
}

/// Flips one element's animation between hidden and visible as it enters
/// and leaves the viewport.
///
/// The trigger owns no observer or timer itself. It asks the host for them
/// and the host delivers entries and timer expiries back with their handles.
///
/// ## Example
///
/// ```rust
/// use zoptal_motion_core::{
///     IntersectionEntry, IntersectionOptions, IntersectionTrigger, ManualScheduler,
///     MotionResult, ObserverHandle, ViewportObserver, Visibility,
/// };
///
/// struct OneObserver;
///
/// impl ViewportObserver for OneObserver {
///     fn observe(&self, _threshold: f64, _margin: &str) -> MotionResult<ObserverHandle> {
///         Ok(ObserverHandle(1))
///     }
///     fn disconnect(&self, _handle: ObserverHandle) {}
/// }
///
/// let scheduler = ManualScheduler::new();
/// let mut trigger = IntersectionTrigger::new(IntersectionOptions::default());
/// trigger.attach(true, false, &OneObserver, &scheduler)?;
///
/// trigger.on_entries(ObserverHandle(1), &[IntersectionEntry::entering(0.5)], &scheduler);
/// assert_eq!(trigger.visibility(), Visibility::Visible);
/// # Ok::<(), zoptal_motion_core::MotionError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct IntersectionTrigger {
    options: IntersectionOptions,
    state: IntersectionState,
    observer: Option<ObserverHandle>,
    pending_reveal: Option<TimerHandle>,
    element_present: bool,
    reduced_motion: bool,
}

impl IntersectionTrigger {
    pub fn new(options: IntersectionOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[inline]
    pub fn options(&self) -> &IntersectionOptions {
        &self.options
    }

    #[inline]
    pub fn state(&self) -> IntersectionState {
        self.state
    }

    #[inline]
    pub fn in_view(&self) -> bool {
        self.state.in_view
    }

    #[inline]
    pub fn has_triggered(&self) -> bool {
        self.state.has_triggered
    }

    /// Current target state for the animation controller.
    #[inline]
    pub fn visibility(&self) -> Visibility {
        if self.state.in_view {
            Visibility::Visible
        } else {
            Visibility::Hidden
        }
    }

    #[inline]
    pub fn is_observing(&self) -> bool {
        self.observer.is_some()
    }

    /// Attach to an element.
    ///
    /// Any previous observer and pending reveal are released first. Reduced
    /// motion reveals immediately and never observes; a disabled trigger or
    /// a missing element does nothing.
    pub fn attach(
        &mut self,
        element_present: bool,
        reduced_motion: bool,
        observer: &dyn ViewportObserver,
        scheduler: &dyn Scheduler,
    ) -> MotionResult<()> {
        self.detach(observer, scheduler);
        self.element_present = element_present;
        self.reduced_motion = reduced_motion;

        if self.options.disabled || !element_present {
            return Ok(());
        }

        if reduced_motion {
            self.state.in_view = true;
            return Ok(());
        }

        let handle = observer.observe(self.options.clamped_threshold(), &self.options.root_margin)?;
        self.observer = Some(handle);
        Ok(())
    }

    /// Release the observer and any pending reveal.
    pub fn detach(&mut self, observer: &dyn ViewportObserver, scheduler: &dyn Scheduler) {
        if let Some(handle) = self.observer.take() {
            observer.disconnect(handle);
        }
        self.cancel_pending(scheduler);
    }

    /// Replace the options, re-attaching when the observer parameters changed.
    pub fn set_options(
        &mut self,
        options: IntersectionOptions,
        observer: &dyn ViewportObserver,
        scheduler: &dyn Scheduler,
    ) -> MotionResult<()> {
        let reattach = self.options.observer_differs(&options);
        self.options = options;
        if reattach {
            self.attach(self.element_present, self.reduced_motion, observer, scheduler)?;
        }
        Ok(())
    }

    /// Apply a reduced-motion change, re-attaching if it differs.
    pub fn set_reduced_motion(
        &mut self,
        reduced_motion: bool,
        observer: &dyn ViewportObserver,
        scheduler: &dyn Scheduler,
    ) -> MotionResult<()> {
        if reduced_motion != self.reduced_motion {
            self.attach(self.element_present, reduced_motion, observer, scheduler)?;
        }
        Ok(())
    }

    /// Handle a batch of entries from the observer.
    ///
    /// Returns true if `in_view` changed.
    pub fn on_entries(
        &mut self,
        handle: ObserverHandle,
        entries: &[IntersectionEntry],
        scheduler: &dyn Scheduler,
    ) -> bool {
        if self.observer != Some(handle) {
            return false;
        }

        let before = self.state.in_view;
        for entry in entries {
            if entry.is_intersecting {
                if self.options.once && self.state.has_triggered {
                    continue;
                }
                if self.options.delay_ms == 0 {
                    self.reveal();
                } else if self.pending_reveal.is_none() {
                    self.pending_reveal = Some(scheduler.set_timeout(self.options.delay_ms));
                }
            } else if !self.options.once {
                self.cancel_pending(scheduler);
                self.state.in_view = false;
            }
        }
        before != self.state.in_view
    }

    /// Handle a timer expiry. Returns true if the element was revealed.
    pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
        if self.pending_reveal != Some(handle) {
            return false;
        }
        self.pending_reveal = None;
        let before = self.state.in_view;
        self.reveal();
        before != self.state.in_view
    }

    fn reveal(&mut self) {
        self.state.in_view = true;
        self.state.has_triggered = true;
    }

    fn cancel_pending(&mut self, scheduler: &dyn Scheduler) {
        if let Some(timer) = self.pending_reveal.take() {
            scheduler.clear_timeout(timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeObserver {
        next: Cell<u64>,
        active: RefCell<Vec<ObserverHandle>>,
        last_params: RefCell<Option<(f64, String)>>,
    }

    impl ViewportObserver for FakeObserver {
        fn observe(&self, threshold: f64, root_margin: &str) -> MotionResult<ObserverHandle> {
            self.next.set(self.next.get() + 1);
            let handle = ObserverHandle(self.next.get());
            self.active.borrow_mut().push(handle);
            *self.last_params.borrow_mut() = Some((threshold, root_margin.to_string()));
            Ok(handle)
        }

        fn disconnect(&self, handle: ObserverHandle) {
            self.active.borrow_mut().retain(|h| *h != handle);
        }
    }

    impl FakeObserver {
        fn current(&self) -> ObserverHandle {
            *self.active.borrow().last().expect("observer attached")
        }
    }

    fn repeatable() -> IntersectionOptions {
        IntersectionOptions {
            once: false,
            ..IntersectionOptions::default()
        }
    }

    #[test]
    fn test_disabled_is_noop() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions {
            disabled: true,
            ..IntersectionOptions::default()
        });

        trigger.attach(true, false, &observer, &scheduler).unwrap();
        assert!(!trigger.is_observing());
        assert!(!trigger.in_view());
    }

    #[test]
    fn test_missing_element_is_noop() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions::default());

        trigger.attach(false, true, &observer, &scheduler).unwrap();
        assert!(!trigger.in_view());
        assert!(observer.active.borrow().is_empty());
    }

    #[test]
    fn test_reduced_motion_reveals_without_observing() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions {
            delay_ms: 500,
            ..IntersectionOptions::default()
        });

        trigger.attach(true, true, &observer, &scheduler).unwrap();
        assert!(trigger.in_view());
        assert_eq!(observer.next.get(), 0);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_observer_receives_clamped_threshold() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions {
            threshold: 1.7,
            root_margin: "0px 0px -50px 0px".into(),
            ..IntersectionOptions::default()
        });

        trigger.attach(true, false, &observer, &scheduler).unwrap();
        assert_eq!(
            observer.last_params.borrow().clone(),
            Some((1.0, "0px 0px -50px 0px".to_string()))
        );
    }

    #[test]
    fn test_once_latch_holds() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions::default());
        trigger.attach(true, false, &observer, &scheduler).unwrap();
        let handle = observer.current();

        assert!(trigger.on_entries(handle, &[IntersectionEntry::entering(0.3)], &scheduler));
        assert!(trigger.has_triggered());

        assert!(!trigger.on_entries(handle, &[IntersectionEntry::leaving()], &scheduler));
        assert!(!trigger.on_entries(handle, &[IntersectionEntry::entering(0.9)], &scheduler));
        assert!(trigger.in_view());
        assert_eq!(trigger.visibility(), Visibility::Visible);
    }

    #[test]
    fn test_repeatable_reveal_hide_cycle() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(repeatable());
        trigger.attach(true, false, &observer, &scheduler).unwrap();
        let handle = observer.current();

        trigger.on_entries(handle, &[IntersectionEntry::entering(0.5)], &scheduler);
        assert!(trigger.in_view());
        trigger.on_entries(handle, &[IntersectionEntry::leaving()], &scheduler);
        assert!(!trigger.in_view());
        trigger.on_entries(handle, &[IntersectionEntry::entering(0.5)], &scheduler);
        assert!(trigger.in_view());
    }

    #[test]
    fn test_delayed_reveal() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions {
            delay_ms: 200,
            ..IntersectionOptions::default()
        });
        trigger.attach(true, false, &observer, &scheduler).unwrap();
        let handle = observer.current();

        trigger.on_entries(handle, &[IntersectionEntry::entering(0.5)], &scheduler);
        assert!(!trigger.in_view());

        assert!(scheduler.advance(199).is_empty());
        let due = scheduler.advance(1);
        assert_eq!(due.len(), 1);
        assert!(trigger.on_timer(due[0]));
        assert!(trigger.in_view());
        assert!(trigger.has_triggered());
    }

    #[test]
    fn test_leaving_cancels_delayed_reveal() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions {
            delay_ms: 200,
            ..repeatable()
        });
        trigger.attach(true, false, &observer, &scheduler).unwrap();
        let handle = observer.current();

        trigger.on_entries(handle, &[IntersectionEntry::entering(0.5)], &scheduler);
        trigger.on_entries(handle, &[IntersectionEntry::leaving()], &scheduler);
        assert_eq!(scheduler.pending_timers(), 0);
        assert!(scheduler.advance(500).is_empty());
        assert!(!trigger.in_view());
    }

    #[test]
    fn test_option_change_replaces_observer() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions::default());
        trigger.attach(true, false, &observer, &scheduler).unwrap();
        let first = observer.current();

        trigger
            .set_options(
                IntersectionOptions {
                    threshold: 0.5,
                    ..IntersectionOptions::default()
                },
                &observer,
                &scheduler,
            )
            .unwrap();

        assert_eq!(observer.active.borrow().len(), 1);
        assert_ne!(observer.current(), first);
        // entries for the old observer are stale
        assert!(!trigger.on_entries(first, &[IntersectionEntry::entering(1.0)], &scheduler));
        assert!(!trigger.in_view());
    }

    #[test]
    fn test_delay_change_keeps_observer() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions::default());
        trigger.attach(true, false, &observer, &scheduler).unwrap();

        trigger
            .set_options(
                IntersectionOptions {
                    delay_ms: 50,
                    ..IntersectionOptions::default()
                },
                &observer,
                &scheduler,
            )
            .unwrap();
        assert_eq!(observer.next.get(), 1);
    }

    #[test]
    fn test_nan_threshold_is_stable() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let nan = || IntersectionOptions {
            threshold: f64::NAN,
            ..IntersectionOptions::default()
        };
        let mut trigger = IntersectionTrigger::new(nan());
        trigger.attach(true, false, &observer, &scheduler).unwrap();
        assert_eq!(observer.last_params.borrow().as_ref().map(|p| p.0), Some(0.1));

        for _ in 0..3 {
            trigger.set_options(nan(), &observer, &scheduler).unwrap();
        }
        assert_eq!(observer.next.get(), 1);

        // NaN and the default threshold observe identically
        trigger
            .set_options(IntersectionOptions::default(), &observer, &scheduler)
            .unwrap();
        assert_eq!(observer.next.get(), 1);
    }

    #[test]
    fn test_reduced_motion_toggle_reattaches() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(repeatable());
        trigger.attach(true, false, &observer, &scheduler).unwrap();
        assert_eq!(observer.next.get(), 1);

        trigger.set_reduced_motion(true, &observer, &scheduler).unwrap();
        assert!(trigger.in_view());
        assert!(!trigger.is_observing());
        assert!(observer.active.borrow().is_empty());

        // same value is a no-op
        trigger.set_reduced_motion(true, &observer, &scheduler).unwrap();
        assert_eq!(observer.next.get(), 1);

        trigger.set_reduced_motion(false, &observer, &scheduler).unwrap();
        assert!(trigger.is_observing());
        assert_eq!(observer.next.get(), 2);

        let handle = observer.current();
        assert!(trigger.on_entries(handle, &[IntersectionEntry::leaving()], &scheduler));
        assert!(!trigger.in_view());

        trigger.set_reduced_motion(false, &observer, &scheduler).unwrap();
        assert_eq!(observer.next.get(), 2);
    }

    #[test]
    fn test_detach_disconnects() {
        let observer = FakeObserver::default();
        let scheduler = ManualScheduler::new();
        let mut trigger = IntersectionTrigger::new(IntersectionOptions::default());
        trigger.attach(true, false, &observer, &scheduler).unwrap();

        trigger.detach(&observer, &scheduler);
        assert!(observer.active.borrow().is_empty());
        assert!(!trigger.is_observing());
    }
}
