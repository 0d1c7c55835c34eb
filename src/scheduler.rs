//! Frame and timer scheduling.
//!
//! The state machines in this crate never own an event loop. They ask a
//! [`Scheduler`] for a handle and the host calls them back with that handle
//! when the frame or timer fires. Handles that were cancelled or superseded
//! are simply ignored by their owner, so late deliveries are harmless.

use std::cell::{Cell, RefCell};

use crate::intersection::{IntersectionEntry, ObserverHandle};

/// Identifies one requested animation frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(pub u64);

/// Identifies one pending timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// Per-frame and timer scheduling primitive.
///
/// No `Send` bounds: everything runs on one cooperative event loop, native
/// or WASM.
pub trait Scheduler {
    /// Request a callback on the next rendered frame.
    fn request_frame(&self) -> FrameHandle;

    /// Cancel a pending frame. Unknown handles are ignored.
    fn cancel_frame(&self, handle: FrameHandle);

    /// Request a callback after `delay_ms` milliseconds.
    fn set_timeout(&self, delay_ms: u32) -> TimerHandle;

    /// Cancel a pending timer. Unknown handles are ignored.
    fn clear_timeout(&self, handle: TimerHandle);
}

/// An event delivered by the host to the owner of a handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Wakeup {
    Frame(FrameHandle),
    Timer(TimerHandle),
    /// A batch of intersection entries for one observer
    Intersection {
        observer: ObserverHandle,
        entries: Vec<IntersectionEntry>,
    },
    /// The reduced-motion media query changed
    ReducedMotion(bool),
}

/// A deterministic [`Scheduler`] driven by hand.
///
/// Frames are flushed with [`ManualScheduler::take_frames`]; timers fire
/// when [`ManualScheduler::advance`] moves the internal clock past their
/// deadline.
///
/// ## Example
///
/// ```rust
/// use zoptal_motion_core::{ManualScheduler, Scheduler};
///
/// let scheduler = ManualScheduler::new();
/// let timer = scheduler.set_timeout(100);
///
/// assert!(scheduler.advance(99).is_empty());
/// assert_eq!(scheduler.advance(1), vec![timer]);
/// ```
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: Cell<u64>,
    now_ms: Cell<u64>,
    frames: RefCell<Vec<FrameHandle>>,
    timers: RefCell<Vec<(TimerHandle, u64)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    /// Drain every frame request made so far (one rendered frame).
    pub fn take_frames(&self) -> Vec<FrameHandle> {
        std::mem::take(&mut *self.frames.borrow_mut())
    }

    /// Move the clock forward and return the timers that came due, in
    /// deadline order.
    pub fn advance(&self, ms: u64) -> Vec<TimerHandle> {
        let now = self.now_ms.get() + ms;
        self.now_ms.set(now);

        let mut timers = self.timers.borrow_mut();
        let mut due: Vec<(TimerHandle, u64)> = Vec::new();
        timers.retain(|&(handle, deadline)| {
            if deadline <= now {
                due.push((handle, deadline));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|&(handle, deadline)| (deadline, handle));
        due.into_iter().map(|(handle, _)| handle).collect()
    }

    /// Frames requested and not yet taken or cancelled.
    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Timers not yet fired or cleared.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Remaining delay of a pending timer, or `None` if it is not pending.
    pub fn remaining_ms(&self, handle: TimerHandle) -> Option<u64> {
        let now = self.now_ms.get();
        self.timers
            .borrow()
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|&(_, deadline)| deadline.saturating_sub(now))
    }
}

impl Scheduler for ManualScheduler {
    fn request_frame(&self) -> FrameHandle {
        let handle = FrameHandle(self.next());
        self.frames.borrow_mut().push(handle);
        handle
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        self.frames.borrow_mut().retain(|h| *h != handle);
    }

    fn set_timeout(&self, delay_ms: u32) -> TimerHandle {
        let handle = TimerHandle(self.next());
        let deadline = self.now_ms.get() + u64::from(delay_ms);
        self.timers.borrow_mut().push((handle, deadline));
        handle
    }

    fn clear_timeout(&self, handle: TimerHandle) {
        self.timers.borrow_mut().retain(|(h, _)| *h != handle);
    }
}
