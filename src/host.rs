//! Capability bundle shared by the recorder and the boundary.

use std::rc::Rc;

use crate::env::{Environment, StaticEnvironment};
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::sink::{AnalyticsSink, ErrorTracker, NoopSink};

/// The injected capabilities one page (or test) runs with.
///
/// Cloning is cheap; every clone shares the same capabilities.
#[derive(Clone)]
pub struct Host {
    pub env: Rc<dyn Environment>,
    pub scheduler: Rc<dyn Scheduler>,
    pub analytics: Rc<dyn AnalyticsSink>,
    pub errors: Rc<dyn ErrorTracker>,
}

impl Host {
    /// Create a host with no-op sinks.
    pub fn new(env: Rc<dyn Environment>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            env,
            scheduler,
            analytics: Rc::new(NoopSink),
            errors: Rc::new(NoopSink),
        }
    }

    /// Replace the analytics sink.
    pub fn with_analytics(mut self, sink: Rc<dyn AnalyticsSink>) -> Self {
        self.analytics = sink;
        self
    }

    /// Replace the error tracker.
    pub fn with_error_tracker(mut self, tracker: Rc<dyn ErrorTracker>) -> Self {
        self.errors = tracker;
        self
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new(Rc::new(StaticEnvironment::new()), Rc::new(ManualScheduler::new()))
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
