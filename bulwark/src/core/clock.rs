//! Wall-clock time for window-based guards
//!
//! Rate-limiting guards read the time through [`Clock`] so that tests can move
//! it across window boundaries.

use std::sync::Arc;
use std::time::SystemTime;

/// Source of wall-clock time for window-based guards
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The system wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }
}
