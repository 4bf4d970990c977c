//! Hardware watchdog capability.
//!
//! Long storage operations run with the watchdog suspended. The
//! [`Suspended`] guard resumes (kicks) it when dropped.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Watchdog control provided by the board layer.
pub trait Watchdog: Send + Sync {
    /// Freeze the watchdog timer.
    fn suspend(&self);

    /// Resume and kick the watchdog timer.
    fn resume(&self);

    /// Suspend until the returned guard is dropped.
    fn suspended(&self) -> Suspended<'_, Self>
    where
        Self: Sized,
    {
        Suspended::new(self)
    }
}

/// Scoped watchdog suspension.
pub struct Suspended<'a, W: Watchdog + ?Sized> {
    watchdog: &'a W,
}

impl<'a, W: Watchdog + ?Sized> Suspended<'a, W> {
    pub fn new(watchdog: &'a W) -> Self {
        watchdog.suspend();
        Self { watchdog }
    }
}

impl<W: Watchdog + ?Sized> Drop for Suspended<'_, W> {
    fn drop(&mut self) {
        self.watchdog.resume();
    }
}

/// Watchdog for hosts without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWatchdog;

impl Watchdog for NullWatchdog {
    fn suspend(&self) {}
    fn resume(&self) {}
}

/// Watchdog that counts calls, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CountingWatchdog {
    suspends: AtomicUsize,
    resumes: AtomicUsize,
}

impl CountingWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspends(&self) -> usize {
        self.suspends.load(Ordering::Relaxed)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }

    /// Suspensions not yet matched by a resume.
    pub fn outstanding(&self) -> usize {
        self.suspends().saturating_sub(self.resumes())
    }
}

impl Watchdog for CountingWatchdog {
    fn suspend(&self) {
        self.suspends.fetch_add(1, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_guard_resumes_on_drop() {
        let wd = CountingWatchdog::new();
        {
            let _guard = wd.suspended();
            assert_eq!(wd.outstanding(), 1);
        }
        assert_eq!(wd.suspends(), 1);
        assert_eq!(wd.resumes(), 1);
    }

    #[test]
    fn test_guard_through_trait_object() {
        let wd = Arc::new(CountingWatchdog::new());
        let dyn_wd: Arc<dyn Watchdog> = wd.clone();
        drop(Suspended::new(dyn_wd.as_ref()));
        assert_eq!(wd.outstanding(), 0);
        assert_eq!(wd.resumes(), 1);
    }
}
