//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress after each processed file
pub trait ProgressObserver: Send + Sync {
    /// `fraction` is in `0.0..=1.0`; `current` names the file just handled
    fn on_progress(&self, fraction: f32, current: &str);
}

impl<F> ProgressObserver for F
where
    F: Fn(f32, &str) + Send + Sync,
{
    fn on_progress(&self, fraction: f32, current: &str) {
        self(fraction, current)
    }
}

/// Observer that ignores all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _fraction: f32, _current: &str) {}
}

/// Fraction of `done` out of `total`, clamped to `0.0..=1.0`
pub(crate) fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        (done as f32 / total as f32).clamp(0.0, 1.0)
    }
}

/// Shared flag a caller sets to stop a running operation between files
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the token can be reused
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_cancellation_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());

        clone.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_closure_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = |fraction: f32, current: &str| {
            seen.lock().unwrap().push((fraction, current.to_string()));
        };
        observer.on_progress(0.5, "a.jpg");
        assert_eq!(seen.lock().unwrap()[0], (0.5, "a.jpg".to_string()));
    }

    #[test]
    fn test_fraction() {
        assert_eq!(fraction(0, 0), 1.0);
        assert_eq!(fraction(1, 4), 0.25);
        assert_eq!(fraction(9, 4), 1.0);
    }
}
