//! Progress reporting and cancellation for PSF extraction.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress information for the per-candidate stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionProgress {
    /// Candidates processed so far in this stage.
    pub current: usize,
    /// Candidates in this stage.
    pub total: usize,
    pub stage: ExtractionStage,
}

/// Stage of extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    /// Evaluating labeled regions.
    Filtering,
    /// Resampling and accumulating surviving candidates.
    Aligning,
}

/// Optional shared progress callback. May be called from worker threads.
#[derive(Clone, Default)]
pub struct ProgressCallback(Option<Arc<dyn Fn(ExtractionProgress) + Send + Sync>>);

impl ProgressCallback {
    pub fn new(f: impl Fn(ExtractionProgress) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => write!(f, "ProgressCallback(...)"),
            None => write!(f, "ProgressCallback(None)"),
        }
    }
}

/// Report progress using the callback if set.
pub fn report_progress(
    callback: &ProgressCallback,
    current: usize,
    total: usize,
    stage: ExtractionStage,
) {
    if let Some(f) = callback.0.as_ref() {
        f(ExtractionProgress {
            current,
            total,
            stage,
        });
    }
}

/// Shared flag checked before each candidate is aligned.
///
/// Candidates already in flight finish; the rest are skipped and the result
/// is marked partial.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_report_progress_calls_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = ProgressCallback::new(move |p| sink.lock().unwrap().push(p));

        report_progress(&callback, 1, 3, ExtractionStage::Aligning);
        report_progress(&callback, 2, 3, ExtractionStage::Aligning);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            ExtractionProgress {
                current: 2,
                total: 3,
                stage: ExtractionStage::Aligning
            }
        );
    }

    #[test]
    fn test_report_progress_without_callback() {
        let callback = ProgressCallback::none();
        assert!(!callback.is_some());
        report_progress(&callback, 0, 1, ExtractionStage::Filtering);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
