/*!
 * Caller-visible progress/warning/retry surface (component E)
 *
 * Grounded on the reference codebase's `core/progress.rs` publish/subscribe
 * shape, retargeted from file-transfer byte counters to the richer
 * phase/warning/retry-decision surface the orchestrator needs. Abort is
 * modeled as `Err(SyncError::Aborted)` returned from any callback method,
 * per the "treat abort as an explicit error value" design note, rather
 * than a panic or unwind.
 */

use tracing::{info, warn};

use crate::error::{Result, SyncError};

/// Which of the three orchestrator passes is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Move,
    Delete,
    Create,
}

/// The caller's decision after being shown a per-item error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Ignore,
}

/// Caller-supplied progress/warning/retry surface, consulted by the
/// orchestrator at every suspension point: phase transitions, item
/// dispatch, per-item failures, and warnings that might otherwise repeat
/// across runs.
pub trait ProcessCallback {
    fn set_phase(&mut self, _phase: Phase) {}

    fn update_total_data(&mut self, _items_delta: i64, _bytes_delta: i64) {}

    fn update_processed_data(&mut self, _items_delta: i64, _bytes_delta: i64) {}

    fn report_status(&mut self, _text: &str) {}

    fn report_info(&mut self, _text: &str) {}

    /// `suppress` carries an `OptionalDialogs`-style flag the caller may
    /// flip to true to silence this warning class on future calls.
    fn report_warning(&mut self, _text: &str, _suppress: &mut bool) {}

    /// Called once per failed attempt at a per-item operation. Returning
    /// `Ok(RetryDecision::Retry)` restarts the single operation;
    /// `Ok(RetryDecision::Ignore)` skips the item and continues the pass;
    /// `Err(SyncError::Aborted)` unwinds the whole pass.
    fn report_error(&mut self, _text: &str, _retry_count: u32) -> Result<RetryDecision> {
        Ok(RetryDecision::Ignore)
    }

    fn report_fatal_error(&mut self, _text: &str) {}

    /// Polled at the start of every item; lets a caller cancel without
    /// waiting for the next error to be reported.
    fn check_abort(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Default callback: logs everything via `tracing`, never retries, never
/// aborts. Used when a caller doesn't need interactive control.
#[derive(Debug, Default)]
pub struct LoggingCallback;

impl ProcessCallback for LoggingCallback {
    fn set_phase(&mut self, phase: Phase) {
        info!(?phase, "entering sync phase");
    }

    fn report_status(&mut self, text: &str) {
        info!("{}", text);
    }

    fn report_info(&mut self, text: &str) {
        info!("{}", text);
    }

    fn report_warning(&mut self, text: &str, _suppress: &mut bool) {
        warn!("{}", text);
    }

    fn report_error(&mut self, text: &str, retry_count: u32) -> Result<RetryDecision> {
        warn!(retry_count, "{}", text);
        Ok(RetryDecision::Ignore)
    }

    fn report_fatal_error(&mut self, text: &str) {
        tracing::error!("{}", text);
    }
}

/// Test/embedding-friendly callback that aborts after a fixed number of
/// reported errors, useful for exercising the unwind path.
#[derive(Debug, Default)]
pub struct AbortAfterNCallback {
    pub errors_seen: u32,
    pub abort_after: u32,
}

impl ProcessCallback for AbortAfterNCallback {
    fn report_error(&mut self, _text: &str, _retry_count: u32) -> Result<RetryDecision> {
        self.errors_seen += 1;
        if self.errors_seen >= self.abort_after {
            return Err(SyncError::Aborted);
        }
        Ok(RetryDecision::Ignore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_callback_ignores_by_default() {
        let mut cb = LoggingCallback;
        let decision = cb.report_error("boom", 1).unwrap();
        assert_eq!(decision, RetryDecision::Ignore);
    }

    #[test]
    fn abort_after_n_triggers_on_threshold() {
        let mut cb = AbortAfterNCallback {
            errors_seen: 0,
            abort_after: 2,
        };
        assert!(cb.report_error("a", 1).is_ok());
        let err = cb.report_error("b", 1).unwrap_err();
        assert!(matches!(err, SyncError::Aborted));
    }
}
