/*!
 * Monitor loop (component G)
 *
 * `Waiting`/`Active` state machine with debounce-reset-on-every-change and
 * fire-once-per-quiescent-window semantics, taken almost line for line from
 * the reference monitor's wait/debounce design. The debounce arithmetic
 * (`Debouncer`) is kept free of real timers so it can be driven by a fake
 * clock in tests; `MonitorLoop` is the real-time wrapper around it.
 */

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::Result;
use crate::fsops::primitives;

use super::{ChangeEvent, DirWatcher};

/// Polling interval for the base-directory existence probe, matching the
/// reference monitor's `CHECK_DIR_INTERVAL`.
pub const CHECK_DIR_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Waiting,
    Active,
}

/// Pure debounce bookkeeping: every change pushes `next_exec_time` out by
/// `delay`; the command fires at most once per quiescent window.
#[derive(Debug, Default)]
pub struct Debouncer {
    next_exec_time: Option<Instant>,
    pending: Option<ChangeEvent>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change and push the execution deadline out by `delay`.
    pub fn on_change(&mut self, event: ChangeEvent, now: Instant, delay: Duration) {
        self.pending = Some(event);
        self.next_exec_time = Some(now + delay);
    }

    /// True once `now` has reached the scheduled deadline and a change is
    /// still pending.
    pub fn ready(&self, now: Instant) -> bool {
        matches!(self.next_exec_time, Some(deadline) if now >= deadline) && self.pending.is_some()
    }

    /// Consume the pending change once it's ready to fire, resetting the
    /// deadline to "never" so the command executes at most once per
    /// quiescent batch.
    pub fn take_if_ready(&mut self, now: Instant) -> Option<ChangeEvent> {
        if self.ready(now) {
            self.next_exec_time = None;
            self.pending.take()
        } else {
            None
        }
    }
}

/// Drives one or more `DirWatcher`s through the `Waiting`/`Active` state
/// machine, invoking a caller-supplied command at most once per quiescent
/// debounce window.
pub struct MonitorLoop {
    paths: Vec<PathBuf>,
    delay: Duration,
    state: MonitorState,
}

impl MonitorLoop {
    pub fn new(paths: Vec<PathBuf>, delay: Duration) -> Self {
        Self {
            paths,
            delay,
            state: MonitorState::Waiting,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    fn all_dirs_exist(&self) -> bool {
        self.paths
            .iter()
            .all(|p| matches!(primitives::probe_path(p), Ok(primitives::PathKind::Dir)))
    }

    /// Block until every watched path exists, polling once per
    /// `CHECK_DIR_INTERVAL`. Calls `on_refresh` on every idle poll so a
    /// caller can pump other work (a GUI event loop, a shutdown check).
    pub fn wait_for_missing_dirs(&mut self, mut on_refresh: impl FnMut() -> bool) {
        while !self.all_dirs_exist() {
            if !on_refresh() {
                return;
            }
            std::thread::sleep(CHECK_DIR_INTERVAL);
        }
        self.state = MonitorState::Active;
    }

    /// Run the `Active` state's inner loop: watch for changes, debounce,
    /// and invoke `on_execute` at most once per quiescent window. Returns
    /// when a watched base directory disappears (so the caller can go back
    /// to `wait_for_missing_dirs`) or when `should_stop` asks to exit.
    pub fn run_active(
        &mut self,
        watchers: &mut [DirWatcher],
        mut on_execute: impl FnMut(&ChangeEvent) -> Result<()>,
        mut should_stop: impl FnMut() -> bool,
    ) -> Result<()> {
        let mut debouncer = Debouncer::new();
        let now = Instant::now();
        debouncer.next_exec_time = Some(now + self.delay);

        loop {
            if should_stop() {
                return Ok(());
            }

            if !self.all_dirs_exist() {
                self.state = MonitorState::Waiting;
                return Ok(());
            }

            let now = Instant::now();
            let mut saw_change = false;
            for watcher in watchers.iter_mut() {
                for event in watcher.get_changes() {
                    debouncer.on_change(event, now, self.delay);
                    saw_change = true;
                }
            }

            if !saw_change {
                if let Some(event) = debouncer.take_if_ready(now) {
                    info!(?event, "quiescent window elapsed, executing command");
                    on_execute(&event)?;
                }
            }

            std::thread::sleep(CHECK_DIR_INTERVAL);
        }
    }
}

pub fn root_paths(pairs: &[(PathBuf, PathBuf)]) -> Vec<PathBuf> {
    pairs
        .iter()
        .flat_map(|(left, right)| [left.clone(), right.clone()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn debouncer_resets_deadline_on_every_change() {
        let mut debouncer = Debouncer::new();
        let t0 = Instant::now();
        let delay = Duration::from_secs(10);

        debouncer.on_change(
            ChangeEvent {
                action: super::super::ChangeAction::Create,
                path: PathBuf::from("a.txt"),
            },
            t0,
            delay,
        );
        assert!(!debouncer.ready(t0 + Duration::from_secs(5)));

        debouncer.on_change(
            ChangeEvent {
                action: super::super::ChangeAction::Update,
                path: PathBuf::from("a.txt"),
            },
            t0 + Duration::from_secs(5),
            delay,
        );
        assert!(!debouncer.ready(t0 + Duration::from_secs(14)));
        assert!(debouncer.ready(t0 + Duration::from_secs(15)));
    }

    #[test]
    fn debouncer_fires_at_most_once_per_window() {
        let mut debouncer = Debouncer::new();
        let t0 = Instant::now();
        let delay = Duration::from_secs(1);

        debouncer.on_change(
            ChangeEvent {
                action: super::super::ChangeAction::Create,
                path: PathBuf::from("a.txt"),
            },
            t0,
            delay,
        );

        let fired = debouncer.take_if_ready(t0 + Duration::from_secs(2));
        assert!(fired.is_some());
        assert!(debouncer.take_if_ready(t0 + Duration::from_secs(3)).is_none());
    }

    #[test]
    fn wait_for_missing_dirs_becomes_active_once_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = MonitorLoop::new(vec![dir.path().to_path_buf()], Duration::from_secs(1));
        let mut calls = 0;
        monitor.wait_for_missing_dirs(|| {
            calls += 1;
            calls < 5
        });
        assert_eq!(monitor.state(), MonitorState::Active);
    }
}
