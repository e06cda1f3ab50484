// CrabSift - GPL-3.0-or-later
// This file is part of CrabSift.
//
// Copyright (C) 2025 The CrabSift contributors
//
// CrabSift is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// CrabSift is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with CrabSift.  If not, see <https://www.gnu.org/licenses/>.

//! Progress reporting and cooperative cancellation.
//!
//! Every long loop in the crate (records in vectorization, trees in forest
//! training, rows in the rarity scan) polls a [`CancelToken`] at each
//! iteration boundary and ticks a [`ProgressTracker`]. Events are fire and
//! forget: the pipeline never waits for the consumer.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of iterations between two progress events
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

/// Pipeline stage a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Vectorize,
    TrainForest,
    ScoreOutliers,
    RarityScan,
}

/// Snapshot of a running stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// Records (or trees, while training) processed so far
    pub records_scanned: usize,
    /// Records kept so far
    pub records_retained: usize,
    pub elapsed: Duration,
}

/// Receiver of progress events. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

impl ProgressSink for Sender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        // Receiver may be gone already, progress is best effort
        let _ = self.send(event);
    }
}

static NO_PROGRESS: NoProgress = NoProgress;

/// Shared flag the caller sets to stop a running analysis.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Everything a pipeline stage needs besides its input: where to send
/// progress, how often, and which flag to poll for cancellation.
#[derive(Clone)]
pub struct RunContext<'a> {
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
    every: usize,
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("cancel", &self.cancel)
            .field("every", &self.every)
            .finish_non_exhaustive()
    }
}

impl Default for RunContext<'static> {
    fn default() -> Self {
        Self {
            sink: &NO_PROGRESS,
            cancel: CancelToken::new(),
            every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl<'a> RunContext<'a> {
    /// Context reporting to `sink` and polling `cancel`.
    #[must_use]
    pub fn new(sink: &'a dyn ProgressSink, cancel: CancelToken) -> Self {
        Self {
            sink,
            cancel,
            every: DEFAULT_PROGRESS_EVERY,
        }
    }

    /// Change the event cadence. Zero is treated as one.
    #[must_use]
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.every = every.max(1);
        self
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Same sink and cadence, but a fresh cancel flag nobody else holds.
    ///
    /// Used to finish a stage over input that was already cut short.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            sink: self.sink,
            cancel: CancelToken::new(),
            every: self.every,
        }
    }

    /// Start tracking a stage.
    #[must_use]
    pub fn tracker(&self, stage: Stage) -> ProgressTracker<'_> {
        ProgressTracker {
            stage,
            sink: self.sink,
            every: self.every,
            started: Instant::now(),
            scanned: AtomicUsize::new(0),
            retained: AtomicUsize::new(0),
        }
    }
}

/// Counts iterations of one stage and emits an event every `every` ticks.
///
/// Counters are atomic so rayon workers can share one tracker.
pub struct ProgressTracker<'a> {
    stage: Stage,
    sink: &'a dyn ProgressSink,
    every: usize,
    started: Instant,
    scanned: AtomicUsize,
    retained: AtomicUsize,
}

impl ProgressTracker<'_> {
    /// Record one processed item, `kept` telling whether it was retained.
    pub fn tick(&self, kept: bool) {
        let retained = if kept {
            self.retained.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.retained.load(Ordering::Relaxed)
        };
        let scanned = self.scanned.fetch_add(1, Ordering::Relaxed) + 1;
        if scanned % self.every == 0 {
            self.emit(scanned, retained);
        }
    }

    /// Record one processed item when the retained count is owned elsewhere
    /// and may shrink again (top-N truncation).
    pub fn tick_retained(&self, retained: usize) {
        self.retained.store(retained, Ordering::Relaxed);
        let scanned = self.scanned.fetch_add(1, Ordering::Relaxed) + 1;
        if scanned % self.every == 0 {
            self.emit(scanned, retained);
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Emit the closing event of the stage.
    pub fn finish(&self) {
        self.emit(
            self.scanned.load(Ordering::Relaxed),
            self.retained.load(Ordering::Relaxed),
        );
    }

    fn emit(&self, records_scanned: usize, records_retained: usize) {
        self.sink.report(ProgressEvent {
            stage: self.stage,
            records_scanned,
            records_retained,
            elapsed: self.started.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_events_follow_cadence() {
        let (tx, rx) = channel();
        let ctx = RunContext::new(&tx, CancelToken::new()).with_progress_every(10);
        let tracker = ctx.tracker(Stage::Vectorize);
        for i in 0..25 {
            tracker.tick(i % 2 == 0);
        }
        tracker.finish();
        drop(tx);

        let events: Vec<ProgressEvent> = rx.iter().collect();
        assert_eq!(events.len(), 3, "two cadence events plus the final one");
        assert_eq!(events[0].records_scanned, 10);
        assert_eq!(events[0].records_retained, 5);
        assert_eq!(events[2].records_scanned, 25);
        assert_eq!(events[2].records_retained, 13);
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let ctx = RunContext::new(&NoProgress, token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_detached_context_ignores_cancel() {
        let token = CancelToken::new();
        let ctx = RunContext::new(&NoProgress, token.clone()).with_progress_every(7);
        token.cancel();
        let detached = ctx.detached();
        assert!(ctx.is_cancelled());
        assert!(!detached.is_cancelled());
        assert!(format!("{detached:?}").contains("every: 7"));
    }

    #[test]
    fn test_final_event_carries_tracker_elapsed() {
        let (tx, rx) = channel();
        let ctx = RunContext::new(&tx, CancelToken::new());
        let tracker = ctx.tracker(Stage::TrainForest);
        tracker.tick(true);
        tracker.finish();
        let after = tracker.elapsed();
        drop(tx);

        let events: Vec<ProgressEvent> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert!(events[0].elapsed <= after);
    }

    #[test]
    fn test_dropped_receiver_does_not_block() {
        let (tx, rx) = channel();
        drop(rx);
        let ctx = RunContext::new(&tx, CancelToken::new()).with_progress_every(1);
        let tracker = ctx.tracker(Stage::RarityScan);
        tracker.tick(true);
        tracker.finish();
    }
}
