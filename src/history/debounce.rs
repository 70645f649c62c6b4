// src/history/debounce.rs

//! Coalescing of high-frequency edits (live text/value editing).
//!
//! The first edit of a burst stashes the pre-burst state; every edit of the
//! burst restarts a cancellable delayed task. When the burst has been quiet
//! for the whole window, the stashed state is committed as one snapshot, so
//! one undo step reverts the whole burst.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use super::HistoryManager;

/// History shared between a session and its debouncer.
pub type SharedHistory<S> = Arc<Mutex<HistoryManager<S>>>;

#[derive(Debug)]
struct Burst<S> {
    /// State before the first edit of the current burst.
    before: Option<S>,
    /// Bumped on every edit; a timer only commits if it is still current.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
pub struct SnapshotDebouncer<S> {
    history: SharedHistory<S>,
    window: Duration,
    burst: Arc<Mutex<Burst<S>>>,
}

impl<S: Clone + Send + 'static> SnapshotDebouncer<S> {
    pub fn new(history: SharedHistory<S>, window: Duration) -> Self {
        Self {
            history,
            window,
            burst: Arc::new(Mutex::new(Burst {
                before: None,
                generation: 0,
                timer: None,
            })),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Note one edit of a burst; `before` is the state prior to this edit.
    ///
    /// Outside a Tokio runtime there is no timer to coalesce with, so the
    /// snapshot is committed immediately.
    pub fn touch(&self, before: S) {
        let Ok(handle) = Handle::try_current() else {
            debug!("no async runtime; committing live edit snapshot immediately");
            lock(&self.history).snapshot(before);
            return;
        };

        let mut burst = lock(&self.burst);
        if burst.before.is_none() {
            burst.before = Some(before);
        }
        burst.generation += 1;
        if let Some(timer) = burst.timer.take() {
            timer.abort();
        }

        let generation = burst.generation;
        let window = self.window;
        let shared_burst = Arc::clone(&self.burst);
        let history = Arc::clone(&self.history);

        burst.timer = Some(handle.spawn(async move {
            tokio::time::sleep(window).await;

            let mut burst = lock(&shared_burst);
            if burst.generation != generation {
                return;
            }
            burst.timer = None;
            if let Some(state) = burst.before.take() {
                debug!(generation, "edit burst quiet; committing snapshot");
                lock(&history).snapshot(state);
            }
        }));
    }

    /// Commit a pending burst now. Returns whether anything was committed.
    ///
    /// Called before undo/redo and before any discrete edit so ordering in
    /// the history matches the order of edits.
    pub fn flush(&self) -> bool {
        let mut burst = lock(&self.burst);
        burst.generation += 1;
        if let Some(timer) = burst.timer.take() {
            timer.abort();
        }
        match burst.before.take() {
            Some(state) => {
                lock(&self.history).snapshot(state);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.burst).before.is_some()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
