use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::analysis::analyzer::{Analyzer, AnalyzerState};
use crate::config::EngineConfig;
use crate::foundation::error::{GaugeError, GaugeResult};

/// Lifecycle state of an analysis queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// No worker is running.
    Stopped,
    /// The worker is processing analyzers.
    Running,
    /// The worker is idling on the pause flag.
    Paused,
}

struct QueueShared {
    analyzers: Mutex<Vec<Arc<Analyzer>>>,
    state: Mutex<QueueState>,
    current: Mutex<Option<Arc<Analyzer>>>,
    paused: AtomicBool,
    stopped: AtomicBool,
}

/// Sequentializes analysis runs across multiple analyzers.
///
/// A single worker thread calls `analyze()` on each queued analyzer in
/// order, skipping those already `Done`. The pause flag is re-checked
/// before each item with a coarse busy-wait; the stop flag ends the queue
/// early and, under `cancel_on_stop`, also cancels the in-flight
/// analyzer instead of letting it finish. A failing analyzer is isolated:
/// the queue logs and proceeds to the next.
pub struct AnalysisQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
    cancel_on_stop: bool,
}

impl AnalysisQueue {
    /// Construct an empty, stopped queue.
    pub fn new(engine: &EngineConfig, cancel_on_stop: bool) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                analyzers: Mutex::new(Vec::new()),
                state: Mutex::new(QueueState::Stopped),
                current: Mutex::new(None),
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
            poll_interval: engine.queue_poll_interval,
            cancel_on_stop,
        }
    }

    /// Append an analyzer to the run order.
    pub fn push(&self, analyzer: Arc<Analyzer>) {
        if let Ok(mut analyzers) = self.shared.analyzers.lock() {
            analyzers.push(analyzer);
        }
    }

    /// Queued analyzer ids, in run order.
    pub fn ids(&self) -> Vec<String> {
        self.shared
            .analyzers
            .lock()
            .map(|a| a.iter().map(|x| x.id().to_string()).collect())
            .unwrap_or_default()
    }

    /// Current queue state.
    pub fn state(&self) -> QueueState {
        self.shared
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(QueueState::Stopped)
    }

    /// Start the worker thread. Fails when the queue is already running.
    pub fn start(&self) -> GaugeResult<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| GaugeError::validation("queue worker lock poisoned"))?;
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(GaugeError::validation("queue is already running"));
        }

        self.shared.stopped.store(false, Ordering::Relaxed);
        set_state(&self.shared, QueueState::Running);

        let shared = self.shared.clone();
        let poll_interval = self.poll_interval;
        *worker = Some(std::thread::spawn(move || {
            run_worker(&shared, poll_interval);
        }));
        Ok(())
    }

    /// Raise the pause flag; the worker idles before the next item.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Relaxed);
    }

    /// Clear the pause flag.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
    }

    /// Raise the stop flag, ending the queue after (or, with
    /// `cancel_on_stop`, during) the current item.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Relaxed);
        if self.cancel_on_stop
            && let Ok(current) = self.shared.current.lock()
            && let Some(analyzer) = current.as_ref()
        {
            analyzer.cancel();
        }
    }

    /// Wait for the worker thread to finish.
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .ok()
            .and_then(|mut worker| worker.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn set_state(shared: &QueueShared, state: QueueState) {
    if let Ok(mut guard) = shared.state.lock() {
        *guard = state;
    }
}

fn run_worker(shared: &QueueShared, poll_interval: Duration) {
    let analyzers: Vec<Arc<Analyzer>> = shared
        .analyzers
        .lock()
        .map(|a| a.clone())
        .unwrap_or_default();

    'queue: for analyzer in analyzers {
        // Coarse busy-wait on the pause flag; granularity of ~0.5s is
        // acceptable here.
        while shared.paused.load(Ordering::Relaxed) {
            if shared.stopped.load(Ordering::Relaxed) {
                break 'queue;
            }
            set_state(shared, QueueState::Paused);
            std::thread::sleep(poll_interval);
        }
        set_state(shared, QueueState::Running);

        if shared.stopped.load(Ordering::Relaxed) {
            debug!(id = analyzer.id(), "queue stopped before item");
            break;
        }
        if analyzer.state() == AnalyzerState::Done {
            debug!(id = analyzer.id(), "skipping analyzer already done");
            continue;
        }

        if let Ok(mut current) = shared.current.lock() {
            *current = Some(analyzer.clone());
        }

        let completed = analyzer.analyze();
        if !completed {
            // Isolated failure or cancellation; the queue moves on.
            warn!(
                id = analyzer.id(),
                state = ?analyzer.state(),
                "queued analysis did not complete"
            );
        }

        if let Ok(mut current) = shared.current.lock() {
            *current = None;
        }
    }

    set_state(shared, QueueState::Stopped);
    info!("analysis queue worker finished");
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/queue.rs"]
mod tests;
