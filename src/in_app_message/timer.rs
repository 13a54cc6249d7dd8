//! Cancellable one-shot timers.
use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{runtime::Handle, task::AbortHandle};

/// A scheduled callback.
pub trait TimerJob: Send + Sync {
    /// `true` once the callback has started.
    fn is_completed(&self) -> bool;

    /// Once this returns the callback never starts. No-op for a completed job.
    fn cancel(&self);
}

pub trait TimerScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Arc<dyn TimerJob>;
}

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Runs every timer as a task on a tokio runtime.
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        TokioScheduler { handle }
    }

    /// Scheduler on the runtime of the calling context.
    ///
    /// Panics when called outside of a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        TokioScheduler::new(Handle::current())
    }
}

impl TimerScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Arc<dyn TimerJob> {
        let state = Arc::new(AtomicU8::new(PENDING));

        let abort_handle = {
            let state = state.clone();
            self.handle
                .spawn(async move {
                    tokio::time::sleep(delay).await;
                    // Whoever moves the state out of PENDING first wins: either the timer runs
                    // the task, or cancel() prevents it.
                    if state
                        .compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        task();
                    }
                })
                .abort_handle()
        };

        Arc::new(TokioJob {
            state,
            abort_handle,
        })
    }
}

struct TokioJob {
    state: Arc<AtomicU8>,
    abort_handle: AbortHandle,
}

impl TimerJob for TokioJob {
    fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETED
    }

    fn cancel(&self) {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.abort_handle.abort();
        }
    }
}
