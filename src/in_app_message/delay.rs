//! Outstanding delayed deliveries, keyed by dispatch id.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, Weak},
};

use chrono::{DateTime, Duration, Utc};

use crate::{clock::Clock, Error, Result};

use super::{
    InAppMessageSchedule, InAppMessageScheduleListener, InAppMessageScheduleRequest,
    InAppMessageScheduleType, TimerJob, TimerScheduler,
};

/// A schedule waiting for its delivery time.
#[derive(Debug, Clone, PartialEq)]
pub struct InAppMessageDelay {
    pub schedule: Arc<InAppMessageSchedule>,
    pub requested_at: DateTime<Utc>,
}

impl InAppMessageDelay {
    pub fn from_request(request: &InAppMessageScheduleRequest) -> Self {
        InAppMessageDelay {
            schedule: request.schedule.clone(),
            requested_at: request.requested_at,
        }
    }

    /// `deliver_at - requested_at`.
    pub fn delay(&self) -> Duration {
        self.schedule.time.delay(self.requested_at)
    }
}

pub struct InAppMessageDelayTask {
    pub delay: InAppMessageDelay,
    job: Arc<dyn TimerJob>,
}

impl InAppMessageDelayTask {
    pub fn is_completed(&self) -> bool {
        self.job.is_completed()
    }

    pub fn cancel(&self) {
        self.job.cancel();
        log::debug!(target: "hackle",
            dispatch_id = self.delay.schedule.dispatch_id.as_str();
            "in-app message delay cancelled");
    }
}

/// Arms timers that hand the schedule back to the listener as a [`Delayed`] request.
///
/// [`Delayed`]: InAppMessageScheduleType::Delayed
pub struct InAppMessageDelayScheduler {
    clock: Arc<dyn Clock>,
    timer_scheduler: Arc<dyn TimerScheduler>,
    listener: Weak<dyn InAppMessageScheduleListener>,
}

impl InAppMessageDelayScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        timer_scheduler: Arc<dyn TimerScheduler>,
        listener: Weak<dyn InAppMessageScheduleListener>,
    ) -> Self {
        InAppMessageDelayScheduler {
            clock,
            timer_scheduler,
            listener,
        }
    }

    pub fn schedule(&self, delay: InAppMessageDelay) -> InAppMessageDelayTask {
        let clock = self.clock.clone();
        let listener = self.listener.clone();
        let schedule = delay.schedule.clone();

        // Overdue delays fire right away.
        let wait = delay.delay().to_std().unwrap_or_default();
        let job = self.timer_scheduler.schedule(
            wait,
            Box::new(move || {
                let Some(listener) = listener.upgrade() else {
                    return;
                };
                let request = InAppMessageScheduleRequest::new(
                    schedule,
                    InAppMessageScheduleType::Delayed,
                    clock.now(),
                );
                listener.on_schedule(request);
            }),
        );

        InAppMessageDelayTask { delay, job }
    }
}

/// Owns the delay tasks. At most one pending task exists per dispatch id.
pub struct InAppMessageDelayManager {
    scheduler: InAppMessageDelayScheduler,
    tasks: RwLock<HashMap<String, InAppMessageDelayTask>>,
}

impl InAppMessageDelayManager {
    pub fn new(scheduler: InAppMessageDelayScheduler) -> Self {
        InAppMessageDelayManager {
            scheduler,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Delay a schedule seen for the first time.
    pub fn register_and_delay(
        &self,
        request: &InAppMessageScheduleRequest,
    ) -> Result<InAppMessageDelay> {
        self.delay(request)
    }

    /// Arm a timer for the schedule. Fails if a task for the same dispatch id is still pending;
    /// a completed one is replaced.
    pub fn delay(&self, request: &InAppMessageScheduleRequest) -> Result<InAppMessageDelay> {
        let dispatch_id = request.dispatch_id();
        if self.is_pending(dispatch_id) {
            return Err(Error::DelayAlreadyRegistered(dispatch_id.to_owned()));
        }

        // Armed outside the lock: a timer may run its callback inline.
        let delay = InAppMessageDelay::from_request(request);
        let task = self.scheduler.schedule(delay.clone());

        let mut tasks = self
            .tasks
            .write()
            .expect("thread holding delay lock should not panic");
        if tasks.get(dispatch_id).is_some_and(|it| !it.is_completed()) {
            drop(tasks);
            task.job.cancel();
            return Err(Error::DelayAlreadyRegistered(dispatch_id.to_owned()));
        }
        // A timer that already fired has nothing left to track.
        if task.is_completed() {
            tasks.remove(dispatch_id);
        } else {
            tasks.insert(dispatch_id.to_owned(), task);
        }
        drop(tasks);

        log::debug!(target: "hackle",
            dispatch_id,
            delay_millis = delay.delay().num_milliseconds();
            "in-app message delay started");
        Ok(delay)
    }

    fn is_pending(&self, dispatch_id: &str) -> bool {
        self.tasks
            .read()
            .expect("thread holding delay lock should not panic")
            .get(dispatch_id)
            .is_some_and(|it| !it.is_completed())
    }

    /// Remove the task without cancelling it.
    pub fn delete(&self, dispatch_id: &str) -> Option<InAppMessageDelay> {
        let task = self
            .tasks
            .write()
            .expect("thread holding delay lock should not panic")
            .remove(dispatch_id)?;

        log::debug!(target: "hackle", dispatch_id; "in-app message delay removed");
        Some(task.delay)
    }

    /// Drain all tasks, cancel them and return their delays.
    pub fn cancel_all(&self) -> Vec<InAppMessageDelay> {
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .write()
                .expect("thread holding delay lock should not panic"),
        );

        tasks
            .into_values()
            .map(|task| {
                task.cancel();
                task.delay
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .expect("thread holding delay lock should not panic")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex, OnceLock, Weak,
        },
        time::Duration,
    };

    use crate::{
        decision::DecisionReason,
        in_app_message::{
            EventBasedContext, InAppMessageSchedule, InAppMessageScheduleListener,
            InAppMessageScheduleRequest, InAppMessageScheduleType, ScheduleTime, TimerJob,
            TimerScheduler,
        },
        testing::{timestamp, FixedClock},
        Error,
    };

    use super::{InAppMessageDelayManager, InAppMessageDelayScheduler};

    /// Timer that never fires by itself; tests complete jobs by hand.
    #[derive(Default)]
    struct ManualTimer {
        jobs: Mutex<Vec<(Duration, Arc<ManualJob>)>>,
    }

    #[derive(Default)]
    struct ManualJob {
        completed: AtomicBool,
        cancelled: AtomicBool,
    }

    impl TimerJob for ManualJob {
        fn is_completed(&self) -> bool {
            self.completed.load(Ordering::SeqCst)
        }

        fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    impl TimerScheduler for ManualTimer {
        fn schedule(&self, delay: Duration, _task: Box<dyn FnOnce() + Send>) -> Arc<dyn TimerJob> {
            let job = Arc::new(ManualJob::default());
            self.jobs.lock().unwrap().push((delay, job.clone()));
            job
        }
    }

    struct NoopListener;

    impl InAppMessageScheduleListener for NoopListener {
        fn on_schedule(&self, _request: InAppMessageScheduleRequest) {}
    }

    fn manager(timer: Arc<ManualTimer>) -> InAppMessageDelayManager {
        InAppMessageDelayManager::new(InAppMessageDelayScheduler::new(
            Arc::new(FixedClock(timestamp(0))),
            timer,
            Weak::<NoopListener>::new(),
        ))
    }

    fn request(dispatch_id: &str) -> InAppMessageScheduleRequest {
        let schedule = InAppMessageSchedule {
            dispatch_id: dispatch_id.to_owned(),
            in_app_message_key: 1,
            identifiers: Default::default(),
            time: ScheduleTime {
                started_at: timestamp(100),
                deliver_at: timestamp(110),
            },
            reason: DecisionReason::InAppMessageTarget,
            event_based_context: EventBasedContext {
                insert_id: "insert".into(),
                event_key: "purchase".into(),
            },
        };
        InAppMessageScheduleRequest::new(
            Arc::new(schedule),
            InAppMessageScheduleType::Triggered,
            timestamp(100),
        )
    }

    #[test]
    fn arms_timer_for_remaining_time() {
        let timer = Arc::new(ManualTimer::default());
        let manager = manager(timer.clone());

        let delay = manager.register_and_delay(&request("1")).unwrap();
        assert_eq!(delay.delay(), chrono::Duration::seconds(10));
        assert_eq!(timer.jobs.lock().unwrap()[0].0, Duration::from_secs(10));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn at_most_one_pending_delay_per_dispatch_id() {
        let timer = Arc::new(ManualTimer::default());
        let manager = manager(timer.clone());

        manager.delay(&request("1")).unwrap();
        assert_eq!(
            manager.delay(&request("1")),
            Err(Error::DelayAlreadyRegistered("1".into()))
        );

        timer.jobs.lock().unwrap()[0]
            .1
            .completed
            .store(true, Ordering::SeqCst);
        assert!(manager.delay(&request("1")).is_ok());
        assert_eq!(timer.jobs.lock().unwrap().len(), 2);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn cancel_all_drains_and_cancels() {
        let timer = Arc::new(ManualTimer::default());
        let manager = manager(timer.clone());
        manager.delay(&request("1")).unwrap();
        manager.delay(&request("2")).unwrap();

        let mut cancelled: Vec<String> = manager
            .cancel_all()
            .into_iter()
            .map(|it| it.schedule.dispatch_id.clone())
            .collect();
        cancelled.sort();
        assert_eq!(cancelled, vec!["1", "2"]);

        assert!(timer
            .jobs
            .lock()
            .unwrap()
            .iter()
            .all(|(_, job)| job.cancelled.load(Ordering::SeqCst)));
        assert!(manager.is_empty());
        assert_eq!(manager.delete("1"), None);
    }

    #[test]
    fn delete_returns_delay_once() {
        let manager = manager(Arc::new(ManualTimer::default()));
        manager.delay(&request("1")).unwrap();

        let deleted = manager.delete("1").unwrap();
        assert_eq!(deleted.schedule.dispatch_id, "1");
        assert_eq!(manager.delete("1"), None);
    }

    /// Timer that runs its task on the calling thread.
    struct InlineTimer;

    impl TimerScheduler for InlineTimer {
        fn schedule(&self, _delay: Duration, task: Box<dyn FnOnce() + Send>) -> Arc<dyn TimerJob> {
            let job = Arc::new(ManualJob::default());
            job.completed.store(true, Ordering::SeqCst);
            task();
            job
        }
    }

    /// Removes the delay from the manager as soon as its timer fires.
    #[derive(Default)]
    struct DeletingListener {
        manager: OnceLock<Weak<InAppMessageDelayManager>>,
        deleted: Mutex<Vec<Option<String>>>,
    }

    impl InAppMessageScheduleListener for DeletingListener {
        fn on_schedule(&self, request: InAppMessageScheduleRequest) {
            let Some(manager) = self.manager.get().and_then(Weak::upgrade) else {
                return;
            };
            let deleted = manager
                .delete(request.dispatch_id())
                .map(|it| it.schedule.dispatch_id.clone());
            self.deleted.lock().unwrap().push(deleted);
        }
    }

    #[test]
    fn timer_firing_while_armed_does_not_block() {
        let listener = Arc::new(DeletingListener::default());
        let weak_listener = Arc::downgrade(&listener);
        let manager = Arc::new(InAppMessageDelayManager::new(InAppMessageDelayScheduler::new(
            Arc::new(FixedClock(timestamp(0))),
            Arc::new(InlineTimer),
            weak_listener,
        )));
        listener.manager.set(Arc::downgrade(&manager)).unwrap();

        let delay = manager.delay(&request("1")).unwrap();
        assert_eq!(delay.schedule.dispatch_id, "1");
        assert_eq!(*listener.deleted.lock().unwrap(), vec![None]);
        assert!(manager.is_empty());

        // Nothing is pending, so the same dispatch id can be delayed again.
        assert!(manager.delay(&request("1")).is_ok());
        assert_eq!(listener.deleted.lock().unwrap().len(), 2);
    }
}
