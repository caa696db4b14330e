//! # Scheduler
//!
//! Explicit task queue for deferred work on the loading thread: deferred
//! observer delivery, zero-delay cancellation timers, postponed cache pruning
//! and font load-limit timers.
//!
//! Nothing runs until the owner drains the queue with
//! [`Scheduler::run_until_idle`]. Immediate tasks run in posting order; delayed
//! tasks run once the clock reaches their deadline, ordered by deadline and
//! then by posting order.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::clock::Clock;

type Task = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    Cancelled,
    Ran,
}

struct Posted {
    label: &'static str,
    state: Rc<Cell<TaskState>>,
    task: Task,
}

/// Handle to a posted task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: Rc<Cell<TaskState>>,
}

impl TaskHandle {
    /// Prevent the task from running. No effect once it has run.
    pub fn cancel(&self) {
        if self.state.get() == TaskState::Pending {
            self.state.set(TaskState::Cancelled);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.get() == TaskState::Pending
    }
}

struct SchedulerInner {
    clock: Rc<dyn Clock>,
    immediate: RefCell<VecDeque<Posted>>,
    delayed: RefCell<BTreeMap<(DateTime<Utc>, u64), Posted>>,
    next_seq: Cell<u64>,
}

/// Single-threaded task queue shared by a memory cache and the fetchers that
/// use it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("immediate", &self.inner.immediate.borrow().len())
            .field("delayed", &self.inner.delayed.borrow().len())
            .finish()
    }
}

impl Scheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                clock,
                immediate: RefCell::new(VecDeque::new()),
                delayed: RefCell::new(BTreeMap::new()),
                next_seq: Cell::new(0),
            }),
        }
    }

    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.inner.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Post a task to run on the next drain.
    pub fn post(&self, label: &'static str, task: impl FnOnce() + 'static) -> TaskHandle {
        let (posted, handle) = Self::wrap(label, Box::new(task));
        self.inner.immediate.borrow_mut().push_back(posted);
        handle
    }

    /// Post a task to run once `delay` has elapsed on the scheduler's clock.
    /// A zero delay behaves like [`Scheduler::post`].
    pub fn post_delayed(
        &self,
        label: &'static str,
        delay: Duration,
        task: impl FnOnce() + 'static,
    ) -> TaskHandle {
        if delay.is_zero() {
            return self.post(label, task);
        }
        let deadline = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| self.now().checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);
        let (posted, handle) = Self::wrap(label, Box::new(task));
        self.inner.delayed.borrow_mut().insert((deadline, seq), posted);
        handle
    }

    fn wrap(label: &'static str, task: Task) -> (Posted, TaskHandle) {
        let state = Rc::new(Cell::new(TaskState::Pending));
        (
            Posted {
                label,
                state: state.clone(),
                task,
            },
            TaskHandle { state },
        )
    }

    fn pop_ready(&self) -> Option<Posted> {
        if let Some(posted) = self.inner.immediate.borrow_mut().pop_front() {
            return Some(posted);
        }
        let now = self.now();
        let mut delayed = self.inner.delayed.borrow_mut();
        let key = *delayed.keys().next()?;
        if key.0 > now {
            return None;
        }
        delayed.remove(&key)
    }

    /// Run a single ready task. Returns false when nothing was ready.
    pub fn run_one(&self) -> bool {
        loop {
            let Some(posted) = self.pop_ready() else {
                return false;
            };
            if posted.state.get() != TaskState::Pending {
                continue;
            }
            posted.state.set(TaskState::Ran);
            trace!(task = posted.label, "Running scheduled task");
            (posted.task)();
            return true;
        }
    }

    /// Run ready tasks, including ones posted while draining, until none are
    /// left. Returns the number of tasks that ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Whether any non-cancelled task is waiting, ready or not.
    pub fn has_pending_tasks(&self) -> bool {
        let pending = |p: &Posted| p.state.get() == TaskState::Pending;
        self.inner.immediate.borrow().iter().any(pending)
            || self.inner.delayed.borrow().values().any(pending)
    }

    /// Deadline of the earliest pending delayed task.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.inner
            .delayed
            .borrow()
            .iter()
            .find(|(_, p)| p.state.get() == TaskState::Pending)
            .map(|((deadline, _), _)| *deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn scheduler() -> (Scheduler, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        (Scheduler::new(clock.clone()), clock)
    }

    #[test]
    fn test_immediate_tasks_run_in_order() {
        let (scheduler, _) = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            scheduler.post("push", move || log.borrow_mut().push(i));
        }
        assert_eq!(scheduler.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_cancelled_task_is_skipped() {
        let (scheduler, _) = scheduler();
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        let handle = scheduler.post("flag", move || flag.set(true));
        handle.cancel();
        assert!(!scheduler.has_pending_tasks());
        assert_eq!(scheduler.run_until_idle(), 0);
        assert!(!hit.get());
    }

    #[test]
    fn test_tasks_posted_while_draining_run() {
        let (scheduler, _) = scheduler();
        let count = Rc::new(Cell::new(0));
        let inner_scheduler = scheduler.clone();
        let counter = count.clone();
        scheduler.post("outer", move || {
            counter.set(counter.get() + 1);
            let counter = counter.clone();
            inner_scheduler.post("inner", move || counter.set(counter.get() + 1));
        });
        assert_eq!(scheduler.run_until_idle(), 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_delayed_task_waits_for_clock() {
        let (scheduler, clock) = scheduler();
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        let handle = scheduler.post_delayed("timer", Duration::from_secs(3), move || flag.set(true));

        assert_eq!(scheduler.run_until_idle(), 0);
        assert!(handle.is_pending());
        assert!(scheduler.next_deadline().is_some());

        clock.advance(Duration::from_secs(3));
        assert_eq!(scheduler.run_until_idle(), 1);
        assert!(hit.get());
        assert!(!handle.is_pending());
    }

    #[test]
    fn test_delayed_tasks_ordered_by_deadline() {
        let (scheduler, clock) = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = log.clone();
        scheduler.post_delayed("late", Duration::from_secs(5), move || l1.borrow_mut().push("late"));
        let l2 = log.clone();
        scheduler.post_delayed("early", Duration::from_secs(1), move || l2.borrow_mut().push("early"));
        clock.advance(Duration::from_secs(10));
        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn test_huge_delays_saturate() {
        let (scheduler, clock) = scheduler();
        // Past the last representable date, then past chrono's range.
        let far = Duration::from_secs(100_000_000 * 365 * 86_400);
        let first = scheduler.post_delayed("far", far, || {});
        let second = scheduler.post_delayed("forever", Duration::MAX, || {});
        assert_eq!(scheduler.next_deadline(), Some(DateTime::<Utc>::MAX_UTC));

        clock.advance(Duration::from_secs(365 * 86_400));
        assert_eq!(scheduler.run_until_idle(), 0);
        assert!(first.is_pending());
        assert!(second.is_pending());
    }
}
