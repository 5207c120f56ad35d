//! Task manager implementation.
//!
//! The manager owns everything the task core shares between task context,
//! the tick interrupt and other tasks:
//! - the ready queue ([`Scheduler`])
//! - the live-task registry and the closed-task registry
//! - the pid allocator and the timer list
//! - the current task of the CPU
//!
//! Lock order is always the task lock first, then at most one of the
//! structure locks above. Nothing takes a task lock while holding a
//! structure lock.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;
use core::sync::atomic::{AtomicUsize, Ordering};

use intrusive_collections::LinkedList;

use crate::config::kernel::{MAX_PRIORITY, MAX_TASKS, MAX_TIMERS};
use crate::error::{TaskError, TaskResult};
use crate::hal::{KernelHal, SpinNoIrq};
use crate::mm::TaskPage;

use super::Scheduler;
use super::pid::{PidAllocator, PidGuard};
use super::scheduler::BaseScheduler;
use super::task::{
    ListOwner, PrioMask, RegistryAdapter, SchedAdapter, Task, TaskCleanup, TaskEntry, TaskId,
    TaskParams, TaskRef, TaskSched, TaskStatus, WakeReason,
};
use super::task_ops::task_exit;
use super::timers::{Expired, Expiry, TimerList};
use super::wait_queue::WaitQueueRef;

static NEXT_MANAGER_ID: AtomicUsize = AtomicUsize::new(1);

/// Capacities of one manager.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Highest task identifier handed out.
    pub max_tasks: usize,
    /// Number of timer slots; a task created when all are taken has no timer.
    pub max_timers: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_tasks: MAX_TASKS,
            max_timers: MAX_TIMERS,
        }
    }
}

/// Task manager that handles all task scheduling operations.
pub struct TaskManager {
    id: usize,
    hal: Arc<dyn KernelHal>,
    /// Scheduler for ready tasks.
    scheduler: SpinNoIrq<Scheduler>,
    /// Live tasks.
    tasks: SpinNoIrq<LinkedList<RegistryAdapter>>,
    /// Deleted tasks waiting to be reaped.
    closed: SpinNoIrq<LinkedList<SchedAdapter>>,
    pids: SpinNoIrq<PidAllocator>,
    timers: SpinNoIrq<TimerList>,
    current: SpinNoIrq<Option<TaskRef>>,
}

fn valid_priority(prio: u8) -> bool {
    // Folds away when the priority space covers all of u8.
    MAX_PRIORITY > u8::MAX as usize || (prio as usize) < MAX_PRIORITY
}

/// Timer callback of every task.
fn timeout(manager: &TaskManager, task: &TaskRef, expiry: Expiry) {
    manager.on_timeout(task, expiry);
}

impl TaskManager {
    /// Creates a new task manager.
    pub fn new(hal: Arc<dyn KernelHal>) -> Self {
        Self::with_config(hal, ManagerConfig::default())
    }

    pub fn with_config(hal: Arc<dyn KernelHal>, config: ManagerConfig) -> Self {
        let mut scheduler = Scheduler::new();
        scheduler.init();

        info!("Scheduler used: {}", Scheduler::scheduler_name());

        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            hal,
            scheduler: SpinNoIrq::new(scheduler),
            tasks: SpinNoIrq::new(LinkedList::new(RegistryAdapter::NEW)),
            closed: SpinNoIrq::new(LinkedList::new(SchedAdapter::NEW)),
            pids: SpinNoIrq::new(PidAllocator::new(config.max_tasks)),
            timers: SpinNoIrq::new(TimerList::new(config.max_timers)),
            current: SpinNoIrq::new(None),
        }
    }

    /// Creates a task in SUSPENDED state and registers it.
    ///
    /// On error nothing is left behind: the page and the identifier taken so
    /// far go back to their allocators. A task whose timer cannot be set up
    /// is still returned; see [`Task::has_timer`].
    pub fn create(
        &self,
        name: &'static str,
        entry: TaskEntry,
        parameter: usize,
        priority: u8,
        tick: u32,
        cleanup: Option<TaskCleanup>,
    ) -> TaskResult<TaskRef> {
        if !valid_priority(priority) {
            error!("{}: Priority should be less than {}", name, MAX_PRIORITY);
            return Err(TaskError::InvalidPriority);
        }

        let page = TaskPage::alloc(&self.hal).ok_or_else(|| {
            error!("{}: alloc task page error", name);
            TaskError::OutOfMemory
        })?;
        let pid = PidGuard::alloc(&self.pids).ok_or_else(|| {
            error!("{}: alloc pid error", name);
            TaskError::NoIdentifierAvailable
        })?;

        let sp = self
            .hal
            .stack_init(entry, parameter, page.stack_start(), task_exit);
        let id = pid.keep();

        let task = Arc::new_cyclic(|this| {
            let timer = match self.timers.lock().init(name, timeout, this.clone()) {
                Ok(timer) => Some(timer),
                Err(err) => {
                    error!("{} init timer error: {:?}", name, err);
                    None
                }
            };
            Task::new(TaskParams {
                id,
                name,
                owner: self.id,
                entry,
                parameter,
                page,
                sp,
                priority,
                tick,
                timer,
                cleanup,
            })
        });
        task.page().set_owner(Arc::as_ptr(&task));

        self.tasks.lock().push_back(task.clone());

        info!(
            "Task Created: id={}, name={}, priority={}, tick={}",
            id, name, priority, tick
        );
        Ok(task)
    }

    /// Deletes a task: it leaves every queue and the live registry, becomes
    /// CLOSING and is parked in the closed registry until [`reap`].
    ///
    /// Deleting the current task requests a reschedule; on a real platform
    /// that call does not come back.
    ///
    /// [`reap`]: TaskManager::reap
    pub fn delete(&self, task: &TaskRef) -> TaskResult<()> {
        self.check_owner(task)?;

        let is_current = {
            let mut sched = task.lock();
            if sched.status == TaskStatus::Closing {
                warn!("{}: task is already closing", task.name());
                return Err(TaskError::InvalidState);
            }
            self.unlink(task, &mut sched);
            unsafe {
                self.tasks
                    .lock()
                    .cursor_mut_from_ptr(Arc::as_ptr(task))
                    .remove();
            }
            sched.status = TaskStatus::Closing;
            if let Some(timer) = sched.timer.take() {
                self.timers.lock().release(timer);
            }
            self.closed.lock().push_back(task.clone());
            sched.owner = ListOwner::Closed;
            self.pids.lock().free(task.id());
            self.is_current(task)
        };

        info!("Task Deleted: id={}, name={}", task.id(), task.name());

        if is_current {
            self.hal.switch_task();
        }
        Ok(())
    }

    /// Unlinks closed tasks from the closed registry and hands them back.
    ///
    /// The current task is skipped while it is still running on its own
    /// stack. A task's page is freed when the last reference to it drops.
    pub fn reap(&self) -> Vec<TaskRef> {
        let current = self.current_task();
        let mut reclaimed = Vec::new();
        for task in self.closed_tasks() {
            if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &task)) {
                continue;
            }
            let mut sched = task.lock();
            if !matches!(sched.owner, ListOwner::Closed) {
                continue;
            }
            self.unlink(&task, &mut sched);
            drop(sched);
            debug!("Task Reaped: id={}, name={}", task.id(), task.name());
            reclaimed.push(task);
        }
        reclaimed
    }

    /// Exit path of the current task: runs its cleanup hook and deletes it.
    pub fn exit_current(&self) -> ! {
        let task = self.current_task().expect("task exit without a current task");

        info!("Task Exited: id={}, name={}", task.id(), task.name());

        if let Some(cleanup) = task.cleanup() {
            cleanup(&task);
        }
        if let Err(err) = self.delete(&task) {
            panic!("exiting task {} could not be deleted: {}", task.name(), err);
        }

        unreachable!("task exited!");
    }

    /// Admits a SUSPENDED task to the ready queue and requests a reschedule.
    pub fn ready(&self, task: &TaskRef) -> TaskResult<()> {
        self.check_owner(task)?;
        {
            let mut sched = task.lock();
            match sched.status {
                TaskStatus::Suspended => self.admit(task, &mut sched),
                TaskStatus::Ready | TaskStatus::Running => {
                    warn!("{}:task is already in a ready state", task.name());
                    return Err(TaskError::AlreadyReady);
                }
                status => {
                    warn!("{}: cannot ready a task in status {:?}", task.name(), status);
                    return Err(TaskError::InvalidState);
                }
            }
        }
        self.hal.switch_task();
        Ok(())
    }

    /// The current task gives up the CPU to its priority peers.
    ///
    /// # Panics
    ///
    /// Panics unless there is a current task and it is RUNNING.
    pub fn yield_now(&self) {
        let task = self.current_task().expect("yield without a current task");
        {
            let mut sched = task.lock();
            assert!(
                sched.status == TaskStatus::Running,
                "task {} yielded while {:?}",
                task.name(),
                sched.status
            );
            self.withdraw(&task, &mut sched);
            self.admit(&task, &mut sched);
        }
        self.hal.switch_task();
    }

    /// Takes a READY or RUNNING task off the ready queue into WAITING.
    ///
    /// # Panics
    ///
    /// Panics if `task` is the current task and is not READY or RUNNING.
    pub fn hang(&self, task: &TaskRef) -> TaskResult<()> {
        self.check_owner(task)?;
        let mut sched = task.lock();
        self.hang_locked(task, &mut sched)
    }

    /// Brings a WAITING task back to the ready queue, cancelling its pending
    /// timeout and taking it off any wait queue.
    ///
    /// # Panics
    ///
    /// Panics if the task is not WAITING.
    pub fn resume(&self, task: &TaskRef) -> TaskResult<()> {
        self.check_owner(task)?;
        let mut sched = task.lock();
        assert!(
            sched.status == TaskStatus::Waiting,
            "task(={}) status(={:?}) is not WAITING",
            task.name(),
            sched.status
        );
        self.stop_timer(&sched);
        self.unlink(task, &mut sched);
        self.admit(task, &mut sched);
        trace!("Task Resumed: id={}, name={}", task.id(), task.name());
        Ok(())
    }

    /// Puts the current task to sleep for `ticks` scheduler ticks.
    pub fn sleep(&self, ticks: u32) -> TaskResult<()> {
        if ticks == 0 {
            error!("sleep tick is 0");
            return Err(TaskError::InvalidArgument);
        }
        let task = self.current_task().ok_or(TaskError::InvalidState)?;

        {
            let mut sched = task.lock();
            let Some(timer) = sched.timer else {
                error!("{}: task has no timer, cannot sleep", task.name());
                return Err(TaskError::TimerUnavailable);
            };
            if let Err(err) = self.hang_locked(&task, &mut sched) {
                error!("{} task hang error, rc={}", task.name(), err.errno());
                return Err(err);
            }
            if let Err(err) = self.timers.lock().start(timer, ticks) {
                error!("{}: arm timer error: {:?}", task.name(), err);
            }
        }

        self.hal.switch_task();

        let mut sched = task.lock();
        if sched.wake == WakeReason::TimedOut {
            sched.wake = WakeReason::Normal;
        }
        Ok(())
    }

    /// Changes the current priority of a task.
    ///
    /// A task in the ready queue moves to its new level under one hold of
    /// the ready-queue lock, so no scan ever sees it at two levels.
    pub fn set_priority(&self, task: &TaskRef, prio: u8) -> TaskResult<()> {
        self.check_owner(task)?;
        if !valid_priority(prio) {
            error!("{}: Priority should be less than {}", task.name(), MAX_PRIORITY);
            return Err(TaskError::InvalidPriority);
        }

        let mut sched = task.lock();
        if sched.status == TaskStatus::Closing {
            return Err(TaskError::InvalidState);
        }
        if sched.current_priority == prio {
            return Ok(());
        }

        let old = sched.current_priority;
        if let ListOwner::ReadyQueue = sched.owner {
            let mut scheduler = self.scheduler.lock();
            // Safety: the ReadyQueue tag says the task is filed under `old`.
            unsafe { scheduler.remove_task(task, old) };
            sched.current_priority = prio;
            sched.prio_mask = PrioMask::new(prio);
            scheduler.add_task(task.clone(), prio);
        } else {
            sched.current_priority = prio;
            sched.prio_mask = PrioMask::new(prio);
        }
        debug!("Task {} priority {} -> {}", task.name(), old, prio);
        Ok(())
    }

    /// Blocks the current task on `queue` until it is woken or, with
    /// `timeout`, until that many ticks have passed.
    pub fn wait(&self, queue: &WaitQueueRef, timeout: Option<u32>) -> TaskResult<()> {
        if timeout == Some(0) {
            return Err(TaskError::InvalidArgument);
        }
        let task = self.current_task().ok_or(TaskError::InvalidState)?;

        {
            let mut sched = task.lock();
            let timer = match (timeout, sched.timer) {
                (Some(ticks), Some(timer)) => Some((timer, ticks)),
                (Some(_), None) => return Err(TaskError::TimerUnavailable),
                (None, _) => None,
            };
            self.hang_locked(&task, &mut sched)?;
            queue.push(task.clone());
            sched.owner = ListOwner::WaitQueue(queue.clone());
            if let Some((timer, ticks)) = timer {
                if let Err(err) = self.timers.lock().start(timer, ticks) {
                    error!("{}: arm timer error: {:?}", task.name(), err);
                }
            }
        }

        self.hal.switch_task();

        match mem::take(&mut task.lock().wake) {
            WakeReason::Normal => Ok(()),
            WakeReason::TimedOut => Err(TaskError::TimedOut),
        }
    }

    /// Wakes the oldest waiter of `queue`. Returns `false` if there was none.
    pub fn wake_one(&self, queue: &WaitQueueRef) -> bool {
        loop {
            let Some(task) = queue.front() else {
                return false;
            };
            let mut sched = task.lock();
            // A timeout or a delete may have unlinked it meanwhile.
            if !matches!(&sched.owner, ListOwner::WaitQueue(q) if Arc::ptr_eq(q, queue)) {
                continue;
            }
            self.stop_timer(&sched);
            self.unlink(&task, &mut sched);
            self.admit(&task, &mut sched);
            trace!("Task Woken: id={}, name={}, queue={}", task.id(), task.name(), queue.name());
            return true;
        }
    }

    /// Wakes every waiter of `queue` and returns how many there were.
    pub fn wake_all(&self, queue: &WaitQueueRef) -> usize {
        let mut woken = 0;
        while self.wake_one(queue) {
            woken += 1;
        }
        woken
    }

    /// Called from the tick interrupt: advances the timer list and delivers
    /// expired timers.
    pub fn timer_tick(&self) {
        let expired = self.collect_expired();
        self.deliver(expired);
    }

    pub(crate) fn collect_expired(&self) -> Vec<Expired> {
        self.timers.lock().advance()
    }

    pub(crate) fn deliver(&self, expired: Vec<Expired>) {
        for timer in expired {
            timer.fire(self);
        }
    }

    fn on_timeout(&self, task: &TaskRef, expiry: Expiry) {
        {
            let mut sched = task.lock();
            if !self.timers.lock().is_current(expiry) {
                trace!("stale timeout of {} ignored", task.name());
                return;
            }
            assert!(
                sched.status == TaskStatus::Waiting,
                "timeout fired on task {} in status {:?}",
                task.name(),
                sched.status
            );
            sched.wake = WakeReason::TimedOut;
            self.unlink(task, &mut sched);
            self.admit(task, &mut sched);
        }
        trace!("Task Timed Out: id={}, name={}", task.id(), task.name());
        self.hal.switch_task();
    }

    /// Picks the highest-priority ready task, marks it RUNNING and makes it
    /// current. The previous current task, if still RUNNING, goes back to
    /// READY. Called by the platform's switch routine.
    ///
    /// Returns the task to switch to, or `None` to idle.
    pub fn dispatch(&self) -> Option<TaskRef> {
        let now = self.hal.cycles();
        if let Some(prev) = self.current_task() {
            let mut sched = prev.lock();
            if sched.status == TaskStatus::Running {
                sched.status = TaskStatus::Ready;
            }
            let stats = prev.stats();
            let start = stats.start_time.load(Ordering::Relaxed);
            stats
                .run_time
                .fetch_add(now.saturating_sub(start), Ordering::Relaxed);
        }

        loop {
            let Some(next) = self.scheduler.lock().pick_next_task() else {
                *self.current.lock() = None;
                return None;
            };
            let mut sched = next.lock();
            if !matches!(sched.owner, ListOwner::ReadyQueue) {
                // Left the ready queue between the pick and the lock.
                continue;
            }
            sched.status = TaskStatus::Running;
            if next.remaining_tick() == 0 {
                next.reset_tick();
            }
            let stats = next.stats();
            stats.start_time.store(now, Ordering::Relaxed);
            stats.sys_cycle.fetch_add(1, Ordering::Relaxed);
            *self.current.lock() = Some(next.clone());
            drop(sched);

            trace!("dispatch: {} ({})", next.id(), next.name());
            return Some(next);
        }
    }

    /// Run time and dispatch count of every live task since the previous
    /// sample.
    pub fn sample_usage(&self) -> Vec<(TaskId, u64, u64)> {
        self.live_tasks()
            .iter()
            .map(|task| {
                let stats = task.stats();
                let run = stats.run_time.load(Ordering::Relaxed);
                let cycles = stats.sys_cycle.load(Ordering::Relaxed);
                let prev_run = stats.save_run_time.swap(run, Ordering::Relaxed);
                let prev_cycles = stats.save_sys_cycle.swap(cycles, Ordering::Relaxed);
                (task.id(), run.wrapping_sub(prev_run), cycles.wrapping_sub(prev_cycles))
            })
            .collect()
    }

    pub fn current_task(&self) -> Option<TaskRef> {
        self.current.lock().clone()
    }

    pub fn live_tasks(&self) -> Vec<TaskRef> {
        let tasks = self.tasks.lock();
        let mut out = Vec::new();
        let mut cursor = tasks.front();
        while let Some(task) = cursor.clone_pointer() {
            out.push(task);
            cursor.move_next();
        }
        out
    }

    pub fn closed_tasks(&self) -> Vec<TaskRef> {
        let closed = self.closed.lock();
        let mut out = Vec::new();
        let mut cursor = closed.front();
        while let Some(task) = cursor.clone_pointer() {
            out.push(task);
            cursor.move_next();
        }
        out
    }

    /// Looks up a live task by identifier.
    pub fn find(&self, id: TaskId) -> Option<TaskRef> {
        let tasks = self.tasks.lock();
        let mut cursor = tasks.front();
        while let Some(task) = cursor.get() {
            if task.id() == id {
                return cursor.clone_pointer();
            }
            cursor.move_next();
        }
        None
    }

    pub fn is_live(&self, task: &Task) -> bool {
        task.registry_linked() && self.tasks.lock().iter().any(|t| core::ptr::eq(t, task))
    }

    pub fn is_closed(&self, task: &Task) -> bool {
        self.closed.lock().iter().any(|t| core::ptr::eq(t, task))
    }

    pub fn ready_count(&self) -> usize {
        self.scheduler.lock().len()
    }

    pub fn highest_ready_priority(&self) -> Option<u8> {
        self.scheduler.lock().highest_priority()
    }

    /// Ready-queue levels `task` is filed under (empty or one).
    pub fn ready_levels(&self, task: &Task) -> Vec<u8> {
        self.scheduler.lock().levels_of(task)
    }

    /// Ready tasks at `prio`, in dispatch order.
    pub fn ready_tasks_at(&self, prio: u8) -> Vec<TaskRef> {
        self.scheduler.lock().tasks_at(prio)
    }

    /// Ticks elapsed since the manager was created.
    pub fn now(&self) -> u64 {
        self.timers.lock().now()
    }

    /// Whether the task's own timer slot is armed.
    pub fn timer_armed(&self, task: &Task) -> bool {
        let sched = task.lock();
        sched
            .timer
            .is_some_and(|timer| self.timers.lock().is_armed(timer))
    }

    fn check_owner(&self, task: &Task) -> TaskResult<()> {
        if task.owner() != self.id {
            error!("{}: task belongs to another manager", task.name());
            return Err(TaskError::InvalidArgument);
        }
        Ok(())
    }

    fn is_current(&self, task: &TaskRef) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, task))
    }

    fn stop_timer(&self, sched: &TaskSched) {
        if let Some(timer) = sched.timer {
            self.timers.lock().stop(timer);
        }
    }

    fn hang_locked(&self, task: &TaskRef, sched: &mut TaskSched) -> TaskResult<()> {
        if !sched.status.is_ready() {
            error!(
                "{}: task status {:?} is not READY or RUNNING",
                task.name(),
                sched.status
            );
            assert!(
                !self.is_current(task),
                "current task {} hung while {:?}",
                task.name(),
                sched.status
            );
            return Err(TaskError::InvalidState);
        }
        self.stop_timer(sched);
        self.withdraw(task, sched);
        sched.status = TaskStatus::Waiting;
        trace!("Task Hung: id={}, name={}", task.id(), task.name());
        Ok(())
    }

    /// Files the task at the tail of its ready level and marks it READY.
    fn admit(&self, task: &TaskRef, sched: &mut TaskSched) {
        assert!(
            matches!(sched.owner, ListOwner::None),
            "task {} admitted while linked into {:?}",
            task.name(),
            sched.owner
        );
        self.scheduler
            .lock()
            .add_task(task.clone(), sched.current_priority);
        sched.owner = ListOwner::ReadyQueue;
        sched.status = TaskStatus::Ready;
    }

    /// Takes the task off the ready queue, if it is there.
    fn withdraw(&self, task: &TaskRef, sched: &mut TaskSched) {
        if let ListOwner::ReadyQueue = sched.owner {
            // Safety: tagged ReadyQueue, filed under its current priority.
            unsafe {
                self.scheduler
                    .lock()
                    .remove_task(task, sched.current_priority)
            };
            sched.owner = ListOwner::None;
        }
    }

    /// Takes the task off whatever structure holds its scheduler link.
    fn unlink(&self, task: &TaskRef, sched: &mut TaskSched) {
        match mem::take(&mut sched.owner) {
            ListOwner::None => {}
            ListOwner::ReadyQueue => unsafe {
                self.scheduler
                    .lock()
                    .remove_task(task, sched.current_priority);
            },
            ListOwner::WaitQueue(queue) => unsafe {
                queue.remove(task);
            },
            ListOwner::Closed => unsafe {
                self.closed
                    .lock()
                    .cursor_mut_from_ptr(Arc::as_ptr(task))
                    .remove();
            },
        }
    }
}
