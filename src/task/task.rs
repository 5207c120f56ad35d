//! Task definition and related types.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use intrusive_collections::{LinkedListAtomicLink, intrusive_adapter};
use memory_addr::VirtAddr;

use crate::error::ETIMEDOUT;
use crate::hal::{SpinNoIrq, SpinNoIrqGuard};
use crate::mm::TaskPage;

use super::timers::TimerId;
use super::wait_queue::WaitQueueRef;

/// Task identifier type.
pub type TaskId = usize;

/// Task reference type.
pub type TaskRef = Arc<Task>;

/// Task entry function, called with the task's parameter.
pub type TaskEntry = fn(usize);

/// Where a task continues when its entry function returns.
pub type TaskExit = extern "C" fn();

/// Cleanup hook run by the task's own exit path.
pub type TaskCleanup = fn(&TaskRef);

/// Task status.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created, never admitted to the ready queue.
    Suspended = 0,
    /// In the ready queue, waiting to be dispatched.
    Ready = 1,
    /// Dispatched; still linked in the ready queue.
    Running = 2,
    /// Hung, sleeping or blocked on a wait queue.
    Waiting = 3,
    /// Deleted, parked in the closed registry until reclaimed.
    Closing = 4,
}

impl TaskStatus {
    /// READY or RUNNING, i.e. linked into the ready queue.
    #[inline]
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

/// Why a task last came out of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakeReason {
    #[default]
    Normal,
    TimedOut,
}

impl WakeReason {
    /// Signed flag form: `0` or `-ETIMEDOUT`.
    pub const fn as_flag(self) -> isize {
        match self {
            Self::Normal => 0,
            Self::TimedOut => -ETIMEDOUT,
        }
    }
}

/// The structure currently holding a task's scheduler link.
#[derive(Clone, Default)]
pub enum ListOwner {
    #[default]
    None,
    ReadyQueue,
    WaitQueue(WaitQueueRef),
    Closed,
}

impl fmt::Debug for ListOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::ReadyQueue => f.write_str("ReadyQueue"),
            Self::WaitQueue(queue) => write!(f, "WaitQueue({})", queue.name()),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Priority class bits used by the ready bitmap.
///
/// With more than 32 levels the priority splits into a group (`prio >> 3`,
/// one bit of `offset_mask` each) and a position inside the group
/// (`prio_mask`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioMask {
    #[cfg(feature = "prio-256")]
    pub offset: u8,
    pub offset_mask: u32,
    #[cfg(feature = "prio-256")]
    pub prio_mask: u8,
}

#[cfg(feature = "prio-256")]
impl PrioMask {
    pub const fn new(prio: u8) -> Self {
        let offset = prio >> 3;
        Self {
            offset,
            offset_mask: 1 << offset,
            prio_mask: 1 << (prio & 0x07),
        }
    }
}

#[cfg(not(feature = "prio-256"))]
impl PrioMask {
    pub const fn new(prio: u8) -> Self {
        Self {
            offset_mask: 1 << prio,
        }
    }
}

/// State guarded by the per-task lock.
#[derive(Debug)]
pub struct TaskSched {
    pub status: TaskStatus,
    pub current_priority: u8,
    pub prio_mask: PrioMask,
    pub owner: ListOwner,
    pub wake: WakeReason,
    /// Timer slot; taken out when the task is deleted.
    pub timer: Option<TimerId>,
}

/// Run-time accounting, maintained by the dispatcher on a best-effort basis.
#[derive(Default)]
pub struct TaskStats {
    pub start_time: AtomicU64,
    pub run_time: AtomicU64,
    pub sys_cycle: AtomicU64,
    pub save_sys_cycle: AtomicU64,
    pub save_run_time: AtomicU64,
}

/// Task control block.
pub struct Task {
    id: TaskId,
    name: &'static str,
    /// Id of the manager that created the task.
    owner: usize,
    entry: TaskEntry,
    parameter: usize,
    page: TaskPage,
    sp: AtomicUsize,
    init_priority: u8,
    init_tick: u32,
    remaining_tick: AtomicU32,
    stats: TaskStats,
    sched: SpinNoIrq<TaskSched>,
    cleanup: Option<TaskCleanup>,
    /// Ready queue, wait queue or closed registry membership.
    sched_link: LinkedListAtomicLink,
    /// Live registry membership.
    registry_link: LinkedListAtomicLink,
}

intrusive_adapter!(pub SchedAdapter = TaskRef: Task { sched_link => LinkedListAtomicLink });
intrusive_adapter!(pub RegistryAdapter = TaskRef: Task { registry_link => LinkedListAtomicLink });

/// Construction parameters gathered by the manager.
pub(crate) struct TaskParams {
    pub id: TaskId,
    pub name: &'static str,
    pub owner: usize,
    pub entry: TaskEntry,
    pub parameter: usize,
    pub page: TaskPage,
    pub sp: VirtAddr,
    pub priority: u8,
    pub tick: u32,
    pub timer: Option<TimerId>,
    pub cleanup: Option<TaskCleanup>,
}

impl Task {
    pub(crate) fn new(params: TaskParams) -> Self {
        Self {
            id: params.id,
            name: params.name,
            owner: params.owner,
            entry: params.entry,
            parameter: params.parameter,
            page: params.page,
            sp: AtomicUsize::new(params.sp.as_usize()),
            init_priority: params.priority,
            init_tick: params.tick,
            remaining_tick: AtomicU32::new(params.tick),
            stats: TaskStats::default(),
            sched: SpinNoIrq::new(TaskSched {
                status: TaskStatus::Suspended,
                current_priority: params.priority,
                prio_mask: PrioMask::new(params.priority),
                owner: ListOwner::None,
                wake: WakeReason::Normal,
                timer: params.timer,
            }),
            cleanup: params.cleanup,
            sched_link: LinkedListAtomicLink::new(),
            registry_link: LinkedListAtomicLink::new(),
        }
    }

    /// Returns the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub(crate) fn owner(&self) -> usize {
        self.owner
    }

    #[inline]
    pub fn entry(&self) -> TaskEntry {
        self.entry
    }

    #[inline]
    pub fn parameter(&self) -> usize {
        self.parameter
    }

    /// Locks the scheduling state of the task.
    #[inline]
    pub(crate) fn lock(&self) -> SpinNoIrqGuard<'_, TaskSched> {
        self.sched.lock()
    }

    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.sched.lock().status
    }

    #[inline]
    pub fn init_priority(&self) -> u8 {
        self.init_priority
    }

    #[inline]
    pub fn current_priority(&self) -> u8 {
        self.sched.lock().current_priority
    }

    #[inline]
    pub fn prio_mask(&self) -> PrioMask {
        self.sched.lock().prio_mask
    }

    /// The wake-reason flag: `0`, or `-ETIMEDOUT` after a timeout.
    #[inline]
    pub fn wake_flag(&self) -> isize {
        self.sched.lock().wake.as_flag()
    }

    /// The structure currently holding the scheduler link.
    pub fn list_owner(&self) -> ListOwner {
        self.sched.lock().owner.clone()
    }

    /// Whether the task holds a timer slot. A task without one (the slot
    /// could not be set up, or the task was deleted) cannot sleep or wait
    /// with a timeout.
    #[inline]
    pub fn has_timer(&self) -> bool {
        self.sched.lock().timer.is_some()
    }

    #[inline]
    pub fn cleanup(&self) -> Option<TaskCleanup> {
        self.cleanup
    }

    #[inline]
    pub fn page(&self) -> &TaskPage {
        &self.page
    }

    /// Saved stack pointer.
    #[inline]
    pub fn sp(&self) -> VirtAddr {
        VirtAddr::from(self.sp.load(Ordering::Acquire))
    }

    /// Slot the platform switch routine saves the stack pointer into.
    #[inline]
    pub fn sp_slot(&self) -> &AtomicUsize {
        &self.sp
    }

    #[inline]
    pub fn init_tick(&self) -> u32 {
        self.init_tick
    }

    #[inline]
    pub fn remaining_tick(&self) -> u32 {
        self.remaining_tick.load(Ordering::Relaxed)
    }

    /// Refills the tick quota.
    #[inline]
    pub fn reset_tick(&self) {
        self.remaining_tick.store(self.init_tick, Ordering::Relaxed);
    }

    #[inline]
    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    #[inline]
    pub(crate) fn registry_linked(&self) -> bool {
        self.registry_link.is_linked()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sched = self.sched.lock();
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &sched.status)
            .field("priority", &sched.current_priority)
            .field("owner", &sched.owner)
            .finish()
    }
}
