//! Wait queues for tasks blocked on a condition.
//!
//! A [`WaitQueue`] is a FIFO of WAITING tasks behind its own lock. Tasks are
//! linked in through their scheduler link and tagged with
//! [`ListOwner::WaitQueue`], so whoever wakes a task (a waker, a timeout, a
//! delete) can unlink it without knowing which primitive queued it.
//! Blocking and waking go through [`TaskManager::wait`] and
//! [`TaskManager::wake_one`].
//!
//! [`ListOwner::WaitQueue`]: super::ListOwner::WaitQueue
//! [`TaskManager::wait`]: super::TaskManager::wait
//! [`TaskManager::wake_one`]: super::TaskManager::wake_one

use alloc::sync::Arc;
use core::fmt;

use intrusive_collections::LinkedList;

use crate::hal::SpinNoIrq;

use super::task::{SchedAdapter, Task, TaskRef};

pub type WaitQueueRef = Arc<WaitQueue>;

pub struct WaitQueue {
    name: &'static str,
    waiters: SpinNoIrq<LinkedList<SchedAdapter>>,
}

impl WaitQueue {
    /// Creates a new empty wait queue.
    pub fn new(name: &'static str) -> WaitQueueRef {
        Arc::new(Self {
            name,
            waiters: SpinNoIrq::new(LinkedList::new(SchedAdapter::new())),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Checks if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    /// Returns the number of waiting tasks.
    pub fn len(&self) -> usize {
        self.waiters.lock().iter().count()
    }

    /// Whether `task` is queued here.
    pub fn contains(&self, task: &Task) -> bool {
        self.waiters
            .lock()
            .iter()
            .any(|t| core::ptr::eq(t, task))
    }

    /// Links `task` at the tail. The caller holds the task lock and tags the
    /// task with this queue.
    pub(crate) fn push(&self, task: TaskRef) {
        self.waiters.lock().push_back(task);
    }

    /// Oldest waiter, left in place.
    pub(crate) fn front(&self) -> Option<TaskRef> {
        self.waiters.lock().front().clone_pointer()
    }

    /// Unlinks `task`.
    ///
    /// # Safety
    ///
    /// The caller holds the task lock and the task is tagged with this queue.
    pub(crate) unsafe fn remove(&self, task: &Task) -> Option<TaskRef> {
        let mut waiters = self.waiters.lock();
        let mut cursor = unsafe { waiters.cursor_mut_from_ptr(task) };
        cursor.remove()
    }
}

impl fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
