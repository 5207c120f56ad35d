//! HAL (Hardware Abstraction Layer) module.
//!
//! The task core does not touch hardware. Everything platform specific it
//! needs (task pages, the initial stack frame, the context switch request)
//! is consumed through [`KernelHal`], and interrupt masking through
//! [`spin::IrqOps`].

pub mod spin;

use memory_addr::VirtAddr;

use crate::task::{TaskEntry, TaskExit};

pub use spin::{IrqOps, SpinNoIrq, SpinNoIrqGuard, init_irq_ops};

/// Platform services consumed by the task core.
pub trait KernelHal: Send + Sync {
    /// Allocates one task page of [`TASK_PAGE_SIZE`] bytes, aligned to its
    /// size. Returns `None` when memory is exhausted.
    ///
    /// [`TASK_PAGE_SIZE`]: crate::config::kernel::TASK_PAGE_SIZE
    fn alloc_page(&self) -> Option<VirtAddr>;

    /// Returns a task page to the platform.
    ///
    /// # Safety
    ///
    /// `page` must come from [`KernelHal::alloc_page`] and must not be used
    /// afterwards.
    unsafe fn free_page(&self, page: VirtAddr);

    /// Builds the initial stack frame of a task.
    ///
    /// When the task is first switched to it must run `entry(parameter)`,
    /// and when `entry` returns it must continue in `exit`. Returns the
    /// stack pointer to save in the task.
    fn stack_init(
        &self,
        entry: TaskEntry,
        parameter: usize,
        stack: VirtAddr,
        exit: TaskExit,
    ) -> VirtAddr;

    /// Requests a reschedule.
    ///
    /// An implementation either switches right away (calling
    /// [`TaskManager::dispatch`] to pick the next task) or defers the switch
    /// to the end of the current interrupt. When it switches away from the
    /// caller it returns only once the caller is dispatched again.
    ///
    /// [`TaskManager::dispatch`]: crate::task::TaskManager::dispatch
    fn switch_task(&self);

    /// Free-running cycle counter used for run-time accounting.
    fn cycles(&self) -> u64 {
        0
    }
}
