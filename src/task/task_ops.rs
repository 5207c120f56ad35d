//! The system task manager and the calls tasks make on themselves.
//!
//! Managers are ordinary values, but a task's entry function returns into
//! [`task_exit`], which has no arguments and has to find its manager
//! somewhere. The platform installs the system manager once with [`init`].

use alloc::sync::Arc;
use core::time::Duration;

use lazyinit::LazyInit;

use crate::config::kernel::TICKS_PER_SEC;
use crate::error::TaskResult;

use super::{TaskManager, TaskRef};

static TASK_MANAGER: LazyInit<Arc<TaskManager>> = LazyInit::new();

/// Installs the system task manager. Must be called at most once.
pub fn init(manager: Arc<TaskManager>) {
    TASK_MANAGER.init_once(manager);
    info!("Task manager initialized");
}

/// Returns whether the system task manager is installed.
pub fn is_initialized() -> bool {
    TASK_MANAGER.is_inited()
}

/// The system task manager.
///
/// # Panics
///
/// Panics if [`init`] has not been called.
pub fn manager() -> &'static Arc<TaskManager> {
    TASK_MANAGER.get().expect("Task manager not initialized")
}

/// Task exit trampoline.
///
/// Every task's initial stack frame returns here when its entry function
/// returns. It runs the task's cleanup hook and deletes it; the reschedule
/// that follows never comes back.
pub extern "C" fn task_exit() {
    manager().exit_current();
}

/// The task running on this CPU.
pub fn current_task() -> Option<TaskRef> {
    manager().current_task()
}

/// Puts the current task to sleep for `ticks` ticks.
pub fn task_sleep(ticks: u32) -> TaskResult<()> {
    manager().sleep(ticks)
}

/// Puts the current task to sleep for at least `duration`.
pub fn task_sleep_for(duration: Duration) -> TaskResult<()> {
    manager().sleep(duration_to_ticks(duration))
}

/// Current task yields CPU.
pub fn task_yield() {
    manager().yield_now();
}

/// Rounds `duration` up to whole ticks, saturating at `u32::MAX`.
pub fn duration_to_ticks(duration: Duration) -> u32 {
    let nanos_per_tick = 1_000_000_000 / TICKS_PER_SEC as u128;
    let ticks = duration.as_nanos().div_ceil(nanos_per_tick);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}
