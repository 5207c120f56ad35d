//! Task management module.
//!
//! This module provides:
//! - Task control blocks and their status machine
//! - A priority ready queue with bitmap lookup
//! - Tick-driven one-shot timers for sleep and timeouts
//! - Wait queues for blocking primitives
//! - The live and closed task registries
//!
//! All shared state lives in a [`TaskManager`]; [`task_ops`] installs one of
//! them as the system instance used by the exit trampoline.

pub mod manager;
pub mod pid;
pub mod scheduler;
pub mod task;
pub mod task_ops;
pub mod timers;
pub mod wait_queue;


use scheduler::prio_scheduler::PriorityScheduler;

/// Type alias for the scheduler implementation.
pub type Scheduler = PriorityScheduler;

pub use manager::{ManagerConfig, TaskManager};
pub use scheduler::BaseScheduler;
pub use task::{
    ListOwner, PrioMask, Task, TaskCleanup, TaskEntry, TaskExit, TaskId, TaskRef, TaskStatus,
    WakeReason,
};
pub use wait_queue::{WaitQueue, WaitQueueRef};
