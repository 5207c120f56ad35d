//! Task management and scheduling core of the rstiny kernel.
//!
//! Creation, status transitions, priority ready-queue admission, sleep and
//! timeouts, and teardown of tasks on one CPU. The platform supplies task
//! pages, the initial stack frame and the context switch through
//! [`hal::KernelHal`], and drives time through [`TaskManager::timer_tick`].

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

extern crate alloc;

pub mod config;
pub mod error;
pub mod hal;
pub mod logging;
pub mod mm;
pub mod task;

pub use error::{TaskError, TaskResult, TinyResult};
pub use task::{TaskManager, TaskRef, TaskStatus};
