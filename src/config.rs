//! Compile-time configuration of the task core.

pub mod kernel;
