//! Core RTOS modules
//!
//! Contains kernel state, scheduler, task management, time management and
//! the fixed-capacity storage every kernel object lives in.

pub mod arena;
pub mod config;
pub mod critical;
pub mod error;
pub mod kernel;
pub mod pool;
pub mod prio;
pub mod types;
pub mod task;
pub mod sched;
pub mod time;
pub mod cs_cell;
