//! Compile-time configuration for the kernel
//!
//! These constants control the behavior and resource limits of the RTOS.

use crate::types::{OsFlags, OsPrio, OsTick};

/// Number of priority levels (higher number = more urgent)
pub const CFG_PRIO_MAX: usize = 32;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Core clock feeding SysTick
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// Default time quanta for round-robin scheduling
pub const CFG_TIME_QUANTA_DEFAULT: OsTick = 10;

/// Enable round-robin scheduling for same-priority tasks
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Maximum number of tasks, idle and timer service included
pub const CFG_TASK_MAX: usize = 16;

/// Words available to task stacks
pub const CFG_STK_POOL_WORDS: usize = 8192;

/// Idle task priority (reserved, lowest)
pub const CFG_PRIO_IDLE: OsPrio = 0;

/// Idle task stack size in words
pub const CFG_IDLE_STK_SIZE: usize = 128;

/// Largest finite timeout; longer requests are clamped
pub const CFG_TICK_MAX_DELAY: OsTick = i32::MAX as OsTick;

/// Largest queue item handed across a blocking call
pub const CFG_MSG_SIZE_MAX: usize = 32;

/// Maximum number of message queues
pub const CFG_QUEUE_MAX: usize = 8;

/// Bytes available to queue ring buffers
pub const CFG_QUEUE_POOL_BYTES: usize = 2048;

/// Maximum number of mutexes
pub const CFG_MUTEX_MAX: usize = 8;

/// Maximum number of event groups
pub const CFG_FLAG_GRP_MAX: usize = 8;

/// Usable event bits; the top byte is reserved
pub const CFG_FLAG_BITS_MASK: OsFlags = 0x00FF_FFFF;

/// Maximum number of software timers
pub const CFG_TMR_MAX: usize = 8;

/// Timer service task priority
pub const CFG_TMR_TASK_PRIO: OsPrio = (CFG_PRIO_MAX - 2) as OsPrio;

/// Timer service task stack size in words
pub const CFG_TMR_TASK_STK_SIZE: usize = 256;

/// Depth of the timer command queue
pub const CFG_TMR_CMD_QUEUE_LEN: usize = 8;

/// Free-list capacity of each region pool
pub const CFG_POOL_FRAGMENTS_MAX: usize = 16;

/// Timer callbacks collected per pass of the timer service
pub const CFG_TMR_FIRED_MAX: usize = 16;
