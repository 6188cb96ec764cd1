//! kestrel: a small real-time kernel core in Rust
//!
//! A real-time operating system kernel providing:
//! - Priority-based preemptive scheduling with round-robin among equals
//! - Bounded message queues with blocking send/receive
//! - Mutexes with priority inheritance
//! - Event groups with any/all waits and rendezvous
//! - A software timer service task
//! - Context switching for ARM Cortex-M

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use crate::core::arena;
pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::kernel;
pub use crate::core::kernel::{os_idle_hook_set, os_init, os_start, Kernel};
pub use crate::core::pool;
pub use crate::core::prio;
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::task;
pub use crate::core::task::{os_task_create, Runnable};
pub use crate::core::sched;
pub use crate::core::time;

#[cfg(feature = "queue")]
pub use sync::queue;
#[cfg(feature = "mutex")]
pub use sync::mutex;
#[cfg(feature = "event-group")]
pub use sync::event_group;
#[cfg(feature = "timer")]
pub use sync::timer;

#[cfg(feature = "pac")]
pub use stm32_metapac as pac;
