//! Port layer - CPU-specific implementations
//!
//! This module provides the hardware abstraction layer for context switching
//! and other CPU-specific operations.
//!
//! Off target the stub port leaves every switch logical: the kernel still
//! tracks which task runs, but nothing changes stacks. Host tests drive the
//! kernel this way.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use crate::types::OsStkElement;

    /// Returns immediately; the first task only runs logically
    pub unsafe fn os_start_high_rdy() {}

    pub fn os_ctx_sw() {}

    pub unsafe fn os_task_stk_init(
        stk_base: *mut OsStkElement,
        stk_size: usize,
        _slot: usize,
    ) -> *mut OsStkElement {
        unsafe { stk_base.add(stk_size) }
    }

    pub fn os_cpu_systick_init(_cnts: u32) {}
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;
