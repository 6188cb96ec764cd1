//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task. TCBs live
//! in the kernel's task arena; the intrusive lists (ready, pend and tick)
//! link them by slot index.

use heapless::Vec;

use crate::config::{CFG_MSG_SIZE_MAX, CFG_TIME_QUANTA_DEFAULT};
use crate::pool::Region;
use crate::task::Runnable;
use crate::types::{
    OsFlags, OsNestingCtr, OsPendOn, OsPendStatus, OsPrio, OsStkElement, OsTaskState, OsTick,
};

/// Task Control Block
#[repr(C)]
pub struct OsTcb {
    // ============ Stack pointer ============
    /// Current stack pointer, swapped by the port on a context switch
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Region of the stack pool owned by this task
    pub stk: Region,

    // ============ Task identification ============
    /// Task name
    pub name: &'static str,

    // ============ Ready list links ============
    pub next: Option<u16>,
    pub prev: Option<u16>,

    // ============ Pend list links ============
    pub pend_next: Option<u16>,
    pub pend_prev: Option<u16>,
    /// What the task is pending on
    pub pend_on: OsPendOn,
    /// Result of the last pend operation
    pub pend_status: OsPendStatus,

    // ============ Tick list links ============
    pub tick_next: Option<u16>,
    pub tick_prev: Option<u16>,
    /// Absolute tick at which a delay or timeout ends
    pub wake_tick: OsTick,
    /// Linked into the delayed list
    pub on_tick_list: bool,

    // ============ Priority ============
    /// Effective priority, may be raised by inheritance
    pub prio: OsPrio,
    /// Priority assigned by the application
    pub base_prio: OsPrio,

    // ============ State ============
    pub task_state: OsTaskState,

    // ============ Suspend ============
    /// Suspend nesting counter
    pub suspend_ctr: OsNestingCtr,

    // ============ Time slicing ============
    pub time_quanta: OsTick,
    pub time_quanta_ctr: OsTick,

    // ============ Event flags ============
    /// Flags being waited for
    pub flags_pend: OsFlags,
    /// Wait for all of `flags_pend` instead of any
    pub flags_all: bool,
    /// Clear `flags_pend` when the wait is satisfied
    pub flags_clear: bool,
    /// Flags observed when the wait was satisfied
    pub flags_rdy: OsFlags,

    // ============ Message ============
    /// Queue item carried across a blocking send or receive
    pub msg: Vec<u8, CFG_MSG_SIZE_MAX>,

    // ============ Task entry point ============
    pub entry: &'static dyn Runnable<usize>,
    pub arg: usize,
}

impl OsTcb {
    /// Create a ready TCB for `entry`
    pub fn new(
        name: &'static str,
        entry: &'static dyn Runnable<usize>,
        arg: usize,
        prio: OsPrio,
        stk: Region,
    ) -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk,

            name,

            next: None,
            prev: None,

            pend_next: None,
            pend_prev: None,
            pend_on: OsPendOn::Nothing,
            pend_status: OsPendStatus::Ok,

            tick_next: None,
            tick_prev: None,
            wake_tick: 0,
            on_tick_list: false,

            prio,
            base_prio: prio,

            task_state: OsTaskState::Ready,

            suspend_ctr: 0,

            time_quanta: CFG_TIME_QUANTA_DEFAULT,
            time_quanta_ctr: CFG_TIME_QUANTA_DEFAULT,

            flags_pend: 0,
            flags_all: false,
            flags_clear: false,
            flags_rdy: 0,

            msg: Vec::new(),

            entry,
            arg,
        }
    }

    /// Check if task is suspended
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.task_state == OsTaskState::Suspended
    }

    /// Check if task is delayed
    #[inline]
    pub fn is_delayed(&self) -> bool {
        self.task_state == OsTaskState::Blocked && self.pend_on == OsPendOn::Delay
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
