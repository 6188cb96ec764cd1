//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.
//!
//! The running task is never linked into a ready list. Every kernel
//! operation that changes readiness ends with [`Kernel::sched`], which
//! compares the running task against the highest ready level and latches
//! a context-switch request for the port when they differ.

mod rdy_list;

pub use rdy_list::ReadyList;

use crate::config::{CFG_PRIO_MAX, CFG_SCHED_ROUND_ROBIN_EN};
use crate::error::{OsError, OsResult};
use crate::kernel::{with_kernel, Kernel};
use crate::prio::PrioTable;
use crate::time::deadline;
use crate::types::{OsNestingCtr, OsPendOn, OsPendStatus, OsPrio, OsTaskState, OsTick, WAIT_FOREVER};

/// Ready registry: one list per priority plus the bitmap of non-empty levels
pub struct SchedState {
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [ReadyList; CFG_PRIO_MAX],
}

impl SchedState {
    pub const fn new() -> Self {
        Self {
            prio_tbl: PrioTable::new(),
            rdy_list: [ReadyList::new(); CFG_PRIO_MAX],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.prio_tbl.init();
        for list in self.rdy_list.iter_mut() {
            list.init();
        }
    }

    /// Get reference to ready list
    #[inline(always)]
    pub fn rdy_list(&self, prio: OsPrio) -> &ReadyList {
        &self.rdy_list[prio as usize]
    }
}

impl Default for SchedState {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Main scheduling point
    ///
    /// Determines the highest priority ready task and switches to it if it
    /// should replace the current one. A running task that is preempted is
    /// put back at the head of its ready list.
    pub(crate) fn sched(&mut self) {
        if !self.running || self.sched_lock > 0 {
            return;
        }

        let Some(high_prio) = self.sched.prio_tbl.get_highest() else {
            return;
        };

        if let Some(cur) = self.cur {
            let tcb = self.tasks.at(cur);
            if tcb.task_state == OsTaskState::Running {
                if high_prio <= tcb.prio {
                    return;
                }
                self.tasks.at_mut(cur).task_state = OsTaskState::Ready;
                self.rdy_insert_head(cur);
            }
        }

        if let Some(next) = self.sched.rdy_list(high_prio).head() {
            self.switch_to(next);
        }
    }

    /// Make `next` the running task and latch a switch request
    pub(crate) fn switch_to(&mut self, next: u16) {
        self.rdy_remove(next);

        let tcb = self.tasks.at_mut(next);
        tcb.task_state = OsTaskState::Running;
        tcb.time_quanta_ctr = tcb.time_quanta;

        if self.cur != Some(next) {
            crate::trace!("switch to {}", tcb.name);
            self.ctx_sw_ctr = self.ctx_sw_ctr.wrapping_add(1);
            self.ctx_sw_pending = true;
        }
        self.cur = Some(next);
    }

    /// Make a task ready, at the tail of its level
    pub(crate) fn rdy_insert_tail(&mut self, idx: u16) {
        let prio = self.tasks.at(idx).prio;
        self.sched.rdy_list[prio as usize].insert_tail(&mut self.tasks, idx);
        self.sched.prio_tbl.insert(prio);
    }

    /// Make a task ready, at the head of its level
    pub(crate) fn rdy_insert_head(&mut self, idx: u16) {
        let prio = self.tasks.at(idx).prio;
        self.sched.rdy_list[prio as usize].insert_head(&mut self.tasks, idx);
        self.sched.prio_tbl.insert(prio);
    }

    /// Remove a task from its ready list
    pub(crate) fn rdy_remove(&mut self, idx: u16) {
        let prio = self.tasks.at(idx).prio;
        let list = &mut self.sched.rdy_list[prio as usize];
        list.remove(&mut self.tasks, idx);
        if list.is_empty() {
            self.sched.prio_tbl.remove(prio);
        }
    }

    /// Move a task to a new effective priority
    ///
    /// Ready tasks move to the tail of the new level; tasks waiting on a
    /// priority-ordered list are repositioned in it.
    pub(crate) fn change_prio(&mut self, idx: u16, prio: OsPrio) {
        let tcb = self.tasks.at(idx);
        if tcb.prio == prio {
            return;
        }

        let state = tcb.task_state;
        match state {
            OsTaskState::Ready => {
                self.rdy_remove(idx);
                self.tasks.at_mut(idx).prio = prio;
                self.rdy_insert_tail(idx);
            }
            OsTaskState::Blocked => {
                self.tasks.at_mut(idx).prio = prio;
                self.pend_reposition(idx);
            }
            _ => self.tasks.at_mut(idx).prio = prio,
        }
    }

    /// Index of the running task, for operations that may block it
    pub(crate) fn pend_check(&self) -> OsResult<u16> {
        if !self.running {
            return Err(OsError::OsNotRunning);
        }
        if self.sched_lock > 0 {
            return Err(OsError::SchedLocked);
        }
        self.cur.ok_or(OsError::OsNotRunning)
    }

    /// Take the running task off the CPU.
    ///
    /// The caller links it into the object's pend list and calls
    /// [`Kernel::sched`] afterwards.
    pub(crate) fn block_current(&mut self, idx: u16, pend_on: OsPendOn, timeout: OsTick) {
        let now = self.tick;
        let tcb = self.tasks.at_mut(idx);
        tcb.task_state = OsTaskState::Blocked;
        tcb.pend_on = pend_on;
        tcb.pend_status = OsPendStatus::Pending;

        if timeout != WAIT_FOREVER {
            self.delayed
                .insert(&mut self.tasks, idx, deadline(now, timeout));
        }
    }

    /// End the wait of a blocked task with `status`.
    ///
    /// The caller has already unlinked it from the object's pend list.
    pub(crate) fn wake(&mut self, idx: u16, status: OsPendStatus) {
        if self.tasks.at(idx).on_tick_list {
            self.delayed.remove(&mut self.tasks, idx);
        }

        let tcb = self.tasks.at_mut(idx);
        tcb.pend_on = OsPendOn::Nothing;
        tcb.pend_status = status;

        if tcb.suspend_ctr > 0 {
            tcb.task_state = OsTaskState::Suspended;
        } else {
            tcb.task_state = OsTaskState::Ready;
            self.rdy_insert_tail(idx);
        }
    }

    /// Give up the rest of the time slice to an equal-priority peer
    pub fn task_yield(&mut self) -> OsResult<()> {
        let cur = self.cur.filter(|_| self.running).ok_or(OsError::OsNotRunning)?;
        if self.sched_lock > 0 {
            return Ok(());
        }

        let prio = self.tasks.at(cur).prio;
        if !self.sched.rdy_list(prio).is_empty() {
            self.tasks.at_mut(cur).task_state = OsTaskState::Ready;
            self.rdy_insert_tail(cur);
            self.sched();
        }
        Ok(())
    }

    /// Round-robin scheduling for tasks at the same priority
    pub(crate) fn time_slice(&mut self) {
        if !CFG_SCHED_ROUND_ROBIN_EN || !self.running || self.sched_lock > 0 {
            return;
        }

        let Some(cur) = self.cur else {
            return;
        };

        let tcb = self.tasks.at_mut(cur);
        if tcb.task_state != OsTaskState::Running {
            return;
        }

        tcb.time_quanta_ctr = tcb.time_quanta_ctr.saturating_sub(1);
        if tcb.time_quanta_ctr > 0 {
            return;
        }

        let prio = tcb.prio;
        if self.sched.rdy_list(prio).is_empty() {
            tcb.time_quanta_ctr = tcb.time_quanta;
            return;
        }

        // Quanta expired with a peer waiting
        self.rotate_current();
    }

    /// Move the running task to the tail of its ready list
    ///
    /// The next `sched()` then picks the peer at the head of that level.
    pub(crate) fn rotate_current(&mut self) {
        if !self.running || self.sched_lock > 0 {
            return;
        }
        let Some(cur) = self.cur else {
            return;
        };
        let tcb = self.tasks.at_mut(cur);
        if tcb.task_state != OsTaskState::Running {
            return;
        }
        tcb.task_state = OsTaskState::Ready;
        self.rdy_insert_tail(cur);
    }

    /// Lock the scheduler
    pub fn sched_lock(&mut self) -> OsResult<()> {
        if !self.running {
            return Err(OsError::OsNotRunning);
        }
        if self.sched_lock == OsNestingCtr::MAX {
            return Err(OsError::LockNestingOvf);
        }
        self.sched_lock += 1;
        Ok(())
    }

    /// Unlock the scheduler, rescheduling when the last lock is released
    pub fn sched_unlock(&mut self) -> OsResult<()> {
        if !self.running {
            return Err(OsError::OsNotRunning);
        }
        if self.sched_lock == 0 {
            return Err(OsError::SchedNotLocked);
        }
        self.sched_lock -= 1;
        if self.sched_lock == 0 {
            self.sched();
        }
        Ok(())
    }

    /// Scheduler lock nesting level
    #[inline]
    pub fn sched_lock_nesting(&self) -> OsNestingCtr {
        self.sched_lock
    }
}

// ============ Global API ============

/// Yield the CPU to a ready task of the same priority
pub fn os_sched_yield() -> OsResult<()> {
    with_kernel(|k| k.task_yield())
}

/// Lock the scheduler
pub fn os_sched_lock() -> OsResult<()> {
    if crate::critical::is_isr_context() {
        return Err(OsError::PendIsr);
    }
    with_kernel(|k| k.sched_lock())
}

/// Unlock the scheduler
pub fn os_sched_unlock() -> OsResult<()> {
    if crate::critical::is_isr_context() {
        return Err(OsError::PendIsr);
    }
    with_kernel(|k| k.sched_unlock())
}
