//! Task management module
//!
//! Provides task creation, deletion, and control functions.

mod tcb;

pub use tcb::OsTcb;

use crate::arena::Slab;
use crate::config::{CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_STK_SIZE_MIN, CFG_TASK_MAX};
use crate::error::{OsError, OsResult};
use crate::kernel::{with_kernel, Kernel};
use crate::types::{OsPrio, OsTaskState, TaskHandle};

/// Arena holding every TCB
pub type TaskTable = Slab<OsTcb, CFG_TASK_MAX>;

/// Code the kernel runs on behalf of an application: task bodies and timer
/// callbacks.
///
/// Plain functions implement it, so a task body is usually declared as
///
/// ```ignore
/// fn blink(_: usize) { loop { /* ... */ } }
/// static BLINK: fn(usize) = blink;
///
/// os_task_create("blink", &BLINK, 0, 5, 256)?;
/// ```
pub trait Runnable<A>: Sync {
    fn run(&self, arg: A);
}

impl<A> Runnable<A> for fn(A) {
    fn run(&self, arg: A) {
        self(arg)
    }
}

impl Kernel {
    /// Create a new task
    ///
    /// # Arguments
    /// * `name` - Task name for debugging
    /// * `entry` - Task body; returning from it deletes the task
    /// * `arg` - Argument passed to `entry`
    /// * `prio` - Task priority, `1..CFG_PRIO_MAX` (higher is more urgent)
    /// * `stk_size` - Stack size in words, carved from the stack pool
    ///
    /// # Returns
    /// * `Err(OsError::PrioInvalid)` - Priority 0 or out of range
    /// * `Err(OsError::StkSizeInvalid)` - Stack below `CFG_STK_SIZE_MIN`
    /// * `Err(OsError::OutOfMemory)` - No free TCB or stack space
    pub fn task_create(
        &mut self,
        name: &'static str,
        entry: &'static dyn Runnable<usize>,
        arg: usize,
        prio: OsPrio,
        stk_size: usize,
    ) -> OsResult<TaskHandle> {
        if prio == CFG_PRIO_IDLE || prio as usize >= CFG_PRIO_MAX {
            return Err(OsError::PrioInvalid);
        }
        self.task_create_internal(name, entry, arg, prio, stk_size)
    }

    /// Task creation for kernel tasks, which may use reserved priorities
    pub(crate) fn task_create_internal(
        &mut self,
        name: &'static str,
        entry: &'static dyn Runnable<usize>,
        arg: usize,
        prio: OsPrio,
        stk_size: usize,
    ) -> OsResult<TaskHandle> {
        if stk_size < CFG_STK_SIZE_MIN {
            return Err(OsError::StkSizeInvalid);
        }
        if self.tasks.is_full() {
            return Err(OsError::OutOfMemory);
        }

        let stk = self.stacks.alloc(stk_size).ok_or(OsError::OutOfMemory)?;
        let id = match self.tasks.insert(OsTcb::new(name, entry, arg, prio, stk)) {
            Ok(id) => id,
            Err(_) => {
                self.stacks.free(stk);
                return Err(OsError::OutOfMemory);
            }
        };
        let idx = id.index() as u16;

        // Initialize stack
        let stk_mem = self.stacks.slice_mut(stk);
        let stk_ptr = unsafe {
            crate::port::os_task_stk_init(stk_mem.as_mut_ptr(), stk_mem.len(), idx as usize)
        };
        self.tasks.at_mut(idx).stk_ptr = stk_ptr;

        self.rdy_insert_tail(idx);
        crate::debug!("task created: {} prio {}", name, prio);

        self.sched();
        Ok(TaskHandle(id))
    }

    /// Delete a task, or the calling task when `task` is `None`.
    ///
    /// The task is unlinked from every list it is on and the mutexes it
    /// holds pass to their next waiter. A task deleting itself keeps its
    /// stack until the idle task reclaims it.
    pub fn task_delete(&mut self, task: Option<TaskHandle>) -> OsResult<()> {
        let idx = self.resolve_task(task)?;

        if Some(idx) == self.idle {
            return Err(OsError::TaskDelIdle);
        }
        #[cfg(feature = "timer")]
        if Some(idx) == self.tmr.task {
            return Err(OsError::TaskDelInvalid);
        }

        let is_cur = self.cur == Some(idx);
        if is_cur && self.sched_lock > 0 {
            return Err(OsError::SchedLocked);
        }

        let state = self.tasks.at(idx).task_state;
        match state {
            OsTaskState::Ready => self.rdy_remove(idx),
            OsTaskState::Blocked => {
                if self.tasks.at(idx).on_tick_list {
                    self.delayed.remove(&mut self.tasks, idx);
                }
                self.pend_unlink(idx);
            }
            _ => {}
        }

        #[cfg(feature = "mutex")]
        self.mutex_release_all(idx);

        crate::debug!("task deleted: {}", self.tasks.at(idx).name);

        if is_cur {
            self.tasks.at_mut(idx).task_state = OsTaskState::Deleted;
            if self.terminated.push(idx).is_err() {
                crate::warn!("terminated list full");
            }
        } else {
            self.task_free(idx);
        }

        self.sched();
        Ok(())
    }

    /// Suspend a task, or the calling task when `task` is `None`.
    ///
    /// Suspensions nest. A blocked task keeps waiting and becomes
    /// suspended when its wait ends.
    pub fn task_suspend(&mut self, task: Option<TaskHandle>) -> OsResult<()> {
        let idx = self.resolve_task(task)?;

        if Some(idx) == self.idle {
            return Err(OsError::TaskSuspendIdle);
        }
        if self.cur == Some(idx) && self.sched_lock > 0 {
            return Err(OsError::SchedLocked);
        }

        let tcb = self.tasks.at_mut(idx);
        tcb.suspend_ctr = tcb
            .suspend_ctr
            .checked_add(1)
            .ok_or(OsError::LockNestingOvf)?;

        if tcb.suspend_ctr == 1 {
            let state = tcb.task_state;
            match state {
                OsTaskState::Ready => {
                    tcb.task_state = OsTaskState::Suspended;
                    self.rdy_remove(idx);
                }
                OsTaskState::Running => tcb.task_state = OsTaskState::Suspended,
                _ => {}
            }
        }

        self.sched();
        Ok(())
    }

    /// Resume a suspended task
    pub fn task_resume(&mut self, task: TaskHandle) -> OsResult<()> {
        let idx = self.task_index(task)?;
        let tcb = self.tasks.at_mut(idx);

        if tcb.suspend_ctr == 0 {
            return Err(OsError::TaskNotSuspended);
        }
        tcb.suspend_ctr -= 1;

        // Only resume if suspend counter reaches 0
        if tcb.suspend_ctr == 0 && tcb.is_suspended() {
            tcb.task_state = OsTaskState::Ready;
            self.rdy_insert_tail(idx);
            self.sched();
        }
        Ok(())
    }

    /// Change the base priority of a task, or of the calling task.
    ///
    /// The effective priority never drops below what the task inherits
    /// from mutexes it holds.
    pub fn task_set_priority(&mut self, task: Option<TaskHandle>, prio: OsPrio) -> OsResult<()> {
        if prio == CFG_PRIO_IDLE || prio as usize >= CFG_PRIO_MAX {
            return Err(OsError::PrioInvalid);
        }

        let idx = self.resolve_task(task)?;
        if Some(idx) == self.idle {
            return Err(OsError::PrioInvalid);
        }

        self.tasks.at_mut(idx).base_prio = prio;
        let effective = self.effective_prio(idx);
        self.change_prio(idx, effective);

        #[cfg(feature = "mutex")]
        if let crate::types::OsPendOn::Mutex(m) = self.tasks.at(idx).pend_on {
            self.mutex_recompute_holder(m);
        }

        self.sched();
        Ok(())
    }

    /// Base priority raised to the highest priority inherited through
    /// held mutexes
    pub(crate) fn effective_prio(&self, idx: u16) -> OsPrio {
        let base = self.tasks.at(idx).base_prio;
        #[cfg(feature = "mutex")]
        let base = base.max(self.mutex_inherited_prio(idx));
        base
    }

    /// Give a TCB slot and its stack back
    pub(crate) fn task_free(&mut self, idx: u16) {
        if let Some(id) = self.tasks.id_at(idx as usize) {
            if let Some(tcb) = self.tasks.remove(id) {
                self.stacks.free(tcb.stk);
            }
        }
    }

    // ============ Queries ============

    /// Slot index of a live task
    pub(crate) fn task_index(&self, task: TaskHandle) -> OsResult<u16> {
        match self.tasks.get(task.0) {
            Some(tcb) if tcb.task_state != OsTaskState::Deleted => Ok(task.0.index() as u16),
            _ => Err(OsError::ObjInvalid),
        }
    }

    /// `None` means the calling task
    pub(crate) fn resolve_task(&self, task: Option<TaskHandle>) -> OsResult<u16> {
        match task {
            Some(t) => self.task_index(t),
            None => self
                .cur
                .filter(|_| self.running)
                .ok_or(OsError::OsNotRunning),
        }
    }

    pub(crate) fn task_handle(&self, idx: u16) -> Option<TaskHandle> {
        self.tasks.id_at(idx as usize).map(TaskHandle)
    }

    /// The running task
    pub fn current(&self) -> Option<TaskHandle> {
        self.cur.and_then(|idx| self.task_handle(idx))
    }

    pub fn task_state(&self, task: TaskHandle) -> OsResult<OsTaskState> {
        self.tasks
            .get(task.0)
            .map(|t| t.task_state)
            .ok_or(OsError::ObjInvalid)
    }

    /// Effective priority, including inheritance
    pub fn task_priority(&self, task: TaskHandle) -> OsResult<OsPrio> {
        self.tasks
            .get(task.0)
            .map(|t| t.prio)
            .ok_or(OsError::ObjInvalid)
    }

    pub fn task_name(&self, task: TaskHandle) -> OsResult<&'static str> {
        self.tasks
            .get(task.0)
            .map(|t| t.name)
            .ok_or(OsError::ObjInvalid)
    }

    /// Number of tasks, idle and deleted-but-unreclaimed included
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

// ============ Global API ============

/// Create a new task
///
/// # Example
/// ```ignore
/// fn my_task(arg: usize) {
///     loop { /* ... */ }
/// }
/// static MY_TASK: fn(usize) = my_task;
///
/// // In main:
/// os_task_create("MyTask", &MY_TASK, 0, 5, 256).unwrap();
/// ```
pub fn os_task_create(
    name: &'static str,
    entry: &'static dyn Runnable<usize>,
    arg: usize,
    prio: OsPrio,
    stk_size: usize,
) -> OsResult<TaskHandle> {
    with_kernel(|k| k.task_create(name, entry, arg, prio, stk_size))
}

/// Delete a task (`None` deletes the calling task and does not return)
pub fn os_task_del(task: Option<TaskHandle>) -> OsResult<()> {
    with_kernel(|k| k.task_delete(task))
}

/// Suspend a task (`None` suspends the calling task)
pub fn os_task_suspend(task: Option<TaskHandle>) -> OsResult<()> {
    with_kernel(|k| k.task_suspend(task))
}

/// Resume a suspended task
pub fn os_task_resume(task: TaskHandle) -> OsResult<()> {
    with_kernel(|k| k.task_resume(task))
}

/// Change a task's base priority
pub fn os_task_change_prio(task: Option<TaskHandle>, prio: OsPrio) -> OsResult<()> {
    with_kernel(|k| k.task_set_priority(task, prio))
}

/// Handle of the calling task
pub fn os_task_self() -> Option<TaskHandle> {
    with_kernel(|k| k.current())
}

/// First code a new task runs; `slot` is its TCB index
#[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
pub(crate) extern "C" fn os_task_trampoline(slot: u32) -> ! {
    let (entry, arg) = with_kernel(|k| {
        let tcb = k.tasks.at(slot as u16);
        (tcb.entry, tcb.arg)
    });

    entry.run(arg);

    let _ = os_task_del(None);
    loop {
        core::hint::spin_loop();
    }
}
