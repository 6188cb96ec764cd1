//! Mutex implementation with priority inheritance
//!
//! Mutexes provide mutual exclusion with automatic priority boosting
//! to prevent priority inversion.
//!
//! A holder runs at the highest of its base priority and the priority of
//! the first waiter of every mutex it holds. The boost is applied one hop:
//! a boosted holder that is itself waiting on another mutex does not pass
//! the boost on to that mutex's holder.

use heapless::Vec;

use crate::config::CFG_MUTEX_MAX;
use crate::critical::is_isr_context;
use crate::error::{OsError, OsResult};
use crate::kernel::{pend_on, with_kernel, Kernel};
use crate::sync::pend_list::PendList;
use crate::types::{
    MutexHandle, OsNestingCtr, OsPendOn, OsPendStatus, OsPrio, OsTick, Pend, TaskHandle, NO_WAIT,
};

/// Mutex with priority inheritance
pub struct OsMutex {
    /// Name for debugging
    name: &'static str,
    /// Task that owns the mutex
    holder: Option<u16>,
    /// Nesting counter
    nesting: OsNestingCtr,
    /// Tasks waiting on this mutex, by priority
    pub(crate) waiters: PendList,
}

impl OsMutex {
    pub const fn new(name: &'static str) -> Self {
        OsMutex {
            name,
            holder: None,
            nesting: 0,
            waiters: PendList::new(),
        }
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.holder.is_some()
    }
}

impl Kernel {
    pub fn mutex_create(&mut self, name: &'static str) -> OsResult<MutexHandle> {
        let id = self
            .mutexes
            .insert(OsMutex::new(name))
            .map_err(|_| OsError::OutOfMemory)?;
        crate::debug!("mutex created: {}", name);
        Ok(MutexHandle(id))
    }

    /// Acquire the mutex for the running task
    ///
    /// If the mutex is owned by a lower-priority task, the owner's priority
    /// is temporarily boosted to prevent priority inversion.
    ///
    /// # Returns
    /// * `Ok(Pend::Done(()))` - Mutex taken, or nesting increased for the owner
    /// * `Ok(Pend::Blocked)` - Caller waits; collect with [`Kernel::pend_result`]
    /// * `Err(OsError::Timeout)` - Held elsewhere and `timeout` is `NO_WAIT`
    /// * `Err(OsError::MutexOvf)` - Nesting counter overflow
    pub fn mutex_acquire(&mut self, m: MutexHandle, timeout: OsTick) -> OsResult<Pend<()>> {
        let cur = self.resolve_task(None)?;
        let mutex = self.mutexes.get_mut(m.0).ok_or(OsError::ObjInvalid)?;

        let holder = mutex.holder;
        match holder {
            None => {
                mutex.holder = Some(cur);
                mutex.nesting = 1;
                Ok(Pend::Done(()))
            }
            Some(h) if h == cur => {
                mutex.nesting = mutex.nesting.checked_add(1).ok_or(OsError::MutexOvf)?;
                Ok(Pend::Done(()))
            }
            Some(h) => {
                if timeout == NO_WAIT {
                    return Err(OsError::Timeout);
                }
                let cur = self.pend_check()?;

                self.block_current(cur, OsPendOn::Mutex(m), timeout);
                if let Some(mutex) = self.mutexes.get_mut(m.0) {
                    mutex.waiters.insert_by_prio(&mut self.tasks, cur);
                }

                // Priority inheritance
                self.mutex_recompute_prio(h);

                self.sched();
                Ok(Pend::Blocked)
            }
        }
    }

    /// Release the mutex held by the running task
    ///
    /// The first waiter becomes the owner. The releasing task drops back
    /// to what it still inherits from other held mutexes, or to its base
    /// priority.
    pub fn mutex_release(&mut self, m: MutexHandle) -> OsResult<()> {
        let cur = self.resolve_task(None)?;
        let mutex = self.mutexes.get_mut(m.0).ok_or(OsError::ObjInvalid)?;

        if mutex.holder != Some(cur) {
            return Err(OsError::MutexNotOwner);
        }
        if mutex.nesting > 1 {
            mutex.nesting -= 1;
            return Ok(());
        }

        self.mutex_hand_over(m);
        self.mutex_recompute_prio(cur);

        self.sched();
        Ok(())
    }

    /// Delete a mutex; waiters wake with `ObjDel`
    pub fn mutex_delete(&mut self, m: MutexHandle) -> OsResult<()> {
        let mut mutex = self.mutexes.remove(m.0).ok_or(OsError::ObjInvalid)?;

        while let Some(idx) = mutex.waiters.pop(&mut self.tasks) {
            self.wake(idx, OsPendStatus::Del);
        }
        if let Some(h) = mutex.holder {
            self.mutex_recompute_prio(h);
        }

        self.sched();
        Ok(())
    }

    /// Current owner, if any
    pub fn mutex_owner(&self, m: MutexHandle) -> OsResult<Option<TaskHandle>> {
        let mutex = self.mutexes.get(m.0).ok_or(OsError::ObjInvalid)?;
        Ok(mutex.holder.and_then(|idx| self.task_handle(idx)))
    }

    pub fn mutex_name(&self, m: MutexHandle) -> OsResult<&'static str> {
        self.mutexes
            .get(m.0)
            .map(|mutex| mutex.name)
            .ok_or(OsError::ObjInvalid)
    }

    // ============ Inheritance ============

    /// Pass a fully released mutex to its first waiter, or free it
    fn mutex_hand_over(&mut self, m: MutexHandle) {
        let Some(mutex) = self.mutexes.get_mut(m.0) else {
            return;
        };

        match mutex.waiters.pop(&mut self.tasks) {
            Some(next) => {
                mutex.holder = Some(next);
                mutex.nesting = 1;
                self.wake(next, OsPendStatus::Ok);
                self.mutex_recompute_prio(next);
            }
            None => {
                mutex.holder = None;
                mutex.nesting = 0;
            }
        }
    }

    /// Highest priority waiting on any mutex `idx` holds, 0 when none
    pub(crate) fn mutex_inherited_prio(&self, idx: u16) -> OsPrio {
        self.mutexes
            .iter()
            .filter(|(_, mutex)| mutex.holder == Some(idx))
            .filter_map(|(_, mutex)| mutex.waiters.head())
            .map(|w| self.tasks.at(w).prio)
            .max()
            .unwrap_or(0)
    }

    /// Bring a task to max(base, inherited)
    pub(crate) fn mutex_recompute_prio(&mut self, idx: u16) {
        let prio = self.effective_prio(idx);
        let old = self.tasks.at(idx).prio;
        if prio != old {
            crate::trace!("{} prio {} -> {}", self.tasks.at(idx).name, old, prio);
            self.change_prio(idx, prio);
        }
    }

    /// Recompute the holder of `m` after its wait list changed
    pub(crate) fn mutex_recompute_holder(&mut self, m: MutexHandle) {
        if let Some(h) = self.mutexes.get(m.0).and_then(|mutex| mutex.holder) {
            self.mutex_recompute_prio(h);
        }
    }

    /// Hand every mutex held by a task that is going away to its next waiter
    pub(crate) fn mutex_release_all(&mut self, idx: u16) {
        let held: Vec<MutexHandle, CFG_MUTEX_MAX> = self
            .mutexes
            .iter()
            .filter(|(_, mutex)| mutex.holder == Some(idx))
            .map(|(id, _)| MutexHandle(id))
            .collect();

        for m in held {
            self.mutex_hand_over(m);
        }
    }
}

// ============ Safe Wrapper ============

/// Mutex handle with blocking lock/unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutex {
    handle: MutexHandle,
}

impl Mutex {
    pub fn create(name: &'static str) -> OsResult<Self> {
        with_kernel(|k| k.mutex_create(name)).map(Self::from_handle)
    }

    pub const fn from_handle(handle: MutexHandle) -> Self {
        Mutex { handle }
    }

    #[inline]
    pub fn handle(&self) -> MutexHandle {
        self.handle
    }

    pub fn lock(&self, timeout: OsTick) -> OsResult<()> {
        pend_on(
            |k| k.mutex_acquire(self.handle, timeout),
            |k, task| k.pend_result(task),
        )
    }

    /// Take the mutex only if it is free or already ours
    pub fn try_lock(&self) -> OsResult<()> {
        self.lock(NO_WAIT)
    }

    pub fn unlock(&self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        with_kernel(|k| k.mutex_release(self.handle))
    }

    /// Lock and return a guard that unlocks on drop
    pub fn lock_guard(&self, timeout: OsTick) -> OsResult<MutexGuard<'_>> {
        self.lock(timeout)?;
        Ok(MutexGuard { mutex: self })
    }

    /// Run `f` with the mutex held
    pub fn with_lock<R>(&self, timeout: OsTick, f: impl FnOnce() -> R) -> OsResult<R> {
        let _guard = self.lock_guard(timeout)?;
        Ok(f())
    }

    pub fn owner(&self) -> OsResult<Option<TaskHandle>> {
        with_kernel(|k| k.mutex_owner(self.handle))
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self.owner(), Ok(Some(_)))
    }

    pub fn delete(self) -> OsResult<()> {
        with_kernel(|k| k.mutex_delete(self.handle))
    }
}

/// RAII guard returned by [`Mutex::lock_guard`]
///
/// The mutex is released when the guard goes out of scope.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl MutexGuard<'_> {
    pub fn mutex(&self) -> &Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        // Only the owner can hold a guard, so the release cannot fail
        let _ = self.mutex.unlock();
    }
}
