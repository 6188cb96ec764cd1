//! Event groups
//!
//! A group holds 24 usable event bits. Tasks wait for any or all of a
//! mask, optionally clearing the bits they were waiting for on exit, or
//! meet at a rendezvous with [`Kernel::flag_sync`].

use crate::config::CFG_FLAG_BITS_MASK;
use crate::critical::is_isr_context;
use crate::error::{OsError, OsResult};
use crate::kernel::{pend_on, with_kernel, Kernel};
use crate::sync::pend_list::PendList;
use crate::types::{EventGroupHandle, OsFlags, OsPendOn, OsPendStatus, OsTick, Pend, TaskHandle, NO_WAIT};

/// Event flag group
pub struct OsFlagGrp {
    name: &'static str,
    flags: OsFlags,
    /// Waiting tasks in arrival order
    pub(crate) waiters: PendList,
}

impl OsFlagGrp {
    pub const fn new(name: &'static str) -> Self {
        OsFlagGrp {
            name,
            flags: 0,
            waiters: PendList::new(),
        }
    }
}

#[inline]
fn satisfied(flags: OsFlags, mask: OsFlags, all: bool) -> bool {
    if all {
        flags & mask == mask
    } else {
        flags & mask != 0
    }
}

#[inline]
fn check_bits(mask: OsFlags) -> OsResult<()> {
    if mask & !CFG_FLAG_BITS_MASK != 0 {
        return Err(OsError::FlagInvalidBits);
    }
    Ok(())
}

impl Kernel {
    pub fn flag_create(&mut self, name: &'static str) -> OsResult<EventGroupHandle> {
        let id = self
            .flag_grps
            .insert(OsFlagGrp::new(name))
            .map_err(|_| OsError::OutOfMemory)?;
        crate::debug!("event group created: {}", name);
        Ok(EventGroupHandle(id))
    }

    fn flag_grp(&self, g: EventGroupHandle) -> OsResult<&OsFlagGrp> {
        self.flag_grps.get(g.0).ok_or(OsError::ObjInvalid)
    }

    /// Set bits and release every waiter they satisfy
    ///
    /// # Returns
    /// The bits of the group once clear-on-exit waiters have consumed theirs.
    pub fn flag_set(&mut self, g: EventGroupHandle, mask: OsFlags) -> OsResult<OsFlags> {
        let after = self.flag_post(g, mask)?;
        self.sched();
        Ok(after)
    }

    /// [`Kernel::flag_set`] without the scheduling point
    fn flag_post(&mut self, g: EventGroupHandle, mask: OsFlags) -> OsResult<OsFlags> {
        check_bits(mask)?;
        let grp = self.flag_grps.get_mut(g.0).ok_or(OsError::ObjInvalid)?;
        grp.flags |= mask;
        let flags = grp.flags;
        let waiters = grp.waiters.snapshot(&self.tasks);

        // Every waiter sees the same bits; consumed bits go afterwards
        let mut consumed: OsFlags = 0;
        for idx in waiters {
            let tcb = self.tasks.at_mut(idx);
            if !satisfied(flags, tcb.flags_pend, tcb.flags_all) {
                continue;
            }
            if tcb.flags_clear {
                consumed |= tcb.flags_pend;
            }
            tcb.flags_rdy = flags;

            if let Some(grp) = self.flag_grps.get_mut(g.0) {
                grp.waiters.remove(&mut self.tasks, idx);
            }
            self.wake(idx, OsPendStatus::Ok);
        }

        let grp = self.flag_grps.get_mut(g.0).ok_or(OsError::ObjInvalid)?;
        grp.flags &= !consumed;
        Ok(grp.flags)
    }

    /// Clear bits, returning the bits as they were before
    pub fn flag_clear(&mut self, g: EventGroupHandle, mask: OsFlags) -> OsResult<OsFlags> {
        check_bits(mask)?;
        let grp = self.flag_grps.get_mut(g.0).ok_or(OsError::ObjInvalid)?;
        let before = grp.flags;
        grp.flags &= !mask;
        Ok(before)
    }

    pub fn flag_get(&self, g: EventGroupHandle) -> OsResult<OsFlags> {
        self.flag_grp(g).map(|grp| grp.flags)
    }

    /// Wait for any (or all) bits of `mask`
    ///
    /// # Arguments
    /// * `all` - Require every bit of `mask` instead of any one
    /// * `clear` - Clear the bits of `mask` when the wait is satisfied
    /// * `timeout` - `NO_WAIT` fails with `Timeout` instead of blocking
    ///
    /// # Returns
    /// * `Ok(Pend::Done(bits))` - Already satisfied; `bits` as observed
    /// * `Ok(Pend::Blocked)` - Collect with [`Kernel::flag_wait_finish`]
    /// * `Err(OsError::FlagInvalidBits)` - Empty mask or reserved bits
    pub fn flag_wait(
        &mut self,
        g: EventGroupHandle,
        mask: OsFlags,
        all: bool,
        clear: bool,
        timeout: OsTick,
    ) -> OsResult<Pend<OsFlags>> {
        if mask == 0 {
            return Err(OsError::FlagInvalidBits);
        }
        check_bits(mask)?;

        let grp = self.flag_grps.get_mut(g.0).ok_or(OsError::ObjInvalid)?;
        let flags = grp.flags;
        if satisfied(flags, mask, all) {
            if clear {
                grp.flags &= !mask;
            }
            return Ok(Pend::Done(flags));
        }
        if timeout == NO_WAIT {
            return Err(OsError::Timeout);
        }

        let cur = self.pend_check()?;
        self.flag_block(g, cur, mask, all, clear, timeout);
        Ok(Pend::Blocked)
    }

    /// Bits observed by the last satisfied wait of `task`
    pub fn flag_wait_finish(&self, task: TaskHandle) -> OsResult<OsFlags> {
        self.pend_result(task)?;
        let tcb = self.tasks.get(task.0).ok_or(OsError::ObjInvalid)?;
        Ok(tcb.flags_rdy)
    }

    /// Rendezvous: set `own` bits, then wait until every bit of `all_bits`
    /// is present.
    ///
    /// The last party to arrive returns at once and clears `all_bits`; the
    /// others are released by its set. All parties observe the combined
    /// mask.
    pub fn flag_sync(
        &mut self,
        g: EventGroupHandle,
        own: OsFlags,
        all_bits: OsFlags,
        timeout: OsTick,
    ) -> OsResult<Pend<OsFlags>> {
        if all_bits == 0 {
            return Err(OsError::FlagInvalidBits);
        }
        check_bits(own)?;
        check_bits(all_bits)?;

        let observed = self.flag_grp(g)?.flags | own;
        let complete = observed & all_bits == all_bits;

        // Refuse before touching the group if the caller cannot block
        let cur = if complete || timeout == NO_WAIT {
            None
        } else {
            Some(self.pend_check()?)
        };

        self.flag_post(g, own)?;

        if complete {
            if let Some(grp) = self.flag_grps.get_mut(g.0) {
                grp.flags &= !all_bits;
            }
            self.sched();
            return Ok(Pend::Done(observed));
        }

        let Some(cur) = cur else {
            self.sched();
            return Err(OsError::Timeout);
        };
        self.flag_block(g, cur, all_bits, true, true, timeout);
        Ok(Pend::Blocked)
    }

    fn flag_block(
        &mut self,
        g: EventGroupHandle,
        cur: u16,
        mask: OsFlags,
        all: bool,
        clear: bool,
        timeout: OsTick,
    ) {
        let tcb = self.tasks.at_mut(cur);
        tcb.flags_pend = mask;
        tcb.flags_all = all;
        tcb.flags_clear = clear;
        tcb.flags_rdy = 0;

        self.block_current(cur, OsPendOn::Flag(g), timeout);
        if let Some(grp) = self.flag_grps.get_mut(g.0) {
            grp.waiters.insert_tail(&mut self.tasks, cur);
        }
        self.sched();
    }

    /// Delete an event group; waiters wake with `ObjDel`
    pub fn flag_delete(&mut self, g: EventGroupHandle) -> OsResult<()> {
        let mut grp = self.flag_grps.remove(g.0).ok_or(OsError::ObjInvalid)?;
        while let Some(idx) = grp.waiters.pop(&mut self.tasks) {
            self.wake(idx, OsPendStatus::Del);
        }
        self.sched();
        Ok(())
    }

    pub fn flag_name(&self, g: EventGroupHandle) -> OsResult<&'static str> {
        self.flag_grp(g).map(|grp| grp.name)
    }
}

// ============ Safe Wrapper ============

/// Event group handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventGroup {
    handle: EventGroupHandle,
}

impl EventGroup {
    pub fn create(name: &'static str) -> OsResult<Self> {
        with_kernel(|k| k.flag_create(name)).map(Self::from_handle)
    }

    pub const fn from_handle(handle: EventGroupHandle) -> Self {
        EventGroup { handle }
    }

    #[inline]
    pub fn handle(&self) -> EventGroupHandle {
        self.handle
    }

    /// Set bits; also callable from interrupt handlers
    pub fn set(&self, mask: OsFlags) -> OsResult<OsFlags> {
        with_kernel(|k| k.flag_set(self.handle, mask))
    }

    pub fn clear(&self, mask: OsFlags) -> OsResult<OsFlags> {
        with_kernel(|k| k.flag_clear(self.handle, mask))
    }

    pub fn get(&self) -> OsResult<OsFlags> {
        with_kernel(|k| k.flag_get(self.handle))
    }

    pub fn wait(&self, mask: OsFlags, all: bool, clear: bool, timeout: OsTick) -> OsResult<OsFlags> {
        pend_on(
            |k| k.flag_wait(self.handle, mask, all, clear, timeout),
            |k, task| k.flag_wait_finish(task),
        )
    }

    #[inline]
    pub fn wait_any(&self, mask: OsFlags, timeout: OsTick) -> OsResult<OsFlags> {
        self.wait(mask, false, false, timeout)
    }

    #[inline]
    pub fn wait_all(&self, mask: OsFlags, timeout: OsTick) -> OsResult<OsFlags> {
        self.wait(mask, true, false, timeout)
    }

    pub fn sync(&self, own: OsFlags, all_bits: OsFlags, timeout: OsTick) -> OsResult<OsFlags> {
        pend_on(
            |k| k.flag_sync(self.handle, own, all_bits, timeout),
            |k, task| k.flag_wait_finish(task),
        )
    }

    pub fn delete(self) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        with_kernel(|k| k.flag_delete(self.handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfied_any_and_all() {
        assert!(satisfied(0b0100, 0b0110, false));
        assert!(!satisfied(0b0100, 0b0110, true));
        assert!(satisfied(0b0111, 0b0110, true));
        assert!(!satisfied(0b1000, 0b0110, false));
    }

    #[test]
    fn test_reserved_bits_rejected() {
        assert_eq!(check_bits(0x0100_0000), Err(OsError::FlagInvalidBits));
        assert_eq!(check_bits(CFG_FLAG_BITS_MASK), Ok(()));
    }
}
