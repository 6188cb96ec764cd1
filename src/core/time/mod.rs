//! Time management module
//!
//! Provides tick handling, time delays, and timeout management.
//!
//! Delays and pend timeouts share one list of TCBs ordered by the absolute
//! tick at which they end. Tick values wrap; two ticks are compared by the
//! sign of their wrapping difference, which is why finite timeouts are
//! clamped to [`CFG_TICK_MAX_DELAY`].

use crate::config::{CFG_TICK_MAX_DELAY, CFG_TICK_RATE_HZ};
use crate::error::{OsError, OsResult};
use crate::kernel::{pend_on, with_kernel, Kernel, FLAGS};
use crate::task::TaskTable;
use crate::types::{OsPendOn, OsPendStatus, OsTaskState, OsTick, Pend, TaskHandle};

/// `a` comes strictly before `b`
#[inline]
pub fn tick_before(a: OsTick, b: OsTick) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `now` has reached `deadline`
#[inline]
pub fn tick_reached(now: OsTick, deadline: OsTick) -> bool {
    !tick_before(now, deadline)
}

/// Absolute tick `timeout` ticks after `now`
#[inline]
pub fn deadline(now: OsTick, timeout: OsTick) -> OsTick {
    now.wrapping_add(timeout.min(CFG_TICK_MAX_DELAY))
}

/// Convert milliseconds to ticks, rounding down
#[inline]
pub const fn ms_to_ticks(ms: u32) -> OsTick {
    ((ms as u64 * CFG_TICK_RATE_HZ as u64) / 1000) as OsTick
}

// ============ Delayed list ============

/// TCBs sorted by wake tick; equal ticks keep insertion order
#[derive(Debug, Default)]
pub struct DelayList {
    head: Option<u16>,
}

impl DelayList {
    pub const fn new() -> Self {
        DelayList { head: None }
    }

    pub fn init(&mut self) {
        self.head = None;
    }

    #[inline]
    pub fn head(&self) -> Option<u16> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn insert(&mut self, tasks: &mut TaskTable, idx: u16, wake_tick: OsTick) {
        let mut prev = None;
        let mut cur = self.head;
        while let Some(i) = cur {
            if tick_before(wake_tick, tasks.at(i).wake_tick) {
                break;
            }
            prev = Some(i);
            cur = tasks.at(i).tick_next;
        }

        let tcb = tasks.at_mut(idx);
        tcb.wake_tick = wake_tick;
        tcb.on_tick_list = true;
        tcb.tick_prev = prev;
        tcb.tick_next = cur;

        match prev {
            Some(p) => tasks.at_mut(p).tick_next = Some(idx),
            None => self.head = Some(idx),
        }
        if let Some(n) = cur {
            tasks.at_mut(n).tick_prev = Some(idx);
        }
    }

    pub fn remove(&mut self, tasks: &mut TaskTable, idx: u16) {
        let tcb = tasks.at_mut(idx);
        let (prev, next) = (tcb.tick_prev, tcb.tick_next);
        tcb.tick_prev = None;
        tcb.tick_next = None;
        tcb.on_tick_list = false;

        match prev {
            Some(p) => tasks.at_mut(p).tick_next = next,
            None => self.head = next,
        }
        if let Some(n) = next {
            tasks.at_mut(n).tick_prev = prev;
        }
    }
}

// ============ Kernel operations ============

impl Kernel {
    /// Advance time by one tick.
    ///
    /// Wakes every task whose delay or timeout has ended, runs time
    /// slicing and reschedules. A woken task of the running task's
    /// priority takes the CPU at once; the running task goes to the tail
    /// of its level.
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        let now = self.tick;

        let running_prio = self
            .cur
            .map(|cur| self.tasks.at(cur))
            .filter(|tcb| tcb.task_state == OsTaskState::Running)
            .map(|tcb| tcb.prio);
        let mut peer_woken = false;

        while let Some(idx) = self.delayed.head() {
            if !tick_reached(now, self.tasks.at(idx).wake_tick) {
                break;
            }
            self.delayed.remove(&mut self.tasks, idx);

            if self.tasks.at(idx).pend_on == OsPendOn::Delay {
                self.wake(idx, OsPendStatus::Ok);
            } else {
                crate::debug!("pend timeout: {}", self.tasks.at(idx).name);
                self.pend_unlink(idx);
                self.wake(idx, OsPendStatus::Timeout);
            }

            let tcb = self.tasks.at(idx);
            if tcb.task_state == OsTaskState::Ready && Some(tcb.prio) == running_prio {
                peer_woken = true;
            }
        }

        // A woken task that outranks the running one preempts it as usual
        if peer_woken && self.sched.prio_tbl.get_highest() == running_prio {
            self.rotate_current();
        } else {
            self.time_slice();
        }
        self.sched();
    }

    /// Current tick count
    #[inline]
    pub fn tick_get(&self) -> OsTick {
        self.tick
    }

    /// Block the running task for `ticks` ticks.
    ///
    /// `0` behaves as a yield. Collect the outcome with
    /// [`Kernel::pend_result`] once the task runs again.
    pub fn delay(&mut self, ticks: OsTick) -> OsResult<Pend<()>> {
        let cur = self.pend_check()?;

        if ticks == 0 {
            self.task_yield()?;
            return Ok(Pend::Done(()));
        }

        self.block_current(cur, OsPendOn::Delay, ticks);
        self.sched();
        Ok(Pend::Blocked)
    }

    /// End the delay of another task early; its delay reports `PendAbort`
    pub fn delay_abort(&mut self, task: TaskHandle) -> OsResult<()> {
        let idx = self.task_index(task)?;
        if !self.tasks.at(idx).is_delayed() {
            return Err(OsError::TaskNotDly);
        }

        self.wake(idx, OsPendStatus::Abort);
        self.sched();
        Ok(())
    }
}

// ============ Global API ============

/// Time delay in ticks
///
/// Delays the calling task for the specified number of system ticks.
/// When the delay expires, the tick handler moves the task back to ready.
///
/// # Returns
/// * `Ok(())` - Delay completed
/// * `Err(OsError::PendAbort)` - Delay ended by [`os_time_dly_resume`]
/// * `Err(OsError::SchedLocked)` - Scheduler is locked
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    pend_on(|k| k.delay(ticks), |k, task| k.pend_result(task))
}

/// Time delay in hours, minutes, seconds, milliseconds
///
/// # Arguments
/// * `hours` - Hours (0-999)
/// * `minutes` - Minutes (0-59)
/// * `seconds` - Seconds (0-59)
/// * `milliseconds` - Milliseconds (0-999)
pub fn os_time_dly_hmsm(hours: u16, minutes: u8, seconds: u8, milliseconds: u16) -> OsResult<()> {
    if minutes > 59 {
        return Err(OsError::TimeInvalidMinutes);
    }
    if seconds > 59 {
        return Err(OsError::TimeInvalidSeconds);
    }
    if milliseconds > 999 {
        return Err(OsError::TimeInvalidMilliseconds);
    }

    let total_ms = (hours as u32) * 3_600_000
        + (minutes as u32) * 60_000
        + (seconds as u32) * 1000
        + (milliseconds as u32);

    os_time_dly(ms_to_ticks(total_ms))
}

/// Resume a delayed task before its delay expires
pub fn os_time_dly_resume(task: TaskHandle) -> OsResult<()> {
    with_kernel(|k| k.delay_abort(task))
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    FLAGS.tick_get()
}

/// Tick handler
pub fn os_tick_handler() {
    if !FLAGS.is_running() {
        return;
    }

    let now = with_kernel(|k| {
        k.tick();
        k.tick_get()
    });
    FLAGS.set_tick(now);
}

/// SysTick interrupt handler
#[cfg(target_arch = "arm")]
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_handler();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Region;
    use crate::task::OsTcb;

    fn nop(_: usize) {}
    static NOP: fn(usize) = nop;

    fn table(n: usize) -> TaskTable {
        let mut tasks = TaskTable::new();
        for _ in 0..n {
            let _ = tasks.insert(OsTcb::new("t", &NOP, 0, 1, Region::EMPTY));
        }
        tasks
    }

    #[test]
    fn test_wrapping_compare() {
        assert!(tick_before(1, 2));
        assert!(!tick_before(2, 2));
        assert!(tick_before(u32::MAX - 1, 3));
        assert!(tick_reached(3, u32::MAX - 1));
    }

    #[test]
    fn test_deadline_clamped() {
        assert_eq!(deadline(10, 5), 15);
        assert_eq!(deadline(0, u32::MAX - 1), CFG_TICK_MAX_DELAY);
    }

    #[test]
    fn test_sorted_insert_keeps_fifo_for_equal_ticks() {
        let mut tasks = table(4);
        let mut list = DelayList::new();
        list.insert(&mut tasks, 0, 30);
        list.insert(&mut tasks, 1, 10);
        list.insert(&mut tasks, 2, 30);
        list.insert(&mut tasks, 3, 20);

        let mut order = [0u16; 4];
        let mut cur = list.head();
        let mut n = 0;
        while let Some(i) = cur {
            order[n] = i;
            n += 1;
            cur = tasks.at(i).tick_next;
        }
        assert_eq!(order, [1, 3, 0, 2]);
    }

    #[test]
    fn test_insert_across_wrap() {
        let mut tasks = table(2);
        let mut list = DelayList::new();
        list.insert(&mut tasks, 0, 5);
        list.insert(&mut tasks, 1, u32::MAX - 5);
        assert_eq!(list.head(), Some(1));

        list.remove(&mut tasks, 1);
        assert_eq!(list.head(), Some(0));
        assert!(!tasks.at(1).on_tick_list);
        list.remove(&mut tasks, 0);
        assert!(list.is_empty());
    }

    #[test]
    fn test_ms_to_ticks() {
        assert_eq!(ms_to_ticks(500), 500 * CFG_TICK_RATE_HZ / 1000);
        assert_eq!(ms_to_ticks(0), 0);
    }
}
