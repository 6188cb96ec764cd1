//! Software timer service
//!
//! Timers are driven by a kernel task created with the first timer. The
//! public calls do not touch a timer directly: they post a command to the
//! service's queue, stamped with the tick it was issued at, and the
//! service applies it. Callbacks run in the service task, outside the
//! kernel critical section.
//!
//! One service pass is split in two kernel calls so the callbacks can run
//! in between:
//! - [`Kernel::timer_service_collect`] applies pending commands and gathers
//!   the timers that are due
//! - [`Kernel::timer_service_wait`] blocks on the command queue until the
//!   next expiry
//!
//! An auto-reload timer is re-armed from its previous expiry, not from the
//! time the service got to it, so a late service fires the missed periods
//! back to back and the schedule does not drift.

use heapless::Vec;

use crate::arena::Slab;
use crate::config::{
    CFG_TMR_CMD_QUEUE_LEN, CFG_TMR_FIRED_MAX, CFG_TMR_MAX, CFG_TMR_TASK_PRIO,
    CFG_TMR_TASK_STK_SIZE,
};
use crate::critical::is_isr_context;
use crate::error::{OsError, OsResult};
use crate::kernel::{pend_on, with_kernel, Kernel};
use crate::task::Runnable;
use crate::time::{tick_before, tick_reached};
use crate::types::{OsTick, Pend, QueueHandle, TaskHandle, TimerHandle, NO_WAIT, WAIT_FOREVER};

/// Software timer control block
pub struct OsTimer {
    name: &'static str,
    period: OsTick,
    /// Tick of the next expiry, valid while `active`
    expiry: OsTick,
    auto_reload: bool,
    active: bool,
    callback: &'static dyn Runnable<usize>,
    arg: usize,
}

/// Timer table plus the service task and its command queue
pub struct TimerService {
    timers: Slab<OsTimer, CFG_TMR_MAX>,
    pub(crate) task: Option<u16>,
    cmd_queue: Option<QueueHandle>,
}

impl TimerService {
    pub const fn new() -> Self {
        TimerService {
            timers: Slab::new(),
            task: None,
            cmd_queue: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.timers.clear();
        self.task = None;
        self.cmd_queue = None;
    }

    /// Active timer with the earliest expiry
    fn next_expiry(&self) -> Option<OsTick> {
        self.timers
            .iter()
            .filter(|(_, t)| t.active)
            .map(|(_, t)| t.expiry)
            .reduce(|a, b| if tick_before(b, a) { b } else { a })
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Commands ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TmrCmd {
    Start,
    Stop,
    ChangePeriod(OsTick),
    Delete,
}

/// Command as carried by the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TmrMsg {
    cmd: TmrCmd,
    timer: TimerHandle,
    /// Tick the command was issued at
    at: OsTick,
}

/// op, handle, issue tick, period; little endian
const CMD_SIZE: usize = 13;

impl TmrMsg {
    fn encode(&self) -> [u8; CMD_SIZE] {
        let (op, period) = match self.cmd {
            TmrCmd::Start => (1u8, 0),
            TmrCmd::Stop => (2, 0),
            TmrCmd::ChangePeriod(p) => (3, p),
            TmrCmd::Delete => (4, 0),
        };

        let mut buf = [0u8; CMD_SIZE];
        buf[0] = op;
        buf[1..5].copy_from_slice(&self.timer.into_raw().to_le_bytes());
        buf[5..9].copy_from_slice(&self.at.to_le_bytes());
        buf[9..13].copy_from_slice(&period.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != CMD_SIZE {
            return None;
        }
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        let cmd = match buf[0] {
            1 => TmrCmd::Start,
            2 => TmrCmd::Stop,
            3 => TmrCmd::ChangePeriod(word(9)),
            4 => TmrCmd::Delete,
            _ => return None,
        };
        Some(TmrMsg {
            cmd,
            timer: TimerHandle::from_raw(word(1)),
            at: word(5),
        })
    }
}

// ============ Fired batch ============

/// A timer that expired during a service pass
#[derive(Clone, Copy)]
pub struct Fired {
    pub timer: TimerHandle,
    /// Expiry tick the callback stands for
    pub at: OsTick,
    callback: &'static dyn Runnable<usize>,
    arg: usize,
}

/// Callbacks gathered by [`Kernel::timer_service_collect`]
pub struct FiredTimers {
    items: Vec<Fired, CFG_TMR_FIRED_MAX>,
}

impl FiredTimers {
    pub const fn new() -> Self {
        FiredTimers { items: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fired> {
        self.items.iter()
    }

    /// Invoke the callbacks in expiry order
    pub fn run(&self) {
        for fired in self.items.iter() {
            fired.callback.run(fired.arg);
        }
    }
}

impl Default for FiredTimers {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Kernel operations ============

impl Kernel {
    /// Create a dormant timer, starting the service on first use
    ///
    /// # Returns
    /// * `Err(OsError::TmrInvalidPeriod)` - Zero period
    /// * `Err(OsError::OutOfMemory)` - Timer table full, or no room for the
    ///   service task or its queue
    pub fn timer_create(
        &mut self,
        name: &'static str,
        period: OsTick,
        auto_reload: bool,
        callback: &'static dyn Runnable<usize>,
        arg: usize,
    ) -> OsResult<TimerHandle> {
        if period == 0 {
            return Err(OsError::TmrInvalidPeriod);
        }
        if self.tmr.timers.is_full() {
            return Err(OsError::OutOfMemory);
        }
        self.timer_service_init()?;

        let timer = OsTimer {
            name,
            period,
            expiry: 0,
            auto_reload,
            active: false,
            callback,
            arg,
        };
        let id = self
            .tmr
            .timers
            .insert(timer)
            .map_err(|_| OsError::OutOfMemory)?;
        crate::debug!("timer created: {} period {}", name, period);
        Ok(TimerHandle(id))
    }

    fn timer_service_init(&mut self) -> OsResult<()> {
        if self.tmr.task.is_some() {
            return Ok(());
        }

        let q = self.queue_create("Tmr Q", CFG_TMR_CMD_QUEUE_LEN, CMD_SIZE)?;
        let task = match self.task_create_internal(
            "Tmr Svc",
            &TIMER_SERVICE,
            0,
            CFG_TMR_TASK_PRIO,
            CFG_TMR_TASK_STK_SIZE,
        ) {
            Ok(task) => task,
            Err(e) => {
                let _ = self.queue_delete(q);
                return Err(e);
            }
        };

        self.tmr.cmd_queue = Some(q);
        self.tmr.task = Some(task.0.index() as u16);
        Ok(())
    }

    /// Arm the timer `period` ticks from now
    pub fn timer_start(&mut self, t: TimerHandle, timeout: OsTick) -> OsResult<Pend<()>> {
        self.timer_command(t, TmrCmd::Start, timeout)
    }

    pub fn timer_stop(&mut self, t: TimerHandle, timeout: OsTick) -> OsResult<Pend<()>> {
        self.timer_command(t, TmrCmd::Stop, timeout)
    }

    /// Set a new period and (re)arm the timer from now
    pub fn timer_change_period(
        &mut self,
        t: TimerHandle,
        period: OsTick,
        timeout: OsTick,
    ) -> OsResult<Pend<()>> {
        if period == 0 {
            return Err(OsError::TmrInvalidPeriod);
        }
        self.timer_command(t, TmrCmd::ChangePeriod(period), timeout)
    }

    pub fn timer_delete(&mut self, t: TimerHandle, timeout: OsTick) -> OsResult<Pend<()>> {
        self.timer_command(t, TmrCmd::Delete, timeout)
    }

    /// Post a command, or apply it directly when issued by a callback
    fn timer_command(&mut self, t: TimerHandle, cmd: TmrCmd, timeout: OsTick) -> OsResult<Pend<()>> {
        if !self.tmr.timers.contains(t.0) {
            return Err(OsError::ObjInvalid);
        }
        let q = self.tmr.cmd_queue.ok_or(OsError::ObjInvalid)?;

        let msg = TmrMsg {
            cmd,
            timer: t,
            at: self.tick,
        };

        // The service cannot wait on its own queue
        if self.cur.is_some() && self.cur == self.tmr.task {
            self.timer_apply(msg);
            return Ok(Pend::Done(()));
        }
        self.queue_send(q, &msg.encode(), timeout)
    }

    fn timer_apply(&mut self, msg: TmrMsg) {
        if msg.cmd == TmrCmd::Delete {
            self.tmr.timers.remove(msg.timer.0);
            return;
        }

        // Deleted before the command was processed
        let Some(timer) = self.tmr.timers.get_mut(msg.timer.0) else {
            return;
        };

        match msg.cmd {
            TmrCmd::Start => {
                timer.expiry = msg.at.wrapping_add(timer.period);
                timer.active = true;
            }
            TmrCmd::Stop => timer.active = false,
            TmrCmd::ChangePeriod(period) => {
                timer.period = period;
                timer.expiry = msg.at.wrapping_add(period);
                timer.active = true;
            }
            TmrCmd::Delete => {}
        }
    }

    // ============ Service pass ============

    /// Apply pending commands, then gather every due timer into `fired`
    ///
    /// Due timers are taken in expiry order. A batch that fills up leaves
    /// the rest due for the next pass.
    pub fn timer_service_collect(&mut self, fired: &mut FiredTimers) -> OsResult<()> {
        let q = self.tmr.cmd_queue.ok_or(OsError::ObjInvalid)?;

        // A command handed straight to the blocked service
        if let Some(svc) = self.tmr.task {
            let delivered = TmrMsg::decode(&self.tasks.at(svc).msg);
            self.tasks.at_mut(svc).msg.clear();
            if let Some(msg) = delivered {
                self.timer_apply(msg);
            }
        }

        let mut buf = [0u8; CMD_SIZE];
        while self.queue_try_pop(q, &mut buf)? {
            match TmrMsg::decode(&buf) {
                Some(msg) => self.timer_apply(msg),
                None => {
                    crate::warn!("bad timer command {}", buf[0]);
                }
            }
        }

        let now = self.tick;
        while !fired.items.is_full() {
            let due = self
                .tmr
                .timers
                .iter()
                .filter(|(_, t)| t.active && tick_reached(now, t.expiry))
                .map(|(id, t)| (id, t.expiry))
                .reduce(|a, b| if tick_before(b.1, a.1) { b } else { a });
            let Some((id, _)) = due else {
                break;
            };
            let Some(timer) = self.tmr.timers.get_mut(id) else {
                break;
            };

            let _ = fired.items.push(Fired {
                timer: TimerHandle(id),
                at: timer.expiry,
                callback: timer.callback,
                arg: timer.arg,
            });
            crate::trace!("timer fired: {} at {}", timer.name, timer.expiry);

            if timer.auto_reload {
                timer.expiry = timer.expiry.wrapping_add(timer.period);
            } else {
                timer.active = false;
            }
        }

        // Popping commands may have released blocked senders
        self.sched();
        Ok(())
    }

    /// Block the service until a command arrives or the next timer is due
    ///
    /// Returns `Done` at once when a timer is already due. A command found
    /// in the queue is applied on the spot.
    pub fn timer_service_wait(&mut self) -> OsResult<Pend<()>> {
        let q = self.tmr.cmd_queue.ok_or(OsError::ObjInvalid)?;
        let now = self.tick;

        let timeout = match self.tmr.next_expiry() {
            Some(at) if tick_reached(now, at) => return Ok(Pend::Done(())),
            Some(at) => at.wrapping_sub(now),
            None => WAIT_FOREVER,
        };

        let mut buf = [0u8; CMD_SIZE];
        let pend = self.queue_receive(q, &mut buf, timeout)?;
        if !pend.is_blocked() {
            if let Some(msg) = TmrMsg::decode(&buf) {
                self.timer_apply(msg);
            }
        }
        Ok(pend)
    }

    // ============ Queries ============

    fn timer(&self, t: TimerHandle) -> OsResult<&OsTimer> {
        self.tmr.timers.get(t.0).ok_or(OsError::ObjInvalid)
    }

    pub fn timer_is_active(&self, t: TimerHandle) -> OsResult<bool> {
        self.timer(t).map(|timer| timer.active)
    }

    pub fn timer_period(&self, t: TimerHandle) -> OsResult<OsTick> {
        self.timer(t).map(|timer| timer.period)
    }

    /// Tick of the next expiry, `None` while dormant
    pub fn timer_expiry_time(&self, t: TimerHandle) -> OsResult<Option<OsTick>> {
        self.timer(t)
            .map(|timer| timer.active.then_some(timer.expiry))
    }

    pub fn timer_name(&self, t: TimerHandle) -> OsResult<&'static str> {
        self.timer(t).map(|timer| timer.name)
    }

    /// The service task, once the first timer exists
    pub fn timer_service_task(&self) -> Option<TaskHandle> {
        self.tmr.task.and_then(|idx| self.task_handle(idx))
    }
}

// ============ Service task ============

struct TimerServiceTask;

impl Runnable<usize> for TimerServiceTask {
    fn run(&self, _: usize) {
        let mut fired = FiredTimers::new();
        loop {
            fired.clear();
            if let Err(_e) = with_kernel(|k| k.timer_service_collect(&mut fired)) {
                crate::error!("timer service: {}", _e);
            }
            fired.run();

            // A timeout only means the next timer is due
            let _ = pend_on(|k| k.timer_service_wait(), |k, task| k.pend_result(task));
        }
    }
}

static TIMER_SERVICE: TimerServiceTask = TimerServiceTask;

// ============ Safe Wrapper ============

/// Software timer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    handle: TimerHandle,
}

impl Timer {
    /// Create a dormant timer
    ///
    /// # Example
    /// ```ignore
    /// fn on_timer(_: usize) { /* ... */ }
    /// static ON_TIMER: fn(usize) = on_timer;
    ///
    /// let timer = Timer::create("tmr", 500, true, &ON_TIMER, 0)?;
    /// timer.start(WAIT_FOREVER)?;
    /// ```
    pub fn create(
        name: &'static str,
        period: OsTick,
        auto_reload: bool,
        callback: &'static dyn Runnable<usize>,
        arg: usize,
    ) -> OsResult<Self> {
        with_kernel(|k| k.timer_create(name, period, auto_reload, callback, arg))
            .map(Self::from_handle)
    }

    pub const fn from_handle(handle: TimerHandle) -> Self {
        Timer { handle }
    }

    #[inline]
    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    pub fn start(&self, timeout: OsTick) -> OsResult<()> {
        pend_on(
            |k| k.timer_start(self.handle, timeout),
            |k, task| k.pend_result(task),
        )
    }

    /// Start without blocking, usable from interrupt handlers
    pub fn start_from_isr(&self) -> OsResult<()> {
        with_kernel(|k| k.timer_start(self.handle, NO_WAIT)).map(|_| ())
    }

    pub fn stop(&self, timeout: OsTick) -> OsResult<()> {
        pend_on(
            |k| k.timer_stop(self.handle, timeout),
            |k, task| k.pend_result(task),
        )
    }

    pub fn change_period(&self, period: OsTick, timeout: OsTick) -> OsResult<()> {
        pend_on(
            |k| k.timer_change_period(self.handle, period, timeout),
            |k, task| k.pend_result(task),
        )
    }

    pub fn delete(self, timeout: OsTick) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        pend_on(
            |k| k.timer_delete(self.handle, timeout),
            |k, task| k.pend_result(task),
        )
    }

    pub fn is_active(&self) -> OsResult<bool> {
        with_kernel(|k| k.timer_is_active(self.handle))
    }

    pub fn period(&self) -> OsResult<OsTick> {
        with_kernel(|k| k.timer_period(self.handle))
    }

    pub fn expiry_time(&self) -> OsResult<Option<OsTick>> {
        with_kernel(|k| k.timer_expiry_time(self.handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Id;

    #[test]
    fn test_command_encoding() {
        let msg = TmrMsg {
            cmd: TmrCmd::ChangePeriod(250),
            timer: TimerHandle(Id::from_raw(0x0003_0002)),
            at: 0xFFFF_FFF0,
        };
        let buf = msg.encode();
        assert_eq!(buf[0], 3);
        assert_eq!(TmrMsg::decode(&buf), Some(msg));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(TmrMsg::decode(&[0u8; CMD_SIZE]), None);
        assert_eq!(TmrMsg::decode(&[1u8; 4]), None);
    }

    fn nop(_: usize) {}
    static NOP: fn(usize) = nop;

    #[test]
    fn test_service_skips_unknown_command() {
        let mut k = Kernel::new();
        k.init().unwrap();
        let app = k.task_create("app", &NOP, 0, 1, 128).unwrap();
        k.start().unwrap();

        let t = k.timer_create("t", 5, false, &NOP, 0).unwrap();
        let mut fired = FiredTimers::new();
        k.timer_service_collect(&mut fired).unwrap();
        assert!(k.timer_service_wait().unwrap().is_blocked());
        assert_eq!(k.current(), Some(app));

        // The start reaches the waiting service, the junk stays queued
        let q = k.tmr.cmd_queue.unwrap();
        k.sched_lock().unwrap();
        k.timer_start(t, NO_WAIT).unwrap();
        k.queue_send(q, &[0xFF; CMD_SIZE], NO_WAIT).unwrap();
        k.sched_unlock().unwrap();
        assert_eq!(k.current(), k.timer_service_task());

        assert_eq!(k.timer_service_collect(&mut fired), Ok(()));
        assert!(fired.is_empty());
        assert_eq!(k.timer_is_active(t), Ok(true));
        assert_eq!(k.queue_len(q), Ok(0));
    }
}
