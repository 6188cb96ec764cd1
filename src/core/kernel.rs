//! Global kernel state and initialization
//!
//! All scheduler and IPC state lives in one [`Kernel`] value. The kernel
//! is a plain state machine: each operation runs to completion, acting on
//! behalf of the running task, and records the task switch it wants in
//! `ctx_sw_pending`. The global instance sits in a [`CsCell`] and is only
//! reached through [`with_kernel`], which forwards that request to the port
//! before interrupts are re-enabled.

use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::{
    CFG_CPU_CLOCK_HZ, CFG_IDLE_STK_SIZE, CFG_PRIO_IDLE, CFG_STK_POOL_WORDS, CFG_TASK_MAX,
    CFG_TICK_RATE_HZ,
};
use crate::core::cs_cell::CsCell;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::pool::Pool;
use crate::sched::SchedState;
use crate::task::{OsTcb, Runnable, TaskTable};
use crate::time::DelayList;
use crate::types::{OsNestingCtr, OsStkElement, OsTick, Pend, TaskHandle};

#[cfg(any(feature = "queue", feature = "mutex", feature = "event-group"))]
use crate::arena::Slab;
#[cfg(feature = "queue")]
use crate::{
    config::{CFG_QUEUE_MAX, CFG_QUEUE_POOL_BYTES},
    sync::queue::OsQueue,
};
#[cfg(feature = "mutex")]
use crate::{config::CFG_MUTEX_MAX, sync::mutex::OsMutex};
#[cfg(feature = "event-group")]
use crate::{config::CFG_FLAG_GRP_MAX, sync::event_group::OsFlagGrp};
#[cfg(feature = "timer")]
use crate::sync::timer::TimerService;

// ============ Kernel State Structures ============

/// Atomic kernel flags, readable without entering the kernel
pub struct KernelFlags {
    running: AtomicBool,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            tick_counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_tick(&self, tick: OsTick) {
        self.tick_counter.store(tick, Ordering::Relaxed);
    }
}

/// Global kernel flags instance
pub(crate) static FLAGS: KernelFlags = KernelFlags::new();

/// Scheduler and IPC state
pub struct Kernel {
    pub(crate) tasks: TaskTable,
    pub(crate) stacks: Pool<OsStkElement, CFG_STK_POOL_WORDS>,
    pub(crate) sched: SchedState,
    pub(crate) delayed: DelayList,

    /// Running task
    pub(crate) cur: Option<u16>,
    pub(crate) idle: Option<u16>,
    /// Self-deleted tasks waiting for the idle task
    pub(crate) terminated: Vec<u16, CFG_TASK_MAX>,

    pub(crate) running: bool,
    pub(crate) sched_lock: OsNestingCtr,
    pub(crate) ctx_sw_pending: bool,
    pub(crate) ctx_sw_ctr: u32,
    pub(crate) tick: OsTick,
    pub(crate) idle_hook: Option<fn()>,

    #[cfg(feature = "queue")]
    pub(crate) queues: Slab<OsQueue, CFG_QUEUE_MAX>,
    #[cfg(feature = "queue")]
    pub(crate) queue_mem: Pool<u8, CFG_QUEUE_POOL_BYTES>,
    #[cfg(feature = "mutex")]
    pub(crate) mutexes: Slab<OsMutex, CFG_MUTEX_MAX>,
    #[cfg(feature = "event-group")]
    pub(crate) flag_grps: Slab<OsFlagGrp, CFG_FLAG_GRP_MAX>,
    #[cfg(feature = "timer")]
    pub(crate) tmr: TimerService,
}

impl Kernel {
    pub const fn new() -> Self {
        Kernel {
            tasks: TaskTable::new(),
            stacks: Pool::new(0),
            sched: SchedState::new(),
            delayed: DelayList::new(),
            cur: None,
            idle: None,
            terminated: Vec::new(),
            running: false,
            sched_lock: 0,
            ctx_sw_pending: false,
            ctx_sw_ctr: 0,
            tick: 0,
            idle_hook: None,
            #[cfg(feature = "queue")]
            queues: Slab::new(),
            #[cfg(feature = "queue")]
            queue_mem: Pool::new(0),
            #[cfg(feature = "mutex")]
            mutexes: Slab::new(),
            #[cfg(feature = "event-group")]
            flag_grps: Slab::new(),
            #[cfg(feature = "timer")]
            tmr: TimerService::new(),
        }
    }

    /// Reset every table in place and create the idle task.
    ///
    /// Handles issued before the reset become stale.
    pub fn init(&mut self) -> OsResult<()> {
        self.tasks.clear();
        self.stacks.reset();
        self.sched.reset();
        self.delayed.init();
        self.cur = None;
        self.idle = None;
        self.terminated.clear();
        self.running = false;
        self.sched_lock = 0;
        self.ctx_sw_pending = false;
        self.ctx_sw_ctr = 0;
        self.tick = 0;
        self.idle_hook = None;

        #[cfg(feature = "queue")]
        {
            self.queues.clear();
            self.queue_mem.reset();
        }
        #[cfg(feature = "mutex")]
        self.mutexes.clear();
        #[cfg(feature = "event-group")]
        self.flag_grps.clear();
        #[cfg(feature = "timer")]
        self.tmr.reset();

        let idle = self.task_create_internal(
            "Idle",
            &IDLE_TASK,
            0,
            CFG_PRIO_IDLE,
            CFG_IDLE_STK_SIZE,
        )?;
        self.idle = Some(idle.0.index() as u16);
        Ok(())
    }

    /// Start multitasking by switching to the highest priority ready task
    ///
    /// # Returns
    /// * `Err(OsError::OsNotInit)` - [`Kernel::init`] was not called
    /// * `Err(OsError::OsRunning)` - Already started
    /// * `Err(OsError::OsNoAppTask)` - Only the idle task exists
    pub fn start(&mut self) -> OsResult<()> {
        if self.running {
            return Err(OsError::OsRunning);
        }
        let Some(idle) = self.idle else {
            return Err(OsError::OsNotInit);
        };
        if !self.tasks.iter().any(|(id, _)| id.index() as u16 != idle) {
            return Err(OsError::OsNoAppTask);
        }

        self.running = true;
        self.sched();
        crate::info!("kernel started, {} tasks", self.tasks.len());
        Ok(())
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// One pass of the idle task: reclaim self-deleted tasks and hand back
    /// the idle hook to call outside the kernel
    pub fn idle_cycle(&mut self) -> Option<fn()> {
        while let Some(idx) = self.terminated.pop() {
            self.task_free(idx);
        }
        self.idle_hook
    }

    pub fn set_idle_hook(&mut self, hook: Option<fn()>) {
        self.idle_hook = hook;
    }

    /// Number of task switches since start
    #[inline]
    pub fn context_switches(&self) -> u32 {
        self.ctx_sw_ctr
    }

    /// Outcome of the last wait of `task`.
    ///
    /// `PendWouldBlock` while the task is still waiting.
    pub fn pend_result(&self, task: TaskHandle) -> OsResult<()> {
        self.tasks
            .get(task.0)
            .ok_or(OsError::ObjInvalid)?
            .pend_status
            .into_result()
    }

    /// Pointer to the running TCB, for the port
    fn cur_tcb_ptr(&mut self) -> *mut OsTcb {
        match self.cur {
            Some(idx) => self.tasks.at_mut(idx) as *mut OsTcb,
            None => core::ptr::null_mut(),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

/// The global kernel instance
pub(crate) static KERNEL: CsCell<Kernel> = CsCell::new(Kernel::new());

/// Run `f` on the global kernel inside a critical section.
///
/// A switch requested by `f` is handed to the port before the section
/// ends, so it takes effect as soon as interrupts are enabled again.
/// Calls must not nest.
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    critical_section(|cs| {
        let k = KERNEL.get(cs);
        let ret = f(k);
        if k.ctx_sw_pending {
            k.ctx_sw_pending = false;
            publish_high_rdy(k);
            crate::port::os_ctx_sw();
        }
        ret
    })
}

/// Run a kernel call that may block the calling task.
///
/// `finish` collects the outcome from the TCB once the task is resumed.
/// On the host port the switch never happens and a blocked call reports
/// `PendWouldBlock`.
pub(crate) fn pend_on<T>(
    op: impl FnOnce(&mut Kernel) -> OsResult<Pend<T>>,
    finish: impl FnOnce(&mut Kernel, TaskHandle) -> OsResult<T>,
) -> OsResult<T> {
    if is_isr_context() {
        return Err(OsError::PendIsr);
    }

    let (task, pend) = with_kernel(|k| (k.current(), op(k)));
    match pend? {
        Pend::Done(v) => Ok(v),
        Pend::Blocked => {
            let task = task.ok_or(OsError::OsNotRunning)?;
            with_kernel(|k| finish(k, task))
        }
    }
}

// ============ CPU/Context Switch State ============

/// CPU context switch state
#[repr(C)]
pub struct CpuState {
    /// Current running task's TCB pointer
    pub tcb_cur: *mut OsTcb,
    /// TCB the next PendSV switches to
    pub tcb_high_rdy: *mut OsTcb,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_high_rdy: core::ptr::null_mut(),
        }
    }

    pub fn reset(&mut self) {
        self.tcb_cur = core::ptr::null_mut();
        self.tcb_high_rdy = core::ptr::null_mut();
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

fn publish_high_rdy(k: &mut Kernel) {
    let tcb = k.cur_tcb_ptr();
    unsafe { (*(&raw mut CPU_STATE)).tcb_high_rdy = tcb };
}

// ============ Idle task ============

struct IdleTask;

impl Runnable<usize> for IdleTask {
    fn run(&self, _: usize) {
        loop {
            if let Some(hook) = with_kernel(|k| k.idle_cycle()) {
                hook();
            }
        }
    }
}

static IDLE_TASK: IdleTask = IdleTask;

// ============ Public API ============

/// Initialize the RTOS kernel
///
/// This must be called before any other OS function. Any previous state
/// (tasks, objects, handles) is discarded. The idle task is created
/// automatically.
pub fn os_init() -> OsResult<()> {
    FLAGS.reset();
    unsafe { (*(&raw mut CPU_STATE)).reset() };
    with_kernel(|k| k.init())
}

/// Start multitasking
///
/// This function starts the highest priority ready task. It does not
/// return on the target. Before calling this, at least one application
/// task must be created.
///
/// # Returns
/// * `Err(OsError::OsNotInit)` - OS not initialized
/// * `Err(OsError::OsRunning)` - OS is already running
/// * `Err(OsError::OsNoAppTask)` - No application task created
pub fn os_start() -> OsResult<()> {
    if FLAGS.is_running() {
        return Err(OsError::OsRunning);
    }

    // The first switch is performed by the port, not by a pended PendSV
    critical_section(|cs| {
        let k = KERNEL.get(cs);
        k.start()?;
        k.ctx_sw_pending = false;
        publish_high_rdy(k);
        Ok(())
    })?;

    FLAGS.set_running(true);

    crate::port::os_cpu_systick_init(CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ);

    unsafe { crate::port::os_start_high_rdy() };

    Ok(())
}

/// Install the function the idle task calls on every pass
///
/// The hook runs in task context with interrupts enabled. It may put the
/// core to sleep with `wfi`; the next tick or interrupt wakes it.
pub fn os_idle_hook_set(hook: Option<fn()>) {
    with_kernel(|k| k.set_idle_hook(hook));
}
