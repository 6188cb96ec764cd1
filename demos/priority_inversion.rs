//! Priority Inversion Demo - mutex priority inheritance
//!
//! Three tasks: High(15), Med(10), Low(5)
//! Low holds mutex -> High waits -> Low runs at prio 15 until it unlocks,
//! so Med cannot starve High through Low.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;
use kestrel::kernel::with_kernel;
use kestrel::mutex::Mutex;
use kestrel::time::os_time_dly;
use kestrel::types::{MutexHandle, WAIT_FOREVER};
use kestrel::{os_init, os_start, os_task_create};

static HIGH_RUNS: AtomicU32 = AtomicU32::new(0);
static LOW_RUNS: AtomicU32 = AtomicU32::new(0);

static MTX: AtomicU32 = AtomicU32::new(0);

fn mtx() -> Mutex {
    Mutex::from_handle(MutexHandle::from_raw(MTX.load(Ordering::Acquire)))
}

fn current_prio() -> u8 {
    with_kernel(|k| k.current().and_then(|t| k.task_priority(t).ok())).unwrap_or(0)
}

/// High priority task (prio=15)
fn high_task_fn(_: usize) {
    let _ = os_time_dly(50);

    loop {
        let n = HIGH_RUNS.fetch_add(1, Ordering::Relaxed) + 1;

        let _ = mtx().with_lock(WAIT_FOREVER, || {
            info!("[HIGH] acquired #{}", n);
            for _ in 0..1_000 { cortex_m::asm::nop(); }
        });

        let _ = os_time_dly(100);
    }
}
static HIGH: fn(usize) = high_task_fn;

/// Medium priority task (prio=10) - CPU bound
fn med_task_fn(_: usize) {
    loop {
        for _ in 0..50_000 { cortex_m::asm::nop(); }
        let _ = os_time_dly(10);
    }
}
static MED: fn(usize) = med_task_fn;

/// Low priority task (prio=5) - holds mutex long
fn low_task_fn(_: usize) {
    loop {
        let n = LOW_RUNS.fetch_add(1, Ordering::Relaxed) + 1;

        if let Ok(guard) = mtx().lock_guard(WAIT_FOREVER) {
            info!("[LOW] holding #{} at prio {}", n, current_prio());
            for _ in 0..100_000 { cortex_m::asm::nop(); }
            info!("[LOW] releasing at prio {}", current_prio());
            drop(guard);
        }

        let _ = os_time_dly(200);
    }
}
static LOW: fn(usize) = low_task_fn;

#[entry]
fn main() -> ! {
    info!("Priority Inversion Demo: H(15) M(10) L(5)");

    os_init().expect("OS init failed");
    let m = Mutex::create("Mtx").expect("mutex");
    MTX.store(m.handle().into_raw(), Ordering::Release);

    os_task_create("L", &LOW, 0, 5, 256).expect("low task");
    os_task_create("M", &MED, 0, 10, 256).expect("med task");
    os_task_create("H", &HIGH, 0, 15, 256).expect("high task");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
