//! Idle hook counting spare cycles
//!
//! The hook sleeps the core until the next interrupt, so each count is
//! one wake-up with nothing to run.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;
use kestrel::time::os_time_dly_hmsm;
use kestrel::{os_idle_hook_set, os_init, os_start, os_task_create};

static IDLE_CYCLES: AtomicU32 = AtomicU32::new(0);

fn count_idle() {
    IDLE_CYCLES.fetch_add(1, Ordering::Relaxed);
    cortex_m::asm::wfi();
}

fn report_task(_: usize) {
    loop {
        let n = IDLE_CYCLES.swap(0, Ordering::Relaxed);
        info!("idle wake-ups in the last second: {}", n);
        let _ = os_time_dly_hmsm(0, 0, 1, 0);
    }
}
static REPORT: fn(usize) = report_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");
    os_idle_hook_set(Some(count_idle));

    os_task_create("Report", &REPORT, 0, 2, 256).expect("report task");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
