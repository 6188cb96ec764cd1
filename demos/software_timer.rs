//! Auto-reload software timer
//!
//! The callback runs on the timer service task and only takes a tick
//! snapshot; a lower priority task prints it.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;
use kestrel::time::{ms_to_ticks, os_time_dly_hmsm, os_time_get};
use kestrel::timer::Timer;
use kestrel::types::NO_WAIT;
use kestrel::{os_init, os_start, os_task_create};

static TIME_NOW: AtomicU32 = AtomicU32::new(0);

fn on_timer(_: usize) {
    TIME_NOW.store(os_time_get(), Ordering::Relaxed);
}
static ON_TIMER: fn(usize) = on_timer;

fn print_task(_: usize) {
    loop {
        info!("Ticks = {}", TIME_NOW.load(Ordering::Relaxed));
        let _ = os_time_dly_hmsm(0, 0, 1, 0);
    }
}
static PRINT: fn(usize) = print_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    let timer = Timer::create("RPTTMR", ms_to_ticks(1000), true, &ON_TIMER, 0)
        .expect("timer create");

    // Below the timer service priority
    os_task_create("Print", &PRINT, 0, 1, 256).expect("print task");

    // Queued until the service task first runs
    timer.start(NO_WAIT).expect("timer start");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
