//! Two tasks sharing the semihosting console under a mutex
//!
//! Without the mutex the lower priority task can be preempted part way
//! through a line and the output interleaves.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use cortex_m_semihosting::hprintln;
use kestrel::mutex::Mutex;
use kestrel::time::os_time_dly;
use kestrel::types::{MutexHandle, WAIT_FOREVER};
use kestrel::{os_init, os_start, os_task_create};

static CONSOLE: AtomicU32 = AtomicU32::new(0);

static LINES: [&str; 2] = [
    "Task 1 ****************************************",
    "Task 2 ----------------------------------------",
];

fn print_guarded(text: &str) {
    let console = Mutex::from_handle(MutexHandle::from_raw(CONSOLE.load(Ordering::Acquire)));
    let _ = console.with_lock(WAIT_FOREVER, || hprintln!("{}", text));
}

fn print_task(arg: usize) {
    // Cheap pseudo-random delay so the two tasks collide now and then
    let mut seed = 0x2545_f491u32 ^ arg as u32;
    loop {
        print_guarded(LINES[arg]);
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let _ = os_time_dly(seed % 500 + 1);
    }
}
static PRINT: fn(usize) = print_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    let console = Mutex::create("Console").expect("mutex");
    CONSOLE.store(console.handle().into_raw(), Ordering::Release);

    os_task_create("Print1", &PRINT, 0, 1, 512).expect("print 1");
    os_task_create("Print2", &PRINT, 1, 2, 512).expect("print 2");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
