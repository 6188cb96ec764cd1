//! One task body, two instances told apart by their argument

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt::info;
use kestrel::time::os_time_dly;
use kestrel::{os_init, os_start, os_task_create};

static MESSAGES: [&str; 2] = ["Task 1 is running", "Task 2 is running"];

fn print_task(arg: usize) {
    let text = MESSAGES[arg];
    loop {
        info!("{=str}", text);
        // Busy part
        for _ in 0..100_000 { cortex_m::asm::nop(); }
        let _ = os_time_dly(250);
    }
}
static PRINT: fn(usize) = print_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    // Equal priorities share the CPU in time slices
    os_task_create("Task 1", &PRINT, 0, 1, 256).expect("task 1");
    os_task_create("Task 2", &PRINT, 1, 1, 256).expect("task 2");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
