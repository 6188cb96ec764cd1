//! Two setter tasks and a waiter on one event group
//!
//! The waiter takes whichever bit arrives first and clears it on the way
//! out, then waits once for both bits together. A one-shot starter task
//! creates the setters and deletes itself.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::{info, warn};
use kestrel::event_group::EventGroup;
use kestrel::task::os_task_del;
use kestrel::time::{ms_to_ticks, os_time_dly};
use kestrel::types::{EventGroupHandle, WAIT_FOREVER};
use kestrel::{os_init, os_start, os_task_create};

const BIT_0: u32 = 1 << 0;
const BIT_1: u32 = 1 << 1;

static GROUP: AtomicU32 = AtomicU32::new(0);

fn group() -> EventGroup {
    EventGroup::from_handle(EventGroupHandle::from_raw(GROUP.load(Ordering::Acquire)))
}

fn setter_task(arg: usize) {
    let bit = 1u32 << arg;
    loop {
        let _ = os_time_dly(300 * (arg as u32 + 1));
        info!("setting bit {}", arg);
        let _ = group().set(bit);
    }
}
static SETTER: fn(usize) = setter_task;

fn waiter_task(_: usize) {
    let g = group();
    loop {
        match g.wait(BIT_0 | BIT_1, false, true, ms_to_ticks(1000)) {
            Ok(bits) => info!("woken by {=u32:#b}", bits),
            Err(_) => warn!("no bit within a second"),
        }
        if let Ok(bits) = g.wait(BIT_0 | BIT_1, true, true, WAIT_FOREVER) {
            info!("both bits set ({=u32:#b})", bits);
        }
    }
}
static WAITER: fn(usize) = waiter_task;

fn starter_task(_: usize) {
    let _ = os_task_create("Set0", &SETTER, 0, 2, 256);
    let _ = os_task_create("Set1", &SETTER, 1, 2, 256);
    info!("setters created, starter leaving");
    let _ = os_task_del(None);
}
static STARTER: fn(usize) = starter_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    let g = EventGroup::create("Events").expect("event group");
    GROUP.store(g.handle().into_raw(), Ordering::Release);

    os_task_create("Wait", &WAITER, 0, 3, 256).expect("waiter");
    os_task_create("Start", &STARTER, 0, 4, 256).expect("starter");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
