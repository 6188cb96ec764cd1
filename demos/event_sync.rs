//! Three tasks meeting at a rendezvous point
//!
//! Each task sets its own bit and waits for all three. None leaves the
//! rendezvous until the last one arrives.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;
use kestrel::event_group::EventGroup;
use kestrel::time::{os_time_dly, os_time_get};
use kestrel::types::{EventGroupHandle, WAIT_FOREVER};
use kestrel::{os_init, os_start, os_task_create};

const ALL_SYNC_BITS: u32 = 0b111;

static GROUP: AtomicU32 = AtomicU32::new(0);

fn sync_task(arg: usize) {
    let group = EventGroup::from_handle(EventGroupHandle::from_raw(GROUP.load(Ordering::Acquire)));
    let own = 1u32 << arg;
    loop {
        // Stagger the arrivals
        let _ = os_time_dly(200 * (arg as u32 + 1));
        info!("task {} reached the sync point at {}", arg, os_time_get());

        if let Ok(bits) = group.sync(own, ALL_SYNC_BITS, WAIT_FOREVER) {
            info!("task {} left the sync point (bits {=u32:#b})", arg, bits);
        }
    }
}
static SYNC: fn(usize) = sync_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    let group = EventGroup::create("Rendezvous").expect("event group");
    GROUP.store(group.handle().into_raw(), Ordering::Release);

    os_task_create("Sync0", &SYNC, 0, 1, 256).expect("sync 0");
    os_task_create("Sync1", &SYNC, 1, 1, 256).expect("sync 1");
    os_task_create("Sync2", &SYNC, 2, 1, 256).expect("sync 2");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
