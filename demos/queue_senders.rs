//! Two equal-priority senders and a low-priority receiver on one queue
//!
//! Both senders outrank the receiver, so the queue fills up before the
//! receiver runs; it then drains the items in the order they were sent.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::{info, warn};
use kestrel::queue::Queue;
use kestrel::time::{ms_to_ticks, os_time_dly_hmsm};
use kestrel::types::{QueueHandle, NO_WAIT};
use kestrel::{os_init, os_start, os_task_create};

#[derive(Clone, Copy)]
#[repr(C)]
struct Sample {
    sender: u32,
    data: u32,
}

static SAMPLES: [Sample; 2] = [
    Sample { sender: 1, data: 20000 },
    Sample { sender: 2, data: 41415 },
];

static QUEUE: AtomicU32 = AtomicU32::new(0);

fn queue() -> Queue<Sample> {
    Queue::from_handle(QueueHandle::from_raw(QUEUE.load(Ordering::Acquire)))
}

fn sender_task(idx: usize) {
    let q = queue();
    // Sender 1 waits up to 100 ms for room, sender 2 up to 200 ms
    let wait = ms_to_ticks(100 * (idx as u32 + 1));
    info!("queue sender {} task", idx + 1);
    loop {
        if q.send(&SAMPLES[idx], wait).is_err() {
            warn!("sender {} could not send", idx + 1);
        }
        let _ = os_time_dly_hmsm(0, 0, 1, 0);
    }
}
static SENDER: fn(usize) = sender_task;

fn receiver_task(_: usize) {
    let q = queue();
    info!("queue receiver task");
    loop {
        if q.len().unwrap_or(0) == 0 {
            continue;
        }
        if let Ok(sample) = q.receive(NO_WAIT) {
            info!("sender {} data = {}", sample.sender, sample.data);
        }
    }
}
static RECEIVER: fn(usize) = receiver_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    let q: Queue<Sample> = Queue::create("Samples", 3).expect("queue");
    q.reset().expect("queue reset");
    QUEUE.store(q.handle().into_raw(), Ordering::Release);

    os_task_create("QS1", &SENDER, 0, 2, 256).expect("sender 1");
    os_task_create("QS2", &SENDER, 1, 2, 256).expect("sender 2");
    os_task_create("QR", &RECEIVER, 0, 1, 256).expect("receiver");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
