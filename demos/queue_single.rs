//! One producer and one blocking consumer on a small queue
//!
//! The consumer waits for each item with a timeout and reports how full
//! the queue was when the item arrived.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::{info, warn};
use kestrel::queue::Queue;
use kestrel::time::{ms_to_ticks, os_time_dly};
use kestrel::types::{QueueHandle, NO_WAIT};
use kestrel::{os_init, os_start, os_task_create};

static QUEUE: AtomicU32 = AtomicU32::new(0);

fn queue() -> Queue<u32> {
    Queue::from_handle(QueueHandle::from_raw(QUEUE.load(Ordering::Acquire)))
}

fn producer_task(_: usize) {
    let q = queue();
    let mut value = 0u32;
    loop {
        // Bursts of three, then a pause
        for _ in 0..3 {
            if q.send(&value, NO_WAIT).is_err() {
                warn!("queue full, dropped {}", value);
            }
            value = value.wrapping_add(1);
        }
        info!("free slots after burst: {}", q.free_slots().unwrap_or(0));
        let _ = os_time_dly(ms_to_ticks(500));
    }
}
static PRODUCER: fn(usize) = producer_task;

fn consumer_task(_: usize) {
    let q = queue();
    loop {
        match q.receive(ms_to_ticks(200)) {
            Ok(value) => info!("received {} ({} left)", value, q.len().unwrap_or(0)),
            Err(_) => info!("nothing within 200 ms"),
        }
        let _ = os_time_dly(ms_to_ticks(50));
    }
}
static CONSUMER: fn(usize) = consumer_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    let q: Queue<u32> = Queue::create("Values", 4).expect("queue");
    QUEUE.store(q.handle().into_raw(), Ordering::Release);

    os_task_create("Prod", &PRODUCER, 0, 2, 256).expect("producer");
    os_task_create("Cons", &CONSUMER, 0, 1, 256).expect("consumer");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
