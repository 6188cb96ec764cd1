//! Passing references through a queue instead of copying the data
//!
//! Items are `&'static str` pointing into a table of messages, so only the
//! reference travels through the queue.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;
use kestrel::queue::Queue;
use kestrel::time::os_time_dly_hmsm;
use kestrel::types::{QueueHandle, WAIT_FOREVER};
use kestrel::{os_init, os_start, os_task_create};

static MESSAGES: [&str; 3] = ["first message", "second message", "third message"];

static QUEUE: AtomicU32 = AtomicU32::new(0);

fn queue() -> Queue<&'static str> {
    Queue::from_handle(QueueHandle::from_raw(QUEUE.load(Ordering::Acquire)))
}

fn sender_task(_: usize) {
    let q = queue();
    for text in MESSAGES.iter().cycle() {
        let _ = q.send(text, WAIT_FOREVER);
        let _ = os_time_dly_hmsm(0, 0, 0, 400);
    }
}
static SENDER: fn(usize) = sender_task;

fn receiver_task(_: usize) {
    let q = queue();
    loop {
        if let Ok(text) = q.receive(WAIT_FOREVER) {
            info!("got {=str} at {=u32:#x}", text, text.as_ptr() as u32);
        }
    }
}
static RECEIVER: fn(usize) = receiver_task;

#[entry]
fn main() -> ! {
    os_init().expect("OS init failed");

    let q: Queue<&'static str> = Queue::create("Refs", 2).expect("queue");
    QUEUE.store(q.handle().into_raw(), Ordering::Release);

    os_task_create("Send", &SENDER, 0, 1, 256).expect("sender");
    os_task_create("Recv", &RECEIVER, 0, 2, 256).expect("receiver");

    os_start().expect("OS start failed");
    loop { cortex_m::asm::nop(); }
}
