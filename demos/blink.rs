//! Blink Example - LED blinking using RTOS on STM32F401

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use kestrel::pac;
use kestrel::time::os_time_dly_hmsm;
use kestrel::{os_init, os_start, os_task_create};

// ============ LED Control ============

fn led_init() {
    pac::RCC.ahb1enr().modify(|w| w.set_gpioaen(true));
    pac::GPIOA.moder().modify(|w| w.set_moder(5, pac::gpio::vals::Moder::OUTPUT));
    pac::GPIOA.otyper().modify(|w| w.set_ot(5, pac::gpio::vals::Ot::PUSHPULL));
}

fn led_on() { pac::GPIOA.bsrr().write(|w| w.set_bs(5, true)); }

fn led_off() { pac::GPIOA.bsrr().write(|w| w.set_br(5, true)); }

// ============ Tasks ============

fn blink_task(_: usize) {
    kestrel::info!("Blink task started");
    loop {
        led_on();
        kestrel::info!("LED ON");
        let _ = os_time_dly_hmsm(0, 0, 0, 500);

        led_off();
        kestrel::info!("LED OFF");
        let _ = os_time_dly_hmsm(0, 0, 0, 500);
    }
}
static BLINK: fn(usize) = blink_task;

fn heartbeat_task(_: usize) {
    loop {
        kestrel::info!("heartbeat");
        let _ = os_time_dly_hmsm(0, 0, 1, 0);
    }
}
static HEARTBEAT: fn(usize) = heartbeat_task;

// ============ Main ============

#[entry]
fn main() -> ! {
    led_init();

    os_init().expect("OS init failed");

    os_task_create("Blink", &BLINK, 0, 5, 256).expect("Blink task failed");
    os_task_create("Heartbeat", &HEARTBEAT, 0, 5, 256).expect("Heartbeat task failed");

    kestrel::info!("Starting RTOS");
    os_start().expect("OS start failed");

    loop { cortex_m::asm::nop(); }
}
