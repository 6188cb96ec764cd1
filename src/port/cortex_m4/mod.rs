//! Cortex-M4 port
//!
//! Tasks run on the process stack (PSP); exceptions and the kernel tick run
//! on a dedicated main stack. Every task switch happens in PendSV, pended
//! at the lowest exception priority so it only runs once no other handler
//! is active.
//!
//! A suspended task's stack holds, from low to high addresses, one padding
//! word, the callee-saved registers r4-r11 with its EXC_RETURN value, and
//! the frame the hardware stacked on exception entry.

#![allow(named_asm_labels)]

use core::arch::{asm, naked_asm};
use core::mem::size_of;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use crate::kernel::CPU_STATE;
use crate::task::os_task_trampoline;
use crate::types::OsStkElement;

/// Lowest exception priority on a 4-bit implementation
const KERNEL_EXCEPTION_PRIO: u8 = 0xF0;

/// Return to thread mode, process stack, no FPU frame
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Thumb bit
const XPSR_T: u32 = 1 << 24;

const MAIN_STACK_WORDS: usize = 512;

/// Main stack for handlers once the scheduler runs
#[no_mangle]
static mut MAIN_STACK: [u32; MAIN_STACK_WORDS] = [0xDEAD_BEEF; MAIN_STACK_WORDS];

/// Registers saved by software in PendSV
#[repr(C)]
struct SavedRegs {
    r4_r11: [u32; 8],
    exc_return: u32,
}

/// Registers stacked by the hardware on exception entry
#[repr(C)]
struct HwFrame {
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

/// Initial context of a task that has never run
#[repr(C)]
struct TaskFrame {
    saved: SavedRegs,
    hw: HwFrame,
}

/// Program SysTick to fire every `cnts` core clock cycles
pub fn os_cpu_systick_init(cnts: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(cnts - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Hand the CPU to the first task
///
/// Switches handlers to [`MAIN_STACK`] and pends PendSV with no current
/// task, so nothing is saved for the code that called `os_start`.
#[no_mangle]
pub unsafe extern "C" fn os_start_high_rdy() {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;
        scb.set_priority(SystemHandler::PendSV, KERNEL_EXCEPTION_PRIO);
        scb.set_priority(SystemHandler::SysTick, KERNEL_EXCEPTION_PRIO);

        let msp_top = (&raw const MAIN_STACK) as u32 + (MAIN_STACK_WORDS * size_of::<u32>()) as u32;
        asm!("msr msp, {0}", in(reg) msp_top);
        asm!("msr psp, {0}", in(reg) 0);

        (*(&raw mut CPU_STATE)).tcb_cur = core::ptr::null_mut();

        cortex_m::interrupt::enable();
        cortex_m::peripheral::SCB::set_pendsv();
    }
}

/// Request a context switch
///
/// Called with interrupts masked; PendSV runs once the kernel critical
/// section ends, from task or interrupt level alike.
#[inline(always)]
pub fn os_ctx_sw() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Build the initial frame of a task at the top of its stack
///
/// The first exception return lands in the task trampoline with the TCB
/// slot in r0. The returned pointer is one word below the frame, the same
/// place PendSV leaves the pointer of a task it switched out.
pub unsafe fn os_task_stk_init(
    stk_base: *mut OsStkElement,
    stk_size: usize,
    slot: usize,
) -> *mut OsStkElement {
    unsafe {
        // The hardware frame ends on the 8-byte aligned top
        let top = ((stk_base.add(stk_size) as usize) & !7) as *mut OsStkElement;
        let frame = top.sub(size_of::<TaskFrame>() / size_of::<OsStkElement>()) as *mut TaskFrame;

        frame.write(TaskFrame {
            saved: SavedRegs {
                r4_r11: [0; 8],
                exc_return: EXC_RETURN_THREAD_PSP,
            },
            hw: HwFrame {
                r0: slot as u32,
                r1: 0,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: os_task_return as *const () as u32,
                pc: (os_task_trampoline as usize as u32) | 1,
                xpsr: XPSR_T,
            },
        });

        (frame as *mut OsStkElement).sub(1)
    }
}

/// Store the outgoing task's stack pointer and return the incoming one
///
/// Null in means there is no outgoing context to keep; null out means
/// there is nothing to restore.
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    unsafe {
        let cpu = &mut *(&raw mut CPU_STATE);

        // A self-deleted task keeps its TCB until the idle task frees it
        if !cpu.tcb_cur.is_null() {
            (*cpu.tcb_cur).stk_ptr = cur_sp;
        }

        cpu.tcb_cur = cpu.tcb_high_rdy;
        match cpu.tcb_cur.as_ref() {
            Some(tcb) => tcb.stk_ptr,
            None => core::ptr::null_mut(),
        }
    }
}

/// PendSV exception handler
///
/// Saves r4-r11 and EXC_RETURN on the outgoing process stack unless no
/// task is current, swaps TCBs and unstacks the incoming task.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",

        "mrs r0, psp",

        // First switch: nothing to save
        "ldr r1, ={cpu_state}",
        "ldr r1, [r1]",
        "cbz r1, 1f",

        "stmdb r0!, {{r4-r11, lr}}",
        "sub r0, r0, #4",

        "1:",
        "bl pendsv_switch_context",

        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",

        "2:",
        "cpsie i",
        "dsb",
        "isb",
        "bx lr",

        cpu_state = sym CPU_STATE,
    );
}

/// Catches a return from the trampoline, which never happens
#[no_mangle]
fn os_task_return() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
