//! Global API tests
//!
//! These go through the global kernel instance the way application code
//! does, so they are serialized. On the host port a call that would block
//! leaves the task blocked and reports `PendWouldBlock`.

use serial_test::serial;

use kestrel::error::OsError;
use kestrel::event_group::EventGroup;
use kestrel::kernel::with_kernel;
use kestrel::mutex::Mutex;
use kestrel::queue::Queue;
use kestrel::sched::{os_sched_lock, os_sched_unlock, os_sched_yield};
use kestrel::task::{os_task_change_prio, os_task_del, os_task_resume, os_task_self, os_task_suspend};
use kestrel::time::{os_tick_handler, os_time_dly, os_time_dly_hmsm, os_time_get};
use kestrel::timer::{FiredTimers, Timer};
use kestrel::types::*;
use kestrel::{os_init, os_start, os_task_create};

fn nop(_: usize) {}
static NOP: fn(usize) = nop;

/// Fresh kernel with one running application task
fn boot(prio: OsPrio) -> TaskHandle {
    os_init().unwrap();
    let task = os_task_create("app", &NOP, 0, prio, 128).unwrap();
    os_start().unwrap();
    task
}

#[test]
#[serial]
fn test_start_sequence() {
    os_init().unwrap();
    assert_eq!(os_start(), Err(OsError::OsNoAppTask));

    let task = os_task_create("app", &NOP, 7, 3, 128).unwrap();
    assert_eq!(os_start(), Ok(()));
    assert_eq!(os_start(), Err(OsError::OsRunning));
    assert_eq!(os_task_self(), Some(task));
}

#[test]
#[serial]
fn test_reinit_invalidates_handles() {
    let old = boot(3);
    os_init().unwrap();
    assert_eq!(with_kernel(|k| k.task_state(old)), Err(OsError::ObjInvalid));
}

#[test]
#[serial]
fn test_tick_handler_advances_time() {
    boot(3);
    let start = os_time_get();
    for _ in 0..5 {
        os_tick_handler();
    }
    assert_eq!(os_time_get(), start + 5);
}

#[test]
#[serial]
fn test_delay_blocks_caller() {
    let app = boot(3);
    assert_eq!(os_time_dly(10), Err(OsError::PendWouldBlock));
    assert_ne!(os_task_self(), Some(app));

    for _ in 0..10 {
        os_tick_handler();
    }
    assert_eq!(os_task_self(), Some(app));
}

#[test]
#[serial]
fn test_delay_hmsm_validation() {
    boot(3);
    assert_eq!(os_time_dly_hmsm(0, 60, 0, 0), Err(OsError::TimeInvalidMinutes));
    assert_eq!(os_time_dly_hmsm(0, 0, 60, 0), Err(OsError::TimeInvalidSeconds));
    assert_eq!(os_time_dly_hmsm(0, 0, 0, 1000), Err(OsError::TimeInvalidMilliseconds));
}

#[test]
#[serial]
fn test_sched_lock_nesting() {
    boot(3);
    os_sched_lock().unwrap();
    os_sched_lock().unwrap();
    assert_eq!(with_kernel(|k| k.sched_lock_nesting()), 2);
    assert_eq!(os_time_dly(1), Err(OsError::SchedLocked));
    os_sched_unlock().unwrap();
    os_sched_unlock().unwrap();
    assert_eq!(os_sched_unlock(), Err(OsError::SchedNotLocked));
}

#[test]
#[serial]
fn test_change_prio_of_self() {
    let app = boot(3);
    os_task_change_prio(None, 9).unwrap();
    assert_eq!(with_kernel(|k| k.task_priority(app)), Ok(9));
}

#[test]
#[serial]
fn test_suspend_resume_and_yield() {
    let app = boot(3);
    let peer = os_task_create("peer", &NOP, 0, 3, 128).unwrap();

    os_task_suspend(Some(peer)).unwrap();
    os_task_suspend(Some(peer)).unwrap();
    os_task_resume(peer).unwrap();
    assert_eq!(with_kernel(|k| k.task_state(peer)), Ok(OsTaskState::Suspended));
    os_task_resume(peer).unwrap();
    assert_eq!(with_kernel(|k| k.task_state(peer)), Ok(OsTaskState::Ready));
    assert_eq!(os_task_resume(peer), Err(OsError::TaskNotSuspended));

    os_sched_yield().unwrap();
    assert_eq!(os_task_self(), Some(peer));
    assert_eq!(with_kernel(|k| k.task_name(app)), Ok("app"));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct Sample {
    id: u32,
    value: u32,
}

#[test]
#[serial]
fn test_queue_round_trip() {
    boot(3);
    let q: Queue<Sample> = Queue::create("samples", 4).unwrap();

    q.send(&Sample { id: 1, value: 10 }, NO_WAIT).unwrap();
    q.send_from_isr(&Sample { id: 2, value: 20 }).unwrap();
    assert_eq!(q.len(), Ok(2));
    assert_eq!(q.free_slots(), Ok(2));

    assert_eq!(q.receive(NO_WAIT), Ok(Sample { id: 1, value: 10 }));
    assert_eq!(q.receive(NO_WAIT), Ok(Sample { id: 2, value: 20 }));
    assert_eq!(q.receive(NO_WAIT), Err(OsError::Timeout));
    assert_eq!(q.is_empty(), Ok(true));
}

#[test]
#[serial]
fn test_queue_handle_travels_as_arg() {
    boot(3);
    let q: Queue<u16> = Queue::create("q", 2).unwrap();
    let raw = q.handle().into_raw() as usize;

    let copy: Queue<u16> = Queue::from_handle(QueueHandle::from_raw(raw as u32));
    copy.send(&0xBEEF, NO_WAIT).unwrap();
    assert_eq!(q.receive(NO_WAIT), Ok(0xBEEF));

    q.delete().unwrap();
    assert_eq!(copy.len(), Err(OsError::ObjInvalid));
}

#[test]
#[serial]
fn test_queue_odd_sized_items() {
    boot(3);
    let q: Queue<[u8; 3]> = Queue::create("bytes", 2).unwrap();
    q.send(&[1, 2, 3], NO_WAIT).unwrap();
    assert_eq!(q.receive(NO_WAIT), Ok([1, 2, 3]));

    // A wrapper whose item does not fit a message is refused
    let wide: Queue<[u8; 64]> = Queue::from_handle(q.handle());
    assert_eq!(wide.receive(NO_WAIT), Err(OsError::QItemSize));
}

#[test]
#[serial]
fn test_queue_carries_static_refs() {
    static GREETINGS: [&str; 2] = ["hello", "world"];

    boot(3);
    let q: Queue<&'static str> = Queue::create("refs", 2).unwrap();
    for g in GREETINGS.iter() {
        q.send(g, NO_WAIT).unwrap();
    }
    assert_eq!(q.free_slots(), Ok(0));

    let first = q.receive(NO_WAIT).unwrap();
    assert!(core::ptr::eq(first, GREETINGS[0]));
    assert_eq!(q.receive(NO_WAIT), Ok("world"));
}

#[test]
#[serial]
fn test_self_delete_through_api() {
    let app = boot(3);
    let next = os_task_create("next", &NOP, 0, 2, 128).unwrap();

    assert_eq!(os_task_del(None), Ok(()));
    assert_eq!(with_kernel(|k| k.current()), Some(next));
    assert_eq!(with_kernel(|k| k.task_state(app)), Ok(OsTaskState::Deleted));
}

#[test]
#[serial]
fn test_queue_blocking_receive() {
    let app = boot(3);
    let q: Queue<u8> = Queue::create("q", 1).unwrap();

    assert_eq!(q.receive(WAIT_FOREVER), Err(OsError::PendWouldBlock));
    assert_eq!(with_kernel(|k| k.task_state(app)), Ok(OsTaskState::Blocked));
}

#[test]
#[serial]
fn test_mutex_guard() {
    let app = boot(3);
    let m = Mutex::create("m").unwrap();

    {
        let _guard = m.lock_guard(WAIT_FOREVER).unwrap();
        assert_eq!(m.owner(), Ok(Some(app)));
    }
    assert!(!m.is_owned());

    assert_eq!(m.with_lock(WAIT_FOREVER, || 42), Ok(42));
    assert!(!m.is_owned());

    m.try_lock().unwrap();
    m.try_lock().unwrap();
    m.unlock().unwrap();
    assert!(m.is_owned());
    m.unlock().unwrap();
    assert_eq!(m.unlock(), Err(OsError::MutexNotOwner));
}

#[test]
#[serial]
fn test_event_group() {
    boot(3);
    let g = EventGroup::create("g").unwrap();

    assert_eq!(g.set(0b1010), Ok(0b1010));
    assert_eq!(g.wait_any(0b0010, NO_WAIT), Ok(0b1010));
    assert_eq!(g.wait_all(0b0110, NO_WAIT), Err(OsError::Timeout));
    assert_eq!(g.wait(0b1000, true, true, NO_WAIT), Ok(0b1010));
    assert_eq!(g.get(), Ok(0b0010));
    assert_eq!(g.clear(0b0010), Ok(0b0010));

    // Last party of one
    assert_eq!(g.sync(0b1, 0b1, WAIT_FOREVER), Ok(0b1));
    assert_eq!(g.get(), Ok(0));
}

#[test]
#[serial]
fn test_timer_wrapper() {
    let app = boot(3);
    let t = Timer::create("t", 100, true, &NOP, 0).unwrap();

    // The service task starts and preempts the creator
    let svc = with_kernel(|k| k.timer_service_task()).unwrap();
    assert_eq!(os_task_self(), Some(svc));
    assert_eq!(with_kernel(|k| k.task_state(app)), Ok(OsTaskState::Ready));

    assert_eq!(t.period(), Ok(100));
    assert_eq!(t.is_active(), Ok(false));
    assert_eq!(t.expiry_time(), Ok(None));
    assert_eq!(
        Timer::create("bad", 0, false, &NOP, 0).err(),
        Some(OsError::TmrInvalidPeriod)
    );
}

#[test]
#[serial]
fn test_timer_commands_reach_service() {
    let app = boot(3);
    let t = Timer::create("t", 50, false, &NOP, 0).unwrap();
    let svc = with_kernel(|k| k.timer_service_task()).unwrap();

    // No timer is active, so the service waits on its queue for good
    assert_eq!(with_kernel(|k| k.timer_service_wait()), Ok(Pend::Blocked));
    assert_eq!(os_task_self(), Some(app));

    // The command is handed to the service, which preempts the caller
    t.start(NO_WAIT).unwrap();
    assert_eq!(os_task_self(), Some(svc));

    let mut fired = FiredTimers::new();
    with_kernel(|k| k.timer_service_collect(&mut fired)).unwrap();
    assert!(fired.is_empty());
    assert_eq!(t.is_active(), Ok(true));
    assert_eq!(t.expiry_time(), Ok(Some(os_time_get() + 50)));

    // Issued from the service task itself: applied at once
    t.change_period(20, NO_WAIT).unwrap();
    assert_eq!(t.period(), Ok(20));
    t.stop(NO_WAIT).unwrap();
    assert_eq!(t.is_active(), Ok(false));
    t.start_from_isr().unwrap();
    assert_eq!(t.is_active(), Ok(true));

    t.delete(NO_WAIT).unwrap();
    assert_eq!(t.is_active(), Err(OsError::ObjInvalid));
}
