//! Pend list - tasks waiting on a kernel object
//!
//! Linked through the `pend_next`/`pend_prev` indices of the TCBs. Queues
//! and mutexes keep their waiters ordered by priority (FIFO among equals),
//! event groups in arrival order.

use heapless::Vec;

use crate::config::CFG_TASK_MAX;
use crate::task::TaskTable;

#[derive(Debug, Clone, Copy, Default)]
pub struct PendList {
    head: Option<u16>,
    tail: Option<u16>,
}

impl PendList {
    pub const fn new() -> Self {
        PendList {
            head: None,
            tail: None,
        }
    }

    /// Highest priority (or oldest) waiter
    #[inline]
    pub fn head(&self) -> Option<u16> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append in arrival order
    pub fn insert_tail(&mut self, tasks: &mut TaskTable, idx: u16) {
        let tcb = tasks.at_mut(idx);
        tcb.pend_next = None;
        tcb.pend_prev = self.tail;

        match self.tail {
            Some(tail) => tasks.at_mut(tail).pend_next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Insert behind every waiter of equal or higher priority
    pub fn insert_by_prio(&mut self, tasks: &mut TaskTable, idx: u16) {
        let prio = tasks.at(idx).prio;

        let mut cur = self.head;
        while let Some(i) = cur {
            if tasks.at(i).prio < prio {
                break;
            }
            cur = tasks.at(i).pend_next;
        }

        let Some(next) = cur else {
            self.insert_tail(tasks, idx);
            return;
        };

        let prev = tasks.at(next).pend_prev;
        let tcb = tasks.at_mut(idx);
        tcb.pend_prev = prev;
        tcb.pend_next = Some(next);

        tasks.at_mut(next).pend_prev = Some(idx);
        match prev {
            Some(p) => tasks.at_mut(p).pend_next = Some(idx),
            None => self.head = Some(idx),
        }
    }

    pub fn remove(&mut self, tasks: &mut TaskTable, idx: u16) {
        let tcb = tasks.at_mut(idx);
        let (prev, next) = (tcb.pend_prev, tcb.pend_next);
        tcb.pend_prev = None;
        tcb.pend_next = None;

        match prev {
            Some(p) => tasks.at_mut(p).pend_next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => tasks.at_mut(n).pend_prev = prev,
            None => self.tail = prev,
        }
    }

    /// Detach and return the head
    pub fn pop(&mut self, tasks: &mut TaskTable) -> Option<u16> {
        let idx = self.head?;
        self.remove(tasks, idx);
        Some(idx)
    }

    /// Waiters in list order
    pub fn snapshot(&self, tasks: &TaskTable) -> Vec<u16, CFG_TASK_MAX> {
        let mut out = Vec::new();
        let mut cur = self.head;
        while let Some(i) = cur {
            if out.push(i).is_err() {
                break;
            }
            cur = tasks.at(i).pend_next;
        }
        out
    }
}
