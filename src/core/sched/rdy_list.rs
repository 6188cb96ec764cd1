//! Ready list - doubly linked list of TCBs at a given priority
//!
//! Each priority level has its own ready list. Tasks are added to the
//! tail (FIFO for round-robin) and scheduled from the head. A preempted
//! task goes back to the head so it resumes before its peers.

use crate::task::TaskTable;

/// Ready list for a single priority level
///
/// Doubly-linked list of tasks ready to run at this priority, threaded
/// through the `next`/`prev` indices of the TCBs.
#[derive(Debug, Clone, Copy)]
pub struct ReadyList {
    head: Option<u16>,
    tail: Option<u16>,
    count: usize,
}

impl ReadyList {
    /// Create a new empty ready list
    pub const fn new() -> Self {
        ReadyList {
            head: None,
            tail: None,
            count: 0,
        }
    }

    /// Initialize/reset the ready list
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Get head of list (first to be scheduled)
    #[inline]
    pub fn head(&self) -> Option<u16> {
        self.head
    }

    /// Get tail of list
    #[inline]
    pub fn tail(&self) -> Option<u16> {
        self.tail
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Insert TCB at the tail of the list (FIFO order)
    ///
    /// The task must not be linked into any ready list.
    pub fn insert_tail(&mut self, tasks: &mut TaskTable, idx: u16) {
        let tcb = tasks.at_mut(idx);
        tcb.next = None;
        tcb.prev = self.tail;

        match self.tail {
            Some(tail) => tasks.at_mut(tail).next = Some(idx),
            None => self.head = Some(idx),
        }

        self.tail = Some(idx);
        self.count += 1;
    }

    /// Insert TCB at the head of the list
    ///
    /// Used when a running task is preempted.
    pub fn insert_head(&mut self, tasks: &mut TaskTable, idx: u16) {
        let tcb = tasks.at_mut(idx);
        tcb.prev = None;
        tcb.next = self.head;

        match self.head {
            Some(head) => tasks.at_mut(head).prev = Some(idx),
            None => self.tail = Some(idx),
        }

        self.head = Some(idx);
        self.count += 1;
    }

    /// Remove a TCB from the list
    ///
    /// The task must be linked into this list.
    pub fn remove(&mut self, tasks: &mut TaskTable, idx: u16) {
        let (prev, next) = {
            let tcb = tasks.at_mut(idx);
            let links = (tcb.prev, tcb.next);
            tcb.prev = None;
            tcb.next = None;
            links
        };

        match prev {
            Some(p) => tasks.at_mut(p).next = next,
            None => self.head = next,
        }

        match next {
            Some(n) => tasks.at_mut(n).prev = prev,
            None => self.tail = prev,
        }

        self.count = self.count.saturating_sub(1);
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Region;
    use crate::task::OsTcb;

    fn nop(_: usize) {}
    static NOP: fn(usize) = nop;

    fn table(n: usize) -> TaskTable {
        let mut tasks = TaskTable::new();
        for _ in 0..n {
            let _ = tasks.insert(OsTcb::new("t", &NOP, 0, 1, Region::EMPTY));
        }
        tasks
    }

    fn order(list: &ReadyList, tasks: &TaskTable) -> heapless::Vec<u16, 8> {
        let mut out = heapless::Vec::new();
        let mut cur = list.head();
        while let Some(i) = cur {
            let _ = out.push(i);
            cur = tasks.at(i).next;
        }
        out
    }

    #[test]
    fn test_fifo_order() {
        let mut tasks = table(3);
        let mut list = ReadyList::new();
        list.insert_tail(&mut tasks, 0);
        list.insert_tail(&mut tasks, 1);
        list.insert_tail(&mut tasks, 2);

        assert_eq!(order(&list, &tasks), [0, 1, 2]);
        assert_eq!(list.tail(), Some(2));
        assert_eq!(list.count(), 3);
    }

    #[test]
    fn test_insert_head() {
        let mut tasks = table(3);
        let mut list = ReadyList::new();
        list.insert_tail(&mut tasks, 0);
        list.insert_tail(&mut tasks, 1);
        list.insert_head(&mut tasks, 2);

        assert_eq!(order(&list, &tasks), [2, 0, 1]);
    }

    #[test]
    fn test_remove_middle_and_ends() {
        let mut tasks = table(4);
        let mut list = ReadyList::new();
        for i in 0..4 {
            list.insert_tail(&mut tasks, i);
        }

        list.remove(&mut tasks, 1);
        assert_eq!(order(&list, &tasks), [0, 2, 3]);

        list.remove(&mut tasks, 0);
        list.remove(&mut tasks, 3);
        assert_eq!(order(&list, &tasks), [2]);
        assert_eq!(list.head(), list.tail());

        list.remove(&mut tasks, 2);
        assert!(list.is_empty());
        assert_eq!(list.tail(), None);
    }
}
