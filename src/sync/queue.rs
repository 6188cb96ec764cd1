//! Message queue
//!
//! Bounded FIFO of fixed-size items, copied by value into a ring buffer
//! carved from the kernel's queue pool. Senders blocked on a full queue
//! and receivers blocked on an empty one wait in priority order.
//!
//! An item never waits in caller memory: a blocked sender's item is copied
//! into its TCB and moved into the ring when a slot frees, and an item for
//! a blocked receiver is handed straight into the receiver's TCB.

use core::marker::PhantomData;
use core::mem::size_of;

use crate::config::{CFG_MSG_SIZE_MAX, CFG_QUEUE_POOL_BYTES};
use crate::error::{OsError, OsResult};
use crate::kernel::{pend_on, with_kernel, Kernel};
use crate::pool::{Pool, Region};
use crate::sync::pend_list::PendList;
use crate::types::{OsPendOn, OsPendStatus, OsTick, Pend, QueueHandle, TaskHandle, NO_WAIT};

/// Message queue control block
pub struct OsQueue {
    name: &'static str,
    item_size: usize,
    capacity: usize,
    /// Ring storage, `capacity * item_size` bytes
    buf: Region,
    head: usize,
    count: usize,
    /// Tasks blocked on a full queue
    pub(crate) senders: PendList,
    /// Tasks blocked on an empty queue
    pub(crate) receivers: PendList,
}

impl OsQueue {
    fn slot(&self, i: usize) -> Region {
        Region {
            offset: self.buf.offset + (i % self.capacity) * self.item_size,
            len: self.item_size,
        }
    }

    fn push(&mut self, mem: &mut Pool<u8, CFG_QUEUE_POOL_BYTES>, item: &[u8]) {
        debug_assert!(self.count < self.capacity);
        let slot = self.slot(self.head + self.count);
        mem.slice_mut(slot).copy_from_slice(item);
        self.count += 1;
    }

    fn pop(&mut self, mem: &Pool<u8, CFG_QUEUE_POOL_BYTES>, out: &mut [u8]) {
        debug_assert!(self.count > 0);
        out.copy_from_slice(mem.slice(self.slot(self.head)));
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.capacity
    }
}

impl Kernel {
    fn queue(&self, q: QueueHandle) -> OsResult<&OsQueue> {
        self.queues.get(q.0).ok_or(OsError::ObjInvalid)
    }

    /// Create a queue of `capacity` items of `item_size` bytes
    ///
    /// # Returns
    /// * `Err(OsError::QCapacityInvalid)` - Zero capacity
    /// * `Err(OsError::QItemSize)` - Item size 0 or above `CFG_MSG_SIZE_MAX`
    /// * `Err(OsError::OutOfMemory)` - Queue table or pool exhausted
    pub fn queue_create(
        &mut self,
        name: &'static str,
        capacity: usize,
        item_size: usize,
    ) -> OsResult<QueueHandle> {
        if capacity == 0 {
            return Err(OsError::QCapacityInvalid);
        }
        if item_size == 0 || item_size > CFG_MSG_SIZE_MAX {
            return Err(OsError::QItemSize);
        }
        if self.queues.is_full() {
            return Err(OsError::OutOfMemory);
        }

        let bytes = capacity.checked_mul(item_size).ok_or(OsError::OutOfMemory)?;
        let buf = self.queue_mem.alloc(bytes).ok_or(OsError::OutOfMemory)?;

        let queue = OsQueue {
            name,
            item_size,
            capacity,
            buf,
            head: 0,
            count: 0,
            senders: PendList::new(),
            receivers: PendList::new(),
        };
        match self.queues.insert(queue) {
            Ok(id) => Ok(QueueHandle(id)),
            Err(_) => {
                self.queue_mem.free(buf);
                Err(OsError::OutOfMemory)
            }
        }
    }

    /// Send an item to the back of the queue
    ///
    /// On a full queue the caller blocks for up to `timeout` ticks, or fails
    /// at once with `Timeout` when `timeout` is [`NO_WAIT`].
    pub fn queue_send(&mut self, q: QueueHandle, item: &[u8], timeout: OsTick) -> OsResult<Pend<()>> {
        let queue = self.queues.get_mut(q.0).ok_or(OsError::ObjInvalid)?;
        if item.len() != queue.item_size {
            return Err(OsError::QItemSize);
        }

        // A waiting receiver means the ring is empty: hand the item over
        if let Some(rx) = queue.receivers.pop(&mut self.tasks) {
            let msg = &mut self.tasks.at_mut(rx).msg;
            msg.clear();
            msg.extend_from_slice(item).map_err(|_| OsError::QItemSize)?;
            self.wake(rx, OsPendStatus::Ok);
            self.sched();
            return Ok(Pend::Done(()));
        }

        if !queue.is_full() {
            queue.push(&mut self.queue_mem, item);
            return Ok(Pend::Done(()));
        }

        if timeout == NO_WAIT {
            return Err(OsError::Timeout);
        }

        let cur = self.pend_check()?;
        let msg = &mut self.tasks.at_mut(cur).msg;
        msg.clear();
        msg.extend_from_slice(item).map_err(|_| OsError::QItemSize)?;

        if let Some(queue) = self.queues.get_mut(q.0) {
            queue.senders.insert_by_prio(&mut self.tasks, cur);
        }
        self.block_current(cur, OsPendOn::QueueSend(q), timeout);
        self.sched();
        Ok(Pend::Blocked)
    }

    /// Receive the item at the front of the queue into `out`
    ///
    /// On an empty queue the caller blocks for up to `timeout` ticks; the
    /// item is then collected with [`Kernel::queue_receive_finish`].
    pub fn queue_receive(
        &mut self,
        q: QueueHandle,
        out: &mut [u8],
        timeout: OsTick,
    ) -> OsResult<Pend<()>> {
        if self.queue_try_pop(q, out)? {
            self.sched();
            return Ok(Pend::Done(()));
        }

        if timeout == NO_WAIT {
            return Err(OsError::Timeout);
        }

        let cur = self.pend_check()?;
        self.tasks.at_mut(cur).msg.clear();
        if let Some(queue) = self.queues.get_mut(q.0) {
            queue.receivers.insert_by_prio(&mut self.tasks, cur);
        }
        self.block_current(cur, OsPendOn::QueueRecv(q), timeout);
        self.sched();
        Ok(Pend::Blocked)
    }

    /// Copy the item a blocked receive got into `out`
    pub fn queue_receive_finish(&mut self, task: TaskHandle, out: &mut [u8]) -> OsResult<()> {
        self.pend_result(task)?;
        let tcb = self.tasks.get_mut(task.0).ok_or(OsError::ObjInvalid)?;
        if tcb.msg.len() != out.len() {
            return Err(OsError::QItemSize);
        }
        out.copy_from_slice(&tcb.msg);
        tcb.msg.clear();
        Ok(())
    }

    /// Pop the front item if there is one, then let the best blocked sender
    /// refill the freed slot
    pub(crate) fn queue_try_pop(&mut self, q: QueueHandle, out: &mut [u8]) -> OsResult<bool> {
        let queue = self.queues.get_mut(q.0).ok_or(OsError::ObjInvalid)?;
        if out.len() != queue.item_size {
            return Err(OsError::QItemSize);
        }
        if queue.count == 0 {
            return Ok(false);
        }

        queue.pop(&self.queue_mem, out);

        if let Some(tx) = queue.senders.pop(&mut self.tasks) {
            let msg = &mut self.tasks.at_mut(tx).msg;
            queue.push(&mut self.queue_mem, msg.as_slice());
            msg.clear();
            self.wake(tx, OsPendStatus::Ok);
        }
        Ok(true)
    }

    /// Empty the queue, then admit as many blocked senders as fit
    pub fn queue_reset(&mut self, q: QueueHandle) -> OsResult<()> {
        let queue = self.queues.get_mut(q.0).ok_or(OsError::ObjInvalid)?;
        queue.head = 0;
        queue.count = 0;

        while let Some(queue) = self.queues.get_mut(q.0) {
            if queue.is_full() {
                break;
            }
            let Some(tx) = queue.senders.pop(&mut self.tasks) else {
                break;
            };
            let msg = &mut self.tasks.at_mut(tx).msg;
            queue.push(&mut self.queue_mem, msg.as_slice());
            msg.clear();
            self.wake(tx, OsPendStatus::Ok);
        }

        self.sched();
        Ok(())
    }

    /// Delete a queue; blocked tasks wake with `ObjDel`
    pub fn queue_delete(&mut self, q: QueueHandle) -> OsResult<()> {
        let mut queue = self.queues.remove(q.0).ok_or(OsError::ObjInvalid)?;

        while let Some(idx) = queue.senders.pop(&mut self.tasks) {
            self.tasks.at_mut(idx).msg.clear();
            self.wake(idx, OsPendStatus::Del);
        }
        while let Some(idx) = queue.receivers.pop(&mut self.tasks) {
            self.wake(idx, OsPendStatus::Del);
        }
        self.queue_mem.free(queue.buf);

        self.sched();
        Ok(())
    }

    /// Items currently stored
    pub fn queue_len(&self, q: QueueHandle) -> OsResult<usize> {
        self.queue(q).map(|queue| queue.count)
    }

    /// Free slots
    pub fn queue_free_slots(&self, q: QueueHandle) -> OsResult<usize> {
        self.queue(q).map(|queue| queue.capacity - queue.count)
    }

    pub fn queue_item_size(&self, q: QueueHandle) -> OsResult<usize> {
        self.queue(q).map(|queue| queue.item_size)
    }

    pub fn queue_name(&self, q: QueueHandle) -> OsResult<&'static str> {
        self.queue(q).map(|queue| queue.name)
    }
}

// ============ Safe Wrapper ============

/// Typed message queue
///
/// Items are copied in and out as raw bytes; `T` should be a plain data
/// type without padding. `size_of::<T>()` must be in `1..=CFG_MSG_SIZE_MAX`.
pub struct Queue<T: Copy> {
    handle: QueueHandle,
    _marker: PhantomData<T>,
}

impl<T: Copy> Clone for Queue<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Copy> Copy for Queue<T> {}

impl<T: Copy> Queue<T> {
    pub fn create(name: &'static str, capacity: usize) -> OsResult<Self> {
        let handle = with_kernel(|k| k.queue_create(name, capacity, size_of::<T>()))?;
        Ok(Self::from_handle(handle))
    }

    /// Wrap a handle received from another task
    pub const fn from_handle(handle: QueueHandle) -> Self {
        Queue {
            handle,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn handle(&self) -> QueueHandle {
        self.handle
    }

    pub fn send(&self, item: &T, timeout: OsTick) -> OsResult<()> {
        let bytes = as_bytes(item);
        pend_on(
            |k| k.queue_send(self.handle, bytes, timeout),
            |k, task| k.pend_result(task),
        )
    }

    /// Send without blocking, usable from interrupt handlers
    pub fn send_from_isr(&self, item: &T) -> OsResult<()> {
        let bytes = as_bytes(item);
        with_kernel(|k| k.queue_send(self.handle, bytes, NO_WAIT)).map(|_| ())
    }

    pub fn receive(&self, timeout: OsTick) -> OsResult<T> {
        let mut buf = [0u8; CFG_MSG_SIZE_MAX];
        let out = buf.get_mut(..size_of::<T>()).ok_or(OsError::QItemSize)?;

        let woken = pend_on(
            |k| Ok(k.queue_receive(self.handle, out, timeout)?.map(|()| None)),
            |k, task| k.pend_result(task).map(|()| Some(task)),
        )?;
        if let Some(task) = woken {
            with_kernel(|k| k.queue_receive_finish(task, out))?;
        }

        // Every byte of `out` was written by a successful receive
        Ok(unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const T) })
    }

    pub fn reset(&self) -> OsResult<()> {
        with_kernel(|k| k.queue_reset(self.handle))
    }

    pub fn delete(self) -> OsResult<()> {
        with_kernel(|k| k.queue_delete(self.handle))
    }

    pub fn len(&self) -> OsResult<usize> {
        with_kernel(|k| k.queue_len(self.handle))
    }

    pub fn is_empty(&self) -> OsResult<bool> {
        self.len().map(|n| n == 0)
    }

    pub fn free_slots(&self) -> OsResult<usize> {
        with_kernel(|k| k.queue_free_slots(self.handle))
    }
}

fn as_bytes<T: Copy>(item: &T) -> &[u8] {
    unsafe { core::slice::from_raw_parts(item as *const T as *const u8, size_of::<T>()) }
}
