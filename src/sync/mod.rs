//! Synchronization primitives
//!
//! Message queues, mutexes, event groups and the software timer service.

#[cfg(any(feature = "queue", feature = "mutex", feature = "event-group"))]
pub mod pend_list;

#[cfg(feature = "queue")]
pub mod queue;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "event-group")]
pub mod event_group;

#[cfg(feature = "timer")]
pub mod timer;

use crate::kernel::Kernel;
use crate::types::OsPendOn;

impl Kernel {
    /// Take a blocked task off the wait list of the object it pends on.
    ///
    /// Used when the wait ends for another reason than the object itself:
    /// a timeout or the deletion of the task.
    pub(crate) fn pend_unlink(&mut self, idx: u16) {
        let pend_on = self.tasks.at(idx).pend_on;
        match pend_on {
            OsPendOn::Nothing | OsPendOn::Delay => {}
            #[cfg(feature = "queue")]
            OsPendOn::QueueSend(q) => {
                if let Some(queue) = self.queues.get_mut(q.0) {
                    queue.senders.remove(&mut self.tasks, idx);
                }
                self.tasks.at_mut(idx).msg.clear();
            }
            #[cfg(feature = "queue")]
            OsPendOn::QueueRecv(q) => {
                if let Some(queue) = self.queues.get_mut(q.0) {
                    queue.receivers.remove(&mut self.tasks, idx);
                }
            }
            #[cfg(feature = "mutex")]
            OsPendOn::Mutex(m) => {
                if let Some(mutex) = self.mutexes.get_mut(m.0) {
                    mutex.waiters.remove(&mut self.tasks, idx);
                }
                self.mutex_recompute_holder(m);
            }
            #[cfg(feature = "event-group")]
            OsPendOn::Flag(g) => {
                if let Some(grp) = self.flag_grps.get_mut(g.0) {
                    grp.waiters.remove(&mut self.tasks, idx);
                }
            }
        }
    }

    /// Keep a priority-ordered wait list sorted after `idx` changed priority
    pub(crate) fn pend_reposition(&mut self, idx: u16) {
        let pend_on = self.tasks.at(idx).pend_on;
        match pend_on {
            #[cfg(feature = "queue")]
            OsPendOn::QueueSend(q) => {
                if let Some(queue) = self.queues.get_mut(q.0) {
                    queue.senders.remove(&mut self.tasks, idx);
                    queue.senders.insert_by_prio(&mut self.tasks, idx);
                }
            }
            #[cfg(feature = "queue")]
            OsPendOn::QueueRecv(q) => {
                if let Some(queue) = self.queues.get_mut(q.0) {
                    queue.receivers.remove(&mut self.tasks, idx);
                    queue.receivers.insert_by_prio(&mut self.tasks, idx);
                }
            }
            #[cfg(feature = "mutex")]
            OsPendOn::Mutex(m) => {
                if let Some(mutex) = self.mutexes.get_mut(m.0) {
                    mutex.waiters.remove(&mut self.tasks, idx);
                    mutex.waiters.insert_by_prio(&mut self.tasks, idx);
                }
            }
            _ => {}
        }
    }
}
