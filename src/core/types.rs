//! Core type definitions for the kernel
//!
//! These types provide strong typing for RTOS primitives.

use crate::arena::Id;
use crate::error::{OsError, OsResult};

/// Task priority (higher value = more urgent, 0 = idle)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Stack element type
pub type OsStkElement = u32;

/// Event flags type
pub type OsFlags = u32;

/// Block without timeout
pub const WAIT_FOREVER: OsTick = OsTick::MAX;

/// Fail immediately instead of blocking
pub const NO_WAIT: OsTick = 0;

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsTaskState {
    /// Task is ready to run
    Ready = 0,
    /// Task owns the CPU
    Running = 1,
    /// Task is delayed or pending on a kernel object
    Blocked = 2,
    /// Task is suspended
    Suspended = 3,
    /// Task was deleted and awaits reclamation by the idle task
    Deleted = 4,
}

/// What the task is pending on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsPendOn {
    Nothing,
    Delay,
    #[cfg(feature = "queue")]
    QueueSend(QueueHandle),
    #[cfg(feature = "queue")]
    QueueRecv(QueueHandle),
    #[cfg(feature = "mutex")]
    Mutex(MutexHandle),
    #[cfg(feature = "event-group")]
    Flag(EventGroupHandle),
}

/// Pend status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsPendStatus {
    /// Pend succeeded
    Ok = 0,
    /// Still waiting
    Pending = 1,
    /// Delay was aborted
    Abort = 2,
    /// Object was deleted while pending
    Del = 3,
    /// Timeout occurred
    Timeout = 4,
}

impl OsPendStatus {
    /// Map the outcome of a finished wait onto a result
    pub fn into_result(self) -> OsResult<()> {
        match self {
            OsPendStatus::Ok => Ok(()),
            OsPendStatus::Pending => Err(OsError::PendWouldBlock),
            OsPendStatus::Abort => Err(OsError::PendAbort),
            OsPendStatus::Del => Err(OsError::ObjDel),
            OsPendStatus::Timeout => Err(OsError::Timeout),
        }
    }
}

/// Outcome of a kernel call that may suspend the caller.
///
/// `Blocked` means the calling task has been moved off the CPU; the final
/// result is collected from its TCB once it runs again.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pend<T> {
    Done(T),
    Blocked,
}

impl<T> Pend<T> {
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Pend::Blocked)
    }

    #[inline]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Pend<U> {
        match self {
            Pend::Done(v) => Pend::Done(f(v)),
            Pend::Blocked => Pend::Blocked,
        }
    }

    /// Value of a call that completed without blocking
    #[inline]
    pub fn done(self) -> Option<T> {
        match self {
            Pend::Done(v) => Some(v),
            Pend::Blocked => None,
        }
    }
}

// ============ Handles ============

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) Id);

        impl $name {
            /// Encode the handle so it can travel as a task argument
            #[inline]
            pub const fn into_raw(self) -> u32 {
                self.0.into_raw()
            }

            /// Rebuild a handle from [`Self::into_raw`].
            ///
            /// A stale or forged value is rejected by the kernel with
            /// `OsError::ObjInvalid` on use.
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(Id::from_raw(raw))
            }
        }
    };
}

define_handle!(
    /// Handle to a task
    TaskHandle
);
define_handle!(
    /// Handle to a message queue
    QueueHandle
);
define_handle!(
    /// Handle to a mutex
    MutexHandle
);
define_handle!(
    /// Handle to an event group
    EventGroupHandle
);
define_handle!(
    /// Handle to a software timer
    TimerHandle
);
