//! Error types for the kernel
//!
//! Uses Rust's Result pattern instead of C-style error pointers.

/// RTOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ Resource errors ============
    /// TCB arena, stack pool, object table or queue pool exhausted
    OutOfMemory = 10001,

    // ============ Flag errors ============
    /// Bits outside the usable mask, or an empty wait mask
    FlagInvalidBits = 15101,

    // ============ Lock errors ============
    /// Lock nesting overflow
    LockNestingOvf = 21001,

    // ============ Mutex errors ============
    /// Caller is not the mutex owner
    MutexNotOwner = 22401,
    /// Mutex nesting overflow
    MutexOvf = 22404,

    // ============ Object errors ============
    /// Handle does not refer to a live object
    ObjInvalid = 24001,
    /// Object was deleted while the caller was pending on it
    ObjDel = 24002,

    // ============ OS state errors ============
    /// OS is not running
    OsNotRunning = 24201,
    /// OS is already running
    OsRunning = 24202,
    /// Kernel not initialized
    OsNotInit = 24203,
    /// No application task created
    OsNoAppTask = 24204,

    // ============ Pend errors ============
    /// Delay was aborted by another task
    PendAbort = 25001,
    /// Cannot pend from ISR
    PendIsr = 25006,
    /// The wait has not completed yet
    PendWouldBlock = 25008,

    // ============ Priority errors ============
    /// Invalid priority
    PrioInvalid = 25203,

    // ============ Queue errors ============
    /// Item size does not match the queue
    QItemSize = 26001,
    /// Zero capacity requested
    QCapacityInvalid = 26003,

    // ============ Scheduler errors ============
    /// Scheduler is locked
    SchedLocked = 28003,
    /// Scheduler is not locked
    SchedNotLocked = 28004,

    // ============ State errors ============
    /// Invalid stack size
    StkSizeInvalid = 28208,

    // ============ Task errors ============
    /// Cannot delete idle task
    TaskDelIdle = 29004,
    /// Task cannot be deleted (timer service)
    TaskDelInvalid = 29005,
    /// Task is not delayed
    TaskNotDly = 29009,
    /// Task is not suspended
    TaskNotSuspended = 29011,
    /// Cannot suspend idle task
    TaskSuspendIdle = 29019,

    // ============ Time errors ============
    TimeInvalidMinutes = 29302,
    TimeInvalidSeconds = 29303,
    TimeInvalidMilliseconds = 29304,

    // ============ Timeout ============
    /// Operation timed out
    Timeout = 29401,

    // ============ Timer errors ============
    /// Invalid timer period
    TmrInvalidPeriod = 29504,
}

/// Result type alias for RTOS operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric error code
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Errors a caller may simply retry later
    #[inline]
    pub fn is_recoverable(self) -> bool {
        matches!(self, OsError::Timeout | OsError::PendWouldBlock)
    }
}
