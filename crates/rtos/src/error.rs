//! Error taxonomy shared by every primitive.
//!
//! `Timeout`, `Full` and `Empty` are ordinary statuses the caller handles
//! locally. `Contract` marks programmer error: the violating call is refused
//! and no primitive state is touched.

use thiserror::Error;

use crate::interrupt::InterruptNumber;

/// Misuse of a primitive that no retry can fix.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("blocking primitive called from interrupt context")]
    BlockingInInterrupt,
    #[error("blocking wait requested from the timer service context")]
    BlockingInTimerService,
    #[error("blocking wait outside of a kernel task")]
    NoTaskContext,
    #[error("synchronous call from a task; use the awaiting form")]
    SyncCallInTask,
    #[error("interrupt {requested} raised while handler {active} is running")]
    NestedInterrupt {
        active: InterruptNumber,
        requested: InterruptNumber,
    },
    #[error("queue capacity must be at least one item")]
    ZeroCapacity,
    #[error("timer period must be at least one tick")]
    ZeroPeriod,
}

/// Status returned by queue, semaphore and timer operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bounded wait elapsed before the operation could complete.
    #[error("operation timed out")]
    Timeout,
    /// No free slot and the caller asked not to wait.
    #[error("queue is full")]
    Full,
    /// Nothing to take and the caller asked not to wait.
    #[error("queue or semaphore is empty")]
    Empty,
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

pub type Result<T> = core::result::Result<T, Error>;
