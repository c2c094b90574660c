//! Binary semaphore used to defer interrupt work to a handler task.

use core::future::poll_fn;
use core::task::Poll;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::interrupt::WakeFlag;
use crate::kernel::{Kernel, Timeout};
use crate::waitlist::WaitList;

struct SemaphoreState {
    available: bool,
    waiters: WaitList,
}

/// Single-token semaphore. Gives never accumulate: giving an available
/// token is a no-op.
///
/// # Example
///
/// ```ignore
/// let sem = BinarySemaphore::new(&kernel);
///
/// // Handler task: wait for the interrupt.
/// sem.take(Timeout::Forever).await?;
///
/// // Interrupt handler: release it.
/// let mut woken = WakeFlag::new();
/// sem.give_from_isr(&mut woken);
/// isr.yield_from_isr(woken);
/// ```
pub struct BinarySemaphore {
    kernel: Kernel,
    state: Arc<Mutex<SemaphoreState>>,
}

impl Clone for BinarySemaphore {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl BinarySemaphore {
    /// Creates a semaphore whose token starts out empty.
    pub fn new(kernel: &Kernel) -> Self {
        Self {
            kernel: kernel.clone(),
            state: Arc::new(Mutex::new(SemaphoreState {
                available: false,
                waiters: WaitList::default(),
            })),
        }
    }

    /// Consumes the token, suspending until it is given or `timeout`
    /// elapses. An expired wait returns `Timeout` and leaves the token empty.
    pub async fn take(&self, timeout: Timeout) -> Result<()> {
        self.kernel.check_blocking_call(timeout)?;
        let deadline = self.kernel.deadline(timeout);

        poll_fn(|cx| {
            let mut state = self.state.lock();
            if state.available {
                state.available = false;
                self.kernel.release(&mut state.waiters);
                return Poll::Ready(Ok(()));
            }
            self.kernel
                .park(&mut state.waiters, deadline, cx, Error::Empty)
                .map(Err)
        })
        .await
    }

    /// Takes the token only if it is available right now.
    pub fn try_take(&self) -> Result<()> {
        self.kernel.check_blocking_call(Timeout::Immediate)?;
        let mut state = self.state.lock();
        if state.available {
            state.available = false;
            Ok(())
        } else {
            Err(Error::Empty)
        }
    }

    /// Task-context give. Yields when it readies a higher-priority waiter.
    pub async fn give(&self) -> Result<()> {
        self.kernel.check_blocking_call(Timeout::Immediate)?;
        let woken = self.release_token();
        self.kernel.preempt_if(woken).await;
        Ok(())
    }

    /// Interrupt-safe give. Never suspends.
    pub fn give_from_isr(&self, woken: &mut WakeFlag) {
        if self.release_token() {
            woken.set();
        }
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().available
    }

    pub fn waiting_tasks(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn release_token(&self) -> bool {
        let mut state = self.state.lock();
        if state.available {
            log::trace!("semaphore already available, give ignored");
            return false;
        }
        state.available = true;
        if state.waiters.is_empty() {
            return false;
        }
        self.kernel.wake_one(&mut state.waiters)
    }
}
