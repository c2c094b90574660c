//! Software timers.
//!
//! Every timer belongs to the kernel's single timer service. Callbacks run
//! one at a time in [`Context::TimerService`](crate::kernel::Context), never
//! on the stack of the task that armed the timer and never in interrupt
//! context. They must not block: only zero-timeout primitive calls
//! (`try_send`, `try_receive`, `try_take`) are accepted there.
//!
//! ```text
//! Disarmed --start--> Armed --fire (one-shot)--> Disarmed
//!                     Armed --fire (auto-reload)--> Armed (next_due += period)
//! ```

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ContractViolation, Result};
use crate::kernel::{Kernel, Tick, Timeout};

type Callback = Box<dyn FnMut(&Timer) + Send>;

struct TimerState {
    period: Tick,
    auto_reload: bool,
    armed: bool,
    next_due: Tick,
    fired: u64,
}

struct TimerInner {
    id: usize,
    name: &'static str,
    kernel: Kernel,
    state: Mutex<TimerState>,
    callback: Mutex<Callback>,
}

/// Handle to a software timer. Clones refer to the same timer.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Timer")
            .field("name", &self.inner.name)
            .field("period", &state.period)
            .field("auto_reload", &state.auto_reload)
            .field("armed", &state.armed)
            .field("next_due", &state.next_due)
            .finish()
    }
}

impl Timer {
    /// Creates a disarmed timer owned by `kernel`'s timer service.
    pub fn new<F>(
        kernel: &Kernel,
        name: &'static str,
        period: Tick,
        auto_reload: bool,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(&Timer) + Send + 'static,
    {
        if period == 0 {
            return Err(kernel.violation(ContractViolation::ZeroPeriod));
        }
        let timer = kernel.timers().register(|id| Timer {
            inner: Arc::new(TimerInner {
                id,
                name,
                kernel: kernel.clone(),
                state: Mutex::new(TimerState {
                    period,
                    auto_reload,
                    armed: false,
                    next_due: 0,
                    fired: 0,
                }),
                callback: Mutex::new(Box::new(callback)),
            }),
        });
        log::debug!("created timer '{name}' (period {period}, auto_reload {auto_reload})");
        Ok(timer)
    }

    /// Arms the timer to fire one period from now. Restarting an armed timer
    /// moves its due tick.
    ///
    /// The command is applied immediately, so `timeout` never causes a
    /// wait; a non-zero one is still refused where blocking is forbidden.
    pub fn start(&self, timeout: Timeout) -> Result<()> {
        self.inner.kernel.check_blocking_call(timeout)?;
        self.arm();
        Ok(())
    }

    /// Disarms the timer. Stopping a disarmed timer is a no-op.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.armed {
            state.armed = false;
            log::debug!("timer '{}' stopped", self.inner.name);
        }
    }

    /// Re-arms relative to the current tick, whether armed or not.
    pub fn reset(&self) {
        self.arm();
    }

    /// Replaces the period and arms the timer relative to now.
    pub fn change_period(&self, period: Tick) -> Result<()> {
        if period == 0 {
            return Err(self.inner.kernel.violation(ContractViolation::ZeroPeriod));
        }
        self.inner.state.lock().period = period;
        self.arm();
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().armed
    }

    pub fn period(&self) -> Tick {
        self.inner.state.lock().period
    }

    pub fn is_auto_reload(&self) -> bool {
        self.inner.state.lock().auto_reload
    }

    /// Tick at which an armed timer fires next.
    pub fn next_due(&self) -> Option<Tick> {
        let state = self.inner.state.lock();
        state.armed.then_some(state.next_due)
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Number of times the callback has run.
    pub fn fire_count(&self) -> u64 {
        self.inner.state.lock().fired
    }

    fn arm(&self) {
        let now = self.inner.kernel.tick_count();
        let mut state = self.inner.state.lock();
        state.armed = true;
        state.next_due = now.saturating_add(state.period);
        log::debug!("timer '{}' armed, due at tick {}", self.inner.name, state.next_due);
    }

    fn due_at(&self, now: Tick) -> Option<Tick> {
        let state = self.inner.state.lock();
        (state.armed && state.next_due <= now).then_some(state.next_due)
    }

    /// Applies one expiry to the timer state.
    fn expire(&self) {
        let mut state = self.inner.state.lock();
        state.fired += 1;
        if state.auto_reload {
            state.next_due = state.next_due.saturating_add(state.period);
        } else {
            state.armed = false;
        }
    }

    fn invoke(&self) {
        let mut callback = self.inner.callback.lock();
        (*callback)(self);
    }
}

/// The deferred-execution context shared by all timers of one kernel.
#[derive(Default)]
pub(crate) struct TimerService {
    timers: Mutex<Vec<Timer>>,
}

impl TimerService {
    pub(crate) fn register(&self, make: impl FnOnce(usize) -> Timer) -> Timer {
        let mut timers = self.timers.lock();
        let timer = make(timers.len());
        timers.push(timer.clone());
        timer
    }

    /// Earliest due tick over all armed timers.
    pub(crate) fn next_due(&self) -> Option<Tick> {
        self.timers
            .lock()
            .iter()
            .filter_map(Timer::next_due)
            .min()
    }

    /// Fires every timer due at or before `now`, earliest due tick first and
    /// creation order among equals. An auto-reload timer that fell several
    /// periods behind fires once per missed period.
    pub(crate) fn fire_due(&self, now: Tick) {
        loop {
            let next = {
                let timers = self.timers.lock();
                timers
                    .iter()
                    .filter_map(|timer| timer.due_at(now).map(|due| (due, timer.inner.id, timer)))
                    .min_by_key(|(due, id, _)| (*due, *id))
                    .map(|(_, _, timer)| timer.clone())
            };
            let Some(timer) = next else {
                break;
            };

            timer.expire();
            log::trace!("timer '{}' fired at tick {now}", timer.name());
            timer.invoke();
        }
    }

    pub(crate) fn clear(&self) {
        let timers = std::mem::take(&mut *self.timers.lock());
        drop(timers);
    }
}
