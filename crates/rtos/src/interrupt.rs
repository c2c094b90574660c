//! Simulated interrupt lines.
//!
//! A raised interrupt runs its handler synchronously on the caller's stack in
//! [`Context::Interrupt`](crate::kernel::Context::Interrupt). Handlers may only
//! use the `*_from_isr` operations; each of them ORs "a higher-priority task
//! became ready" into a [`WakeFlag`] that the handler hands to
//! [`IsrContext::yield_from_isr`] once, at the end.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::kernel::{Kernel, Tick};

/// Logical interrupt line number.
pub type InterruptNumber = u32;

/// Accumulated "higher priority task woken" flag for one handler execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WakeFlag(bool);

impl WakeFlag {
    pub const fn new() -> Self {
        Self(false)
    }

    pub fn is_set(self) -> bool {
        self.0
    }

    pub(crate) fn set(&mut self) {
        self.0 = true;
    }
}

/// View of the kernel handed to a running interrupt handler.
pub struct IsrContext<'a> {
    number: InterruptNumber,
    kernel: &'a Kernel,
    yield_requested: bool,
}

impl IsrContext<'_> {
    pub fn number(&self) -> InterruptNumber {
        self.number
    }

    pub fn tick_count_from_isr(&self) -> Tick {
        self.kernel.tick_count()
    }

    /// Requests a reschedule on exit when `woken` is set; otherwise a no-op.
    pub fn yield_from_isr(&mut self, woken: WakeFlag) {
        if woken.is_set() {
            log::trace!("interrupt {} requested a yield", self.number);
            self.yield_requested = true;
        }
    }
}

type Handler = Arc<Mutex<Box<dyn FnMut(&mut IsrContext<'_>) + Send>>>;

/// Interrupt vector table: at most one handler per interrupt number.
pub struct InterruptController {
    kernel: Kernel,
    handlers: Arc<Mutex<BTreeMap<InterruptNumber, Handler>>>,
}

impl Clone for InterruptController {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel.clone(),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl InterruptController {
    pub fn new(kernel: &Kernel) -> Self {
        Self {
            kernel: kernel.clone(),
            handlers: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Installs `handler` for `number`. Returns `true` if it replaced an
    /// existing handler.
    pub fn register_handler<F>(&self, number: InterruptNumber, handler: F) -> bool
    where
        F: FnMut(&mut IsrContext<'_>) + Send + 'static,
    {
        let handler: Handler = Arc::new(Mutex::new(Box::new(handler)));
        let replaced = self.handlers.lock().insert(number, handler).is_some();
        log::debug!(
            "{} handler for interrupt {number}",
            if replaced { "replaced" } else { "registered" }
        );
        replaced
    }

    pub fn unregister_handler(&self, number: InterruptNumber) -> bool {
        self.handlers.lock().remove(&number).is_some()
    }

    pub fn is_registered(&self, number: InterruptNumber) -> bool {
        self.handlers.lock().contains_key(&number)
    }

    /// Runs the handler for `number` to completion and returns whether it
    /// requested a yield. An unregistered line is ignored.
    ///
    /// Fails with `NestedInterrupt` when called from inside a handler.
    pub fn trigger(&self, number: InterruptNumber) -> Result<bool> {
        let _context = self.kernel.enter_interrupt(number)?;
        let handler = self.handlers.lock().get(&number).cloned();
        let Some(handler) = handler else {
            log::trace!("interrupt {number} raised with no handler");
            return Ok(false);
        };

        let mut isr = IsrContext {
            number,
            kernel: &self.kernel,
            yield_requested: false,
        };
        let mut handler = handler.lock();
        (*handler)(&mut isr);
        Ok(isr.yield_requested)
    }

    /// Raises `number` from a task and, if the handler asked for it, yields
    /// so the woken task runs before the caller resumes.
    pub async fn raise(&self, number: InterruptNumber) -> Result<()> {
        if self.trigger(number)? {
            self.kernel.yield_now().await;
        }
        Ok(())
    }
}
