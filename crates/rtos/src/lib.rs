//! # blinky-rtos
//!
//! The interrupt-to-task coordination core of the blinky demos: the protocol
//! by which a simulated hardware interrupt hands data to waiting tasks
//! through ISR-safe primitives, with priority-ordered wakes and no blocking
//! inside interrupt context.
//!
//! ## Module Overview
//! - [`kernel`]    – Deterministic priority executor hosting `async` task
//!   bodies over a virtual tick counter.
//! - [`queue`]     – Bounded FIFO queue with blocking and ISR-safe operations.
//! - [`semaphore`] – Binary semaphore for deferred interrupt processing.
//! - [`timer`]     – One-shot and auto-reload software timers.
//! - [`interrupt`] – Interrupt vector table and the wake flag bookkeeping.
//! - [`error`]     – Status and contract-violation types.

pub mod error;
pub mod interrupt;
pub mod kernel;
pub mod queue;
pub mod semaphore;
pub mod timer;
mod waitlist;

pub use error::{ContractViolation, Error, Result};
pub use interrupt::{InterruptController, InterruptNumber, IsrContext, WakeFlag};
pub use kernel::{
    Context, Kernel, KernelBuilder, KernelConfig, KernelConfigBuilder, KernelError, Priority,
    TaskId, Tick, Timeout,
};
pub use queue::Queue;
pub use semaphore::BinarySemaphore;
pub use timer::Timer;

#[cfg(test)]
mod tests;
