//! Deferred interrupt processing through a binary semaphore.
//!
//! A low-priority periodic task raises [`INTERRUPT_NUMBER`] every 500 ms. The
//! handler only gives the semaphore and requests a yield; the real work runs
//! in the high-priority handler task, which therefore finishes before the
//! periodic task gets past the raise.

use std::sync::Arc;

use blinky_board::Console;
use blinky_rtos::{
    BinarySemaphore, InterruptController, InterruptNumber, Kernel, Priority, Timeout, WakeFlag,
};

use crate::DemoError;

pub const INTERRUPT_NUMBER: InterruptNumber = 40;
pub const PERIOD_MS: u64 = 500;
pub const HANDLER_PRIORITY: Priority = Priority(3);
pub const PERIODIC_PRIORITY: Priority = Priority(1);

pub struct Handles {
    pub semaphore: BinarySemaphore,
    pub interrupts: InterruptController,
}

pub fn build(kernel: &Kernel, console: Arc<dyn Console>) -> Result<Handles, DemoError> {
    let semaphore = BinarySemaphore::new(kernel);
    let interrupts = InterruptController::new(kernel);

    kernel.spawn(
        "Handler",
        HANDLER_PRIORITY,
        handler_task(semaphore.clone(), Arc::clone(&console)),
    )?;
    kernel.spawn(
        "Periodic",
        PERIODIC_PRIORITY,
        periodic_task(kernel.clone(), interrupts.clone(), Arc::clone(&console)),
    )?;

    console.print(&format!(
        "Setting interrupt handler for interrupt number: {INTERRUPT_NUMBER}"
    ));
    let (sem, out) = (semaphore.clone(), Arc::clone(&console));
    interrupts.register_handler(INTERRUPT_NUMBER, move |isr| {
        let mut woken = WakeFlag::new();
        out.print("Interrupt handler - Giving semaphore.");
        sem.give_from_isr(&mut woken);
        isr.yield_from_isr(woken);
    });

    Ok(Handles {
        semaphore,
        interrupts,
    })
}

async fn periodic_task(kernel: Kernel, interrupts: InterruptController, console: Arc<dyn Console>) {
    let delay = kernel.ms_to_ticks(PERIOD_MS);
    loop {
        kernel.delay(delay).await;
        console.print("Periodic task - About to generate an interrupt.");
        console.print(&format!(
            "Simulated interrupt generated for interrupt number: {INTERRUPT_NUMBER}"
        ));
        if let Err(err) = interrupts.raise(INTERRUPT_NUMBER).await {
            log::error!("periodic task stopping: {err}");
            return;
        }
        console.print("Periodic task - Interrupt generated.");
    }
}

async fn handler_task(semaphore: BinarySemaphore, console: Arc<dyn Console>) {
    loop {
        if let Err(err) = semaphore.take(Timeout::Forever).await {
            log::error!("handler task stopping: {err}");
            return;
        }
        console.print("Handler task - Processing event.");
    }
}
