//! Interrupt handler translating integers into strings.
//!
//! The generator pushes five increasing integers to the integer queue every
//! 200 ms and raises [`INTERRUPT_NUMBER`]. The handler drains the integer
//! queue with ISR-safe receives, maps each value to one of [`STRINGS`] and
//! forwards it to the string queue, where the printer task picks it up.

use std::sync::Arc;

use blinky_board::Console;
use blinky_rtos::{InterruptController, InterruptNumber, Kernel, Priority, Queue, Timeout, WakeFlag};

use crate::DemoError;

pub const INTERRUPT_NUMBER: InterruptNumber = 40;
pub const QUEUE_LENGTH: usize = 10;
pub const BATCH: u32 = 5;
pub const PERIOD_MS: u64 = 200;
pub const GENERATOR_PRIORITY: Priority = Priority(1);
pub const PRINTER_PRIORITY: Priority = Priority(2);

pub const STRINGS: [&str; 4] = ["String 0", "String 1", "String 2", "String 3"];

/// Picks the string for `value` by masking off all but the low two bits.
///
/// Masking and `% 4` only agree because the table has four entries; the
/// mask is the contract.
pub fn select_string(value: u32) -> &'static str {
    STRINGS[(value & 0x03) as usize]
}

pub struct Handles {
    pub integers: Queue<u32>,
    pub strings: Queue<&'static str>,
    pub interrupts: InterruptController,
}

pub fn build(kernel: &Kernel, console: Arc<dyn Console>) -> Result<Handles, DemoError> {
    let integers: Queue<u32> = Queue::new(kernel, QUEUE_LENGTH)?;
    let strings: Queue<&'static str> = Queue::new(kernel, QUEUE_LENGTH)?;
    let interrupts = InterruptController::new(kernel);

    kernel.spawn(
        "IntGen",
        GENERATOR_PRIORITY,
        generator_task(
            kernel.clone(),
            integers.clone(),
            interrupts.clone(),
            Arc::clone(&console),
        ),
    )?;
    kernel.spawn(
        "String",
        PRINTER_PRIORITY,
        printer_task(strings.clone(), Arc::clone(&console)),
    )?;

    let (from, to) = (integers.clone(), strings.clone());
    interrupts.register_handler(INTERRUPT_NUMBER, move |isr| {
        let mut woken = WakeFlag::new();
        while let Ok(value) = from.receive_from_isr(&mut woken) {
            if to.send_from_isr(select_string(value), &mut woken).is_err() {
                log::warn!("string queue full, dropped value {value}");
            }
        }
        isr.yield_from_isr(woken);
    });
    console.print(&format!(
        "Interrupt handler set for interrupt number: {INTERRUPT_NUMBER}"
    ));

    Ok(Handles {
        integers,
        strings,
        interrupts,
    })
}

async fn generator_task(
    kernel: Kernel,
    integers: Queue<u32>,
    interrupts: InterruptController,
    console: Arc<dyn Console>,
) {
    let period = kernel.ms_to_ticks(PERIOD_MS).max(1);
    let mut last_wake = kernel.tick_count();
    let mut value: u32 = 0;
    loop {
        kernel.delay_until(&mut last_wake, period).await;
        for _ in 0..BATCH {
            if let Err(err) = integers.send_to_back(value, Timeout::Immediate).await {
                log::warn!("integer {value} not queued: {err}");
            }
            value = value.wrapping_add(1);
        }

        console.print("Generator task - About to generate an interrupt.");
        if let Err(err) = interrupts.raise(INTERRUPT_NUMBER).await {
            log::error!("generator stopping: {err}");
            return;
        }
        console.print("Generator task - Interrupt generated.");
    }
}

async fn printer_task(strings: Queue<&'static str>, console: Arc<dyn Console>) {
    loop {
        match strings.receive(Timeout::Forever).await {
            Ok(line) => console.print(line),
            Err(err) => {
                log::error!("printer stopping: {err}");
                return;
            }
        }
    }
}
