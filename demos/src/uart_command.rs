//! LED blinking controlled over a mock UART.
//!
//! The UART receive interrupt gives a semaphore; the UART task wakes, reads
//! every pending frame, echoes it and applies `BLINK ON` / `BLINK OFF`. The
//! blink task toggles the LED every 500 ms while blinking is enabled. A
//! ground-station task plays the other end of the line from a script.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blinky_board::{Console, LedPin, MockLed, MockUart, UartPort, LED1};
use blinky_rtos::{
    BinarySemaphore, InterruptController, InterruptNumber, Kernel, Priority, Timeout, WakeFlag,
};
use parking_lot::Mutex;

use crate::DemoError;

pub const UART_INTERRUPT: InterruptNumber = 41;
pub const BLINK_PERIOD_MS: u64 = 500;
pub const BUFFER_SIZE: usize = 128;
pub const BLINK_PRIORITY: Priority = Priority(1);
pub const UART_PRIORITY: Priority = Priority(2);
pub const GROUND_PRIORITY: Priority = Priority(1);

/// Ground-station script: wait this many milliseconds, then transmit.
pub const SCRIPT: &[(u64, &str)] = &[(1200, "BLINK OFF"), (1500, "BLINK ON"), (900, "PING")];

/// Parsed UART command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    BlinkOn,
    BlinkOff,
}

impl Command {
    pub fn parse(frame: &str) -> Option<Self> {
        match frame.trim() {
            "BLINK ON" => Some(Command::BlinkOn),
            "BLINK OFF" => Some(Command::BlinkOff),
            _ => None,
        }
    }
}

pub struct Handles {
    pub led: Arc<Mutex<MockLed>>,
    pub uart: Arc<Mutex<MockUart>>,
    pub blinking: Arc<AtomicBool>,
    pub semaphore: BinarySemaphore,
    pub interrupts: InterruptController,
}

/// Builds the demo. `script` drives the ground-station task; an empty script
/// leaves the line idle so a test can inject frames itself.
pub fn build(
    kernel: &Kernel,
    console: Arc<dyn Console>,
    script: &'static [(u64, &'static str)],
) -> Result<Handles, DemoError> {
    let led = Arc::new(Mutex::new(MockLed::new(LED1)?));
    console.print(&format!("GPIO {LED1} initialized."));
    let uart = Arc::new(Mutex::new(MockUart::new()));
    console.print("UART initialized.");

    let semaphore = BinarySemaphore::new(kernel);
    let interrupts = InterruptController::new(kernel);
    let sem = semaphore.clone();
    interrupts.register_handler(UART_INTERRUPT, move |isr| {
        let mut woken = WakeFlag::new();
        sem.give_from_isr(&mut woken);
        isr.yield_from_isr(woken);
    });
    console.print("UART interrupt handler set.");

    let blinking = Arc::new(AtomicBool::new(true));

    kernel.spawn(
        "Blinky",
        BLINK_PRIORITY,
        blink_task(
            kernel.clone(),
            Arc::clone(&led),
            Arc::clone(&blinking),
            Arc::clone(&console),
        ),
    )?;
    kernel.spawn(
        "UART",
        UART_PRIORITY,
        uart_task(
            semaphore.clone(),
            Arc::clone(&uart),
            Arc::clone(&blinking),
            Arc::clone(&console),
        ),
    )?;
    if !script.is_empty() {
        kernel.spawn(
            "Ground",
            GROUND_PRIORITY,
            ground_station(kernel.clone(), Arc::clone(&uart), interrupts.clone(), script),
        )?;
    }

    Ok(Handles {
        led,
        uart,
        blinking,
        semaphore,
        interrupts,
    })
}

async fn blink_task(
    kernel: Kernel,
    led: Arc<Mutex<MockLed>>,
    blinking: Arc<AtomicBool>,
    console: Arc<dyn Console>,
) {
    let delay = kernel.ms_to_ticks(BLINK_PERIOD_MS);
    loop {
        if blinking.load(Ordering::Acquire) {
            let toggled = led.lock().toggle();
            match toggled {
                Ok(level) => {
                    console.print(&format!("GPIO {LED1} toggled to {}.", u8::from(level.is_high())))
                }
                Err(err) => log::warn!("LED toggle failed: {err}"),
            }
        }
        kernel.delay(delay).await;
    }
}

async fn uart_task(
    semaphore: BinarySemaphore,
    uart: Arc<Mutex<MockUart>>,
    blinking: Arc<AtomicBool>,
    console: Arc<dyn Console>,
) {
    loop {
        if let Err(err) = semaphore.take(Timeout::Forever).await {
            log::error!("UART task stopping: {err}");
            return;
        }
        // Gives do not accumulate, so one wake may cover several frames.
        while let Some(frame) = read_frame(&uart) {
            console.print(&format!("UART write: {frame}"));
            match Command::parse(&frame) {
                Some(Command::BlinkOn) => blinking.store(true, Ordering::Release),
                Some(Command::BlinkOff) => blinking.store(false, Ordering::Release),
                None => log::info!("ignoring UART frame {frame:?}"),
            }
        }
    }
}

/// Reads and echoes one frame; `None` once the receive buffer is drained.
fn read_frame(uart: &Mutex<MockUart>) -> Option<String> {
    let mut uart = uart.lock();
    let mut buffer = [0u8; BUFFER_SIZE];
    let len = uart.read(&mut buffer).ok()?;
    if let Err(err) = uart.write(&buffer[..len]) {
        log::warn!("UART echo failed: {err}");
    }
    Some(String::from_utf8_lossy(&buffer[..len]).into_owned())
}

async fn ground_station(
    kernel: Kernel,
    uart: Arc<Mutex<MockUart>>,
    interrupts: InterruptController,
    script: &'static [(u64, &'static str)],
) {
    for &(wait_ms, command) in script {
        kernel.delay(kernel.ms_to_ticks(wait_ms)).await;
        log::debug!("ground station sends {command:?}");
        uart.lock().inject(format!("{command}\n").as_bytes());
        if let Err(err) = interrupts.raise(UART_INTERRUPT).await {
            log::error!("ground station stopping: {err}");
            return;
        }
    }
}
