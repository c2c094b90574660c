//! Queue shared by a periodic task and an auto-reload software timer.
//!
//! The send task posts [`VALUE_FROM_TASK`] every 200 ms, the timer posts
//! [`VALUE_FROM_TIMER`] every 2 s, and the higher-priority receive task
//! reports each value. Every send and receive toggles the LED.

use std::sync::Arc;

use blinky_board::{Console, LedPin, MockLed, LED1};
use blinky_rtos::{Kernel, Priority, Queue, Timeout, Timer};
use parking_lot::Mutex;

use crate::DemoError;

pub const QUEUE_LENGTH: usize = 2;
pub const VALUE_FROM_TASK: u32 = 100;
pub const VALUE_FROM_TIMER: u32 = 200;
pub const SEND_PERIOD_MS: u64 = 200;
pub const TIMER_PERIOD_MS: u64 = 2000;
pub const RECEIVE_PRIORITY: Priority = Priority(2);
pub const SEND_PRIORITY: Priority = Priority(1);

pub struct Handles {
    pub queue: Queue<u32>,
    pub timer: Timer,
    pub led: Arc<Mutex<MockLed>>,
}

pub fn build(kernel: &Kernel, console: Arc<dyn Console>) -> Result<Handles, DemoError> {
    let queue: Queue<u32> = Queue::new(kernel, QUEUE_LENGTH)?;
    let led = Arc::new(Mutex::new(MockLed::new(LED1)?));

    kernel.spawn(
        "Rx",
        RECEIVE_PRIORITY,
        receive_task(queue.clone(), Arc::clone(&led), Arc::clone(&console)),
    )?;
    kernel.spawn(
        "TX",
        SEND_PRIORITY,
        send_task(
            kernel.clone(),
            queue.clone(),
            Arc::clone(&led),
            Arc::clone(&console),
        ),
    )?;

    let timer = {
        let (queue, led, console) = (queue.clone(), Arc::clone(&led), Arc::clone(&console));
        Timer::new(
            kernel,
            "Timer",
            kernel.ms_to_ticks(TIMER_PERIOD_MS).max(1),
            true,
            move |_| {
                // Runs in the timer service: never block.
                if let Err(err) = queue.try_send(VALUE_FROM_TIMER) {
                    log::warn!("timer could not post: {err}");
                }
                toggle_led(&led, console.as_ref());
            },
        )?
    };
    timer.start(Timeout::Immediate)?;

    Ok(Handles { queue, timer, led })
}

async fn send_task(
    kernel: Kernel,
    queue: Queue<u32>,
    led: Arc<Mutex<MockLed>>,
    console: Arc<dyn Console>,
) {
    let period = kernel.ms_to_ticks(SEND_PERIOD_MS).max(1);
    let mut next_wake = kernel.tick_count();
    loop {
        kernel.delay_until(&mut next_wake, period).await;
        // The receiver drains the queue at higher priority, so a slot is
        // always free here.
        if let Err(err) = queue.send(VALUE_FROM_TASK, Timeout::Immediate).await {
            log::warn!("send task could not post: {err}");
        }
        toggle_led(&led, console.as_ref());
    }
}

async fn receive_task(queue: Queue<u32>, led: Arc<Mutex<MockLed>>, console: Arc<dyn Console>) {
    loop {
        let value = match queue.receive(Timeout::Forever).await {
            Ok(value) => value,
            Err(err) => {
                log::error!("receive task stopping: {err}");
                return;
            }
        };
        console.print(describe(value));
        toggle_led(&led, console.as_ref());
    }
}

/// Console line for a received value.
pub fn describe(value: u32) -> &'static str {
    match value {
        VALUE_FROM_TASK => "Message received from task",
        VALUE_FROM_TIMER => "Message received from software timer",
        _ => "Unexpected message",
    }
}

fn toggle_led(led: &Mutex<MockLed>, console: &dyn Console) {
    let toggled = led.lock().toggle();
    match toggled {
        Ok(level) if level.is_high() => console.print("LED toggled ON"),
        Ok(_) => console.print("LED toggled OFF"),
        Err(err) => log::warn!("LED toggle failed: {err}"),
    }
}
