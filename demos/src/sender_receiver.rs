//! Two senders keeping a queue full for a lower-priority receiver.
//!
//! Both senders outrank the receiver, so it only runs once both are blocked
//! on a full queue. Each item it removes unblocks a sender, which refills the
//! slot before the receiver continues: the receiver should always find the
//! queue full.

use std::sync::Arc;

use blinky_board::Console;
use blinky_rtos::{Kernel, Priority, Queue, Timeout, Timer};

use crate::{DemoError, IdleCounter};

pub const QUEUE_LENGTH: usize = 3;
pub const SEND_TIMEOUT_MS: u64 = 100;
pub const TIMER_PERIOD_MS: u64 = 500;
pub const SENDER_PRIORITY: Priority = Priority(2);
pub const RECEIVER_PRIORITY: Priority = Priority(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Sender1,
    Sender2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Data {
    pub value: i32,
    pub source: Source,
}

pub const SENDER1_DATA: Data = Data {
    value: 100,
    source: Source::Sender1,
};
pub const SENDER2_DATA: Data = Data {
    value: 200,
    source: Source::Sender2,
};

pub struct Handles {
    pub queue: Queue<Data>,
    pub timer: Timer,
}

pub fn build(
    kernel: &Kernel,
    console: Arc<dyn Console>,
    idle: &IdleCounter,
) -> Result<Handles, DemoError> {
    let timer = {
        let (console, idle) = (Arc::clone(&console), idle.clone());
        Timer::new(
            kernel,
            "AutoReload",
            kernel.ms_to_ticks(TIMER_PERIOD_MS).max(1),
            true,
            move |_| {
                console.print("Auto-reload timer callback executing");
                log::debug!("idle entries so far: {}", idle.count());
            },
        )?
    };
    let queue: Queue<Data> = Queue::new(kernel, QUEUE_LENGTH)?;
    timer.start(Timeout::Immediate)?;

    let send_timeout = Timeout::Ticks(kernel.ms_to_ticks(SEND_TIMEOUT_MS).max(1));
    for (name, data) in [("Sender1", SENDER1_DATA), ("Sender2", SENDER2_DATA)] {
        kernel.spawn(
            name,
            SENDER_PRIORITY,
            sender_task(queue.clone(), data, send_timeout, Arc::clone(&console)),
        )?;
    }
    kernel.spawn(
        "Receiver",
        RECEIVER_PRIORITY,
        receiver_task(kernel.clone(), queue.clone(), console),
    )?;

    Ok(Handles { queue, timer })
}

async fn sender_task(queue: Queue<Data>, data: Data, timeout: Timeout, console: Arc<dyn Console>) {
    loop {
        match queue.send_to_back(data, timeout).await {
            Ok(()) => {}
            Err(blinky_rtos::Error::Timeout) => console.print("Could not send to the queue."),
            Err(err) => {
                log::error!("sender stopping: {err}");
                return;
            }
        }
    }
}

async fn receiver_task(kernel: Kernel, queue: Queue<Data>, console: Arc<dyn Console>) {
    loop {
        if queue.count() != QUEUE_LENGTH {
            console.print("Queue should always be full based on prio!");
        }
        match queue.receive(Timeout::Immediate).await {
            Ok(data) => console.print(&describe(data)),
            Err(_) => {
                console.print("Could not receive from the queue.");
                // Nothing to do until a sender runs again.
                kernel.yield_now().await;
            }
        }
    }
}

pub fn describe(data: Data) -> String {
    match data.source {
        Source::Sender1 => format!("From Sender 1 = {}", data.value),
        Source::Sender2 => format!("From Sender 2 = {}", data.value),
    }
}
