//! # blinky-demos
//!
//! The blinky demo programs, each a handful of worker tasks built on the
//! `blinky-rtos` primitives and the `blinky-board` mock peripherals.
//!
//! ## Module Overview
//! - [`queue_timer`]        – Queue fed by a periodic task and a software timer.
//! - [`deferred_semaphore`] – Interrupt deferred to a handler task through a
//!   binary semaphore.
//! - [`integer_strings`]    – Interrupt handler translating integers into
//!   strings between two queues.
//! - [`uart_command`]       – UART receive interrupt driving LED commands.
//! - [`sender_receiver`]    – Two senders keeping a queue full for a
//!   lower-priority receiver.

pub mod deferred_semaphore;
pub mod integer_strings;
pub mod queue_timer;
pub mod sender_receiver;
pub mod uart_command;

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use blinky_board::{BoardError, Console};
use blinky_rtos::{Kernel, KernelConfig, KernelError, Tick};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemoError {
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("primitive error: {0}")]
    Rtos(#[from] blinky_rtos::Error),
    #[error("board error: {0}")]
    Board(#[from] BoardError),
}

/// The demo programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Demo {
    QueueTimer,
    DeferredSemaphore,
    IntegerStrings,
    UartCommand,
    SenderReceiver,
}

impl Demo {
    pub const ALL: [Demo; 5] = [
        Demo::QueueTimer,
        Demo::DeferredSemaphore,
        Demo::IntegerStrings,
        Demo::UartCommand,
        Demo::SenderReceiver,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Demo::QueueTimer => "queue-timer",
            Demo::DeferredSemaphore => "deferred-semaphore",
            Demo::IntegerStrings => "integer-strings",
            Demo::UartCommand => "uart-command",
            Demo::SenderReceiver => "sender-receiver",
        }
    }

    /// Creates the demo's primitives and tasks on `kernel`.
    pub fn install(
        self,
        kernel: &Kernel,
        console: Arc<dyn Console>,
        idle: &IdleCounter,
    ) -> Result<(), DemoError> {
        match self {
            Demo::QueueTimer => queue_timer::build(kernel, console).map(drop),
            Demo::DeferredSemaphore => deferred_semaphore::build(kernel, console).map(drop),
            Demo::IntegerStrings => integer_strings::build(kernel, console).map(drop),
            Demo::UartCommand => {
                uart_command::build(kernel, console, uart_command::SCRIPT).map(drop)
            }
            Demo::SenderReceiver => sender_receiver::build(kernel, console, idle).map(drop),
        }
    }
}

impl fmt::Display for Demo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts how often the kernel found nothing to run.
#[derive(Debug, Clone, Default)]
pub struct IdleCounter {
    entries: Arc<AtomicU64>,
}

impl IdleCounter {
    /// Hook for [`blinky_rtos::KernelBuilder::idle_hook`].
    pub fn hook(&self) -> impl Fn() + Send + Sync + 'static {
        let entries = Arc::clone(&self.entries);
        move || {
            entries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }
}

/// What a finished run looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub ticks: Tick,
    pub tasks: usize,
    pub idle_entries: u64,
}

/// Runs `demo` on a fresh kernel for `ms` milliseconds of virtual time, then
/// shuts the kernel down.
pub fn run(
    demo: Demo,
    config: KernelConfig,
    ms: u64,
    console: Arc<dyn Console>,
) -> Result<Summary, DemoError> {
    let idle = IdleCounter::default();
    let kernel = Kernel::with_config(config).idle_hook(idle.hook()).build()?;
    demo.install(&kernel, console, &idle)?;

    log::info!("running {demo} for {ms} ms");
    let result = kernel.run_for(kernel.ms_to_ticks(ms));
    let summary = Summary {
        ticks: kernel.tick_count(),
        tasks: kernel.task_count(),
        idle_entries: idle.count(),
    };
    kernel.shutdown();
    result?;
    Ok(summary)
}
