//! # blinky-board
//!
//! Side effects the blinky demo tasks trigger: an LED on a mock GPIO pin, a
//! mock UART with a receive buffer and a transmit log, and console sinks. None
//! of it is part of the coordination core; tasks reach it through the traits
//! below so tests can observe every effect.
//!
//! ## Module Overview
//! - [`gpio`]    – LED pin trait and mock pin.
//! - [`uart`]    – UART port trait and mock port.
//! - [`console`] – Line-oriented output sinks.

pub mod console;
pub mod error;
pub mod gpio;
pub mod uart;

pub use console::{Console, LogConsole, Transcript};
pub use error::{BoardError, BoardResult};
pub use gpio::{LedPin, Level, MockLed, LED1};
pub use uart::{MockUart, UartPort};
