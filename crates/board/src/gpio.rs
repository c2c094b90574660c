//! GPIO LED abstraction

use crate::error::{BoardError, BoardResult};

/// Pin wired to the board's user LED.
pub const LED1: u32 = 1;

/// Highest pin number the mock board exposes.
pub const MAX_PIN: u32 = 31;

/// GPIO pin levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    /// Low level (LED off)
    #[default]
    Low,
    /// High level (LED on)
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// Output pin driving an LED
pub trait LedPin: Send {
    /// Read current level
    fn read(&self) -> Level;

    /// Write level
    fn write(&mut self, level: Level) -> BoardResult<()>;

    /// Toggle output, returning the new level
    fn toggle(&mut self) -> BoardResult<Level> {
        let next = match self.read() {
            Level::Low => Level::High,
            Level::High => Level::Low,
        };
        self.write(next)?;
        Ok(next)
    }

    /// Get pin number
    fn pin_number(&self) -> u32;
}

/// In-memory LED pin that counts level changes.
#[derive(Debug)]
pub struct MockLed {
    pin: u32,
    level: Level,
    toggles: u32,
}

impl MockLed {
    pub fn new(pin: u32) -> BoardResult<Self> {
        if pin > MAX_PIN {
            return Err(BoardError::InvalidPin(pin));
        }
        log::debug!("GPIO {pin} initialized");
        Ok(Self {
            pin,
            level: Level::Low,
            toggles: 0,
        })
    }

    /// Number of writes that changed the level.
    pub fn toggle_count(&self) -> u32 {
        self.toggles
    }
}

impl LedPin for MockLed {
    fn read(&self) -> Level {
        self.level
    }

    fn write(&mut self, level: Level) -> BoardResult<()> {
        if level != self.level {
            self.toggles += 1;
        }
        self.level = level;
        Ok(())
    }

    fn pin_number(&self) -> u32 {
        self.pin
    }
}
