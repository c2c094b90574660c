//! Common error types for mock peripheral operations

use thiserror::Error;

/// Board operation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// Pin number outside of the board's GPIO range
    #[error("invalid GPIO pin {0}")]
    InvalidPin(u32),
    /// Read attempted with nothing in the UART receive buffer
    #[error("UART receive buffer is empty")]
    RxEmpty,
}

/// Result type for board operations
pub type BoardResult<T> = Result<T, BoardError>;
