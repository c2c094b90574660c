//! UART abstraction

use std::collections::VecDeque;

use crate::error::{BoardError, BoardResult};

/// UART peripheral trait
pub trait UartPort: Send {
    /// Write data, returning the number of bytes accepted
    fn write(&mut self, data: &[u8]) -> BoardResult<usize>;

    /// Read one frame into `buffer`.
    ///
    /// A frame ends at a `'\n'` (consumed, not copied) or when `buffer` is
    /// full. Fails with `RxEmpty` when nothing has been received.
    fn read(&mut self, buffer: &mut [u8]) -> BoardResult<usize>;

    /// Bytes available in RX buffer
    fn available(&self) -> usize;
}

/// Loopback-free mock port: the test side injects RX bytes and inspects
/// everything the firmware side wrote.
#[derive(Debug, Default)]
pub struct MockUart {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl MockUart {
    pub fn new() -> Self {
        log::debug!("UART initialized");
        Self::default()
    }

    /// Queues bytes as if they arrived on the RX line.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Everything written so far.
    pub fn tx_log(&self) -> &[u8] {
        &self.tx
    }

    pub fn clear_tx(&mut self) {
        self.tx.clear();
    }
}

impl UartPort for MockUart {
    fn write(&mut self, data: &[u8]) -> BoardResult<usize> {
        self.tx.extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&mut self, buffer: &mut [u8]) -> BoardResult<usize> {
        if self.rx.is_empty() {
            return Err(BoardError::RxEmpty);
        }
        let mut len = 0;
        while len < buffer.len() {
            match self.rx.pop_front() {
                Some(b'\n') | None => break,
                Some(byte) => {
                    buffer[len] = byte;
                    len += 1;
                }
            }
        }
        Ok(len)
    }

    fn available(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_one_frame_at_a_time() {
        let mut uart = MockUart::new();
        uart.inject(b"BLINK OFF\nBLINK ON\n");

        let mut buf = [0u8; 32];
        let len = uart.read(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"BLINK OFF");
        let len = uart.read(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"BLINK ON");
        assert_eq!(uart.read(&mut buf), Err(BoardError::RxEmpty));
    }

    #[test]
    fn short_buffer_splits_a_frame() {
        let mut uart = MockUart::new();
        uart.inject(b"ABCDE");

        let mut buf = [0u8; 3];
        assert_eq!(uart.read(&mut buf), Ok(3));
        assert_eq!(uart.available(), 2);
        assert_eq!(uart.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"DE");
    }

    #[test]
    fn writes_are_logged() {
        let mut uart = MockUart::new();
        assert_eq!(uart.write(b"hi "), Ok(3));
        uart.write(b"there").unwrap();
        assert_eq!(uart.tx_log(), b"hi there");
        uart.clear_tx();
        assert!(uart.tx_log().is_empty());
    }
}
