//! Peripherals used through their traits, the way demo tasks hold them.

use blinky_board::{BoardError, LedPin, Level, MockLed, MockUart, UartPort, LED1};

#[test]
fn led_behind_trait_object() {
    let mut led: Box<dyn LedPin> = Box::new(MockLed::new(LED1).unwrap());
    assert_eq!(led.pin_number(), 1);
    assert_eq!(led.toggle().unwrap(), Level::High);
    assert!(led.read().is_high());
}

#[test]
fn uart_echo_round_trip() {
    let mut uart = MockUart::new();
    uart.inject(b"BLINK ON\n");

    let mut buf = [0u8; 128];
    let len = uart.read(&mut buf).unwrap();
    uart.write(&buf[..len]).unwrap();

    assert_eq!(uart.tx_log(), b"BLINK ON");
    assert_eq!(uart.available(), 0);
    assert_eq!(uart.read(&mut buf), Err(BoardError::RxEmpty));
}
