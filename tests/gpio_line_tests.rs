//! GPIO line operations against a simulated board.

mod common;

use common::attach;
use sub20_usb::{
    protocol, Error, GpioChip, GpioDirection, GpioLevel, GpioPin, LineClaim, Packet, Payload,
    UsbFault,
};

fn pin(n: u8) -> GpioPin {
    GpioPin::new(n).unwrap()
}

#[test]
fn test_configure_replaces_direction_cache() {
    let t = attach();
    // Another host left lines 0 and 31 as outputs
    t.sim.with(|s| s.config = 0x8000_0001);

    let word = t.board.gpio_configure(0x0000_0030, 0x0000_0010).unwrap();
    assert_eq!(word, 0x8000_0011);
    assert_eq!(t.board.gpio_direction_mask(), 0x8000_0011);

    for (line, expected) in [
        (0, GpioDirection::Output),
        (4, GpioDirection::Output),
        (5, GpioDirection::Input),
        (31, GpioDirection::Output),
    ] {
        assert_eq!(t.board.gpio_get_direction(pin(line)), expected, "line {line}");
    }
}

#[test]
fn test_get_direction_never_touches_device() {
    let t = attach();
    t.board.gpio_get_direction(pin(3));
    GpioChip::get_direction(&t.board, 3).unwrap();
    assert!(t.sim.requests().is_empty());
}

#[test]
fn test_direction_input_and_output_requests() {
    let t = attach();
    t.board.gpio_set_direction_input(pin(7)).unwrap();
    t.board
        .gpio_set_direction_output(pin(5), GpioLevel::High)
        .unwrap();

    assert_eq!(
        t.sim.requests(),
        vec![
            Packet::gpio_request(protocol::CMD_GPIO_CONFIG, 1 << 7, 0),
            Packet::gpio_request(protocol::CMD_GPIO_CONFIG, 1 << 5, 1 << 5),
            Packet::gpio_request(protocol::CMD_GPIO_WRITE, 1 << 5, 1 << 5),
        ]
    );
    assert_eq!(t.board.gpio_get_direction(pin(5)), GpioDirection::Output);
    assert_eq!(t.board.gpio_get_direction(pin(7)), GpioDirection::Input);
}

#[test]
fn test_write_then_read_output_line() {
    let t = attach();
    for line in [0u8, 5, 17, 31] {
        t.board
            .gpio_set_direction_output(pin(line), GpioLevel::Low)
            .unwrap();
        t.board.gpio_write(pin(line), GpioLevel::High).unwrap();
        assert_eq!(t.board.gpio_read(pin(line)).unwrap(), GpioLevel::High);
        t.board.gpio_write(pin(line), GpioLevel::Low).unwrap();
        assert_eq!(t.board.gpio_read(pin(line)).unwrap(), GpioLevel::Low);
    }
}

#[test]
fn test_read_ignores_direction_cache() {
    let t = attach();
    t.sim.with(|s| s.inputs = 1 << 9);
    assert_eq!(t.board.gpio_read(pin(9)).unwrap(), GpioLevel::High);
    assert_eq!(t.board.gpio_read(pin(8)).unwrap(), GpioLevel::Low);
    assert_eq!(
        t.sim.requests()[0].payload,
        Payload::GpioRequest {
            mask: 1 << 9,
            value: 0
        }
    );
}

#[test]
fn test_write_shifts_value_to_line() {
    let t = attach();
    t.board.gpio_write(pin(20), GpioLevel::High).unwrap();
    t.board.gpio_write(pin(20), GpioLevel::Low).unwrap();
    assert_eq!(
        t.sim.requests(),
        vec![
            Packet::gpio_request(protocol::CMD_GPIO_WRITE, 1 << 20, 1 << 20),
            Packet::gpio_request(protocol::CMD_GPIO_WRITE, 1 << 20, 0),
        ]
    );
}

#[test]
fn test_masked_operations() {
    let t = attach();
    t.board.gpio_configure(0x0000_00FF, 0x0000_00FF).unwrap();
    t.board.gpio_write_masked(0x0000_000F, 0x0000_00A5).unwrap();
    assert_eq!(t.board.gpio_read_masked(0x0000_00FF).unwrap(), 0x0000_0005);

    // An empty mask is not sent
    t.sim.clear_log();
    t.board.gpio_write_masked(0, u32::MAX).unwrap();
    assert!(t.sim.requests().is_empty());
}

#[test]
fn test_failed_configure_keeps_cache() {
    let t = attach();
    t.board.gpio_configure(0x1, 0x1).unwrap();
    t.sim.with(|s| s.fail_next_read = Some(UsbFault::Timeout));
    assert!(t.board.gpio_set_direction_input(pin(0)).is_err());
    assert_eq!(t.board.gpio_get_direction(pin(0)), GpioDirection::Output);
}

#[test]
fn test_uart_lines_refused_before_io() {
    let t = attach();
    t.board.uart_enable().unwrap();
    t.sim.clear_log();

    match t.board.gpio_set_direction_output(pin(10), GpioLevel::High) {
        Err(Error::ReservationConflict { line, owner }) => {
            assert_eq!(line.number(), 10);
            assert_eq!(owner, "sub20-uart");
        }
        other => panic!("Expected ReservationConflict, got: {:?}", other),
    }
    assert!(t.board.gpio_read(pin(10)).is_err());
    assert!(t.board.gpio_write_masked(0x0000_0C00, 0).is_err());
    assert!(t.sim.requests().is_empty());

    // Line 11 is not used by RX-only operation
    t.board.gpio_read(pin(11)).unwrap();
}

#[test]
fn test_gpio_chip_interface() {
    let t = attach();
    assert_eq!(t.board.label(), "SUB-20 GPIO");
    assert_eq!(t.board.ngpio(), 32);
    assert!(t.board.can_sleep());
    assert_eq!(t.board.base(), None);

    t.board.direction_output(3, true).unwrap();
    assert_eq!(
        GpioChip::get_direction(&t.board, 3).unwrap(),
        GpioDirection::Output
    );
    assert!(t.board.get(3).unwrap());
    t.board.set(3, false);
    assert!(!t.board.get(3).unwrap());
    t.board.direction_input(3).unwrap();
    assert_eq!(
        GpioChip::get_direction(&t.board, 3).unwrap(),
        GpioDirection::Input
    );

    assert!(matches!(
        t.board.direction_input(32),
        Err(Error::PinArgumentOutOfRange { pin: 32, .. })
    ));
}

#[test]
fn test_gpio_chip_set_swallows_errors() {
    let t = attach();
    t.sim.with(|s| s.fail_next_write = Some(UsbFault::Timeout));
    // Must not panic or propagate
    t.board.set(4, true);
    t.board.set(40, true);
    assert!(t.sim.requests().is_empty());
}

#[test]
fn test_consumer_line_requests() {
    let t = attach();
    t.board.gpio_request(pin(4), "led").unwrap();
    assert!(matches!(
        t.board.gpio_request(pin(4), "button"),
        Err(Error::ReservationConflict { .. })
    ));
    // Only the holder can give the line back
    match t.board.gpio_free(pin(4), "button") {
        Err(Error::ReservationConflict { owner, .. }) => assert_eq!(owner, "led"),
        other => panic!("Expected ReservationConflict, got: {:?}", other),
    }
    assert_eq!(t.claims.registry.owner(pin(4)).as_deref(), Some("led"));

    t.board.gpio_free(pin(4), "led").unwrap();
    t.board.gpio_request(pin(4), "button").unwrap();
    assert_eq!(t.claims.registry.owner(pin(4)).as_deref(), Some("button"));
}

#[test]
fn test_free_of_unclaimed_or_uart_line() {
    let t = attach();
    t.board.gpio_free(pin(6), "led").unwrap();
    assert!(t.claims.calls().is_empty());

    t.board.uart_enable().unwrap();
    assert!(matches!(
        t.board.gpio_free(pin(10), "sub20-uart"),
        Err(Error::ReservationConflict { .. })
    ));
    assert_eq!(t.board.reserved_lines(), protocol::RS232_RXD_TTL);
}
