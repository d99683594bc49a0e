use sub20_usb::{
    find_devices, CharSize, Error, GpioPin, Parity, Result, StopBits, Sub20, UartConfig,
};

fn main() -> Result<()> {
    env_logger::init();

    let devices = find_devices()?;
    println!("Found {} SUB-20 board(s)", devices.len());
    let info = devices.first().ok_or(Error::DeviceNotFound)?;
    let device = Sub20::open(info)?;

    let config = UartConfig {
        rx_enable: true,
        tx_enable: true,
        char_size: CharSize::Eight,
        parity: Parity::None,
        stop_bits: StopBits::One,
        baud_divisor: 0x0133,
    };
    device.uart_apply(&config)?;
    println!(
        "UART enabled, reserved lines: 0x{:08X}",
        device.reserved_lines()
    );

    // GPIO access to the RX line is refused while the UART owns it
    let rx = GpioPin::new(10)?;
    match device.gpio_read(rx) {
        Err(e) => println!("Reading line {}: {}", rx, e),
        Ok(level) => println!("Line {} unexpectedly readable: {:?}", rx, level),
    }

    device.uart_disable()?;
    println!("UART disabled, line {} reads {:?}", rx, device.gpio_read(rx)?);
    Ok(())
}
