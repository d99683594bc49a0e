use std::{thread, time::Duration};
use sub20_usb::{
    gpio::{GpioLevel, GpioPin},
    Result, Sub20,
};

const BLINK_PIN_NUM: u8 = 3;

fn main() -> Result<()> {
    env_logger::init();
    println!("Opening first SUB-20 board...");
    let device = Sub20::open_first()?;
    println!("Board opened: {:?}", device);

    let blink_pin = GpioPin::new(BLINK_PIN_NUM)?;
    device.gpio_request(blink_pin, "blink")?;
    device.gpio_set_direction_output(blink_pin, GpioLevel::Low)?;

    println!("Blinking pin {} (Press Ctrl+C to stop)", blink_pin.number());
    loop {
        device.gpio_write(blink_pin, GpioLevel::High)?;
        thread::sleep(Duration::from_millis(250));
        device.gpio_write(blink_pin, GpioLevel::Low)?;
        thread::sleep(Duration::from_millis(250));
    }
}
