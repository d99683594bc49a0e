//! # sub20-usb
//!
//! A Rust crate for controlling the 32 GPIO lines and the UART function of a
//! Dimax SUB-20 multi-function USB board from the host.
//!
//! This crate uses the `nusb` crate for USB bulk transfers. Every operation is
//! one request/response exchange on the board's bulk endpoint pair (OUT 0x01,
//! IN 0x82), bounded by a 100 ms timeout.
//!
//! ## Features
//!
//! *   Board discovery (`find_devices`) and opening (`Sub20::open`, `open_first`,
//!     `open_by_serial`, `open_by_index`).
//! *   Raw request/response exchanges (`Sub20::transact`) with typed payloads.
//! *   GPIO control (lines 0-31):
//!     *   Strongly-typed `GpioPin` struct.
//!     *   Setting pin direction; getting it from the board's direction cache.
//!     *   Reading/Writing pin levels, single and masked.
//!     *   A `GpioChip` trait for plugging the board into a GPIO framework.
//! *   UART function control (`uart_enable`, `uart_disable`, `uart_configure`,
//!     `uart_apply`), with automatic reservation of lines 10 (RXD) and 11 (TXD).
//! *   Line ownership between generic consumers (`gpio_request`/`gpio_free`)
//!     and the UART function.
//!
//! ## Concurrency
//!
//! [`Sub20`] is `Sync`. Exchanges are serialized on one lock held for the whole
//! send and receive, so concurrent callers never interleave on the wire. There
//! is no cancellation: an exchange runs until it completes or times out.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use sub20_usb::{GpioLevel, GpioPin, Result, Sub20};
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     let board = Sub20::open_first()?;
//!
//!     let pin = GpioPin::new(3)?;
//!     board.gpio_set_direction_output(pin, GpioLevel::High)?;
//!     println!("Pin {} reads {:?}", pin.number(), board.gpio_read(pin)?);
//!
//!     // Lines 10 and 11 now belong to the UART
//!     board.uart_enable()?;
//!     board.uart_disable()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **Linux udev Rules:** Grant user permission to the USB device. Create `/etc/udev/rules.d/99-sub20.rules`:
//!     ```udev
//!     SUBSYSTEM=="usb", ATTRS{idVendor}=="04d8", ATTRS{idProduct}=="ffc3", MODE="0666", GROUP="plugdev"
//!     ```
//!     Reload: `sudo udevadm control --reload-rules && sudo udevadm trigger`
//! *   **Kernel driver:** If a kernel driver is bound to the board it is detached when the interface is claimed.
//!
//! ## License
//!
//! This project is licensed under the WTFPL.

mod consts;
mod device;
mod error;
pub mod gpio; // Keep gpio public for its enums/structs
pub mod packet;
pub mod reservation;
mod transport;
pub mod uart;

pub use device::{find_devices, BoardConfig, PeripheralHost, Sub20, Sub20DeviceInfo};
pub use error::{Error, Result, TransferStage, UsbFault};
pub use gpio::{GpioChip, GpioDirection, GpioLevel, GpioPin};
pub use packet::{Packet, Payload, PayloadKind};
pub use reservation::{LineClaim, LineRegistry};
pub use transport::{NusbTransport, Transport};
pub use uart::{CharSize, Parity, StopBits, UartConfig};
// Re-export only essential public constants
pub use consts::{IN_EP, OUT_EP, SUB20_PID, SUB20_VID, USB_TIMEOUT};

/// Protocol constants needed to build raw requests for [`Sub20::transact`].
pub mod protocol {
    /// Command codes.
    pub use crate::consts::packet::{
        CMD_GPIO_CONFIG, CMD_GPIO_READ, CMD_GPIO_WRITE, CMD_UART_CONFIG, MAX_PAYLOAD,
        RESPONSE_FLOOR,
    };
    /// UART flag bits.
    pub mod uart {
        pub use crate::consts::uart::{
            CHAR_5, CHAR_6, CHAR_7, CHAR_8, CHAR_9, PARITY_EVEN, PARITY_NONE, PARITY_ODD,
            RX_ENABLE, STOP_1, STOP_2, TX_ENABLE,
        };
    }
    /// Lines shared with the UART function.
    pub use crate::consts::gpio::{RS232_RXD_TTL, RS232_TXD_TTL, UART_LINES};
}
