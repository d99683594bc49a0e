//! Internal constants, endpoint addresses, command codes and bit definitions.

use std::time::Duration;

// Default Vendor/Product IDs
/// Dimax SUB-20 vendor ID (registered under Microchip).
pub const SUB20_VID: u16 = 0x04D8;
/// Dimax SUB-20 product ID.
pub const SUB20_PID: u16 = 0xFFC3;

// --- USB ---
/// Interface carrying the bulk endpoint pair.
pub const INTERFACE: u8 = 0;
/// Bulk OUT endpoint (host -> device).
pub const OUT_EP: u8 = 0x01;
/// Bulk IN endpoint (device -> host).
pub const IN_EP: u8 = 0x82;
/// Bound applied to every bulk write and bulk read.
pub const USB_TIMEOUT: Duration = Duration::from_millis(100);

// --- Packet layout ---
pub mod packet {
    /// Full size of a frame buffer on the device side.
    pub const PACKET_SIZE: usize = 256;
    /// total_size(1) + code(1) + payload_size(1)
    pub const HEADER_LEN: usize = 3;
    /// Overhead counted by the total_size byte (code + payload_size).
    pub const SIZE_OVERHEAD: usize = 2;
    /// Largest payload a frame can carry.
    pub const MAX_PAYLOAD: usize = PACKET_SIZE - HEADER_LEN;
    /// The device always answers with at least one full-speed packet.
    pub const RESPONSE_FLOOR: usize = 64;

    // Command codes
    pub const CMD_GPIO_CONFIG: u8 = 0x60;
    pub const CMD_GPIO_READ: u8 = 0x61;
    pub const CMD_GPIO_WRITE: u8 = 0x62;
    pub const CMD_UART_CONFIG: u8 = 0x68;
}

// --- GPIO ---
pub mod gpio {
    pub const LINE_COUNT: u8 = 32;
    pub const DEFAULT_LABEL: &str = "SUB-20 GPIO";

    // Alternate functions sharing the GPIO lines
    pub const RS232_RXD_TTL: u32 = 1 << 10;
    pub const RS232_TXD_TTL: u32 = 1 << 11;
    /// Lines repurposed by the UART function.
    pub const UART_LINES: u32 = RS232_RXD_TTL | RS232_TXD_TTL;
}

// --- UART (UCSRA-style flags byte) ---
pub mod uart {
    pub const DEFAULT_LABEL: &str = "sub20-uart";

    pub const RX_ENABLE: u8 = 0x80;
    pub const TX_ENABLE: u8 = 0x40;

    pub const CHAR_5: u8 = 0;
    pub const CHAR_6: u8 = 2;
    pub const CHAR_7: u8 = 4;
    pub const CHAR_8: u8 = 6;
    pub const CHAR_9: u8 = 7;
    pub const CHAR_MASK: u8 = 0x07;

    pub const PARITY_NONE: u8 = 0;
    pub const PARITY_EVEN: u8 = 0x20;
    pub const PARITY_ODD: u8 = 0x30;
    pub const PARITY_MASK: u8 = 0x30;

    pub const STOP_1: u8 = 0;
    pub const STOP_2: u8 = 0x08;
    pub const STOP_MASK: u8 = 0x08;
}
