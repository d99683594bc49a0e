//! UART function of the board.
//!
//! The UART shares lines 10 (RXD) and 11 (TXD) with the GPIO controller.
//! Enabling a direction reserves its line; disabling releases it. The
//! reservation is made before the device is told anything, so a line held by
//! a GPIO consumer makes the whole reconfiguration fail without I/O.

use crate::consts;
use crate::consts::packet::CMD_UART_CONFIG;
use crate::device::Sub20;
use crate::error::Result;
use crate::packet::{Payload, PayloadKind};
use crate::transport::Transport;
use log::{debug, warn};

/// Character size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharSize {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
    Nine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl CharSize {
    fn bits(self) -> u8 {
        match self {
            CharSize::Five => consts::uart::CHAR_5,
            CharSize::Six => consts::uart::CHAR_6,
            CharSize::Seven => consts::uart::CHAR_7,
            CharSize::Eight => consts::uart::CHAR_8,
            CharSize::Nine => consts::uart::CHAR_9,
        }
    }

    fn from_bits(flags: u8) -> Self {
        match flags & consts::uart::CHAR_MASK {
            consts::uart::CHAR_5 => CharSize::Five,
            consts::uart::CHAR_6 => CharSize::Six,
            consts::uart::CHAR_7 => CharSize::Seven,
            consts::uart::CHAR_9 => CharSize::Nine,
            _ => CharSize::Eight,
        }
    }
}

impl Parity {
    fn bits(self) -> u8 {
        match self {
            Parity::None => consts::uart::PARITY_NONE,
            Parity::Even => consts::uart::PARITY_EVEN,
            Parity::Odd => consts::uart::PARITY_ODD,
        }
    }

    fn from_bits(flags: u8) -> Self {
        match flags & consts::uart::PARITY_MASK {
            consts::uart::PARITY_EVEN => Parity::Even,
            consts::uart::PARITY_ODD => Parity::Odd,
            _ => Parity::None,
        }
    }
}

/// Frame format and enable state of the UART function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UartConfig {
    pub rx_enable: bool,
    pub tx_enable: bool,
    pub char_size: CharSize,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Raw baud rate divisor as understood by the board firmware.
    pub baud_divisor: u16,
}

impl UartConfig {
    /// Encodes the flags byte of a UART-config packet.
    pub fn flags(&self) -> u8 {
        let mut flags = self.char_size.bits() | self.parity.bits();
        if self.stop_bits == StopBits::Two {
            flags |= consts::uart::STOP_2;
        }
        if self.rx_enable {
            flags |= consts::uart::RX_ENABLE;
        }
        if self.tx_enable {
            flags |= consts::uart::TX_ENABLE;
        }
        flags
    }

    /// Decodes a flags byte and divisor.
    pub fn from_flags(flags: u8, baud_divisor: u16) -> Self {
        UartConfig {
            rx_enable: flags & consts::uart::RX_ENABLE != 0,
            tx_enable: flags & consts::uart::TX_ENABLE != 0,
            char_size: CharSize::from_bits(flags),
            parity: Parity::from_bits(flags),
            stop_bits: if flags & consts::uart::STOP_MASK != 0 {
                StopBits::Two
            } else {
                StopBits::One
            },
            baud_divisor,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.rx_enable || self.tx_enable
    }
}

/// GPIO lines the UART needs reserved for the given flags.
pub(crate) fn uart_lines_for(flags: u8) -> u32 {
    let mut lines = 0;
    if flags & consts::uart::RX_ENABLE != 0 {
        lines |= consts::gpio::RS232_RXD_TTL;
    }
    if flags & consts::uart::TX_ENABLE != 0 {
        lines |= consts::gpio::RS232_TXD_TTL;
    }
    lines
}

impl<T: Transport> Sub20<T> {
    /// Sends a raw UART configuration to the board.
    ///
    /// The RX/TX lines are reserved (or released) first. If that fails the
    /// device is not contacted. If the device exchange fails the previous
    /// reservations are restored.
    pub fn uart_configure(&self, flags: u8, baud: u16) -> Result<()> {
        let label = &self.config().uart_label;
        let claims = self.claims();
        let mask = consts::gpio::UART_LINES;
        let desired = uart_lines_for(flags);

        let mut state = self.lock();
        let previous = state.reservations.reserved_mask() & mask;
        state
            .reservations
            .reserve_batch(claims, mask, desired, label)?;

        let request = Payload::UartConfig { flags, baud };
        let result = state.exchange(
            CMD_UART_CONFIG,
            request,
            PayloadKind::Empty,
            self.config().timeout,
        );
        if let Err(e) = result {
            if let Err(restore_err) = state
                .reservations
                .reserve_batch(claims, mask, previous, label)
            {
                warn!("Failed to restore UART line reservations: {}", restore_err);
            }
            return Err(e);
        }

        debug!("UART configured: flags=0x{:02X}, baud={}", flags, baud);
        state.uart = Some(UartConfig::from_flags(flags, baud));
        Ok(())
    }

    /// Applies a typed configuration.
    pub fn uart_apply(&self, config: &UartConfig) -> Result<()> {
        self.uart_configure(config.flags(), config.baud_divisor)
    }

    /// Enables the receiver.
    ///
    /// This replaces the whole configuration: format flags and divisor are
    /// reset to zero rather than preserved.
    pub fn uart_enable(&self) -> Result<()> {
        self.uart_configure(consts::uart::RX_ENABLE, 0)
    }

    /// Disables the UART and releases its lines. Clears format and divisor too.
    pub fn uart_disable(&self) -> Result<()> {
        self.uart_configure(0, 0)
    }

    /// Last configuration the device accepted, if any since attach.
    pub fn uart_state(&self) -> Option<UartConfig> {
        self.lock().uart
    }
}
