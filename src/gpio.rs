//! GPIO line types and the line operations of a [`Sub20`] board.
//!
//! The device keeps one 32-bit configuration word (bit set = output). Every
//! configuration transaction echoes the full word back and the board keeps it
//! as its direction cache; [`Sub20::gpio_get_direction`] only ever reads that
//! cache.

use crate::consts;
use crate::consts::packet::{CMD_GPIO_CONFIG, CMD_GPIO_READ, CMD_GPIO_WRITE};
use crate::device::Sub20;
use crate::error::{Error, Result};
use crate::transport::Transport;
use log::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLevel {
    Low,
    High,
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

impl From<GpioLevel> for bool {
    fn from(level: GpioLevel) -> Self {
        level == GpioLevel::High
    }
}

/// Represents a valid GPIO line number (0-31).
/// Use `GpioPin::new(num)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpioPin(pub(crate) u8); // Make field private to enforce constructor use

impl GpioPin {
    /// Creates a new GpioPin, returning an error if the number is out of range (0-31).
    pub fn new(pin_num: u8) -> Result<Self> {
        if pin_num < consts::gpio::LINE_COUNT {
            Ok(GpioPin(pin_num))
        } else {
            Err(Error::PinArgumentOutOfRange {
                pin: pin_num,
                message: "Pin number must be 0-31".to_string(),
            })
        }
    }

    /// Returns the underlying line number (0-31).
    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Returns the bit mask (1 << number) used in request words.
    #[inline]
    pub fn mask(&self) -> u32 {
        1u32 << self.0
    }

    /// Iterates over the lines whose bits are set in `mask`, lowest first.
    pub fn iter_mask(mask: u32) -> impl Iterator<Item = GpioPin> {
        (0..consts::gpio::LINE_COUNT)
            .filter(move |n| mask & (1u32 << n) != 0)
            .map(GpioPin)
    }
}

impl std::fmt::Display for GpioPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider side of a generic GPIO controller framework.
///
/// Offsets are raw line numbers as handed over by the framework. All
/// operations may block on USB I/O.
pub trait GpioChip {
    /// Name of the line group.
    fn label(&self) -> &str;
    /// Number of lines exposed.
    fn ngpio(&self) -> u8;
    /// Whether the operations may sleep.
    fn can_sleep(&self) -> bool {
        true
    }
    /// Fixed base number, or `None` to let the framework assign one.
    fn base(&self) -> Option<u32> {
        None
    }

    fn get_direction(&self, offset: u8) -> Result<GpioDirection>;
    fn direction_input(&self, offset: u8) -> Result<()>;
    fn direction_output(&self, offset: u8, value: bool) -> Result<()>;
    fn get(&self, offset: u8) -> Result<bool>;
    /// Drives a line. The framework contract has no error channel.
    fn set(&self, offset: u8, value: bool);
}

impl<T: Transport> Sub20<T> {
    /// Runs one GPIO transaction after checking that no line in `mask` is
    /// held by an internal function. The check and the exchange share one
    /// critical section.
    fn gpio_exchange(&self, code: u8, mask: u32, value: u32) -> Result<u32> {
        let mut state = self.lock();
        state.check_unreserved(mask, &self.config().uart_label)?;
        let word = state.gpio_transaction(code, mask, value, self.config().timeout)?;
        if code == CMD_GPIO_CONFIG {
            state.store_config_word(word);
        }
        Ok(word)
    }

    // --- Configuration ---

    /// Sets the direction of the lines in `mask` (bit set = output) and
    /// replaces the direction cache with the device's reply.
    ///
    /// Returns the full configuration word reported by the device.
    pub fn gpio_configure(&self, mask: u32, value: u32) -> Result<u32> {
        self.gpio_exchange(CMD_GPIO_CONFIG, mask, value)
    }

    /// Re-reads the configuration word without changing any line.
    pub fn gpio_refresh(&self) -> Result<u32> {
        self.gpio_configure(0, 0)
    }

    /// Snapshot of the direction cache (bit set = output).
    pub fn gpio_direction_mask(&self) -> u32 {
        self.lock().gpio_config_cache
    }

    // --- Single Line GPIO ---

    /// Gets the direction of a line from the cache. Never touches the device.
    pub fn gpio_get_direction(&self, pin: GpioPin) -> GpioDirection {
        if self.gpio_direction_mask() & pin.mask() != 0 {
            GpioDirection::Output
        } else {
            GpioDirection::Input
        }
    }

    /// Configures a line as input.
    pub fn gpio_set_direction_input(&self, pin: GpioPin) -> Result<()> {
        debug!("Setting GPIO {} as input", pin);
        self.gpio_configure(pin.mask(), 0)?;
        Ok(())
    }

    /// Configures a line as output, then drives it to `level`.
    ///
    /// The device needs two transactions for this: the line may briefly
    /// drive its previous level between them.
    pub fn gpio_set_direction_output(&self, pin: GpioPin, level: GpioLevel) -> Result<()> {
        debug!("Setting GPIO {} as output, level {:?}", pin, level);
        self.gpio_configure(pin.mask(), pin.mask())?;
        self.gpio_write(pin, level)
    }

    /// Sets the direction of a line without touching its level.
    pub fn gpio_set_direction(&self, pin: GpioPin, direction: GpioDirection) -> Result<()> {
        let value = match direction {
            GpioDirection::Input => 0,
            GpioDirection::Output => pin.mask(),
        };
        debug!("Setting GPIO {} direction: {:?}", pin, direction);
        self.gpio_configure(pin.mask(), value)?;
        Ok(())
    }

    /// Reads the current level of a line, regardless of its cached direction.
    pub fn gpio_read(&self, pin: GpioPin) -> Result<GpioLevel> {
        let value = self.gpio_read_masked(pin.mask())?;
        trace!("Read GPIO {}: 0x{:08X}", pin, value);
        Ok(GpioLevel::from(value & pin.mask() != 0))
    }

    /// Drives a line configured as output.
    pub fn gpio_write(&self, pin: GpioPin, level: GpioLevel) -> Result<()> {
        let value = u32::from(bool::from(level)) << pin.number();
        self.gpio_write_masked(pin.mask(), value)
    }

    // --- Bulk GPIO Operations ---

    /// Reads the level word for the lines in `mask`.
    pub fn gpio_read_masked(&self, mask: u32) -> Result<u32> {
        self.gpio_exchange(CMD_GPIO_READ, mask, 0)
    }

    /// Drives the lines in `mask` to the matching bits of `levels`.
    pub fn gpio_write_masked(&self, mask: u32, levels: u32) -> Result<()> {
        if mask == 0 {
            return Ok(());
        }
        trace!("Writing GPIO mask=0x{:08X}, levels=0x{:08X}", mask, levels);
        self.gpio_exchange(CMD_GPIO_WRITE, mask, levels & mask)?;
        Ok(())
    }
}

impl<T: Transport> GpioChip for Sub20<T> {
    fn label(&self) -> &str {
        &self.config().gpio_label
    }

    fn ngpio(&self) -> u8 {
        consts::gpio::LINE_COUNT
    }

    fn get_direction(&self, offset: u8) -> Result<GpioDirection> {
        Ok(self.gpio_get_direction(GpioPin::new(offset)?))
    }

    fn direction_input(&self, offset: u8) -> Result<()> {
        self.gpio_set_direction_input(GpioPin::new(offset)?)
    }

    fn direction_output(&self, offset: u8, value: bool) -> Result<()> {
        self.gpio_set_direction_output(GpioPin::new(offset)?, value.into())
    }

    fn get(&self, offset: u8) -> Result<bool> {
        Ok(self.gpio_read(GpioPin::new(offset)?)?.into())
    }

    fn set(&self, offset: u8, value: bool) {
        let result = GpioPin::new(offset).and_then(|pin| self.gpio_write(pin, value.into()));
        if let Err(e) = result {
            warn!("Failed to set GPIO {}: {}", offset, e);
        }
    }
}
