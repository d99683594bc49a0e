//! Ownership of GPIO lines shared with internal functions.
//!
//! Some lines double as peripheral pins (the UART takes lines 10 and 11).
//! While a function is active those lines are claimed through a
//! [`LineClaim`] collaborator so that generic consumers cannot drive them,
//! and the board records them in its [`ReservationTable`].

use crate::consts;
use crate::error::{Error, Result};
use crate::gpio::GpioPin;
use log::{debug, trace, warn};
use std::sync::{Mutex, PoisonError};

/// Per-line claim bookkeeping shared between internal functions and generic
/// GPIO consumers.
pub trait LineClaim: Send + Sync {
    /// Claims `line` for `label`. Fails if someone else already holds it.
    fn claim(&self, line: GpioPin, label: &str) -> Result<()>;
    /// Gives `line` back. Releasing a free line is a no-op.
    fn release(&self, line: GpioPin);
    /// Label of the current holder of `line`, if any.
    fn owner(&self, line: GpioPin) -> Option<String>;
}

/// In-process [`LineClaim`] implementation keeping one owner label per line.
#[derive(Debug, Default)]
pub struct LineRegistry {
    owners: Mutex<[Option<String>; consts::gpio::LINE_COUNT as usize]>,
}

impl LineRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineClaim for LineRegistry {
    fn claim(&self, line: GpioPin, label: &str) -> Result<()> {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut owners[line.number() as usize];
        if let Some(owner) = slot {
            return Err(Error::ReservationConflict {
                line,
                owner: owner.clone(),
            });
        }
        trace!("GPIO {} claimed by '{}'", line, label);
        *slot = Some(label.to_string());
        Ok(())
    }

    fn release(&self, line: GpioPin) {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(owner) = owners[line.number() as usize].take() {
            trace!("GPIO {} released by '{}'", line, owner);
        }
    }

    fn owner(&self, line: GpioPin) -> Option<String> {
        let owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        owners[line.number() as usize].clone()
    }
}

/// Bitmap of lines currently held by an internal function (bit set = held).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReservationTable {
    reserved: u32,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserved_mask(&self) -> u32 {
        self.reserved
    }

    pub fn is_reserved(&self, line: GpioPin) -> bool {
        self.reserved & line.mask() != 0
    }

    /// Moves one line to the requested state. Returns whether anything changed.
    fn reserve_line(
        &mut self,
        claims: &dyn LineClaim,
        line: GpioPin,
        reserve: bool,
        label: &str,
    ) -> Result<bool> {
        if self.is_reserved(line) == reserve {
            return Ok(false);
        }
        if reserve {
            claims.claim(line, label)?;
        } else {
            claims.release(line);
        }
        self.reserved ^= line.mask();
        Ok(true)
    }

    /// Moves every line in `mask` to the ownership given by the matching bit
    /// of `desired` (set = reserved for `label`).
    ///
    /// All lines are attempted even after a failure. If any line fails, the
    /// lines this call changed are put back and the first error is returned,
    /// so the table never keeps a partially applied batch.
    pub fn reserve_batch(
        &mut self,
        claims: &dyn LineClaim,
        mask: u32,
        desired: u32,
        label: &str,
    ) -> Result<()> {
        let mut first_err = None;
        let mut modified = 0u32;

        for line in GpioPin::iter_mask(mask) {
            let reserve = desired & line.mask() != 0;
            match self.reserve_line(claims, line, reserve, label) {
                Ok(true) => modified |= line.mask(),
                Ok(false) => {}
                Err(e) => {
                    debug!("Could not reserve GPIO {} for '{}': {}", line, label, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        let Some(err) = first_err else {
            if modified != 0 {
                debug!(
                    "Reservations for '{}' changed on 0x{:08X}, now 0x{:08X}",
                    label, modified, self.reserved
                );
            }
            return Ok(());
        };

        // roll back modified lines on failure
        for line in GpioPin::iter_mask(modified) {
            let restore = !self.is_reserved(line);
            if let Err(e) = self.reserve_line(claims, line, restore, label) {
                warn!("Failed to roll back reservation of GPIO {}: {}", line, e);
            }
        }
        Err(err)
    }

    /// Releases every held line. Used at teardown.
    pub fn release_all(&mut self, claims: &dyn LineClaim) {
        for line in GpioPin::iter_mask(self.reserved) {
            claims.release(line);
        }
        self.reserved = 0;
    }
}
