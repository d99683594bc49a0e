//! Device discovery, board lifecycle and the transaction engine.

use crate::consts;
use crate::consts::packet::{CMD_GPIO_CONFIG, CMD_UART_CONFIG};
use crate::error::{invalid_response, Error, Result, TransferStage, UsbFault};
use crate::gpio::GpioPin;
use crate::packet::{Packet, Payload, PayloadKind};
use crate::reservation::{LineClaim, LineRegistry, ReservationTable};
use crate::transport::{NusbTransport, Transport};
use crate::uart::UartConfig;
use log::{debug, trace, warn};
use nusb::MaybeFuture;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Information about a discovered SUB-20 board.
/// Can be used with `Sub20::open` to connect to a specific board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sub20DeviceInfo {
    /// USB bus number.
    pub bus: u8,
    /// Device address on the bus.
    pub address: u8,
    /// Device serial number string.
    pub serial_number: Option<String>,
    /// Human-readable product name.
    pub product_string: Option<String>,
}

/// Finds all attached SUB-20 boards, ordered by serial number.
pub fn find_devices() -> Result<Vec<Sub20DeviceInfo>> {
    let mut devices: Vec<Sub20DeviceInfo> = nusb::list_devices()
        .wait()?
        .filter(|d| d.vendor_id() == consts::SUB20_VID && d.product_id() == consts::SUB20_PID)
        .map(|d| {
            debug!(
                "Found SUB-20: bus={}, address={}, SN={:?}",
                d.busnum(),
                d.device_address(),
                d.serial_number()
            );
            Sub20DeviceInfo {
                bus: d.busnum(),
                address: d.device_address(),
                serial_number: d.serial_number().map(String::from),
                product_string: d.product_string().map(String::from),
            }
        })
        .collect();

    // Devices with serial come first
    devices.sort_by(|a, b| match (&a.serial_number, &b.serial_number) {
        (Some(a_serial), Some(b_serial)) => a_serial.cmp(b_serial),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => (a.bus, a.address).cmp(&(b.bus, b.address)),
    });
    Ok(devices)
}

/// Registers the logical sub-devices a board provides (currently the UART).
pub trait PeripheralHost: Send + Sync {
    /// Announces a sub-device named `name`.
    fn add_device(&self, name: &str) -> Result<()>;
    /// Withdraws a sub-device previously added.
    fn remove_device(&self, name: &str);
}

/// Tunables for a board handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Bound on each bulk write and each bulk read.
    pub timeout: Duration,
    /// Label of the GPIO line group.
    pub gpio_label: String,
    /// Claim label for UART lines and name of the UART sub-device.
    pub uart_label: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            timeout: consts::USB_TIMEOUT,
            gpio_label: consts::gpio::DEFAULT_LABEL.to_string(),
            uart_label: consts::uart::DEFAULT_LABEL.to_string(),
        }
    }
}

impl BoardConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_gpio_label(mut self, label: impl Into<String>) -> Self {
        self.gpio_label = label.into();
        self
    }

    pub fn with_uart_label(mut self, label: impl Into<String>) -> Self {
        self.uart_label = label.into();
        self
    }
}

/// Everything guarded by the board's transaction lock.
pub(crate) struct BoardState<T> {
    pub(crate) transport: T,
    /// Last configuration word reported by the device (bit set = output).
    pub(crate) gpio_config_cache: u32,
    pub(crate) reservations: ReservationTable,
    pub(crate) uart: Option<UartConfig>,
}

impl<T: Transport> BoardState<T> {
    /// One send-then-receive exchange. The caller holds the board lock.
    pub(crate) fn exchange(
        &mut self,
        code: u8,
        payload: Payload,
        expect: PayloadKind,
        timeout: Duration,
    ) -> Result<Payload> {
        let frame = Packet::new(code, payload).encode();
        trace!("Sending packet 0x{:02X}: {:02X?}", code, &frame[..]);

        let send_err = |source: UsbFault| {
            warn!("Failed to send packet 0x{:02X}: {}", code, source);
            Error::Transport {
                code,
                stage: TransferStage::Send,
                source,
            }
        };
        let written = self
            .transport
            .bulk_write(consts::OUT_EP, &frame, timeout)
            .map_err(send_err)?;
        if written != frame.len() {
            return Err(send_err(UsbFault::ShortWrite {
                expected: frame.len(),
                actual: written,
            }));
        }

        let mut in_buf = vec![0u8; expect.response_buffer_len()];
        let bytes_read = self
            .transport
            .bulk_read(consts::IN_EP, &mut in_buf, timeout)
            .map_err(|source| {
                warn!("Failed to receive packet for 0x{:02X}: {}", code, source);
                Error::Transport {
                    code,
                    stage: TransferStage::Receive,
                    source,
                }
            })?;
        let bytes_read = bytes_read.min(in_buf.len());
        trace!(
            "Received response for 0x{:02X} ({} bytes): {:02X?}",
            code,
            bytes_read,
            &in_buf[..bytes_read]
        );

        let response = Packet::decode(&in_buf[..bytes_read], expect)
            .map_err(|e| match e {
                Error::InvalidResponse { message, .. } => invalid_response(code, message),
                other => other,
            })?;
        Ok(response.payload)
    }

    /// Fails if any line in `mask` is held by an internal function.
    pub(crate) fn check_unreserved(&self, mask: u32, owner: &str) -> Result<()> {
        match GpioPin::iter_mask(mask & self.reservations.reserved_mask()).next() {
            Some(line) => Err(Error::ReservationConflict {
                line,
                owner: owner.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Replaces the direction cache with the word echoed by a configuration request.
    pub(crate) fn store_config_word(&mut self, word: u32) {
        if word != self.gpio_config_cache {
            debug!(
                "GPIO config cache 0x{:08X} -> 0x{:08X}",
                self.gpio_config_cache, word
            );
        }
        self.gpio_config_cache = word;
    }

    /// GPIO request answered by a 32-bit state word.
    pub(crate) fn gpio_transaction(
        &mut self,
        code: u8,
        mask: u32,
        value: u32,
        timeout: Duration,
    ) -> Result<u32> {
        let request = Payload::GpioRequest { mask, value };
        match self.exchange(code, request, PayloadKind::GpioResponse, timeout)? {
            Payload::GpioResponse { value } => Ok(value),
            other => Err(invalid_response(
                code,
                format!("expected a GPIO state word, got {:?}", other.kind()),
            )),
        }
    }
}

// --- Device Handle ---
/// A handle to an attached SUB-20 board.
///
/// All operations block for the duration of their USB exchange. The handle is
/// `Sync`: concurrent callers are serialized on one internal lock, which also
/// guards the GPIO direction cache and the line reservations.
pub struct Sub20<T: Transport = NusbTransport> {
    state: Mutex<BoardState<T>>,
    config: BoardConfig,
    claims: Arc<dyn LineClaim>,
    host: Option<Arc<dyn PeripheralHost>>,
    registered: bool,
}

impl<T: Transport> std::fmt::Debug for Sub20<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Sub20")
            .field("config", &self.config)
            .field("gpio_config_cache", &format_args!("0x{:08X}", state.gpio_config_cache))
            .field("reservations", &state.reservations)
            .field("uart", &state.uart)
            .finish_non_exhaustive()
    }
}

impl Sub20<NusbTransport> {
    // --- Constructors ---

    /// Opens and attaches a board using its discovery info. Recommended method.
    pub fn open(info: &Sub20DeviceInfo) -> Result<Self> {
        Self::attach(NusbTransport::open(info)?)
    }

    /// Opens the first board found. **Warning:** Ambiguous if multiple boards exist.
    pub fn open_first() -> Result<Self> {
        let info = find_devices()?
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound)?;
        Self::open(&info)
    }

    /// Opens a board by its serial number.
    pub fn open_by_serial(serial: &str) -> Result<Self> {
        let info = find_devices()?
            .into_iter()
            .find(|d| d.serial_number.as_deref() == Some(serial))
            .ok_or_else(|| Error::DeviceNotFoundBySerial {
                serial: serial.to_string(),
                message: "No SUB-20 found with this serial number".to_string(),
            })?;
        Self::open(&info)
    }

    /// Opens a board by its index in the order returned by [`find_devices`].
    pub fn open_by_index(index: usize) -> Result<Self> {
        let devices = find_devices()?;
        let info = devices
            .get(index)
            .ok_or_else(|| Error::DeviceNotFoundByIndex {
                index,
                message: format!("Index out of range (found {} devices)", devices.len()),
            })?;
        Self::open(info)
    }
}

impl<T: Transport> Sub20<T> {
    /// Attaches to a board over `transport` with default configuration, an
    /// internal [`LineRegistry`] and no peripheral host.
    pub fn attach(transport: T) -> Result<Self> {
        Self::attach_with(
            transport,
            BoardConfig::default(),
            Arc::new(LineRegistry::new()),
            None,
        )
    }

    /// Attaches to a board with explicit collaborators.
    ///
    /// The direction cache is loaded from the device (it may not have been
    /// reset since its last use), the UART sub-device is registered with
    /// `host`, and the UART function is switched off.
    pub fn attach_with(
        transport: T,
        config: BoardConfig,
        claims: Arc<dyn LineClaim>,
        host: Option<Arc<dyn PeripheralHost>>,
    ) -> Result<Self> {
        let mut board = Sub20 {
            state: Mutex::new(BoardState {
                transport,
                gpio_config_cache: 0,
                reservations: ReservationTable::new(),
                uart: None,
            }),
            config,
            claims,
            host,
            registered: false,
        };

        let word = board.gpio_refresh()?;
        debug!("Attached SUB-20, GPIO config 0x{:08X}", word);

        if let Some(host) = &board.host {
            host.add_device(&board.config.uart_label)?;
            board.registered = true;
        }

        if let Err(e) = board.uart_disable() {
            warn!("Failed to disable UART on attach: {}", e);
        }
        Ok(board)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BoardState<T>> {
        // State is plain data; a panic elsewhere cannot leave it half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub(crate) fn claims(&self) -> &dyn LineClaim {
        self.claims.as_ref()
    }

    /// Gets the configuration this handle was attached with.
    pub fn board_config(&self) -> &BoardConfig {
        &self.config
    }

    /// Performs one raw request/response exchange with the board.
    ///
    /// Blocks until the board lock is free, then until the response arrives or
    /// the transport times out. Failures are not retried.
    ///
    /// GPIO requests touching a line held by the UART are refused before any
    /// I/O, and a configuration reply replaces the direction cache. UART
    /// configuration is not accepted here since it has to move the line
    /// reservations with it; use [`Sub20::uart_configure`].
    pub fn transact(&self, code: u8, payload: Payload, expect: PayloadKind) -> Result<Payload> {
        if code == CMD_UART_CONFIG {
            return Err(Error::UnsupportedCommand {
                code,
                message: "use Sub20::uart_configure".to_string(),
            });
        }
        let mut state = self.lock();
        if let Payload::GpioRequest { mask, .. } = payload {
            state.check_unreserved(mask, &self.config.uart_label)?;
        }
        let response = state.exchange(code, payload, expect, self.config.timeout)?;
        if let (CMD_GPIO_CONFIG, Payload::GpioResponse { value }) = (code, response) {
            state.store_config_word(value);
        }
        Ok(response)
    }

    /// Lines currently reserved by an internal function.
    pub fn reserved_lines(&self) -> u32 {
        self.lock().reservations.reserved_mask()
    }

    // --- Line ownership for generic consumers ---

    /// Claims a line for a generic consumer. Fails if the UART or another
    /// consumer holds it.
    pub fn gpio_request(&self, pin: GpioPin, label: &str) -> Result<()> {
        let _state = self.lock();
        self.claims.claim(pin, label)
    }

    /// Returns a line claimed with [`Sub20::gpio_request`] under the same
    /// `label`. Freeing a line nobody holds is a no-op.
    pub fn gpio_free(&self, pin: GpioPin, label: &str) -> Result<()> {
        let state = self.lock();
        if state.reservations.is_reserved(pin) {
            return Err(Error::ReservationConflict {
                line: pin,
                owner: self.config.uart_label.clone(),
            });
        }
        match self.claims.owner(pin) {
            Some(owner) if owner != label => Err(Error::ReservationConflict { line: pin, owner }),
            Some(_) => {
                self.claims.release(pin);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<T: Transport> Drop for Sub20<T> {
    fn drop(&mut self) {
        if self.registered {
            if let Some(host) = &self.host {
                host.remove_device(&self.config.uart_label);
            }
        }
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.reservations.release_all(self.claims.as_ref());
        debug!("Detached SUB-20");
    }
}
