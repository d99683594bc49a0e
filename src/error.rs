use crate::gpio::GpioPin;
use thiserror::Error;

/// Errors that can occur when using a SUB-20 board.
///
/// This enum covers device discovery, USB transport failures, malformed
/// responses and GPIO ownership conflicts.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the USB stack while enumerating, opening or claiming a device.
    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),
    /// No SUB-20 board was found with the specified vendor/product ID.
    #[error("Device not found with specified VID/PID")]
    DeviceNotFound,
    /// No SUB-20 board was found with the specified serial number.
    #[error("Device not found with serial number '{serial}': {message}")]
    DeviceNotFoundBySerial {
        /// The serial number that was searched for.
        serial: String,
        /// Additional error details.
        message: String,
    },
    /// No SUB-20 board was found at the specified index.
    #[error("Device not found at index {index}: {message}")]
    DeviceNotFoundByIndex {
        /// The index that was requested.
        index: usize,
        /// Additional error details.
        message: String,
    },
    /// A bulk transfer failed or timed out while exchanging a packet.
    #[error("Failed to {stage} packet 0x{code:02X}: {source}")]
    Transport {
        /// Command code of the request being exchanged.
        code: u8,
        /// Which half of the exchange failed.
        stage: TransferStage,
        /// Underlying transfer failure.
        #[source]
        source: UsbFault,
    },
    /// The line is owned by another function or consumer.
    #[error("GPIO line {line} is already claimed by '{owner}'")]
    ReservationConflict {
        /// The contested line.
        line: GpioPin,
        /// Label of the current owner.
        owner: String,
    },
    /// The device answered with a frame that does not fit the request.
    #[error("Invalid response to packet 0x{code:02X}: {message}")]
    InvalidResponse {
        /// Command code of the request.
        code: u8,
        /// What was wrong with the frame.
        message: String,
    },
    /// GPIO pin number is outside the valid range for this device.
    #[error("GPIO pin {pin} argument out of range (0-31): {message}")]
    PinArgumentOutOfRange {
        /// The invalid pin number that was specified.
        pin: u8,
        /// Detailed error message explaining the constraint.
        message: String,
    },
    /// The command cannot be sent as a raw request.
    #[error("Command 0x{code:02X} is not accepted as a raw request: {message}")]
    UnsupportedCommand {
        /// Command code of the rejected request.
        code: u8,
        /// Where to send it instead.
        message: String,
    },
}

/// Half of a send-then-receive exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Bulk OUT write of the request.
    Send,
    /// Bulk IN read of the response.
    Receive,
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStage::Send => f.write_str("send"),
            TransferStage::Receive => f.write_str("receive"),
        }
    }
}

/// Failure reported by a [`Transport`](crate::Transport) for a single bulk transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsbFault {
    /// The transfer did not complete within the timeout.
    #[error("transfer timed out")]
    Timeout,
    /// The endpoint stalled.
    #[error("endpoint stalled")]
    Stall,
    /// The device went away.
    #[error("device disconnected")]
    Disconnected,
    /// Fewer bytes were accepted than were submitted.
    #[error("short write ({actual} of {expected} bytes)")]
    ShortWrite {
        /// Frame length.
        expected: usize,
        /// Bytes the device accepted.
        actual: usize,
    },
    /// Any other transfer failure.
    #[error("{0}")]
    Other(String),
}

/// Result type alias for SUB-20 operations.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn invalid_response(code: u8, message: impl Into<String>) -> Error {
    Error::InvalidResponse {
        code,
        message: message.into(),
    }
}
