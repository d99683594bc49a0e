//! Wire format of SUB-20 request and response frames.
//!
//! Every frame starts with a three byte header:
//!
//! | Offset | Field        | Notes                                   |
//! |--------|--------------|-----------------------------------------|
//! | 0      | total_size   | payload_size + 2 (code and size bytes)  |
//! | 1      | code         | command identifier                      |
//! | 2      | payload_size | size of the active payload variant      |
//! | 3..    | payload      | little-endian fields, at most 253 bytes |
//!
//! The protocol carries no response type tag, so decoding is driven by the
//! [`PayloadKind`] the caller expects for the request it sent.

use crate::consts::packet::{HEADER_LEN, RESPONSE_FLOOR, SIZE_OVERHEAD};
use crate::error::{invalid_response, Result};

/// Typed payload carried by a [`Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// No payload.
    Empty,
    /// GPIO config/read/write request.
    GpioRequest {
        /// Lines affected by the request.
        mask: u32,
        /// Per-line value for the lines in `mask`.
        value: u32,
    },
    /// GPIO state word returned by the device.
    GpioResponse {
        /// Direction or level word, depending on the request.
        value: u32,
    },
    /// UART function configuration.
    UartConfig {
        /// Enable, character size, parity and stop bit flags.
        flags: u8,
        /// Baud rate divisor.
        baud: u16,
    },
}

/// Payload variant expected when decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// No payload.
    Empty,
    /// Mask and value words.
    GpioRequest,
    /// One state word.
    GpioResponse,
    /// Flags byte and baud divisor.
    UartConfig,
}

impl PayloadKind {
    /// Encoded size of this payload variant.
    pub fn len(self) -> usize {
        match self {
            PayloadKind::Empty => 0,
            PayloadKind::GpioRequest => 8,
            PayloadKind::GpioResponse => 4,
            PayloadKind::UartConfig => 3,
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Size of the receive buffer for a response of this kind.
    ///
    /// The device pads short responses to a full packet, so the buffer never
    /// shrinks below the protocol floor.
    pub fn response_buffer_len(self) -> usize {
        (self.len() + HEADER_LEN).max(RESPONSE_FLOOR)
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Empty => PayloadKind::Empty,
            Payload::GpioRequest { .. } => PayloadKind::GpioRequest,
            Payload::GpioResponse { .. } => PayloadKind::GpioResponse,
            Payload::UartConfig { .. } => PayloadKind::UartConfig,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Payload::Empty => {}
            Payload::GpioRequest { mask, value } => {
                out.extend_from_slice(&mask.to_le_bytes());
                out.extend_from_slice(&value.to_le_bytes());
            }
            Payload::GpioResponse { value } => out.extend_from_slice(&value.to_le_bytes()),
            Payload::UartConfig { flags, baud } => {
                out.push(flags);
                out.extend_from_slice(&baud.to_le_bytes());
            }
        }
    }

    fn read_from(kind: PayloadKind, bytes: &[u8]) -> Payload {
        let le32 = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        match kind {
            PayloadKind::Empty => Payload::Empty,
            PayloadKind::GpioRequest => Payload::GpioRequest {
                mask: le32(0),
                value: le32(4),
            },
            PayloadKind::GpioResponse => Payload::GpioResponse { value: le32(0) },
            PayloadKind::UartConfig => Payload::UartConfig {
                flags: bytes[0],
                baud: u16::from_le_bytes([bytes[1], bytes[2]]),
            },
        }
    }
}

/// A single request or response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub code: u8,
    pub payload: Payload,
}

impl Packet {
    pub fn new(code: u8, payload: Payload) -> Self {
        Packet { code, payload }
    }

    pub fn gpio_request(code: u8, mask: u32, value: u32) -> Self {
        Packet::new(code, Payload::GpioRequest { mask, value })
    }

    /// Value of the payload_size byte.
    pub fn payload_size(&self) -> usize {
        self.payload.kind().len()
    }

    /// Value of the total_size byte: payload plus the code and size bytes.
    pub fn total_size(&self) -> usize {
        self.payload_size() + SIZE_OVERHEAD
    }

    /// Serializes the frame. The returned buffer is `total_size + 1` bytes long.
    ///
    /// Every payload variant fits well inside the frame capacity.
    pub fn encode(&self) -> Vec<u8> {
        let payload_size = self.payload_size();
        let mut out = Vec::with_capacity(HEADER_LEN + payload_size);
        out.push(self.total_size() as u8);
        out.push(self.code);
        out.push(payload_size as u8);
        self.payload.write_to(&mut out);
        out
    }

    /// Parses a frame whose payload is expected to be of `kind`.
    ///
    /// A declared payload smaller than `kind` needs, or a buffer too short to
    /// hold it, is rejected. Trailing padding is ignored.
    pub fn decode(bytes: &[u8], kind: PayloadKind) -> Result<Packet> {
        if bytes.len() < HEADER_LEN {
            return Err(invalid_response(
                bytes.get(1).copied().unwrap_or(0),
                format!("frame of {} bytes is shorter than the header", bytes.len()),
            ));
        }
        let code = bytes[1];
        let declared = bytes[2] as usize;
        let needed = kind.len();
        if declared < needed {
            return Err(invalid_response(
                code,
                format!("declared payload of {declared} bytes, expected {needed}"),
            ));
        }
        let body = &bytes[HEADER_LEN..];
        if body.len() < needed {
            return Err(invalid_response(
                code,
                format!("frame holds {} payload bytes, expected {needed}", body.len()),
            ));
        }
        Ok(Packet {
            code,
            payload: Payload::read_from(kind, body),
        })
    }
}
