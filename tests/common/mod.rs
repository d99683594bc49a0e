//! Simulated SUB-20 board for driving `Sub20` without hardware.
//!
//! The simulation decodes each request, applies it to an in-memory model of
//! the device (configuration word, output latch, input pins, UART flags) and
//! answers with a padded 64-byte frame like the real firmware.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use sub20_usb::{
    protocol, BoardConfig, LineClaim, LineRegistry, Packet, Payload, PayloadKind,
    PeripheralHost, Result, Sub20, Transport, UsbFault,
};

#[derive(Debug, Default)]
pub struct SimState {
    /// Direction word (bit set = output).
    pub config: u32,
    /// Levels driven on output lines.
    pub latch: u32,
    /// Levels seen on input lines.
    pub inputs: u32,
    /// Last UART flags and divisor received.
    pub uart: Option<(u8, u16)>,
    /// Every request frame as decoded by the device.
    pub requests: Vec<Packet>,
    /// Raw request frames.
    pub frames: Vec<Vec<u8>>,
    /// (write start, read end) of each completed exchange.
    pub intervals: Vec<(Instant, Instant)>,
    pub fail_next_write: Option<UsbFault>,
    pub fail_next_read: Option<UsbFault>,
    /// Answer the next request with a frame of this many bytes.
    pub truncate_next_response: Option<usize>,
    /// Accept one byte less than submitted on the next write.
    pub short_next_write: bool,
    /// Time spent inside each write.
    pub latency: Duration,
    pending: Option<Vec<u8>>,
    write_started: Option<Instant>,
}

/// Handle kept by the test to inspect and steer the simulation.
#[derive(Debug, Clone, Default)]
pub struct SimHandle(pub Arc<Mutex<SimState>>);

impl SimHandle {
    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }

    pub fn requests(&self) -> Vec<Packet> {
        self.with(|s| s.requests.clone())
    }

    pub fn request_codes(&self) -> Vec<u8> {
        self.with(|s| s.requests.iter().map(|p| p.code).collect())
    }

    pub fn clear_log(&self) {
        self.with(|s| {
            s.requests.clear();
            s.frames.clear();
            s.intervals.clear();
        })
    }
}

#[derive(Debug)]
pub struct SimulatedBoard {
    handle: SimHandle,
}

impl SimulatedBoard {
    pub fn new() -> (Self, SimHandle) {
        let handle = SimHandle::default();
        (
            SimulatedBoard {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

fn request_kind(code: u8) -> PayloadKind {
    match code {
        protocol::CMD_UART_CONFIG => PayloadKind::UartConfig,
        _ => PayloadKind::GpioRequest,
    }
}

fn response_frame(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![payload.len() as u8 + 2, code, payload.len() as u8];
    frame.extend_from_slice(payload);
    frame.resize(64, 0);
    frame
}

impl Transport for SimulatedBoard {
    fn bulk_write(
        &mut self,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> std::result::Result<usize, UsbFault> {
        assert_eq!(endpoint, sub20_usb::OUT_EP);
        let started = Instant::now();
        let mut s = self.handle.0.lock().unwrap();
        if let Some(fault) = s.fail_next_write.take() {
            return Err(fault);
        }
        let latency = s.latency;
        if !latency.is_zero() {
            drop(s);
            thread::sleep(latency);
            s = self.handle.0.lock().unwrap();
        }

        assert_eq!(data[0] as usize, data.len() - 1, "total_size must cover code, size and payload");
        let request = Packet::decode(data, request_kind(data[1])).expect("malformed request");
        s.frames.push(data.to_vec());
        s.requests.push(request);
        s.write_started = Some(started);

        let response = match request.payload {
            Payload::GpioRequest { mask, value } => {
                let word = match request.code {
                    protocol::CMD_GPIO_CONFIG => {
                        s.config = (s.config & !mask) | (value & mask);
                        s.config
                    }
                    protocol::CMD_GPIO_READ => ((s.latch & s.config) | (s.inputs & !s.config)) & mask,
                    protocol::CMD_GPIO_WRITE => {
                        s.latch = (s.latch & !mask) | (value & mask);
                        s.latch
                    }
                    other => panic!("unexpected GPIO command 0x{other:02X}"),
                };
                response_frame(request.code, &word.to_le_bytes())
            }
            Payload::UartConfig { flags, baud } => {
                s.uart = Some((flags, baud));
                response_frame(request.code, &[])
            }
            other => panic!("unexpected request payload {other:?}"),
        };
        s.pending = Some(response);

        if s.short_next_write {
            s.short_next_write = false;
            return Ok(data.len() - 1);
        }
        Ok(data.len())
    }

    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> std::result::Result<usize, UsbFault> {
        assert_eq!(endpoint, sub20_usb::IN_EP);
        assert!(buf.len() >= 64, "response buffer below the protocol floor");
        let mut s = self.handle.0.lock().unwrap();
        let started = s.write_started.take();
        let pending = s.pending.take();
        if let Some(fault) = s.fail_next_read.take() {
            return Err(fault);
        }
        let mut frame = pending.expect("read without a preceding write");
        if let Some(len) = s.truncate_next_response.take() {
            frame.truncate(len);
        }
        buf[..frame.len()].copy_from_slice(&frame);
        if let Some(started) = started {
            s.intervals.push((started, Instant::now()));
        }
        Ok(frame.len())
    }
}

/// Line-claim double that records every call on top of a real registry.
#[derive(Debug, Default)]
pub struct RecordingClaims {
    pub registry: LineRegistry,
    pub calls: Mutex<Vec<ClaimCall>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimCall {
    Claim(u8, String),
    Release(u8),
}

impl RecordingClaims {
    pub fn calls(&self) -> Vec<ClaimCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl LineClaim for RecordingClaims {
    fn claim(&self, line: sub20_usb::GpioPin, label: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(ClaimCall::Claim(line.number(), label.to_string()));
        self.registry.claim(line, label)
    }

    fn release(&self, line: sub20_usb::GpioPin) {
        self.calls
            .lock()
            .unwrap()
            .push(ClaimCall::Release(line.number()));
        self.registry.release(line)
    }

    fn owner(&self, line: sub20_usb::GpioPin) -> Option<String> {
        self.registry.owner(line)
    }
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    pub events: Mutex<Vec<String>>,
    pub refuse: bool,
}

impl PeripheralHost for RecordingHost {
    fn add_device(&self, name: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("add {name}"));
        if self.refuse {
            return Err(sub20_usb::Error::DeviceNotFound);
        }
        Ok(())
    }

    fn remove_device(&self, name: &str) {
        self.events.lock().unwrap().push(format!("remove {name}"));
    }
}

pub struct TestBoard {
    pub board: Sub20<SimulatedBoard>,
    pub sim: SimHandle,
    pub claims: Arc<RecordingClaims>,
    pub host: Arc<RecordingHost>,
}

/// Attaches a board to a fresh simulation and clears the attach traffic.
pub fn attach() -> TestBoard {
    let (transport, sim) = SimulatedBoard::new();
    let claims = Arc::new(RecordingClaims::default());
    let host = Arc::new(RecordingHost::default());
    let board = Sub20::attach_with(
        transport,
        BoardConfig::default(),
        claims.clone(),
        Some(host.clone()),
    )
    .expect("attach to simulated board");
    sim.clear_log();
    claims.clear();
    TestBoard {
        board,
        sim,
        claims,
        host,
    }
}
