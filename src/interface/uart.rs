//! Byte-stream (UART-SHTP) transport adapter.
//!
//! Frames are delimited by `0x7E` markers with a mandatory `0x01` protocol
//! identifier after the start marker. Header and payload travel escaped:
//! any reserved byte becomes `0x7D` followed by the byte XORed with `0x20`.
//! There is no ready signal on this link; readiness is approximated by at
//! least a header's worth of bytes buffered at the port. Outbound bytes are
//! spaced at least 100 us apart; the sensor cannot absorb them faster.

use serialport::SerialPort;
use std::io;
use std::time::{Duration, Instant};

use crate::buffer::ReceiveBuffer;
use crate::constants::{
    UART_ESCAPE_BYTE, UART_ESCAPE_MASK, UART_FRAME_BYTE, UART_INTERBYTE_DELAY_US,
    UART_PROTOCOL_ID,
};
use crate::interface::delay::{delay_ms, delay_us};
use crate::interface::gpio::OutputPin;
use crate::interface::{SensorInterface, PACKET_HEADER_LENGTH};
use crate::packet::{encode_header, escape_into, Channel, Packet, RawHeader};
use crate::sequence::SequenceTable;
use crate::TransportError;

/// Default baud rate of the UART-SHTP link
pub const DEFAULT_BAUD_RATE: u32 = 3_000_000;

/// How long to hunt for a start marker before declaring the stream lost
const SCAN_TIMEOUT: Duration = Duration::from_millis(500);
/// How long one in-frame byte may take before the frame counts as lost
const BYTE_TIMEOUT: Duration = Duration::from_millis(100);

/// Byte-level access to the serial link
pub trait SerialLink {
    /// Read one byte, `Ok(None)` if nothing arrived within the port timeout
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Write one byte
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Number of bytes buffered at the port
    fn bytes_available(&mut self) -> io::Result<usize>;
}

/// A serial port opened for the sensor's UART-SHTP mode
pub struct SerialDevice {
    port: Box<dyn SerialPort>,
}

impl SerialDevice {
    pub fn new(path: &str, baud_rate: u32) -> io::Result<SerialDevice> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(SerialDevice { port })
    }
}

impl SerialLink for SerialDevice {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.port.write_all(&[byte])
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

/// UART transport adapter
pub struct UartInterface<S, OUT> {
    serial: S,
    reset: Option<OUT>,
    scan_timeout: Duration,
    byte_timeout: Duration,
}

impl<S, OUT> UartInterface<S, OUT>
where
    S: SerialLink,
    OUT: OutputPin<Error = io::Error>,
{
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            reset: None,
            scan_timeout: SCAN_TIMEOUT,
            byte_timeout: BYTE_TIMEOUT,
        }
    }

    pub fn with_reset(mut self, reset: OUT) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Override the frame-hunt and in-frame byte deadlines
    pub fn with_timeouts(mut self, scan: Duration, byte: Duration) -> Self {
        self.scan_timeout = scan;
        self.byte_timeout = byte;
        self
    }

    /// Read a byte that must arrive mid-frame; starvation here means the
    /// frame boundary is lost.
    fn read_required(&mut self) -> Result<u8, TransportError> {
        let start = Instant::now();
        loop {
            if let Some(byte) = self.serial.read_byte()? {
                return Ok(byte);
            }
            if start.elapsed() >= self.byte_timeout {
                return Err(TransportError::FrameDelimiterMissing);
            }
        }
    }

    /// Read one byte with control-escaping reversed
    fn read_unescaped(&mut self) -> Result<u8, TransportError> {
        let byte = self.read_required()?;
        if byte == UART_ESCAPE_BYTE {
            Ok(self.read_required()? ^ UART_ESCAPE_MASK)
        } else {
            Ok(byte)
        }
    }

    /// Hunt for the start marker of the next frame
    fn seek_frame_start(&mut self) -> Result<(), TransportError> {
        let start = Instant::now();
        let mut saw_garbage = false;
        loop {
            match self.serial.read_byte()? {
                Some(UART_FRAME_BYTE) => return Ok(()),
                Some(_) => saw_garbage = true,
                None => {}
            }
            if start.elapsed() >= self.scan_timeout {
                return Err(if saw_garbage {
                    TransportError::FrameDelimiterMissing
                } else {
                    TransportError::InterruptTimeout
                });
            }
        }
    }
}

impl<S, OUT> SensorInterface for UartInterface<S, OUT>
where
    S: SerialLink,
    OUT: OutputPin<Error = io::Error>,
{
    fn setup(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn is_data_ready(&mut self) -> bool {
        self.serial
            .bytes_available()
            .map(|n| n >= PACKET_HEADER_LENGTH)
            .unwrap_or(false)
    }

    fn read_packet<'b>(
        &mut self,
        rx: &'b mut ReceiveBuffer,
        seq: &mut SequenceTable,
        wait: bool,
    ) -> Result<Option<Packet<'b>>, TransportError> {
        if !wait && self.serial.bytes_available()? < PACKET_HEADER_LENGTH {
            return Ok(None);
        }

        self.seek_frame_start()?;

        // The byte after the start marker must be the protocol identifier;
        // a second 0x7E is a back-to-back end+start pair and is skipped
        let mut protocol_id = self.read_required()?;
        if protocol_id == UART_FRAME_BYTE {
            protocol_id = self.read_required()?;
        }
        if protocol_id != UART_PROTOCOL_ID {
            return Err(TransportError::UnhandledProtocol(protocol_id));
        }

        let mut header_buf = [0u8; PACKET_HEADER_LENGTH];
        for byte in header_buf.iter_mut() {
            *byte = self.read_unescaped()?;
        }
        let announced = RawHeader::parse(&header_buf)?;
        if announced.is_empty() {
            // The end marker stays in the stream; the next hunt skips it
            return Ok(None);
        }

        // Consume the cargo to the frame boundary even when the channel
        // turns out to be invalid, so the next read starts clean
        let total = announced.packet_byte_count as usize;
        rx.ensure_capacity(total);
        {
            let slice = rx.as_mut_slice();
            slice[..PACKET_HEADER_LENGTH].copy_from_slice(&header_buf);
            for idx in PACKET_HEADER_LENGTH..total {
                slice[idx] = self.read_unescaped()?;
            }
        }
        if self.read_required()? != UART_FRAME_BYTE {
            return Err(TransportError::FrameDelimiterMissing);
        }

        let header = announced.validated()?;
        seq.record_rx(header.channel, header.sequence);

        let frame: &'b [u8] = rx.as_slice();
        Ok(Some(Packet {
            header,
            payload: &frame[PACKET_HEADER_LENGTH..total],
        }))
    }

    fn send_packet(
        &mut self,
        channel: Channel,
        payload: &[u8],
        seq: &mut SequenceTable,
    ) -> Result<u8, TransportError> {
        let sequence = seq.next_tx(channel);
        let packet_length = (payload.len() + PACKET_HEADER_LENGTH) as u16;

        let mut frame = Vec::with_capacity(packet_length as usize);
        frame.extend_from_slice(&encode_header(packet_length, channel, sequence));
        frame.extend_from_slice(payload);
        let mut escaped = Vec::with_capacity(frame.len() + 4);
        escape_into(&frame, &mut escaped);

        self.serial.write_byte(UART_FRAME_BYTE)?;
        delay_us(UART_INTERBYTE_DELAY_US);
        self.serial.write_byte(UART_PROTOCOL_ID)?;
        delay_us(UART_INTERBYTE_DELAY_US);
        for &byte in &escaped {
            self.serial.write_byte(byte)?;
            delay_us(UART_INTERBYTE_DELAY_US);
        }
        self.serial.write_byte(UART_FRAME_BYTE)?;

        Ok(sequence)
    }

    fn reset_pulse(&mut self) -> Result<bool, TransportError> {
        match self.reset.as_mut() {
            Some(reset) => {
                reset.set_high()?;
                delay_ms(10);
                reset.set_low()?;
                delay_ms(10);
                reset.set_high()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
