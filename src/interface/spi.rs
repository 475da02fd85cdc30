//! Shift-register (SPI) transport adapter.
//!
//! The sensor signals data ready by asserting HINTN low. Before any
//! transfer the adapter wakes the sensor (WAKE/PS0 low) and requires HINTN
//! to assert within a bounded wait; every register-level transfer is
//! bracketed by a chip-select assert/deassert pair with a short settle delay
//! after asserting. Reading is speculative: a 4-byte header transfer
//! announces the cargo size, then the whole packet is clocked out in a
//! second bracketed transfer.

use std::io;
use std::time::Duration;

use log::trace;

use crate::buffer::ReceiveBuffer;
use crate::interface::delay::{delay_ms, delay_us, poll_deadline};
use crate::interface::gpio::{InputPin, OutputPin};
use crate::interface::spidev::{Transfer, Write};
use crate::interface::{SensorInterface, PACKET_HEADER_LENGTH};
use crate::packet::{encode_header, Channel, Packet, RawHeader};
use crate::sequence::SequenceTable;
use crate::TransportError;

/// Settle time after asserting chip select
const CS_SETTLE_US: u64 = 2;
/// Gap between the header transfer and the cargo transfer
const HEADER_TO_CARGO_DELAY_US: u64 = 100;
/// Bounded wait for HINTN during normal operation
const READY_TIMEOUT: Duration = Duration::from_millis(150);
/// Bounded wait for HINTN after releasing reset (boot takes ~120 ms)
const BOOT_TIMEOUT: Duration = Duration::from_millis(400);

/// All the lines required to operate the sensor on SPI:
/// - SPI: the spidev transfer/write handle
/// - HINTN: sensor drives low when it has data for the host
/// - CS: chip select, asserted only around a transfer
/// - WAKE: PS0/WAKE, held high to select SPI mode, pulsed low to wake
/// - RESET: optional active-low reset line
pub struct SpiControlLines<SPI, IN, OUT> {
    pub spi: SPI,
    pub hintn: IN,
    pub cs: OUT,
    pub wake: OUT,
    pub reset: Option<OUT>,
}

/// SPI transport adapter
pub struct SpiInterface<SPI, IN, OUT> {
    spi: SPI,
    hintn: IN,
    cs: OUT,
    wake: OUT,
    reset: Option<OUT>,
    ready_timeout: Duration,
}

impl<SPI, IN, OUT> SpiInterface<SPI, IN, OUT>
where
    SPI: Transfer<Error = io::Error> + Write<Error = io::Error>,
    IN: InputPin<Error = io::Error>,
    OUT: OutputPin<Error = io::Error>,
{
    pub fn new(lines: SpiControlLines<SPI, IN, OUT>) -> Self {
        Self {
            spi: lines.spi,
            hintn: lines.hintn,
            cs: lines.cs,
            wake: lines.wake,
            reset: lines.reset,
            ready_timeout: READY_TIMEOUT,
        }
    }

    /// Override the bounded wait for the ready signal
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Is the sensor indicating it has data or is ready for a transfer
    fn hintn_asserted(&self) -> bool {
        self.hintn.is_low().unwrap_or(false)
    }

    /// Wake the sensor and wait for HINTN to assert within `timeout`.
    fn wait_for_ready(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if self.hintn_asserted() {
            return Ok(());
        }
        self.wake.set_low()?;
        let ready = poll_deadline(timeout, || self.hintn.is_low().unwrap_or(false));
        self.wake.set_high()?;
        if ready {
            Ok(())
        } else {
            Err(TransportError::InterruptTimeout)
        }
    }

    /// Run one full-duplex transfer with CS bracketing around exactly the
    /// bytes being moved.
    fn transfer_bracketed(&mut self, words: &mut [u8]) -> Result<(), TransportError> {
        self.cs.set_low()?;
        delay_us(CS_SETTLE_US);
        let result = self.spi.transfer(words);
        self.cs.set_high()?;
        result.map_err(TransportError::Comm)
    }

    /// Write bytes with CS bracketing, discarding the incoming bytes
    fn write_bracketed(&mut self, words: &[u8]) -> Result<(), TransportError> {
        self.cs.set_low()?;
        delay_us(CS_SETTLE_US);
        let result = self.spi.write(words);
        self.cs.set_high()?;
        result.map_err(TransportError::Comm)
    }
}

impl<SPI, IN, OUT> SensorInterface for SpiInterface<SPI, IN, OUT>
where
    SPI: Transfer<Error = io::Error> + Write<Error = io::Error>,
    IN: InputPin<Error = io::Error>,
    OUT: OutputPin<Error = io::Error>,
{
    fn setup(&mut self) -> Result<(), TransportError> {
        // Deselect the sensor and hold WAKE high so it boots into SPI mode
        self.cs.set_high()?;
        self.wake.set_high()?;

        if self.reset_pulse()? {
            trace!("reset released, waiting for boot");
            if !poll_deadline(BOOT_TIMEOUT, || self.hintn.is_low().unwrap_or(false)) {
                return Err(TransportError::InterruptTimeout);
            }
        }
        Ok(())
    }

    fn is_data_ready(&mut self) -> bool {
        self.hintn_asserted()
    }

    fn read_packet<'b>(
        &mut self,
        rx: &'b mut ReceiveBuffer,
        seq: &mut SequenceTable,
        wait: bool,
    ) -> Result<Option<Packet<'b>>, TransportError> {
        if wait {
            let timeout = self.ready_timeout;
            self.wait_for_ready(timeout)?;
        } else if !self.hintn_asserted() {
            return Ok(None);
        }

        let mut header_buf = [0u8; PACKET_HEADER_LENGTH];
        self.transfer_bracketed(&mut header_buf)?;
        let announced = RawHeader::parse(&header_buf)?;
        if announced.is_empty() {
            return Ok(None);
        }

        let mut total = announced.packet_byte_count as usize;
        rx.ensure_capacity(total);
        delay_us(HEADER_TO_CARGO_DELAY_US);

        // The sensor resends the whole packet, header included, on the next
        // chip-select cycle
        self.transfer_bracketed(&mut rx.as_mut_slice()[..total])?;
        let reread = RawHeader::parse(rx.as_slice())?;
        if reread.is_empty() {
            return Ok(None);
        }
        total = total.min(reread.packet_byte_count as usize);
        let header = reread.validated()?;
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

        self.write_bracketed(&frame)?;
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
