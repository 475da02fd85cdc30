// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transport adapters for the three physical links the sensor supports.
//!
//! The protocol engine is written once against [`SensorInterface`]; the
//! I2C, SPI and UART adapters implement it with their per-link quirks
//! (speculative header reads, wake/ready handshakes, frame escaping).

pub mod delay;
pub mod gpio;
pub mod i2c;
pub mod spi;
pub mod spidev;
pub mod uart;

pub use i2c::{I2cDevice, I2cInterface};
pub use spi::{SpiControlLines, SpiInterface};
pub use spidev::SpiDevice;
pub use uart::{SerialDevice, UartInterface};

use crate::buffer::ReceiveBuffer;
use crate::packet::{Channel, Packet};
use crate::sequence::SequenceTable;
use crate::TransportError;

pub use crate::packet::PACKET_HEADER_LENGTH;

/// A method of communicating with the sensor.
///
/// The engine owns the receive buffer and sequence table; adapters borrow
/// them only for the duration of a single call and must not retain
/// references across calls.
pub trait SensorInterface {
    /// One-time link bring-up: mode-select pins, reset release, port flush
    fn setup(&mut self) -> Result<(), TransportError>;

    /// Whether the sensor currently has data for the host
    fn is_data_ready(&mut self) -> bool;

    /// Read at most one packet.
    ///
    /// Returns `Ok(None)` when the sensor has nothing to offer (zero-length
    /// header, or nothing buffered with `wait` false). With `wait` true the
    /// adapter blocks up to its bounded internal timeout for the ready
    /// signal. The returned packet's payload borrows `rx`.
    fn read_packet<'b>(
        &mut self,
        rx: &'b mut ReceiveBuffer,
        seq: &mut SequenceTable,
        wait: bool,
    ) -> Result<Option<Packet<'b>>, TransportError>;

    /// Frame and send one packet, consuming the next transmit sequence
    /// number for `channel`. Returns the sequence number just used.
    fn send_packet(
        &mut self,
        channel: Channel,
        payload: &[u8],
        seq: &mut SequenceTable,
    ) -> Result<u8, TransportError>;

    /// Pulse the hardware reset line if one is wired.
    ///
    /// Returns `false` when the adapter has no reset line; callers fall
    /// back to a soft reset in that case.
    fn reset_pulse(&mut self) -> Result<bool, TransportError>;

    /// Whether this link needs a soft reset during init (register-bus quirk)
    fn requires_soft_reset(&self) -> bool {
        false
    }
}
