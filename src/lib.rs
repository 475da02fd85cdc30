// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! SHTP protocol driver for the BNO08x family of IMU sensor hubs.
//!
//! The crate is organized around a transport-independent protocol engine
//! ([`driver::BNO08x`]) that speaks the Sensor Hub Transport Protocol over
//! any type implementing [`interface::SensorInterface`]. Three adapters are
//! provided for Linux hosts: I2C (`/dev/i2c-*`), SPI (`/dev/spidev*` plus
//! GPIO control lines) and UART (`/dev/tty*`).

pub mod buffer;
pub mod calibration;
pub mod constants;
pub mod driver;
pub mod features;
pub mod interface;
pub mod packet;
pub mod reports;
pub mod sequence;

pub use buffer::ReceiveBuffer;
pub use calibration::{CalibrationPhase, CalibrationState, TareBasis};
pub use driver::{BNO08x, DriverError};
pub use packet::{Channel, Packet, PacketHeader};
pub use reports::{Accuracy, SensorData, SensorReading};
pub use sequence::SequenceTable;

use std::io;

/// Transport-level faults surfaced by the adapters.
///
/// Recoverable kinds can be retried from the caller's poll loop; the rest
/// indicate a desynchronized link that needs a reset to recover.
#[derive(Debug)]
pub enum TransportError {
    /// A packet was required but the sensor had nothing to offer
    NoPacketAvailable,
    /// Received a channel outside the known set; the frame has already been
    /// consumed, so the caller may simply read again
    InvalidChannel(u8),
    /// Length field held the reserved all-ones value (bus desynchronization)
    MalformedLength,
    /// Continuation flag was set; segmented cargoes are not supported
    Fragmented,
    /// Byte-stream frame delimiter not found where expected
    FrameDelimiterMissing,
    /// Byte-stream protocol identifier missing or unrecognized
    UnhandledProtocol(u8),
    /// Ready signal did not assert within the bounded wait
    InterruptTimeout,
    /// Underlying bus I/O failure
    Comm(io::Error),
}

impl TransportError {
    /// Whether the caller's loop may retry the read without resetting the
    /// sensor first.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::NoPacketAvailable
                | TransportError::InvalidChannel(_)
                | TransportError::InterruptTimeout
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Comm(err)
    }
}
