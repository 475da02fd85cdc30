// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! SHTP frame codec.
//!
//! Every packet starts with a 4-byte little-endian header: a 16-bit total
//! length (including the header itself, top bit reserved as a continuation
//! flag), an 8-bit channel and an 8-bit sequence number. The UART transport
//! additionally wraps the header and payload in `0x7E`-delimited frames with
//! control-byte escaping; the escape helpers for that layer live here too.

use crate::constants::{UART_ESCAPE_BYTE, UART_ESCAPE_MASK, UART_FRAME_BYTE};
use crate::TransportError;

/// Length of an SHTP packet header
pub const PACKET_HEADER_LENGTH: usize = 4;

/// Continuation flag in the raw length field
const CONTINUATION_FLAG: u16 = 0x8000;

/// The six logical sub-streams multiplexed over one physical link.
///
/// Anything outside this set on the wire is a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// SHTP command channel (advertisements, error lists)
    Command,
    /// Executable channel (device reset)
    Executable,
    /// Sensor hub control channel (feature and calibration commands)
    HubControl,
    /// Input sensor reports (non-wake)
    InputReports,
    /// Wake input sensor reports
    WakeInputReports,
    /// Gyro-integrated rotation vector stream
    GyroRotationVector,
}

impl Channel {
    /// Number of known channels
    pub const COUNT: usize = 6;

    /// Channel number as it appears on the wire
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Index into per-channel tables
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Channel::Command),
            1 => Ok(Channel::Executable),
            2 => Ok(Channel::HubControl),
            3 => Ok(Channel::InputReports),
            4 => Ok(Channel::WakeInputReports),
            5 => Ok(Channel::GyroRotationVector),
            other => Err(other),
        }
    }
}

/// A decoded header whose channel has not been validated yet.
///
/// Transports must consume the announced cargo before rejecting an unknown
/// channel, so validation is a separate step from parsing.
#[derive(Debug, Clone, Copy)]
pub struct RawHeader {
    /// Total packet length including the header, continuation flag cleared
    pub packet_byte_count: u16,
    /// Channel number as received
    pub channel: u8,
    /// Sequence number as received
    pub sequence: u8,
}

impl RawHeader {
    /// Parse the 4 header bytes.
    ///
    /// `0xFFFF` in the length field means the bus has desynchronized; a set
    /// continuation flag means the sensor segmented the cargo, which this
    /// driver does not reassemble. Both are fatal for the transaction.
    pub fn parse(buf: &[u8]) -> Result<RawHeader, TransportError> {
        debug_assert!(buf.len() >= PACKET_HEADER_LENGTH);
        let raw_length = u16::from_le_bytes([buf[0], buf[1]]);
        if raw_length == 0xFFFF {
            return Err(TransportError::MalformedLength);
        }
        if raw_length & CONTINUATION_FLAG != 0 {
            return Err(TransportError::Fragmented);
        }
        let packet_byte_count = raw_length & !CONTINUATION_FLAG;
        if packet_byte_count != 0 && (packet_byte_count as usize) < PACKET_HEADER_LENGTH {
            return Err(TransportError::MalformedLength);
        }
        Ok(RawHeader {
            packet_byte_count,
            channel: buf[2],
            sequence: buf[3],
        })
    }

    /// A zero length field is the "no data available" sentinel, not an error
    pub fn is_empty(&self) -> bool {
        self.packet_byte_count == 0
    }

    /// Resolve the channel number against the known set
    pub fn validated(self) -> Result<PacketHeader, TransportError> {
        let channel =
            Channel::try_from(self.channel).map_err(TransportError::InvalidChannel)?;
        Ok(PacketHeader {
            packet_byte_count: self.packet_byte_count,
            channel,
            sequence: self.sequence,
        })
    }
}

/// A validated SHTP packet header
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    /// Total packet length including the header
    pub packet_byte_count: u16,
    /// Channel the packet arrived on
    pub channel: Channel,
    /// Sequence number assigned by the sender
    pub sequence: u8,
}

impl PacketHeader {
    /// Payload length excluding the header
    pub fn data_length(&self) -> usize {
        (self.packet_byte_count as usize).saturating_sub(PACKET_HEADER_LENGTH)
    }
}

/// Encode a header for an outbound packet.
///
/// `packet_length` is the total length including the header; the continuation
/// flag is never set on outbound packets.
pub fn encode_header(packet_length: u16, channel: Channel, sequence: u8) -> [u8; 4] {
    let len = packet_length.to_le_bytes();
    [len[0], len[1], channel.number(), sequence]
}

/// A received packet; the payload borrows the engine's receive buffer for the
/// duration of the read call.
#[derive(Debug)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

/// Append `src` to `dst` with UART-SHTP control-byte escaping applied.
///
/// Any byte equal to the frame delimiter or the escape introducer is replaced
/// by the escape introducer followed by the byte XORed with the escape mask.
pub fn escape_into(src: &[u8], dst: &mut Vec<u8>) {
    for &b in src {
        if b == UART_FRAME_BYTE || b == UART_ESCAPE_BYTE {
            dst.push(UART_ESCAPE_BYTE);
            dst.push(b ^ UART_ESCAPE_MASK);
        } else {
            dst.push(b);
        }
    }
}

/// Reverse [`escape_into`]. A trailing escape introducer with no byte after
/// it indicates a truncated frame.
pub fn unescape(src: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut out = Vec::with_capacity(src.len());
    let mut iter = src.iter();
    while let Some(&b) = iter.next() {
        if b == UART_ESCAPE_BYTE {
            let &next = iter.next().ok_or(TransportError::FrameDelimiterMissing)?;
            out.push(next ^ UART_ESCAPE_MASK);
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        for &(length, channel, sequence) in &[
            (4u16, Channel::Command, 0u8),
            (21, Channel::HubControl, 17),
            (0x7FFF, Channel::GyroRotationVector, 255),
            (284, Channel::InputReports, 128),
        ] {
            let encoded = encode_header(length, channel, sequence);
            let header = RawHeader::parse(&encoded).unwrap().validated().unwrap();
            assert_eq!(header.packet_byte_count, length);
            assert_eq!(header.channel, channel);
            assert_eq!(header.sequence, sequence);
        }
    }

    #[test]
    fn test_zero_length_is_sentinel() {
        let raw = RawHeader::parse(&[0, 0, 3, 9]).unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn test_malformed_length_is_fatal() {
        assert!(matches!(
            RawHeader::parse(&[0xFF, 0xFF, 0, 0]),
            Err(TransportError::MalformedLength)
        ));
        // Nonzero but shorter than the header itself
        assert!(matches!(
            RawHeader::parse(&[3, 0, 0, 0]),
            Err(TransportError::MalformedLength)
        ));
    }

    #[test]
    fn test_continuation_flag_is_fatal() {
        // 0x8014: continuation flag plus a 20 byte cargo
        assert!(matches!(
            RawHeader::parse(&[0x14, 0x80, 2, 0]),
            Err(TransportError::Fragmented)
        ));
    }

    #[test]
    fn test_invalid_channel_detected_after_parse() {
        let raw = RawHeader::parse(&[10, 0, 19, 0]).unwrap();
        assert!(matches!(
            raw.validated(),
            Err(TransportError::InvalidChannel(19))
        ));
    }

    #[test]
    fn test_data_length_excludes_header() {
        let header = RawHeader::parse(&[20, 0, 3, 1]).unwrap().validated().unwrap();
        assert_eq!(header.data_length(), 16);
    }

    #[test]
    fn test_escape_round_trip() {
        let cases: &[&[u8]] = &[
            &[],
            &[0x00, 0x42, 0xFF],
            &[0x7E],
            &[0x7D],
            &[0x7E, 0x7D, 0x7E, 0x7D],
            &[0x11, 0x7D, 0x5E, 0x7E, 0x5D, 0x22],
        ];
        for &case in cases {
            let mut escaped = Vec::new();
            escape_into(case, &mut escaped);
            // No reserved byte may survive unescaped
            assert!(!escaped
                .iter()
                .any(|&b| b == UART_FRAME_BYTE));
            assert_eq!(unescape(&escaped).unwrap(), case);
        }
    }

    #[test]
    fn test_unescape_truncated_frame() {
        assert!(matches!(
            unescape(&[0x01, 0x7D]),
            Err(TransportError::FrameDelimiterMissing)
        ));
    }

    #[test]
    fn test_channel_numbers() {
        assert_eq!(Channel::Command.number(), 0);
        assert_eq!(Channel::Executable.number(), 1);
        assert_eq!(Channel::HubControl.number(), 2);
        assert_eq!(Channel::InputReports.number(), 3);
        assert_eq!(Channel::WakeInputReports.number(), 4);
        assert_eq!(Channel::GyroRotationVector.number(), 5);
        assert!(Channel::try_from(6).is_err());
    }
}
