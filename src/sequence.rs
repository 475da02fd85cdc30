// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-channel sequence number tracking.
//!
//! Each communication channel carries independent transmit and receive
//! sequence counters. Outbound packets consume and increment the transmit
//! counter modulo 256; inbound packets overwrite the receive record with
//! whatever the sensor sent (last-write-wins). The sensor is the sole
//! initiator of report cadence and the host cannot request retransmission,
//! so received sequence numbers are an observability signal for duplicate or
//! lost packets, not flow control.

use crate::packet::Channel;

/// Transmit and receive sequence counters for all six channels
#[derive(Debug, Default)]
pub struct SequenceTable {
    tx: [u8; Channel::COUNT],
    rx: [u8; Channel::COUNT],
}

impl SequenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next transmit sequence number for `channel`.
    ///
    /// Returns the number to place in the outgoing header; the stored
    /// counter advances with wraparound.
    pub fn next_tx(&mut self, channel: Channel) -> u8 {
        let seq = self.tx[channel.index()];
        self.tx[channel.index()] = seq.wrapping_add(1);
        seq
    }

    /// Sequence number the next send on `channel` will use
    pub fn peek_tx(&self, channel: Channel) -> u8 {
        self.tx[channel.index()]
    }

    /// Record the sequence number of a received packet verbatim
    pub fn record_rx(&mut self, channel: Channel, sequence: u8) {
        self.rx[channel.index()] = sequence;
    }

    /// Last sequence number seen from the sensor on `channel`
    pub fn last_rx(&self, channel: Channel) -> u8 {
        self.rx[channel.index()]
    }

    /// Zero every counter in both directions (after a sensor reset)
    pub fn reset(&mut self) {
        self.tx = [0; Channel::COUNT];
        self.rx = [0; Channel::COUNT];
    }

    /// Zero the transmit counters only (after a soft reset request)
    pub fn reset_tx(&mut self) {
        self.tx = [0; Channel::COUNT];
    }

    /// True when every counter in both directions is zero
    pub fn is_zeroed(&self) -> bool {
        self.tx.iter().all(|&s| s == 0) && self.rx.iter().all(|&s| s == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_wraparound() {
        let mut table = SequenceTable::new();
        for expected in 0..=255u8 {
            assert_eq!(table.next_tx(Channel::HubControl), expected);
        }
        // 257th send wraps back to the start of the cycle
        assert_eq!(table.next_tx(Channel::HubControl), 0);
        assert_eq!(table.next_tx(Channel::HubControl), 1);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut table = SequenceTable::new();
        table.next_tx(Channel::HubControl);
        table.next_tx(Channel::HubControl);
        assert_eq!(table.peek_tx(Channel::HubControl), 2);
        assert_eq!(table.peek_tx(Channel::Executable), 0);
    }

    #[test]
    fn test_rx_is_last_write_wins() {
        let mut table = SequenceTable::new();
        table.record_rx(Channel::InputReports, 7);
        table.record_rx(Channel::InputReports, 3);
        // No ordering enforcement: the later value simply overwrites
        assert_eq!(table.last_rx(Channel::InputReports), 3);
    }

    #[test]
    fn test_reset_zeroes_both_directions() {
        let mut table = SequenceTable::new();
        table.next_tx(Channel::Command);
        table.record_rx(Channel::InputReports, 42);
        assert!(!table.is_zeroed());
        table.reset();
        assert!(table.is_zeroed());
    }
}
