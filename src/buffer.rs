// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Growable receive buffer shared by all transports.

use log::debug;

use crate::constants::DATA_BUFFER_SIZE;

/// Owned byte region used for header and payload reads.
///
/// The buffer never shrinks; it grows in a single step to exactly fit the
/// largest packet announced so far, so no read can ever be truncated. Growth
/// discards previous contents; a reader that still needs them must have
/// consumed them before asking for more room.
pub struct ReceiveBuffer {
    buf: Vec<u8>,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0; DATA_BUFFER_SIZE],
        }
    }

    /// Current capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Make room for a packet of `total_len` bytes (header included),
    /// reallocating to exactly that size if the buffer is smaller.
    pub fn ensure_capacity(&mut self, total_len: usize) {
        if total_len > self.buf.len() {
            debug!(
                "growing receive buffer {} -> {} bytes",
                self.buf.len(),
                total_len
            );
            self.buf = vec![0; total_len];
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}
