//! Linux spidev access for the shift-register link.
//!
//! The sensor requires SPI mode 3 (CPOL = 1, CPHA = 1) and tops out at
//! 3 MHz. Chip select is driven as a separate GPIO line by the transport so
//! the assert/settle/deassert bracketing around each transfer is explicit;
//! the kernel's own CS is left unused.

use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::io;
use std::path::Path;

/// Maximum clock rate supported by the sensor
const SPI_MAX_SPEED_HZ: u32 = 3_000_000;

/// Blocking full-duplex transfer
pub trait Transfer {
    type Error;

    /// Shift `words` out while reading the same number of bytes back into
    /// `words`
    fn transfer(&mut self, words: &mut [u8]) -> Result<(), Self::Error>;
}

/// Blocking write, incoming bytes discarded
pub trait Write {
    type Error;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error>;
}

pub struct SpiDevice {
    spi: Spidev,
}

impl SpiDevice {
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<SpiDevice> {
        let mut spi = Spidev::open(path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(SPI_MAX_SPEED_HZ)
            .mode(SpiModeFlags::SPI_MODE_3 | SpiModeFlags::SPI_NO_CS)
            .lsb_first(false)
            .build();
        spi.configure(&options)?;

        Ok(SpiDevice { spi })
    }
}

impl Transfer for SpiDevice {
    type Error = io::Error;

    fn transfer(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let tx = words.to_vec();
        let mut transfer = SpidevTransfer::read_write(&tx, words);
        self.spi.transfer(&mut transfer)?;
        Ok(())
    }
}

impl Write for SpiDevice {
    type Error = io::Error;

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        let mut rx_buf = vec![0_u8; words.len()];
        let mut transfer = SpidevTransfer::read_write(words, &mut rx_buf);
        self.spi.transfer(&mut transfer)?;
        Ok(())
    }
}
