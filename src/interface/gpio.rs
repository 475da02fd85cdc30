//! Digital signal lines through the Linux gpiod character device.
//!
//! The sensor needs up to four lines depending on the link: reset,
//! interrupt/ready (HINTN), chip select (SPI) and wake/PS0 (SPI mode
//! select). The pin traits keep the transport adapters testable without
//! hardware.

use gpiod::{Chip, Input, Lines, Options, Output};
use std::io;
use std::path::PathBuf;

/// Consumer label shown in gpioinfo for lines this driver holds
const GPIO_CONSUMER: &str = "bno08x-shtp";

pub trait OutputPin {
    type Error;

    /// Drive the pin low
    fn set_low(&mut self) -> Result<(), Self::Error>;

    /// Drive the pin high
    fn set_high(&mut self) -> Result<(), Self::Error>;
}

pub trait InputPin {
    type Error;

    /// Is the input pin high?
    fn is_high(&self) -> Result<bool, Self::Error>;

    /// Is the input pin low?
    fn is_low(&self) -> Result<bool, Self::Error>;
}

/// An output line requested from a gpiod chip
pub struct GpiodOut {
    output: Lines<Output>,
}

impl GpiodOut {
    /// Request `pin` on `chip` as an output, initially high (all the
    /// sensor's control inputs are active low).
    pub fn new(chip: &Chip, pin: u32) -> io::Result<GpiodOut> {
        let opts = Options::output([pin])
            .values([true])
            .consumer(GPIO_CONSUMER);
        Ok(GpiodOut {
            output: chip.request_lines(opts)?,
        })
    }
}

impl OutputPin for GpiodOut {
    type Error = io::Error;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.output.set_values([false])?;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.output.set_values([true])?;
        Ok(())
    }
}

/// An input line requested from a gpiod chip
pub struct GpiodIn {
    input: Lines<Input>,
}

impl GpiodIn {
    pub fn new(chip: &Chip, pin: u32) -> io::Result<GpiodIn> {
        let opts = Options::input([pin]).consumer(GPIO_CONSUMER);
        Ok(GpiodIn {
            input: chip.request_lines(opts)?,
        })
    }
}

impl InputPin for GpiodIn {
    type Error = io::Error;

    fn is_high(&self) -> Result<bool, Self::Error> {
        let values = self.input.get_values([false])?;
        Ok(values[0])
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        let values = self.input.get_values([false])?;
        Ok(!values[0])
    }
}

/// Locate a GPIO line by its symbolic name across all chips on the system.
///
/// Returns the chip device path and line offset, for boards where pins are
/// labelled (e.g. "IMU_INT") rather than numbered.
pub fn find_line(name: &str) -> io::Result<(PathBuf, u32)> {
    for entry in Chip::list_devices()? {
        let chip = Chip::new(&entry)?;
        for offset in 0..chip.num_lines() {
            if chip.line_info(offset)?.name == name {
                return Ok((entry, offset));
            }
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("did not find GPIO line \"{}\"", name),
    ))
}
