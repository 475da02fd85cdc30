// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! BNO08x protocol engine.
//!
//! This module contains the main driver for the BNO08x family of IMU
//! sensors. It owns the receive buffer and sequence table, runs the poll
//! cycle against whichever transport adapter it was constructed with, and
//! dispatches received packets to the report decoder or to the control
//! plane (feature acknowledgments, calibration responses, resets).

use log::{debug, trace, warn};

use std::io;
use std::time::{Duration, Instant};

use crate::buffer::ReceiveBuffer;
use crate::calibration::{CalibrationState, TareBasis};
use crate::constants::{
    shtp_error_to_str, CMD_RESP_ADVERTISEMENT, CMD_RESP_ERROR_LIST, DEFAULT_I2C_ADDRESS,
    EXECUTABLE_DEVICE_CMD_RESET, EXECUTABLE_DEVICE_RESP_RESET_COMPLETE,
    SENSOR_REPORTID_ACCELEROMETER, SENSOR_REPORTID_GRAVITY, SENSOR_REPORTID_GYROSCOPE,
    SENSOR_REPORTID_LINEAR_ACCEL, SENSOR_REPORTID_MAGNETIC_FIELD,
    SENSOR_REPORTID_ROTATION_VECTOR, SH2_CMD_ME_CALIBRATE, SH2_CMD_SAVE_DCD, SH2_CMD_TARE,
    SH2_INIT_SYSTEM, SH2_ME_CAL_CONFIG, SH2_ME_CAL_GET, SH2_STARTUP_INIT_UNSOLICITED,
    SH2_TARE_NOW, SH2_TARE_PERSIST, SHUB_COMMAND_REQ, SHUB_COMMAND_RESP, SHUB_GET_FEATURE_REQ,
    SHUB_GET_FEATURE_RESP, SHUB_PROD_ID_REQ, SHUB_PROD_ID_RESP, TARE_AXIS_ALL,
};
use crate::features::{FeatureRequest, FeatureTracker};
use crate::interface::delay::delay_ms;
use crate::interface::gpio::{find_line, GpiodIn, GpiodOut};
use crate::interface::i2c::{I2cDevice, I2cInterface};
use crate::interface::spi::{SpiControlLines, SpiInterface};
use crate::interface::spidev::SpiDevice;
use crate::interface::uart::{SerialDevice, UartInterface};
use crate::interface::{SensorInterface, PACKET_HEADER_LENGTH};
use crate::packet::{Channel, PacketHeader};
use crate::reports::{self, Accuracy, ActivityClassification, DecodeError, SensorData,
    StabilityClassification};
use crate::sequence::SequenceTable;
use crate::TransportError;

/// How long a reset may take before the sensor counts as unresponsive
const RESET_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(2);
/// Delay between read attempts while waiting for the reset announcement,
/// so a sensor that is still booting is not busy-spun
const RESET_RETRY_DELAY_MS: u64 = 10;
/// Settle time after requesting a soft reset
const RESET_SETTLE_MS: u64 = 250;

/// Driver-level errors
#[derive(Debug)]
pub enum DriverError {
    /// Transport fault while talking to the sensor
    Transport(TransportError),
    /// The sensor did not produce an expected response in time
    SensorUnresponsive,
    /// The product ID could not be verified
    InvalidProductId,
    /// An input-report payload could not be decoded
    Decode(DecodeError),
}

impl From<TransportError> for DriverError {
    fn from(err: TransportError) -> Self {
        DriverError::Transport(err)
    }
}

impl From<DecodeError> for DriverError {
    fn from(err: DecodeError) -> Self {
        DriverError::Decode(err)
    }
}

/// BNO08x protocol engine
///
/// One engine instance drives one sensor on one bus. The receive buffer,
/// sequence table and transport handle are exclusively owned; concurrent
/// use from multiple threads needs external mutual exclusion.
pub struct BNO08x<SI> {
    pub(crate) interface: SI,
    /// Each communication channel has its own tx/rx sequence counters
    sequence: SequenceTable,
    /// Grows to fit the largest packet the sensor has announced
    rx_buf: ReceiveBuffer,
    /// Latest decoded value of every supported report
    data: SensorData,
    /// Requested and granted report periods
    features: FeatureTracker,
    /// Calibration commands issued and accuracy stability timer
    calibration: CalibrationState,
    /// Sequence counter for SH-2 command requests
    command_seq: u8,

    /// Has the device reported reset-complete
    device_reset: bool,
    /// Has the product ID been verified
    prod_id_verified: bool,
    /// Has system initialization been reported
    init_received: bool,
    /// Have we received the full advertisement
    advert_received: bool,
    /// Have we received an error list
    error_list_received: bool,
    last_error_received: u8,
}

impl<SI> BNO08x<SI> {
    /// Create a new driver with the given sensor interface
    pub fn new_with_interface(interface: SI) -> Self {
        Self {
            interface,
            sequence: SequenceTable::new(),
            rx_buf: ReceiveBuffer::new(),
            data: SensorData::new(),
            features: FeatureTracker::new(),
            calibration: CalibrationState::new(),
            command_seq: 0,
            device_reset: false,
            prod_id_verified: false,
            init_received: false,
            advert_received: false,
            error_list_received: false,
            last_error_received: 0,
        }
    }

    /// Returns the previously consumed sensor interface instance.
    pub fn free(self) -> SI {
        self.interface
    }

    /// Access the underlying transport adapter
    pub fn interface(&self) -> &SI {
        &self.interface
    }

    /// Mutable access to the underlying transport adapter
    pub fn interface_mut(&mut self) -> &mut SI {
        &mut self.interface
    }
}

impl BNO08x<SpiInterface<SpiDevice, GpiodIn, GpiodOut>> {
    /// Create a new driver on SPI with explicit GPIO chip and pin numbers
    ///
    /// # Arguments
    /// * `spidevice` - Path to the SPI device (e.g., "/dev/spidev1.0")
    /// * `gpiochip` - GPIO chip carrying the control lines
    /// * `hintn_pin` - Interrupt/ready line
    /// * `cs_pin` - Chip select line
    /// * `wake_pin` - WAKE/PS0 line (mode select and wake)
    /// * `reset_pin` - Reset line
    pub fn new_spi(
        spidevice: &str,
        gpiochip: &str,
        hintn_pin: u32,
        cs_pin: u32,
        wake_pin: u32,
        reset_pin: u32,
    ) -> io::Result<Self> {
        let chip = gpiod::Chip::new(gpiochip)?;
        let lines = SpiControlLines {
            spi: SpiDevice::new(spidevice)?,
            hintn: GpiodIn::new(&chip, hintn_pin)?,
            cs: GpiodOut::new(&chip, cs_pin)?,
            wake: GpiodOut::new(&chip, wake_pin)?,
            reset: Some(GpiodOut::new(&chip, reset_pin)?),
        };
        Ok(BNO08x::new_with_interface(SpiInterface::new(lines)))
    }

    /// Create a new driver on SPI with GPIO line names (symbol lookup)
    ///
    /// Searches all GPIO chips on the system for lines with the given
    /// symbolic names (e.g., "IMU_INT").
    pub fn new_spi_from_symbol(
        spidevice: &str,
        hintn: &str,
        cs: &str,
        wake: &str,
        reset: &str,
    ) -> io::Result<Self> {
        let (hintn_chip, hintn_pin) = find_line(hintn)?;
        let (cs_chip, cs_pin) = find_line(cs)?;
        let (wake_chip, wake_pin) = find_line(wake)?;
        let (reset_chip, reset_pin) = find_line(reset)?;
        let lines = SpiControlLines {
            spi: SpiDevice::new(spidevice)?,
            hintn: GpiodIn::new(&gpiod::Chip::new(&hintn_chip)?, hintn_pin)?,
            cs: GpiodOut::new(&gpiod::Chip::new(&cs_chip)?, cs_pin)?,
            wake: GpiodOut::new(&gpiod::Chip::new(&wake_chip)?, wake_pin)?,
            reset: Some(GpiodOut::new(&gpiod::Chip::new(&reset_chip)?, reset_pin)?),
        };
        Ok(BNO08x::new_with_interface(SpiInterface::new(lines)))
    }
}

impl BNO08x<I2cInterface<I2cDevice, GpiodOut>> {
    /// Create a new driver on I2C at the default sensor address
    pub fn new_i2c(bus: &str) -> io::Result<Self> {
        Self::new_i2c_at(bus, DEFAULT_I2C_ADDRESS)
    }

    /// Create a new driver on I2C at an explicit address
    pub fn new_i2c_at(bus: &str, address: u16) -> io::Result<Self> {
        let device = I2cDevice::new(bus, address)?;
        Ok(BNO08x::new_with_interface(I2cInterface::new(device)))
    }

    /// Create a new driver on I2C with a reset line wired
    pub fn new_i2c_with_reset(
        bus: &str,
        address: u16,
        gpiochip: &str,
        reset_pin: u32,
    ) -> io::Result<Self> {
        let device = I2cDevice::new(bus, address)?;
        let chip = gpiod::Chip::new(gpiochip)?;
        let reset = GpiodOut::new(&chip, reset_pin)?;
        Ok(BNO08x::new_with_interface(
            I2cInterface::new(device).with_reset(reset),
        ))
    }
}

impl BNO08x<UartInterface<SerialDevice, GpiodOut>> {
    /// Create a new driver on a UART-SHTP serial port
    pub fn new_uart(port: &str, baud_rate: u32) -> io::Result<Self> {
        let device = SerialDevice::new(port, baud_rate)?;
        Ok(BNO08x::new_with_interface(UartInterface::new(device)))
    }

    /// Create a new driver on UART with a reset line wired
    pub fn new_uart_with_reset(
        port: &str,
        baud_rate: u32,
        gpiochip: &str,
        reset_pin: u32,
    ) -> io::Result<Self> {
        let device = SerialDevice::new(port, baud_rate)?;
        let chip = gpiod::Chip::new(gpiochip)?;
        let reset = GpiodOut::new(&chip, reset_pin)?;
        Ok(BNO08x::new_with_interface(
            UartInterface::new(device).with_reset(reset),
        ))
    }
}

impl<SI: SensorInterface> BNO08x<SI> {
    /// Initialize the sensor.
    ///
    /// The BNO08x starts up with all sensors disabled, waiting for the
    /// application to configure it. On startup the SHTP control application
    /// sends its full advertisement response, unsolicited, to the host.
    pub fn init(&mut self) -> Result<(), DriverError> {
        trace!("driver init");
        delay_ms(1);
        self.interface.setup()?;

        if self.interface.requires_soft_reset() {
            delay_ms(1);
            self.soft_reset()?;
            delay_ms(RESET_SETTLE_MS);
            self.eat_all_messages();
            delay_ms(RESET_SETTLE_MS);
            self.eat_all_messages();
        } else {
            // we only expect two messages after reset:
            // the advertisement response and the reset announcement
            delay_ms(RESET_SETTLE_MS);
            self.handle_one_message(20);
            delay_ms(RESET_SETTLE_MS);
            self.handle_one_message(20);
        }
        self.verify_product_id()?;
        delay_ms(100);
        Ok(())
    }

    /// Handle up to `max_count` messages with the given per-read timeout
    pub fn handle_messages(&mut self, timeout_ms: u64, max_count: u32) -> u32 {
        let mut total_handled: u32 = 0;
        while total_handled < max_count {
            if self.handle_one_message(timeout_ms) == 0 {
                break;
            }
            total_handled += 1;
            delay_ms(1);
        }
        total_handled
    }

    /// Handle messages until the sensor goes quiet
    pub fn handle_all_messages(&mut self, timeout_ms: u64) -> u32 {
        let mut total_handled: u32 = 0;
        loop {
            let handled_count = self.handle_one_message(timeout_ms);
            if handled_count == 0 {
                break;
            }
            total_handled += handled_count;
            delay_ms(1);
        }
        total_handled
    }

    /// Handle one message and return the count of messages handled (0 or 1)
    pub fn handle_one_message(&mut self, max_ms: u64) -> u32 {
        match self.receive_packet_with_timeout(max_ms) {
            Ok(Some(header)) => {
                if let Err(e) = self.handle_received_packet(header) {
                    warn!("{:?}", e);
                }
                1
            }
            Ok(None) => 0,
            Err(e) => {
                trace!("handle1 err {:?}", e);
                0
            }
        }
    }

    /// Receive and ignore one message, returning the packet size or zero
    pub fn eat_one_message(&mut self) -> usize {
        match self.receive_packet_with_timeout(150) {
            Ok(Some(header)) => header.packet_byte_count as usize,
            Ok(None) => 0,
            Err(e) => {
                trace!("e1 err {:?}", e);
                0
            }
        }
    }

    /// Consume all available messages on the port without processing them
    pub fn eat_all_messages(&mut self) {
        loop {
            if self.eat_one_message() == 0 {
                break;
            }
            delay_ms(1);
        }
    }

    /// Poll the transport for one packet, bounded by `max_ms`.
    ///
    /// One call yields at most one packet; packets on the same channel come
    /// back in arrival order.
    pub(crate) fn receive_packet_with_timeout(
        &mut self,
        max_ms: u64,
    ) -> Result<Option<PacketHeader>, TransportError> {
        let deadline = Duration::from_millis(max_ms);
        let start = Instant::now();
        loop {
            if self.interface.is_data_ready() {
                match self
                    .interface
                    .read_packet(&mut self.rx_buf, &mut self.sequence, false)
                {
                    Ok(Some(packet)) => return Ok(Some(packet.header)),
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
            }
            if start.elapsed() >= deadline {
                return Ok(None);
            }
            delay_ms(1);
        }
    }

    /// Handle a received packet and dispatch to the appropriate handler.
    ///
    /// The packet bytes are still in the receive buffer; `header` tells us
    /// where they end.
    pub fn handle_received_packet(&mut self, header: PacketHeader) -> Result<(), DriverError> {
        let total = (header.packet_byte_count as usize).min(self.rx_buf.capacity());
        if total < PACKET_HEADER_LENGTH {
            return Ok(());
        }

        match header.channel {
            Channel::Command => self.handle_command_channel(total),
            Channel::Executable => {
                let payload = &self.rx_buf.as_slice()[PACKET_HEADER_LENGTH..total];
                if payload.first() == Some(&EXECUTABLE_DEVICE_RESP_RESET_COMPLETE) {
                    trace!("reset complete");
                    self.device_reset = true;
                } else {
                    trace!("unhandled executable response {:?}", payload.first());
                }
            }
            Channel::HubControl => self.handle_control_channel(total),
            Channel::InputReports | Channel::WakeInputReports => {
                let events = {
                    let payload = &self.rx_buf.as_slice()[PACKET_HEADER_LENGTH..total];
                    reports::decode_input_payload(payload)?
                };
                for event in events {
                    self.data.apply(event);
                }
            }
            Channel::GyroRotationVector => {
                let (quaternion, angular_velocity) = {
                    let payload = &self.rx_buf.as_slice()[PACKET_HEADER_LENGTH..total];
                    reports::decode_gyro_integrated_rv(payload)?
                };
                self.data.gyro_rv_quaternion = quaternion;
                self.data.gyro_rv_angular_velocity = angular_velocity;
            }
        }
        Ok(())
    }

    /// SHTP command channel: advertisements and error lists
    fn handle_command_channel(&mut self, total: usize) {
        let payload = &self.rx_buf.as_slice()[PACKET_HEADER_LENGTH..total];
        match payload.first().copied() {
            Some(CMD_RESP_ADVERTISEMENT) => {
                // tag/length/value walk; the contents are only needed for
                // protocol debugging
                let mut cursor = 1usize;
                while cursor + 1 < payload.len() {
                    let _tag = payload[cursor];
                    let len = payload[cursor + 1] as usize;
                    cursor += 2 + len;
                }
                self.advert_received = true;
            }
            Some(CMD_RESP_ERROR_LIST) => {
                let mut last = 0;
                for &err in &payload[1..] {
                    warn!("SHTP error {}: {}", err, shtp_error_to_str(err));
                    last = err;
                }
                self.error_list_received = true;
                self.last_error_received = last;
            }
            other => trace!("unhandled command response {:?}", other),
        }
    }

    /// Sensor hub control channel: product id, feature and command responses
    fn handle_control_channel(&mut self, total: usize) {
        let payload = &self.rx_buf.as_slice()[PACKET_HEADER_LENGTH..total];
        match payload.first().copied() {
            Some(SHUB_PROD_ID_RESP) => {
                if payload.len() >= 4 {
                    trace!("PID_RESP {}.{}", payload[2], payload[3]);
                }
                self.prod_id_verified = true;
            }
            Some(SHUB_GET_FEATURE_RESP) if payload.len() >= 9 => {
                let report_id = payload[1];
                let period_us =
                    u32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]);
                self.features.note_response(report_id, period_us);
            }
            Some(SHUB_COMMAND_RESP) if payload.len() >= 6 => {
                let command = payload[2];
                let status = payload[5];
                trace!("CMD_RESP: 0x{:X} status {}", command, status);
                match command {
                    SH2_CMD_ME_CALIBRATE => self.calibration.set_status(status),
                    SH2_CMD_SAVE_DCD => {
                        if status == 0 {
                            self.calibration.mark_saved();
                        } else {
                            warn!("save calibration data failed with status {}", status);
                        }
                    }
                    SH2_STARTUP_INIT_UNSOLICITED | SH2_INIT_SYSTEM => {
                        self.init_received = true;
                    }
                    _ => {}
                }
            }
            other => trace!("unhandled control response {:?}", other),
        }
    }

    /// Verify that the sensor answers a product ID request
    fn verify_product_id(&mut self) -> Result<(), DriverError> {
        trace!("request PID...");
        let cmd_body: [u8; 2] = [
            SHUB_PROD_ID_REQ, // request product ID
            0,                // reserved
        ];
        self.send_packet(Channel::HubControl, &cmd_body)?;

        // process incoming messages until we get a product id (or no more data)
        while !self.prod_id_verified {
            if self.handle_one_message(150) < 1 {
                break;
            }
        }

        if !self.prod_id_verified {
            return Err(DriverError::InvalidProductId);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Feature control
    // -------------------------------------------------------------------------

    /// Enable a sensor report with the specified update interval.
    ///
    /// The command does not block for acknowledgment; the sensor confirms
    /// with a Get Feature Response that is recorded when it arrives. Use
    /// [`Self::await_feature_enabled`] to wait for the confirmation.
    /// Resending re-arms the same feature at the new rate.
    pub fn enable_report(
        &mut self,
        report_id: u8,
        millis_between_reports: u16,
    ) -> Result<(), DriverError> {
        self.enable_report_us(report_id, u32::from(millis_between_reports) * 1000)
    }

    /// Enable a sensor report with a microsecond period
    pub fn enable_report_us(&mut self, report_id: u8, period_us: u32) -> Result<(), DriverError> {
        trace!("enable_report 0x{:X} every {} us", report_id, period_us);
        let request = FeatureRequest {
            report_id,
            period_us,
        };
        self.send_packet(Channel::HubControl, &request.encode())?;
        self.features.note_request(report_id, period_us);
        Ok(())
    }

    /// Ask the sensor to report a feature's current configuration
    pub fn request_feature(&mut self, report_id: u8) -> Result<(), DriverError> {
        self.send_packet(Channel::HubControl, &[SHUB_GET_FEATURE_REQ, report_id])?;
        Ok(())
    }

    /// Poll messages until the sensor confirms `report_id` or the timeout
    /// expires. Returns whether the feature is enabled.
    pub fn await_feature_enabled(&mut self, report_id: u8, timeout_ms: u64) -> bool {
        let start = Instant::now();
        while !self.features.is_enabled(report_id)
            && start.elapsed() < Duration::from_millis(timeout_ms)
        {
            self.handle_one_message(50);
        }
        self.features.is_enabled(report_id)
    }

    /// Enable reporting of the rotation vector (fused quaternion).
    ///
    /// Note that the maximum valid update rate is 1 kHz, based on the max
    /// update rate of the sensor's gyros.
    pub fn enable_rotation_vector(
        &mut self,
        millis_between_reports: u16,
    ) -> Result<(), DriverError> {
        self.enable_report(SENSOR_REPORTID_ROTATION_VECTOR, millis_between_reports)
    }

    /// Enable reporting of the accelerometer.
    pub fn enable_accelerometer(
        &mut self,
        millis_between_reports: u16,
    ) -> Result<(), DriverError> {
        self.enable_report(SENSOR_REPORTID_ACCELEROMETER, millis_between_reports)
    }

    /// Enable reporting of the calibrated magnetometer.
    pub fn enable_magnetometer(
        &mut self,
        millis_between_reports: u16,
    ) -> Result<(), DriverError> {
        self.enable_report(SENSOR_REPORTID_MAGNETIC_FIELD, millis_between_reports)
    }

    /// Enable reporting of the linear acceleration vector.
    pub fn enable_linear_accel(
        &mut self,
        millis_between_reports: u16,
    ) -> Result<(), DriverError> {
        self.enable_report(SENSOR_REPORTID_LINEAR_ACCEL, millis_between_reports)
    }

    /// Enable reporting of calibrated gyroscope data.
    pub fn enable_gyro(&mut self, millis_between_reports: u16) -> Result<(), DriverError> {
        self.enable_report(SENSOR_REPORTID_GYROSCOPE, millis_between_reports)
    }

    /// Enable reporting of the gravity vector.
    pub fn enable_gravity(&mut self, millis_between_reports: u16) -> Result<(), DriverError> {
        self.enable_report(SENSOR_REPORTID_GRAVITY, millis_between_reports)
    }

    /// Check if a report has been confirmed enabled
    pub fn is_report_enabled(&self, report_id: u8) -> bool {
        self.features.is_enabled(report_id)
    }

    /// Log the granted period of every confirmed feature
    pub fn log_report_periods(&self) {
        for (report_id, period_us) in self.features.enabled_reports() {
            debug!(
                "report 0x{:02X}: {:.1} ms, {:.1} Hz",
                report_id,
                period_us as f64 / 1000.0,
                1e6 / period_us.max(1) as f64
            );
        }
    }

    // -------------------------------------------------------------------------
    // Calibration and tare
    // -------------------------------------------------------------------------

    /// Start motion-engine calibration of the accelerometer, gyro and
    /// magnetometer.
    pub fn begin_calibration(&mut self) -> Result<(), DriverError> {
        self.send_command(
            SH2_CMD_ME_CALIBRATE,
            [1, 1, 1, SH2_ME_CAL_CONFIG, 0, 0, 0, 0, 0],
        )?;
        self.calibration.begin();
        Ok(())
    }

    /// Ask the sensor for its current calibration status; the answer lands
    /// in [`Self::calibration_status`] when the response packet is handled.
    pub fn request_calibration_status(&mut self) -> Result<(), DriverError> {
        self.send_command(
            SH2_CMD_ME_CALIBRATE,
            [0, 0, 0, SH2_ME_CAL_GET, 0, 0, 0, 0, 0],
        )?;
        Ok(())
    }

    /// Status byte of the most recent calibration command response
    pub fn calibration_status(&self) -> Option<u8> {
        self.calibration.last_status()
    }

    /// Persist the sensor's dynamic calibration data on the sensor side
    pub fn save_calibration_data(&mut self) -> Result<(), DriverError> {
        self.send_command(SH2_CMD_SAVE_DCD, [0; 9])?;
        Ok(())
    }

    /// Feed an accuracy reading into the host-side stability timer.
    ///
    /// The timing policy (how long is long enough) is the caller's; this
    /// only does the bookkeeping. See [`CalibrationState::stable_for`].
    pub fn observe_calibration_accuracy(&mut self, accuracy: Accuracy) {
        self.calibration.observe_accuracy(accuracy);
    }

    /// Calibration phase and stability timer
    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    /// Tare the given axes against the current orientation.
    ///
    /// One-shot command, independent of the calibration state machine.
    pub fn tare(&mut self, axes: u8, basis: TareBasis) -> Result<(), DriverError> {
        self.send_command(
            SH2_CMD_TARE,
            [SH2_TARE_NOW, axes & TARE_AXIS_ALL, basis.value(), 0, 0, 0, 0, 0, 0],
        )?;
        Ok(())
    }

    /// Persist the most recent tare on the sensor side
    pub fn save_tare_data(&mut self) -> Result<(), DriverError> {
        self.send_command(SH2_CMD_TARE, [SH2_TARE_PERSIST, 0, 0, 0, 0, 0, 0, 0, 0])?;
        Ok(())
    }

    /// Send an SH-2 command request with the given parameters
    fn send_command(&mut self, command: u8, params: [u8; 9]) -> Result<u8, TransportError> {
        let mut body = [0u8; 12];
        body[0] = SHUB_COMMAND_REQ;
        body[1] = self.command_seq;
        body[2] = command;
        body[3..].copy_from_slice(&params);
        self.command_seq = self.command_seq.wrapping_add(1);
        self.send_packet(Channel::HubControl, &body)
    }

    // -------------------------------------------------------------------------
    // Resets
    // -------------------------------------------------------------------------

    /// Tell the sensor to reset through the executable channel.
    ///
    /// Blocks until the reset announcement arrives on the command channel,
    /// retrying reads every 10 ms for up to two seconds, then zeroes the
    /// sequence table and forgets enabled features and calibration state.
    pub fn soft_reset(&mut self) -> Result<(), DriverError> {
        trace!("soft_reset");
        self.send_packet(Channel::Executable, &[EXECUTABLE_DEVICE_CMD_RESET])?;
        delay_ms(RESET_SETTLE_MS);
        self.await_reset_announcement()?;
        self.finish_reset();
        Ok(())
    }

    /// Reset the sensor through its reset line.
    ///
    /// Falls back to [`Self::soft_reset`] when the transport has no reset
    /// line wired. Same announcement wait and backoff policy as
    /// [`Self::soft_reset`].
    pub fn hard_reset(&mut self) -> Result<(), DriverError> {
        trace!("hard_reset");
        if !self.interface.reset_pulse()? {
            warn!("no reset line wired, falling back to soft reset");
            return self.soft_reset();
        }
        self.await_reset_announcement()?;
        self.finish_reset();
        Ok(())
    }

    /// Read packets until the reset announcement shows up on the command
    /// channel, with a short delay between attempts to avoid busy-spinning
    /// a sensor that is still booting.
    fn await_reset_announcement(&mut self) -> Result<(), DriverError> {
        let start = Instant::now();
        self.device_reset = false;
        while start.elapsed() < RESET_ANNOUNCE_TIMEOUT {
            match self.receive_packet_with_timeout(20) {
                Ok(Some(header)) => {
                    let channel = header.channel;
                    if let Err(e) = self.handle_received_packet(header) {
                        warn!("{:?}", e);
                    }
                    if channel == Channel::Command {
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_recoverable() => trace!("reset wait: {:?}", e),
                Err(e) => return Err(e.into()),
            }
            delay_ms(RESET_RETRY_DELAY_MS);
        }
        Err(DriverError::SensorUnresponsive)
    }

    /// Post-reset bookkeeping: the sensor has forgotten everything, so the
    /// host must too.
    fn finish_reset(&mut self) {
        self.sequence.reset();
        self.features.reset();
        self.calibration.reset();
        self.prod_id_verified = false;
    }

    /// Frame and send one packet on `channel`
    fn send_packet(&mut self, channel: Channel, body: &[u8]) -> Result<u8, TransportError> {
        self.interface
            .send_packet(channel, body, &mut self.sequence)
    }

    // -------------------------------------------------------------------------
    // Decoded data accessors
    // -------------------------------------------------------------------------

    /// Latest decoded value of every supported report
    pub fn data(&self) -> &SensorData {
        &self.data
    }

    /// Per-channel sequence counters (observability)
    pub fn sequence(&self) -> &SequenceTable {
        &self.sequence
    }

    /// Requested and granted feature periods (diagnostics)
    pub fn features(&self) -> &FeatureTracker {
        &self.features
    }

    /// Get accelerometer data [x, y, z] in m/s^2
    pub fn accelerometer(&self) -> [f32; 3] {
        xyz(&self.data.accelerometer.values)
    }

    /// Get rotation quaternion [i, j, k, real] (not re-normalized)
    pub fn rotation_quaternion(&self) -> [f32; 4] {
        self.data.rotation.values
    }

    /// Get rotation accuracy estimate in radians
    pub fn rotation_acc(&self) -> f32 {
        self.data.rotation_acc_rad
    }

    /// Get game rotation quaternion [i, j, k, real]
    pub fn game_rotation_quaternion(&self) -> [f32; 4] {
        self.data.game_rotation.values
    }

    /// Get geomagnetic rotation quaternion [i, j, k, real]
    pub fn geomag_rotation_quaternion(&self) -> [f32; 4] {
        self.data.geomag_rotation.values
    }

    /// Get geomagnetic rotation accuracy estimate in radians
    pub fn geomag_rotation_acc(&self) -> f32 {
        self.data.geomag_rotation_acc_rad
    }

    /// Euler angles [roll, pitch, yaw] in radians derived from the rotation
    /// vector quaternion
    pub fn euler_angles(&self) -> [f32; 3] {
        let [qi, qj, qk, qr] = self.data.rotation.values;
        reports::quaternion_to_euler(qi, qj, qk, qr)
    }

    /// Get linear acceleration [x, y, z] in m/s^2 (gravity removed)
    pub fn linear_accel(&self) -> [f32; 3] {
        xyz(&self.data.linear_accel.values)
    }

    /// Get gravity vector [x, y, z] in m/s^2
    pub fn gravity(&self) -> [f32; 3] {
        xyz(&self.data.gravity.values)
    }

    /// Get calibrated gyroscope data [x, y, z] in rad/s
    pub fn gyro(&self) -> [f32; 3] {
        xyz(&self.data.gyro.values)
    }

    /// Get uncalibrated gyroscope data [x, y, z] in rad/s
    pub fn gyro_uncalib(&self) -> [f32; 3] {
        xyz(&self.data.uncalib_gyro.values)
    }

    /// Get calibrated magnetic field [x, y, z] in uT (micro-Tesla)
    pub fn mag_field(&self) -> [f32; 3] {
        xyz(&self.data.mag_field.values)
    }

    /// Total steps detected
    pub fn steps(&self) -> u16 {
        self.data.steps
    }

    /// Stability classifier output
    pub fn stability_classification(&self) -> StabilityClassification {
        self.data.stability
    }

    /// Activity classifier output
    pub fn activity_classification(&self) -> ActivityClassification {
        self.data.activity
    }

    /// Whether a shake was detected in the last shake report
    pub fn shake_detected(&self) -> bool {
        self.data.shake_detected
    }

    /// Whether the sensor has announced reset-complete
    pub fn reset_complete(&self) -> bool {
        self.device_reset
    }

    /// Whether the startup advertisement has been received
    pub fn advertisement_received(&self) -> bool {
        self.advert_received
    }

    /// Whether system initialization has been reported
    pub fn init_received(&self) -> bool {
        self.init_received
    }

    /// Last error code reported on the command channel, if any
    pub fn last_error(&self) -> Option<u8> {
        self.error_list_received.then_some(self.last_error_received)
    }
}

#[inline]
fn xyz(values: &[f32; 4]) -> [f32; 3] {
    [values[0], values[1], values[2]]
}
