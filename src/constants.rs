// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Constants for the BNO08x sensor hub protocol.
//!
//! This module contains the report IDs, command codes, Q-point values and
//! framing bytes used for communication with the sensor, along with the
//! fixed-point conversion helpers.

/// Initial receive buffer capacity; the buffer grows on demand
pub const DATA_BUFFER_SIZE: usize = 512;

/// Default I2C address of the sensor
pub const DEFAULT_I2C_ADDRESS: u16 = 0x4B;
/// Alternate I2C address (ADR pin pulled high)
pub const ALTERNATE_I2C_ADDRESS: u16 = 0x4A;

// =============================================================================
// UART-SHTP framing
// =============================================================================

/// Start and end marker of a UART-SHTP frame
pub const UART_FRAME_BYTE: u8 = 0x7E;
/// Escape introducer for in-frame occurrences of the reserved bytes
pub const UART_ESCAPE_BYTE: u8 = 0x7D;
/// Mask XORed onto an escaped byte
pub const UART_ESCAPE_MASK: u8 = 0x20;
/// Protocol identifier that must follow the start marker
pub const UART_PROTOCOL_ID: u8 = 0x01;
/// Minimum spacing between outbound bytes; the sensor cannot absorb them faster
pub const UART_INTERBYTE_DELAY_US: u64 = 110;

// =============================================================================
// Command Channel Responses
// =============================================================================

/// Advertisement response
pub const CMD_RESP_ADVERTISEMENT: u8 = 0;
/// Error list response
pub const CMD_RESP_ERROR_LIST: u8 = 1;

// =============================================================================
// Sensor Hub (SHUB) Protocol Constants
// =============================================================================

/// Report ID for Product ID request
pub const SHUB_PROD_ID_REQ: u8 = 0xF9;
/// Report ID for Product ID response
pub const SHUB_PROD_ID_RESP: u8 = 0xF8;
/// Get feature request
pub const SHUB_GET_FEATURE_REQ: u8 = 0xFE;
/// Get feature response
pub const SHUB_GET_FEATURE_RESP: u8 = 0xFC;
/// Set feature command
pub const SHUB_REPORT_SET_FEATURE_CMD: u8 = 0xFD;
/// Command request
pub const SHUB_COMMAND_REQ: u8 = 0xF2;
/// Command response
pub const SHUB_COMMAND_RESP: u8 = 0xF1;
/// Time base sub-report carrying the running microsecond counter
pub const SHUB_BASE_TIMESTAMP: u8 = 0xFB;
/// Timestamp rebase sub-report
pub const SHUB_TIMESTAMP_REBASE: u8 = 0xFA;

// =============================================================================
// Sensor Report IDs (from SH2 Reference Manual)
// =============================================================================

/// Accelerometer (m/s^2 including gravity): Q point 8
pub const SENSOR_REPORTID_ACCELEROMETER: u8 = 0x01;
/// Gyroscope calibrated (rad/s): Q point 9
pub const SENSOR_REPORTID_GYROSCOPE: u8 = 0x02;
/// Magnetic field calibrated (uTesla): Q point 4
pub const SENSOR_REPORTID_MAGNETIC_FIELD: u8 = 0x03;
/// Linear acceleration (m/s^2 minus gravity): Q point 8
pub const SENSOR_REPORTID_LINEAR_ACCEL: u8 = 0x04;
/// Unit quaternion rotation vector, Q point 14, with heading accuracy
/// (radians) Q point 12
pub const SENSOR_REPORTID_ROTATION_VECTOR: u8 = 0x05;
/// Gravity vector: Q point 8
pub const SENSOR_REPORTID_GRAVITY: u8 = 0x06;
/// Gyroscope uncalibrated (rad/s): Q point 9
pub const SENSOR_REPORTID_GYROSCOPE_UNCALIB: u8 = 0x07;
/// Game rotation vector: Q point 14
pub const SENSOR_REPORTID_ROTATION_VECTOR_GAME: u8 = 0x08;
/// Geomagnetic rotation vector: Q point 14 for quaternion, Q point 12 for
/// heading accuracy
pub const SENSOR_REPORTID_ROTATION_VECTOR_GEOMAGNETIC: u8 = 0x09;
/// Step counter
pub const SENSOR_REPORTID_STEP_COUNTER: u8 = 0x11;
/// Stability classifier
pub const SENSOR_REPORTID_STABILITY_CLASSIFIER: u8 = 0x13;
/// Raw (uncalibrated ADC) accelerometer
pub const SENSOR_REPORTID_RAW_ACCELEROMETER: u8 = 0x14;
/// Raw (uncalibrated ADC) gyroscope
pub const SENSOR_REPORTID_RAW_GYROSCOPE: u8 = 0x15;
/// Raw (uncalibrated ADC) magnetometer
pub const SENSOR_REPORTID_RAW_MAGNETOMETER: u8 = 0x16;
/// Shake detector
pub const SENSOR_REPORTID_SHAKE_DETECTOR: u8 = 0x19;
/// Activity classifier
pub const SENSOR_REPORTID_ACTIVITY_CLASSIFIER: u8 = 0x1E;

/// Record length in bytes for each known sub-report, used to skip records
/// the caller has enabled but this layer does not decode.
///
/// An identifier missing from this table makes the rest of the payload
/// unparseable and aborts the decode.
pub fn report_length(report_id: u8) -> Option<usize> {
    Some(match report_id {
        SENSOR_REPORTID_ACCELEROMETER
        | SENSOR_REPORTID_GYROSCOPE
        | SENSOR_REPORTID_MAGNETIC_FIELD
        | SENSOR_REPORTID_LINEAR_ACCEL
        | SENSOR_REPORTID_GRAVITY => 10,
        SENSOR_REPORTID_ROTATION_VECTOR | SENSOR_REPORTID_ROTATION_VECTOR_GEOMAGNETIC => 14,
        SENSOR_REPORTID_ROTATION_VECTOR_GAME => 12,
        SENSOR_REPORTID_GYROSCOPE_UNCALIB => 16,
        SENSOR_REPORTID_STEP_COUNTER => 12,
        SENSOR_REPORTID_STABILITY_CLASSIFIER | SENSOR_REPORTID_SHAKE_DETECTOR => 6,
        SENSOR_REPORTID_ACTIVITY_CLASSIFIER => 16,
        SENSOR_REPORTID_RAW_ACCELEROMETER
        | SENSOR_REPORTID_RAW_GYROSCOPE
        | SENSOR_REPORTID_RAW_MAGNETOMETER => 16,
        SHUB_BASE_TIMESTAMP | SHUB_TIMESTAMP_REBASE => 5,
        _ => return None,
    })
}

// =============================================================================
// Q-Point Tables for Fixed-Point Conversion
// =============================================================================

/// Q-points for primary sensor data (indexed by report ID)
pub const Q_POINTS: [usize; 15] = [0, 8, 9, 4, 8, 14, 8, 9, 14, 14, 0, 0, 0, 0, 0];
/// Q-points for secondary sensor data like accuracy (indexed by report ID)
pub const Q_POINTS2: [usize; 15] = [0, 0, 0, 0, 0, 12, 0, 0, 0, 12, 0, 0, 0, 0, 0];

/// Q-point of the gyro-integrated rotation vector quaternion (channel 5)
pub const GYRO_RV_QUATERNION_Q: usize = 14;
/// Q-point of the gyro-integrated rotation vector angular velocity
pub const GYRO_RV_ANGULAR_VELOCITY_Q: usize = 10;

// =============================================================================
// Executable/Device Channel Commands
// =============================================================================

/// Reset command
pub const EXECUTABLE_DEVICE_CMD_RESET: u8 = 1;
/// Reset complete response
pub const EXECUTABLE_DEVICE_RESP_RESET_COMPLETE: u8 = 1;

// =============================================================================
// SH-2 Commands (sent through SHUB_COMMAND_REQ)
// =============================================================================

/// Tare command
pub const SH2_CMD_TARE: u8 = 3;
/// Initialize command
pub const SH2_CMD_INITIALIZE: u8 = 4;
/// Save dynamic calibration data to the sensor's flash
pub const SH2_CMD_SAVE_DCD: u8 = 6;
/// Motion engine calibration command
pub const SH2_CMD_ME_CALIBRATE: u8 = 7;
/// Unsolicited flag
pub const SH2_INIT_UNSOLICITED: u8 = 0x80;
/// System initialization
pub const SH2_INIT_SYSTEM: u8 = 1;
/// Startup initialization (unsolicited)
pub const SH2_STARTUP_INIT_UNSOLICITED: u8 = SH2_CMD_INITIALIZE | SH2_INIT_UNSOLICITED;

/// Motion-engine calibrate subcommand: configure which sensors calibrate
pub const SH2_ME_CAL_CONFIG: u8 = 0;
/// Motion-engine calibrate subcommand: get the current status
pub const SH2_ME_CAL_GET: u8 = 1;

/// Tare subcommand: apply a tare against the current orientation
pub const SH2_TARE_NOW: u8 = 0;
/// Tare subcommand: persist the most recent tare
pub const SH2_TARE_PERSIST: u8 = 1;

/// Tare axis mask bits
pub const TARE_AXIS_X: u8 = 0x01;
pub const TARE_AXIS_Y: u8 = 0x02;
pub const TARE_AXIS_Z: u8 = 0x04;
pub const TARE_AXIS_ALL: u8 = TARE_AXIS_X | TARE_AXIS_Y | TARE_AXIS_Z;

// =============================================================================
// Helper Functions
// =============================================================================

/// Convert Q-point fixed-point value to f32
#[inline]
pub fn q_to_f32(q_val: i16, q_point: usize) -> f32 {
    (q_val as f32) / ((1u32 << q_point) as f32)
}

/// Get SHTP error list code description string
pub fn shtp_error_to_str(code: u8) -> &'static str {
    match code {
        0 => "no error",
        1 => "hub application attempted to exceed maximum read cargo length",
        2 => "host write was too short (need at least a 4-byte header)",
        3 => "host wrote a header with length greater than maximum write cargo length",
        4 => "host wrote a header with length less than or equal to header length",
        5 => "host wrote beginning of fragmented cargo, fragmentation not supported",
        6 => "host wrote continuation of fragmented cargo, fragmentation not supported",
        7 => "unrecognized command on control channel",
        8 => "unrecognized parameter to get-advertisement command",
        9 => "host wrote to unrecognized channel",
        10 => "advertisement request received while advertisement response was pending",
        11 => "host wrote before the hub finished sending its advertisement response",
        12 => "error list too long to send, truncated",
        _ => "unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_q_to_f32() {
        // Q8: 256 in Q8 = 1.0
        assert!((q_to_f32(256, 8) - 1.0).abs() < 1e-4);
        // Q14: 16384 in Q14 = 1.0
        assert!((q_to_f32(16384, 14) - 1.0).abs() < 1e-4);
        // Q4: 16 in Q4 = 1.0 (magnetometer scaling)
        assert!((q_to_f32(16, 4) - 1.0).abs() < 1e-4);
        // Test zero
        assert!((q_to_f32(0, 14)).abs() < 1e-4);
        // Test negative values
        assert!((q_to_f32(-16384, 14) + 1.0).abs() < 1e-4);
        // Test fractional
        assert!((q_to_f32(8192, 14) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_report_lengths() {
        // Vector reports carry a 4-byte record header plus i16 fields
        assert_eq!(report_length(SENSOR_REPORTID_ACCELEROMETER), Some(10));
        assert_eq!(report_length(SENSOR_REPORTID_ROTATION_VECTOR), Some(14));
        assert_eq!(report_length(SENSOR_REPORTID_GYROSCOPE_UNCALIB), Some(16));
        assert_eq!(report_length(SHUB_BASE_TIMESTAMP), Some(5));
        // Unknown identifiers have no length and must abort a decode
        assert_eq!(report_length(0x7F), None);
    }

    #[test]
    fn test_q_points_arrays() {
        assert_eq!(Q_POINTS.len(), Q_POINTS2.len());
        assert!(Q_POINTS[SENSOR_REPORTID_ACCELEROMETER as usize] > 0);
        assert!(Q_POINTS[SENSOR_REPORTID_GYROSCOPE as usize] > 0);
        assert!(Q_POINTS[SENSOR_REPORTID_ROTATION_VECTOR as usize] > 0);
        assert!(Q_POINTS2[SENSOR_REPORTID_ROTATION_VECTOR as usize] > 0);
    }

    #[test]
    fn test_sensor_report_ids() {
        // Verify report IDs are unique
        let report_ids = [
            SENSOR_REPORTID_ACCELEROMETER,
            SENSOR_REPORTID_GYROSCOPE,
            SENSOR_REPORTID_GYROSCOPE_UNCALIB,
            SENSOR_REPORTID_MAGNETIC_FIELD,
            SENSOR_REPORTID_LINEAR_ACCEL,
            SENSOR_REPORTID_ROTATION_VECTOR,
            SENSOR_REPORTID_ROTATION_VECTOR_GAME,
            SENSOR_REPORTID_ROTATION_VECTOR_GEOMAGNETIC,
            SENSOR_REPORTID_GRAVITY,
            SENSOR_REPORTID_STEP_COUNTER,
            SENSOR_REPORTID_STABILITY_CLASSIFIER,
            SENSOR_REPORTID_SHAKE_DETECTOR,
            SENSOR_REPORTID_ACTIVITY_CLASSIFIER,
        ];

        for (i, &id1) in report_ids.iter().enumerate() {
            for &id2 in report_ids.iter().skip(i + 1) {
                assert_ne!(id1, id2, "Duplicate report ID found: {}", id1);
            }
        }
    }
}
