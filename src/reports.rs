// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sensor report decoding for the BNO08x driver.
//!
//! Input-report payloads are concatenated sub-records, each starting with a
//! one-byte report identifier. Vector reports carry a 4-byte record header
//! (id, sequence, status, delay) followed by little-endian signed 16-bit
//! fields that scale to physical units through the report's Q-point.
//!
//! Decoding is two-phase: the whole payload is validated and collected into
//! events first, then applied, so a malformed record never leaves the sensor
//! state partially updated.

use crate::constants::{
    q_to_f32, report_length, GYRO_RV_ANGULAR_VELOCITY_Q, GYRO_RV_QUATERNION_Q, Q_POINTS,
    Q_POINTS2, SENSOR_REPORTID_ACCELEROMETER, SENSOR_REPORTID_ACTIVITY_CLASSIFIER,
    SENSOR_REPORTID_GRAVITY, SENSOR_REPORTID_GYROSCOPE, SENSOR_REPORTID_GYROSCOPE_UNCALIB,
    SENSOR_REPORTID_LINEAR_ACCEL, SENSOR_REPORTID_MAGNETIC_FIELD,
    SENSOR_REPORTID_ROTATION_VECTOR, SENSOR_REPORTID_ROTATION_VECTOR_GAME,
    SENSOR_REPORTID_ROTATION_VECTOR_GEOMAGNETIC, SENSOR_REPORTID_SHAKE_DETECTOR,
    SENSOR_REPORTID_STABILITY_CLASSIFIER, SENSOR_REPORTID_STEP_COUNTER, SHUB_BASE_TIMESTAMP,
    SHUB_TIMESTAMP_REBASE,
};

/// x/y/z bits of the shake detector bitfield
const SHAKE_AXIS_MASK: u16 = 0x0007;

/// Faults raised while walking an input-report payload.
///
/// Either kind makes the rest of the payload unrecoverable; the decoder
/// discards it without applying any record.
#[derive(Debug)]
pub enum DecodeError {
    /// Report identifier with no known record width
    UnknownReportId(u8),
    /// Record extends past the end of the payload
    TruncatedReport(u8),
}

/// Sensor-reported ordinal confidence attached to most reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Accuracy {
    #[default]
    Unreliable = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl From<u8> for Accuracy {
    fn from(status: u8) -> Self {
        match status & 0x03 {
            0 => Accuracy::Unreliable,
            1 => Accuracy::Low,
            2 => Accuracy::Medium,
            _ => Accuracy::High,
        }
    }
}

/// One decoded sensor reading in physical units
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorReading {
    /// Up to four components; unused components are zero
    pub values: [f32; 4],
    /// Confidence reported in the record's status byte
    pub accuracy: Accuracy,
    /// Microsecond counter from the payload's time base, modulo 32-bit rollover
    pub timestamp_us: u32,
}

/// Stability classifier output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StabilityClassification {
    #[default]
    Unknown,
    OnTable,
    Stationary,
    Stable,
    InMotion,
}

impl From<u8> for StabilityClassification {
    fn from(value: u8) -> Self {
        match value {
            1 => StabilityClassification::OnTable,
            2 => StabilityClassification::Stationary,
            3 => StabilityClassification::Stable,
            4 => StabilityClassification::InMotion,
            _ => StabilityClassification::Unknown,
        }
    }
}

impl StabilityClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            StabilityClassification::Unknown => "unknown",
            StabilityClassification::OnTable => "on table",
            StabilityClassification::Stationary => "stationary",
            StabilityClassification::Stable => "stable",
            StabilityClassification::InMotion => "in motion",
        }
    }
}

/// Activity classes reported by the activity classifier, in confidence-table
/// order
pub const ACTIVITY_CLASSES: [&str; 9] = [
    "unknown",
    "in vehicle",
    "on bicycle",
    "on foot",
    "still",
    "tilting",
    "walking",
    "running",
    "on stairs",
];

/// Activity classifier output
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityClassification {
    /// Index into [`ACTIVITY_CLASSES`] of the most likely activity
    pub most_likely: u8,
    /// Per-class confidence, 0..=100
    pub confidences: [u8; 9],
}

impl ActivityClassification {
    /// Name of the most likely activity
    pub fn most_likely_name(&self) -> &'static str {
        ACTIVITY_CLASSES
            .get(self.most_likely as usize)
            .copied()
            .unwrap_or("unknown")
    }

    /// Confidence of the most likely activity, 0..=100
    pub fn confidence(&self) -> u8 {
        self.confidences
            .get(self.most_likely as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// One decoded sub-record, staged before being applied to [`SensorData`]
#[derive(Debug)]
pub enum ReportEvent {
    Reading {
        report_id: u8,
        reading: SensorReading,
        /// Heading accuracy estimate in radians, rotation-vector reports only
        estimated_accuracy_rad: Option<f32>,
    },
    Steps(u16),
    Stability(StabilityClassification),
    Shake(bool),
    Activity(ActivityClassification),
}

/// Latest decoded value of every supported report
#[derive(Debug, Default)]
pub struct SensorData {
    /// Accelerometer [x, y, z] in m/s²
    pub accelerometer: SensorReading,
    /// Calibrated gyroscope [x, y, z] in rad/s
    pub gyro: SensorReading,
    /// Uncalibrated gyroscope [x, y, z] in rad/s
    pub uncalib_gyro: SensorReading,
    /// Calibrated magnetic field [x, y, z] in µT
    pub mag_field: SensorReading,
    /// Linear acceleration [x, y, z] in m/s² (gravity removed)
    pub linear_accel: SensorReading,
    /// Gravity vector [x, y, z] in m/s²
    pub gravity: SensorReading,

    /// Rotation vector quaternion [i, j, k, real], not re-normalized
    pub rotation: SensorReading,
    /// Rotation vector accuracy estimate (radians)
    pub rotation_acc_rad: f32,
    /// Game rotation vector quaternion [i, j, k, real]
    pub game_rotation: SensorReading,
    /// Geomagnetic rotation vector quaternion [i, j, k, real]
    pub geomag_rotation: SensorReading,
    /// Geomagnetic rotation accuracy estimate (radians)
    pub geomag_rotation_acc_rad: f32,

    /// Gyro-integrated rotation vector quaternion [i, j, k, real] (channel 5)
    pub gyro_rv_quaternion: [f32; 4],
    /// Gyro-integrated angular velocity [x, y, z] in rad/s
    pub gyro_rv_angular_velocity: [f32; 3],

    /// Total steps detected
    pub steps: u16,
    /// Stability classifier output
    pub stability: StabilityClassification,
    /// Whether a shake was detected in the last shake report
    pub shake_detected: bool,
    /// Activity classifier output
    pub activity: ActivityClassification,
}

impl SensorData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a decoded record into the latest-value store
    pub fn apply(&mut self, event: ReportEvent) {
        match event {
            ReportEvent::Reading {
                report_id,
                reading,
                estimated_accuracy_rad,
            } => match report_id {
                SENSOR_REPORTID_ACCELEROMETER => self.accelerometer = reading,
                SENSOR_REPORTID_GYROSCOPE => self.gyro = reading,
                SENSOR_REPORTID_GYROSCOPE_UNCALIB => self.uncalib_gyro = reading,
                SENSOR_REPORTID_MAGNETIC_FIELD => self.mag_field = reading,
                SENSOR_REPORTID_LINEAR_ACCEL => self.linear_accel = reading,
                SENSOR_REPORTID_GRAVITY => self.gravity = reading,
                SENSOR_REPORTID_ROTATION_VECTOR => {
                    self.rotation = reading;
                    if let Some(acc) = estimated_accuracy_rad {
                        self.rotation_acc_rad = acc;
                    }
                }
                SENSOR_REPORTID_ROTATION_VECTOR_GAME => self.game_rotation = reading,
                SENSOR_REPORTID_ROTATION_VECTOR_GEOMAGNETIC => {
                    self.geomag_rotation = reading;
                    if let Some(acc) = estimated_accuracy_rad {
                        self.geomag_rotation_acc_rad = acc;
                    }
                }
                _ => {}
            },
            ReportEvent::Steps(count) => self.steps = count,
            ReportEvent::Stability(class) => self.stability = class,
            ReportEvent::Shake(detected) => self.shake_detected = detected,
            ReportEvent::Activity(activity) => self.activity = activity,
        }
    }
}

#[inline]
fn read_i16_le(record: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([record[offset], record[offset + 1]])
}

#[inline]
fn read_u16_le(record: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([record[offset], record[offset + 1]])
}

#[inline]
fn read_u32_le(record: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        record[offset],
        record[offset + 1],
        record[offset + 2],
        record[offset + 3],
    ])
}

/// Number of i16 data fields decoded for a vector report
fn vector_field_count(report_id: u8) -> usize {
    match report_id {
        SENSOR_REPORTID_ROTATION_VECTOR | SENSOR_REPORTID_ROTATION_VECTOR_GEOMAGNETIC => 5,
        SENSOR_REPORTID_ROTATION_VECTOR_GAME => 4,
        _ => 3,
    }
}

fn decode_vector_record(report_id: u8, record: &[u8], timestamp_us: u32) -> ReportEvent {
    let q = Q_POINTS[report_id as usize];
    let accuracy = Accuracy::from(record[2]);
    let field_count = vector_field_count(report_id);

    let mut values = [0.0f32; 4];
    for (i, value) in values.iter_mut().enumerate().take(field_count.min(4)) {
        *value = q_to_f32(read_i16_le(record, 4 + 2 * i), q);
    }

    // Fifth field of the rotation vector reports is the heading accuracy
    // estimate at its own Q-point
    let estimated_accuracy_rad = if field_count == 5 {
        let q2 = Q_POINTS2[report_id as usize];
        Some(q_to_f32(read_i16_le(record, 12), q2))
    } else {
        None
    };

    ReportEvent::Reading {
        report_id,
        reading: SensorReading {
            values,
            accuracy,
            timestamp_us,
        },
        estimated_accuracy_rad,
    }
}

/// Decode a sensor-input channel payload into a list of report events.
///
/// The first sub-record is normally the time base; its microsecond counter
/// stamps every following record. Records whose identifier is in the width
/// table but carries no data for this layer (raw ADC reports, timestamp
/// rebase) are skipped. An identifier with no known width aborts the decode
/// and nothing from the payload should be applied.
pub fn decode_input_payload(payload: &[u8]) -> Result<Vec<ReportEvent>, DecodeError> {
    let mut events = Vec::new();
    let mut timestamp_us: u32 = 0;
    let mut cursor = 0usize;

    while cursor < payload.len() {
        let report_id = payload[cursor];
        let record_len =
            report_length(report_id).ok_or(DecodeError::UnknownReportId(report_id))?;
        if cursor + record_len > payload.len() {
            return Err(DecodeError::TruncatedReport(report_id));
        }
        let record = &payload[cursor..cursor + record_len];

        match report_id {
            SHUB_BASE_TIMESTAMP => timestamp_us = read_u32_le(record, 1),
            SHUB_TIMESTAMP_REBASE => {}
            SENSOR_REPORTID_ACCELEROMETER
            | SENSOR_REPORTID_GYROSCOPE
            | SENSOR_REPORTID_GYROSCOPE_UNCALIB
            | SENSOR_REPORTID_MAGNETIC_FIELD
            | SENSOR_REPORTID_LINEAR_ACCEL
            | SENSOR_REPORTID_GRAVITY
            | SENSOR_REPORTID_ROTATION_VECTOR
            | SENSOR_REPORTID_ROTATION_VECTOR_GAME
            | SENSOR_REPORTID_ROTATION_VECTOR_GEOMAGNETIC => {
                events.push(decode_vector_record(report_id, record, timestamp_us));
            }
            SENSOR_REPORTID_STEP_COUNTER => {
                events.push(ReportEvent::Steps(read_u16_le(record, 8)));
            }
            SENSOR_REPORTID_STABILITY_CLASSIFIER => {
                events.push(ReportEvent::Stability(record[4].into()));
            }
            SENSOR_REPORTID_SHAKE_DETECTOR => {
                let axes = read_u16_le(record, 4) & SHAKE_AXIS_MASK;
                events.push(ReportEvent::Shake(axes != 0));
            }
            SENSOR_REPORTID_ACTIVITY_CLASSIFIER => {
                let mut confidences = [0u8; 9];
                confidences.copy_from_slice(&record[6..15]);
                events.push(ReportEvent::Activity(ActivityClassification {
                    most_likely: record[5],
                    confidences,
                }));
            }
            // Raw ADC reports are skipped through the width table
            _ => {}
        }

        cursor += record_len;
    }

    Ok(events)
}

/// Decode a channel-5 gyro-integrated rotation vector payload.
///
/// The record has no header: quaternion i, j, k, real at Q14 followed by
/// angular velocity x, y, z at Q10.
pub fn decode_gyro_integrated_rv(payload: &[u8]) -> Result<([f32; 4], [f32; 3]), DecodeError> {
    if payload.len() < 14 {
        return Err(DecodeError::TruncatedReport(0));
    }
    let mut quaternion = [0.0f32; 4];
    for (i, q) in quaternion.iter_mut().enumerate() {
        *q = q_to_f32(read_i16_le(payload, 2 * i), GYRO_RV_QUATERNION_Q);
    }
    let mut angular_velocity = [0.0f32; 3];
    for (i, w) in angular_velocity.iter_mut().enumerate() {
        *w = q_to_f32(read_i16_le(payload, 8 + 2 * i), GYRO_RV_ANGULAR_VELOCITY_Q);
    }
    Ok((quaternion, angular_velocity))
}

/// Convert a quaternion to Euler angles [roll, pitch, yaw] in radians.
///
/// The quaternion is taken as-is (no normalization). The pitch argument is
/// clamped to [-1, 1] before the inverse sine so floating rounding near a
/// 90° pitch cannot push it outside the asin domain.
pub fn quaternion_to_euler(qi: f32, qj: f32, qk: f32, qr: f32) -> [f32; 3] {
    let roll = (2.0 * (qr * qi + qj * qk)).atan2(1.0 - 2.0 * (qi * qi + qj * qj));
    let pitch = (2.0 * (qr * qj - qk * qi)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (qr * qk + qi * qj)).atan2(1.0 - 2.0 * (qj * qj + qk * qk));
    [roll, pitch, yaw]
}

/// Convert a quaternion to Euler angles [roll, pitch, yaw] in degrees
pub fn quaternion_to_euler_deg(qi: f32, qj: f32, qk: f32, qr: f32) -> [f32; 3] {
    let [roll, pitch, yaw] = quaternion_to_euler(qi, qj, qk, qr);
    [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_1_SQRT_2;

    /// Time base record announcing `us` on the running counter
    fn time_base(us: u32) -> Vec<u8> {
        let mut rec = vec![SHUB_BASE_TIMESTAMP];
        rec.extend_from_slice(&us.to_le_bytes());
        rec
    }

    /// Vector record with the given i16 fields
    fn vector_record(report_id: u8, status: u8, fields: &[i16]) -> Vec<u8> {
        let mut rec = vec![report_id, 0, status, 0];
        for f in fields {
            rec.extend_from_slice(&f.to_le_bytes());
        }
        rec
    }

    #[test]
    fn test_fixed_point_decode() {
        // raw 16384 at Q14 decodes to 1.0; accel is Q8 so 256 -> 1.0
        let mut payload = time_base(1_000);
        payload.extend(vector_record(SENSOR_REPORTID_ACCELEROMETER, 0x03, &[256, -256, 2560]));

        let events = decode_input_payload(&payload).unwrap();
        assert_eq!(events.len(), 1);
        let mut data = SensorData::new();
        for ev in events {
            data.apply(ev);
        }
        assert!((data.accelerometer.values[0] - 1.0).abs() < 1e-4);
        assert!((data.accelerometer.values[1] + 1.0).abs() < 1e-4);
        assert!((data.accelerometer.values[2] - 10.0).abs() < 1e-4);
        assert_eq!(data.accelerometer.accuracy, Accuracy::High);
        assert_eq!(data.accelerometer.timestamp_us, 1_000);
    }

    #[test]
    fn test_rotation_vector_decode() {
        // Identity-ish quaternion with a heading accuracy estimate of 0.5 rad
        let mut payload = time_base(42);
        payload.extend(vector_record(
            SENSOR_REPORTID_ROTATION_VECTOR,
            0x02,
            &[0, 0, 0, 16384, 2048],
        ));

        let mut data = SensorData::new();
        for ev in decode_input_payload(&payload).unwrap() {
            data.apply(ev);
        }
        assert!((data.rotation.values[3] - 1.0).abs() < 1e-4);
        assert!((data.rotation_acc_rad - 0.5).abs() < 1e-4);
        assert_eq!(data.rotation.accuracy, Accuracy::Medium);
    }

    #[test]
    fn test_multiple_records_share_time_base() {
        let mut payload = time_base(77);
        payload.extend(vector_record(SENSOR_REPORTID_GYROSCOPE, 0x01, &[512, 0, 0]));
        payload.extend(vector_record(SENSOR_REPORTID_MAGNETIC_FIELD, 0x02, &[16, 32, -16]));

        let mut data = SensorData::new();
        for ev in decode_input_payload(&payload).unwrap() {
            data.apply(ev);
        }
        // gyro is Q9, magnetometer Q4
        assert!((data.gyro.values[0] - 1.0).abs() < 1e-4);
        assert!((data.mag_field.values[1] - 2.0).abs() < 1e-4);
        assert_eq!(data.gyro.timestamp_us, 77);
        assert_eq!(data.mag_field.timestamp_us, 77);
    }

    #[test]
    fn test_unknown_report_id_aborts_payload() {
        let mut payload = time_base(0);
        payload.extend(vector_record(SENSOR_REPORTID_ACCELEROMETER, 0, &[256, 0, 0]));
        payload.push(0x7F); // no width known for this identifier

        assert!(matches!(
            decode_input_payload(&payload),
            Err(DecodeError::UnknownReportId(0x7F))
        ));
    }

    #[test]
    fn test_truncated_record_aborts_payload() {
        let mut payload = time_base(0);
        payload.extend_from_slice(&[SENSOR_REPORTID_ACCELEROMETER, 0, 0]); // cut short

        assert!(matches!(
            decode_input_payload(&payload),
            Err(DecodeError::TruncatedReport(_))
        ));
    }

    #[test]
    fn test_classifier_records() {
        let mut payload = time_base(5);
        // step counter: steps at record offset 8
        let mut steps = vec![SENSOR_REPORTID_STEP_COUNTER, 0, 0, 0];
        steps.extend_from_slice(&[0; 4]); // latency
        steps.extend_from_slice(&1234u16.to_le_bytes());
        steps.extend_from_slice(&[0; 2]);
        payload.extend(steps);
        // stability: class byte at offset 4
        payload.extend_from_slice(&[SENSOR_REPORTID_STABILITY_CLASSIFIER, 0, 0, 0, 2, 0]);
        // shake: axis bits at offset 4
        payload.extend_from_slice(&[SENSOR_REPORTID_SHAKE_DETECTOR, 0, 0, 0, 0x01, 0x00]);

        let mut data = SensorData::new();
        for ev in decode_input_payload(&payload).unwrap() {
            data.apply(ev);
        }
        assert_eq!(data.steps, 1234);
        assert_eq!(data.stability, StabilityClassification::Stationary);
        assert!(data.shake_detected);
    }

    #[test]
    fn test_activity_classifier() {
        let mut record = vec![SENSOR_REPORTID_ACTIVITY_CLASSIFIER, 0, 0, 0];
        record.push(0x80); // page number / end-of-sequence
        record.push(6); // most likely: walking
        record.extend_from_slice(&[0, 0, 0, 10, 5, 0, 90, 0, 0]);
        record.push(0); // reserved
        assert_eq!(record.len(), 16);

        let mut payload = time_base(9);
        payload.extend(record);

        let mut data = SensorData::new();
        for ev in decode_input_payload(&payload).unwrap() {
            data.apply(ev);
        }
        assert_eq!(data.activity.most_likely_name(), "walking");
        assert_eq!(data.activity.confidence(), 90);
    }

    #[test]
    fn test_raw_reports_are_skipped_not_faulted() {
        let mut payload = time_base(0);
        payload.push(crate::constants::SENSOR_REPORTID_RAW_GYROSCOPE);
        payload.extend_from_slice(&[0u8; 15]);
        payload.extend(vector_record(SENSOR_REPORTID_GRAVITY, 0, &[0, 0, 2510]));

        let events = decode_input_payload(&payload).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_gyro_integrated_rv_decode() {
        let mut payload = Vec::new();
        for q in [0i16, 0, 0, 16384] {
            payload.extend_from_slice(&q.to_le_bytes());
        }
        for w in [1024i16, 0, -1024] {
            payload.extend_from_slice(&w.to_le_bytes());
        }
        let (quat, angvel) = decode_gyro_integrated_rv(&payload).unwrap();
        assert!((quat[3] - 1.0).abs() < 1e-4);
        assert!((angvel[0] - 1.0).abs() < 1e-4);
        assert!((angvel[2] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_euler_gimbal_adjacent_pitch() {
        // 90 degree pitch: qj = qr = 1/sqrt(2). Rounding may push the asin
        // argument slightly past 1.0; the clamp must keep the result finite.
        let [roll, pitch, yaw] = quaternion_to_euler(0.0, FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2);
        assert!(roll.is_finite());
        assert!(yaw.is_finite());
        assert!((pitch - std::f32::consts::FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn test_euler_known_rotation() {
        // 90 degrees about Z: qk = qr = 1/sqrt(2)
        let [roll, pitch, yaw] = quaternion_to_euler_deg(0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2);
        assert!(roll.abs() < 1e-3);
        assert!(pitch.abs() < 1e-3);
        assert!((yaw - 90.0).abs() < 1e-3);
    }
}
