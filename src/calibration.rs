// Copyright 2025 Au-Zone Technologies Inc.
// SPDX-License-Identifier: Apache-2.0

//! Calibration and tare bookkeeping.
//!
//! The sensor runs the motion-engine calibration itself; the host only
//! issues commands (begin, status poll, save) and watches the accuracy
//! fields streamed through normal sensor reports. The accuracy-stability
//! timer lives here so calling code can decide when calibration has been
//! "good enough for long enough". The threshold policy is deliberately left
//! to the caller, since it varies per sensor axis combination.

use std::time::{Duration, Instant};

use crate::reports::Accuracy;

/// Reference frame a tare is computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TareBasis {
    RotationVector = 0,
    GamingRotationVector = 1,
    GeomagneticRotationVector = 2,
}

impl TareBasis {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Host-visible calibration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// No calibration has been requested
    Idle,
    /// Calibration is running, accuracy below Medium or not yet observed
    Calibrating,
    /// Accuracy has held at Medium or better since `stable_for()` began
    Stable,
    /// The sensor acknowledged a save of its dynamic calibration data
    Saved,
}

/// Calibration state machine plus the host-side stability timer.
///
/// Transitions happen only through explicit commands issued to the sensor;
/// the stability timer is pure host bookkeeping over repeated accuracy
/// readings.
#[derive(Debug, Default)]
pub struct CalibrationState {
    begun: bool,
    saved: bool,
    last_status: Option<u8>,
    stability_since: Option<Instant>,
}

impl CalibrationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase, derived from commands issued and accuracy observed
    pub fn phase(&self) -> CalibrationPhase {
        if self.saved {
            CalibrationPhase::Saved
        } else if self.stability_since.is_some() {
            CalibrationPhase::Stable
        } else if self.begun {
            CalibrationPhase::Calibrating
        } else {
            CalibrationPhase::Idle
        }
    }

    /// Mark that a begin-calibration command was sent
    pub(crate) fn begin(&mut self) {
        self.begun = true;
        self.saved = false;
        self.stability_since = None;
    }

    /// Record the status byte of a motion-engine calibration response
    pub(crate) fn set_status(&mut self, status: u8) {
        self.last_status = Some(status);
    }

    /// Mark that the sensor acknowledged a save-calibration command
    pub(crate) fn mark_saved(&mut self) {
        self.saved = true;
    }

    /// Status byte of the most recent calibration command response
    pub fn last_status(&self) -> Option<u8> {
        self.last_status
    }

    /// Feed one accuracy reading into the stability timer.
    ///
    /// The timer starts on the first reading at Medium or better and resets
    /// whenever accuracy drops below Medium.
    pub fn observe_accuracy(&mut self, accuracy: Accuracy) {
        if accuracy >= Accuracy::Medium {
            if self.stability_since.is_none() {
                self.stability_since = Some(Instant::now());
            }
        } else {
            self.stability_since = None;
        }
    }

    /// How long accuracy has continuously held at Medium or better
    pub fn stable_for(&self) -> Option<Duration> {
        self.stability_since.map(|since| since.elapsed())
    }

    /// Forget everything (after a sensor reset)
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let mut cal = CalibrationState::new();
        assert_eq!(cal.phase(), CalibrationPhase::Idle);

        cal.begin();
        assert_eq!(cal.phase(), CalibrationPhase::Calibrating);

        cal.observe_accuracy(Accuracy::Medium);
        assert_eq!(cal.phase(), CalibrationPhase::Stable);
        assert!(cal.stable_for().is_some());

        cal.mark_saved();
        assert_eq!(cal.phase(), CalibrationPhase::Saved);
    }

    #[test]
    fn test_stability_timer_resets_on_accuracy_drop() {
        let mut cal = CalibrationState::new();
        cal.begin();

        cal.observe_accuracy(Accuracy::High);
        let first = cal.stable_for().unwrap();

        // Staying at Medium or better keeps the original start time
        cal.observe_accuracy(Accuracy::Medium);
        assert!(cal.stable_for().unwrap() >= first);

        // Dropping below Medium restarts the timer
        cal.observe_accuracy(Accuracy::Low);
        assert!(cal.stable_for().is_none());
        assert_eq!(cal.phase(), CalibrationPhase::Calibrating);
    }

    #[test]
    fn test_status_bookkeeping() {
        let mut cal = CalibrationState::new();
        assert_eq!(cal.last_status(), None);
        cal.set_status(0);
        assert_eq!(cal.last_status(), Some(0));
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut cal = CalibrationState::new();
        cal.begin();
        cal.observe_accuracy(Accuracy::High);
        cal.reset();
        assert_eq!(cal.phase(), CalibrationPhase::Idle);
        assert_eq!(cal.last_status(), None);
    }

    #[test]
    fn test_tare_basis_values() {
        assert_eq!(TareBasis::RotationVector.value(), 0);
        assert_eq!(TareBasis::GamingRotationVector.value(), 1);
        assert_eq!(TareBasis::GeomagneticRotationVector.value(), 2);
    }
}
