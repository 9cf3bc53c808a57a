//! Adaptation status register decoding

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of the adaptation status register.
///
/// The register is 16 bits wide. Only `ReadyToCalibrate`, `Error` and
/// `Success` drive the calibration session; every other value (including
/// codes this crate does not know) means the device is still busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationStatus {
    /// No adaptation pending (0x00)
    None,
    /// Valve is mounted and waits for the calibrate command (0x01)
    ReadyToCalibrate,
    /// Valve travel is being measured (0x02)
    CalibrationInProgress,
    /// Adaptation failed on the device (0x03)
    Error,
    /// Adaptation finished (0x04)
    Success,
    /// Any code outside the documented range
    Unknown(u16),
}

impl AdaptationStatus {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x00 => AdaptationStatus::None,
            0x01 => AdaptationStatus::ReadyToCalibrate,
            0x02 => AdaptationStatus::CalibrationInProgress,
            0x03 => AdaptationStatus::Error,
            0x04 => AdaptationStatus::Success,
            other => AdaptationStatus::Unknown(other),
        }
    }

    pub fn raw(&self) -> u16 {
        match self {
            AdaptationStatus::None => 0x00,
            AdaptationStatus::ReadyToCalibrate => 0x01,
            AdaptationStatus::CalibrationInProgress => 0x02,
            AdaptationStatus::Error => 0x03,
            AdaptationStatus::Success => 0x04,
            AdaptationStatus::Unknown(raw) => *raw,
        }
    }

    /// True for every value the session treats as "keep waiting".
    pub fn is_pending(&self) -> bool {
        !matches!(
            self,
            AdaptationStatus::ReadyToCalibrate | AdaptationStatus::Error | AdaptationStatus::Success
        )
    }
}

impl fmt::Display for AdaptationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdaptationStatus::None => write!(f, "none"),
            AdaptationStatus::ReadyToCalibrate => write!(f, "ready_to_calibrate"),
            AdaptationStatus::CalibrationInProgress => write!(f, "calibration_in_progress"),
            AdaptationStatus::Error => write!(f, "error"),
            AdaptationStatus::Success => write!(f, "success"),
            AdaptationStatus::Unknown(raw) => write!(f, "unknown(0x{:04x})", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(AdaptationStatus::from_raw(0x01), AdaptationStatus::ReadyToCalibrate);
        assert_eq!(AdaptationStatus::from_raw(0x03), AdaptationStatus::Error);
        assert_eq!(AdaptationStatus::from_raw(0x04), AdaptationStatus::Success);
        assert_eq!(AdaptationStatus::from_raw(0x04).raw(), 0x04);
    }

    #[test]
    fn test_unknown_code_is_pending() {
        let status = AdaptationStatus::from_raw(0x7f);
        assert_eq!(status, AdaptationStatus::Unknown(0x7f));
        assert!(status.is_pending());
        assert_eq!(status.raw(), 0x7f);
        assert_eq!(status.to_string(), "unknown(0x007f)");
    }

    #[test]
    fn test_only_three_codes_are_actionable() {
        let actionable: Vec<u16> = (0..=0x10)
            .filter(|raw| !AdaptationStatus::from_raw(*raw).is_pending())
            .collect();
        assert_eq!(actionable, vec![0x01, 0x03, 0x04]);
    }
}
