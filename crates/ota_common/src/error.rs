//! Error types for otad.

use crate::device::IeeeAddr;
use serde::Serialize;
use thiserror::Error;

/// Failure of a single request over the device link.
///
/// Always transient from the calibration session's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("request to {device} timed out")]
    Timeout { device: IeeeAddr },

    #[error("device {device} answered with status 0x{status:02x}")]
    Status { device: IeeeAddr, status: u8 },

    #[error("device {device} is unreachable")]
    Unreachable { device: IeeeAddr },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure of the firmware availability check or the image transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtaError {
    #[error("no firmware image available for device {0}")]
    NoImageAvailable(IeeeAddr),

    #[error("firmware transfer to device {device} failed: {reason}")]
    Transfer { device: IeeeAddr, reason: String },

    #[error("link error: {0}")]
    Link(#[from] LinkError),
}

/// Terminal failure of a post-update calibration session.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationError {
    #[error("device {device} has no endpoint with a thermostat output cluster")]
    NoThermostatEndpoint { device: IeeeAddr },

    #[error("valve adaptation of device {device} reported an error, please check the device")]
    AdaptationFailed { device: IeeeAddr },

    #[error("valve calibration of device {device} timed out, please check the device")]
    Timeout { device: IeeeAddr },
}

impl CalibrationError {
    pub fn device(&self) -> IeeeAddr {
        match self {
            CalibrationError::NoThermostatEndpoint { device }
            | CalibrationError::AdaptationFailed { device }
            | CalibrationError::Timeout { device } => *device,
        }
    }
}

/// Failure to load or store the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
