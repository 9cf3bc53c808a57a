//! OTA Common - Shared device model, link traits and configuration for otad
//!
//! Everything the calibration watchdog needs to know about the outside world
//! lives here: how a device is addressed, what the thermostat cluster looks
//! like on the wire, and the two collaborator traits (`DeviceLink`,
//! `FirmwareSource`) together with scripted fakes for tests and simulation.

pub mod adaptation;
pub mod config;
pub mod device;
pub mod error;
pub mod firmware;
pub mod link;
pub mod zcl;

pub use adaptation::AdaptationStatus;
pub use config::{CalibrationConfig, Config, ConfigSource, LoggingConfig};
pub use device::{Device, Endpoint, IeeeAddr};
pub use error::{CalibrationError, ConfigError, LinkError, OtaError};
pub use firmware::{
    FirmwareSource, FirmwareVersion, ImageInfo, ProgressCallback, StaticFirmwareSource,
    UpdateProgress,
};
pub use link::{
    DeviceLink, EndpointRef, FrameOptions, ScriptedDeviceLink, ScriptedDeviceLinkBuilder,
    ScriptedRead, SentCommand,
};
