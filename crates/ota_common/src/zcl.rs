//! Zigbee cluster library identifiers used by the calibration watchdog
//!
//! Only the handful of codes needed to talk to the thermostat cluster of a
//! radiator valve are defined here. Encoding and transport belong to the
//! `DeviceLink` implementation.

/// Basic cluster, served by every device.
pub const CLUSTER_BASIC: u16 = 0x0000;

/// Standard HVAC thermostat cluster.
pub const CLUSTER_HVAC_THERMOSTAT: u16 = 0x0201;

/// Manufacturer-specific adaptation status register on the thermostat cluster.
pub const ATTR_ADAPTATION_STATUS: u16 = 0x4022;

/// Manufacturer-specific "calibrate valve" command on the thermostat cluster.
pub const CMD_CALIBRATE_VALVE: u8 = 0x41;

/// Robert Bosch GmbH manufacturer code.
pub const MANUFACTURER_CODE_BOSCH: u16 = 0x1209;

/// Model identifier of the Bosch radiator thermostat II.
pub const MODEL_BOSCH_BTH_RA: &str = "BTH-RA";
