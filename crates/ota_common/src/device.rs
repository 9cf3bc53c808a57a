//! Device model as seen by the OTA orchestrator
//!
//! Devices are read-only here. Sessions hold an `Arc<Device>` so they observe
//! the same instance the rest of the daemon works with.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 64-bit IEEE (EUI-64) address of a Zigbee device.
///
/// Serialized as its `0x`-prefixed hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IeeeAddr(pub u64);

impl fmt::Display for IeeeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl FromStr for IeeeAddr {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(hex, 16).map(IeeeAddr)
    }
}

impl Serialize for IeeeAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IeeeAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// One addressable sub-unit of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: u8,
    #[serde(default)]
    pub input_clusters: Vec<u16>,
    #[serde(default)]
    pub output_clusters: Vec<u16>,
}

impl Endpoint {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            input_clusters: Vec::new(),
            output_clusters: Vec::new(),
        }
    }

    pub fn with_output_cluster(mut self, cluster: u16) -> Self {
        self.output_clusters.push(cluster);
        self
    }

    pub fn with_input_cluster(mut self, cluster: u16) -> Self {
        self.input_clusters.push(cluster);
        self
    }

    pub fn supports_output_cluster(&self, cluster: u16) -> bool {
        self.output_clusters.contains(&cluster)
    }
}

/// A paired device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub ieee_addr: IeeeAddr,
    /// Model identifier reported by the basic cluster, if the interview got that far
    pub model_id: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Device {
    pub fn new(ieee_addr: IeeeAddr, model_id: impl Into<String>) -> Self {
        Self {
            ieee_addr,
            model_id: Some(model_id.into()),
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// First endpoint exposing `cluster` as an output cluster.
    pub fn find_output_endpoint(&self, cluster: u16) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.supports_output_cluster(cluster))
    }

    pub fn model_is(&self, model: &str) -> bool {
        self.model_id.as_deref() == Some(model)
    }
}
