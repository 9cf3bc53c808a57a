//! Firmware source abstraction
//!
//! Image discovery and transfer are owned by the OTA backend. The orchestrator
//! sees them as two calls: "is there something newer" and "flash the latest".

use crate::device::Device;
use crate::error::OtaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Image description sent by a device in a query-next-image request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub image_type: u16,
    pub manufacturer_code: u16,
    pub file_version: u32,
}

/// OTA file version of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion(pub u32);

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Progress report during an image transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateProgress {
    /// 0.0 to 100.0
    pub percent: f32,
    /// Estimated time left, once the backend can tell
    pub remaining: Option<Duration>,
}

pub type ProgressCallback = Arc<dyn Fn(UpdateProgress) + Send + Sync>;

#[async_trait]
pub trait FirmwareSource: Send + Sync {
    async fn is_update_available(
        &self,
        device: &Device,
        request: Option<ImageInfo>,
    ) -> Result<bool, OtaError>;

    /// Transfer the newest image and wait until the device has applied it
    async fn update_to_latest(
        &self,
        device: &Device,
        on_progress: ProgressCallback,
    ) -> Result<FirmwareVersion, OtaError>;
}

/// Firmware source with a fixed answer, for tests and simulation.
#[derive(Debug, Clone)]
pub struct StaticFirmwareSource {
    available: bool,
    outcome: Result<FirmwareVersion, String>,
    steps: u32,
    step_delay: Duration,
}

impl StaticFirmwareSource {
    /// Every update succeeds with `version`
    pub fn succeeding(version: FirmwareVersion) -> Self {
        Self {
            available: true,
            outcome: Ok(version),
            steps: 4,
            step_delay: Duration::ZERO,
        }
    }

    /// Every update fails with a transfer error carrying `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            available: true,
            outcome: Err(reason.into()),
            steps: 4,
            step_delay: Duration::ZERO,
        }
    }

    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Number of progress callbacks and the pause between them
    pub fn with_progress_steps(mut self, steps: u32, step_delay: Duration) -> Self {
        self.steps = steps;
        self.step_delay = step_delay;
        self
    }
}

#[async_trait]
impl FirmwareSource for StaticFirmwareSource {
    async fn is_update_available(
        &self,
        _device: &Device,
        _request: Option<ImageInfo>,
    ) -> Result<bool, OtaError> {
        Ok(self.available)
    }

    async fn update_to_latest(
        &self,
        device: &Device,
        on_progress: ProgressCallback,
    ) -> Result<FirmwareVersion, OtaError> {
        if !self.available {
            return Err(OtaError::NoImageAvailable(device.ieee_addr));
        }

        for step in 1..=self.steps {
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            let left = self.steps - step;
            on_progress(UpdateProgress {
                percent: step as f32 * 100.0 / self.steps as f32,
                remaining: Some(self.step_delay * left),
            });
        }

        self.outcome.clone().map_err(|reason| OtaError::Transfer {
            device: device.ieee_addr,
            reason,
        })
    }
}
