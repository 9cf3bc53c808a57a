//! Update orchestrator
//!
//! Delegates availability checks and image transfer to the `FirmwareSource`
//! and, once an update has been applied to a valve that needs it, starts a
//! calibration session in the background. Calibration is a best-effort
//! follow-up: its outcome never changes the result of the update itself.

use crate::calibration::{CalibrationReport, CalibrationSession};
use ota_common::{
    CalibrationConfig, CalibrationError, Device, DeviceLink, FirmwareSource, FirmwareVersion,
    ImageInfo, OtaError, ProgressCallback,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Outcome of one post-update calibration, as delivered to the report sink.
///
/// `Err` means no session could be started for the device.
pub type CalibrationOutcome = Result<CalibrationReport, CalibrationError>;

pub struct UpdateOrchestrator {
    firmware: Arc<dyn FirmwareSource>,
    link: Arc<dyn DeviceLink>,
    config: CalibrationConfig,
    reports: Option<mpsc::UnboundedSender<CalibrationOutcome>>,
}

impl UpdateOrchestrator {
    pub fn new(
        firmware: Arc<dyn FirmwareSource>,
        link: Arc<dyn DeviceLink>,
        config: CalibrationConfig,
    ) -> Self {
        Self {
            firmware,
            link,
            config,
            reports: None,
        }
    }

    /// Forward every calibration outcome to `sink` for operator attention
    pub fn with_report_sink(mut self, sink: mpsc::UnboundedSender<CalibrationOutcome>) -> Self {
        self.reports = Some(sink);
        self
    }

    pub fn requires_calibration(&self, device: &Device) -> bool {
        self.config.requires_calibration(device)
    }

    pub async fn is_update_available(
        &self,
        device: &Device,
        request: Option<ImageInfo>,
    ) -> Result<bool, OtaError> {
        self.firmware.is_update_available(device, request).await
    }

    /// Flash the newest image; on success, start calibration if the model needs it.
    ///
    /// Returns as soon as the update finished. The calibration session keeps
    /// running on its own task.
    pub async fn update_to_latest(
        &self,
        device: &Arc<Device>,
        on_progress: ProgressCallback,
    ) -> Result<FirmwareVersion, OtaError> {
        let version = self
            .firmware
            .update_to_latest(device, on_progress)
            .await
            .map_err(|e| {
                warn!("Firmware update of device {} failed: {}", device.ieee_addr, e);
                e
            })?;

        info!(
            "Device {} updated to firmware {}",
            device.ieee_addr, version
        );

        if self.requires_calibration(device) {
            self.start_calibration_session(Arc::clone(device));
        }

        Ok(version)
    }

    /// Fire-and-forget start of a calibration session.
    pub fn start_calibration_session(&self, device: Arc<Device>) {
        let session = match CalibrationSession::new(device, Arc::clone(&self.link)) {
            Ok(session) => session,
            Err(e) => {
                error!("Cannot start valve calibration: {}", e);
                self.report(Err(e));
                return;
            }
        };

        let reports = self.reports.clone();
        tokio::spawn(async move {
            let report = session.run().await;
            if let Some(sink) = reports {
                let _ = sink.send(Ok(report));
            }
        });
    }

    fn report(&self, outcome: CalibrationOutcome) {
        if let Some(sink) = &self.reports {
            let _ = sink.send(outcome);
        }
    }
}
