//! Scripted end-to-end run of an update followed by calibration
//!
//! Wires the real orchestrator and session against `ScriptedDeviceLink` and
//! `StaticFirmwareSource`, for `otad simulate` and for tests.

use crate::calibration::CalibrationReport;
use crate::orchestrator::UpdateOrchestrator;
use ota_common::zcl::{CLUSTER_BASIC, CLUSTER_HVAC_THERMOSTAT};
use ota_common::{
    CalibrationConfig, CalibrationError, Device, Endpoint, FirmwareVersion, IeeeAddr, LinkError,
    ProgressCallback, ScriptedDeviceLink, ScriptedRead, StaticFirmwareSource, UpdateProgress,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Version reported by the simulated firmware source
pub const SIMULATED_VERSION: FirmwareVersion = FirmwareVersion(0x0300_0c00);

/// What the scripted device and firmware source will do
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub ieee_addr: IeeeAddr,
    pub model: String,
    /// Raw adaptation status codes, one per poll; pending once exhausted
    pub statuses: Vec<u16>,
    /// Number of reads that fail before the status script starts
    pub read_faults: usize,
    pub fail_command: bool,
    pub fail_update: bool,
    pub thermostat_endpoint: bool,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            ieee_addr: IeeeAddr(0x0018_2f00_0012_3456),
            model: ota_common::zcl::MODEL_BOSCH_BTH_RA.to_string(),
            statuses: vec![0x00, 0x00, 0x01, 0x02, 0x04],
            read_faults: 0,
            fail_command: false,
            fail_update: false,
            thermostat_endpoint: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub device: IeeeAddr,
    pub firmware_version: Option<FirmwareVersion>,
    pub update_error: Option<String>,
    pub calibration: Option<CalibrationReport>,
    pub calibration_error: Option<CalibrationError>,
    /// Commands the scripted device received
    pub commands_received: usize,
}

impl SimulationPlan {
    fn device(&self) -> Device {
        let mut endpoint = Endpoint::new(1).with_input_cluster(CLUSTER_BASIC);
        if self.thermostat_endpoint {
            endpoint = endpoint
                .with_input_cluster(CLUSTER_HVAC_THERMOSTAT)
                .with_output_cluster(CLUSTER_HVAC_THERMOSTAT);
        }
        Device::new(self.ieee_addr, self.model.clone()).with_endpoint(endpoint)
    }

    fn link(&self) -> ScriptedDeviceLink {
        let mut builder = ScriptedDeviceLink::builder();
        for _ in 0..self.read_faults {
            builder = builder.read(ScriptedRead::Fault(LinkError::Timeout {
                device: self.ieee_addr,
            }));
        }
        for raw in &self.statuses {
            builder = builder.read(ScriptedRead::Value(*raw));
        }
        if self.fail_command {
            builder = builder.command_result(Err(LinkError::Status {
                device: self.ieee_addr,
                status: 0x01,
            }));
        }
        builder.build()
    }

    fn firmware(&self) -> StaticFirmwareSource {
        let source = if self.fail_update {
            StaticFirmwareSource::failing("image block request aborted by device")
        } else {
            StaticFirmwareSource::succeeding(SIMULATED_VERSION)
        };
        source.with_progress_steps(4, Duration::from_millis(500))
    }
}

/// Run `plan` to completion, including any calibration session it triggers
pub async fn run_simulation(plan: &SimulationPlan, config: &CalibrationConfig) -> SimulationResult {
    let device = Arc::new(plan.device());
    let link = Arc::new(plan.link());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator =
        UpdateOrchestrator::new(Arc::new(plan.firmware()), link.clone(), config.clone())
            .with_report_sink(tx);

    let on_progress: ProgressCallback = Arc::new(|p: UpdateProgress| {
        info!(
            "Update progress {:.0}% ({}s remaining)",
            p.percent,
            p.remaining.map(|d| d.as_secs()).unwrap_or(0)
        );
    });

    let mut result = SimulationResult {
        device: device.ieee_addr,
        firmware_version: None,
        update_error: None,
        calibration: None,
        calibration_error: None,
        commands_received: 0,
    };

    match orchestrator.update_to_latest(&device, on_progress).await {
        Ok(version) => {
            result.firmware_version = Some(version);
            if orchestrator.requires_calibration(&device) {
                match rx.recv().await {
                    Some(Ok(report)) => result.calibration = Some(report),
                    Some(Err(e)) => result.calibration_error = Some(e),
                    None => {}
                }
            }
        }
        Err(e) => result.update_error = Some(e.to_string()),
    }

    result.commands_received = link.command_count();
    result
}
