//! Calibration session driver
//!
//! Runs one device's post-update valve adaptation: polls the adaptation status
//! register every `POLL_INTERVAL`, sends the calibrate command when the valve
//! reports `ready_to_calibrate` and gives up after `ADAPTATION_TIMEOUT`.
//!
//! Reads and commands run as independent tasks in a `JoinSet`, so a slow
//! command never delays the next poll. Their results come back through the
//! driver loop one at a time and are handed to the `CalibrationMachine`.
//! Every tick passes through the machine too, so the deadline holds even when
//! the link never answers.

use super::machine::{CalibrationMachine, Effect, SessionEvent, SessionState, Termination};
use super::{ADAPTATION_TIMEOUT, POLL_INTERVAL};
use ota_common::zcl::{
    ATTR_ADAPTATION_STATUS, CLUSTER_HVAC_THERMOSTAT, CMD_CALIBRATE_VALVE, MANUFACTURER_CODE_BOSCH,
};
use chrono::{DateTime, Utc};
use ota_common::{
    AdaptationStatus, CalibrationError, Device, DeviceLink, EndpointRef, FrameOptions, IeeeAddr,
    LinkError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub device: IeeeAddr,
    pub state: SessionState,
    /// Status reads issued
    pub polls: u32,
    pub read_faults: u32,
    pub commands_issued: u32,
    pub command_faults: u32,
    pub elapsed_ms: u64,
    pub error: Option<CalibrationError>,
}

impl CalibrationReport {
    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Succeeded
    }

    pub fn into_result(self) -> Result<CalibrationReport, CalibrationError> {
        match self.error.clone() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Recurring poll timer, owned and cancelled by the session only.
struct PollTimer {
    interval: Option<Interval>,
}

impl PollTimer {
    fn idle() -> Self {
        Self { interval: None }
    }

    /// First tick fires immediately
    fn arm(&mut self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(ticker);
    }

    fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Returns false if the timer was already cancelled
    fn cancel(&mut self) -> bool {
        self.interval.take().is_some()
    }
}

/// Post-update adaptation watchdog for one device
pub struct CalibrationSession {
    device: Arc<Device>,
    link: Arc<dyn DeviceLink>,
    target: EndpointRef,
    machine: CalibrationMachine,
    timer: PollTimer,
    in_flight: JoinSet<SessionEvent>,
    started_at: Instant,
    /// Wall clock at `started_at`, for log output
    started_wall: DateTime<Utc>,
    polls: u32,
    read_faults: u32,
    commands_issued: u32,
    command_faults: u32,
}

impl CalibrationSession {
    /// Arm the deadline and resolve the thermostat endpoint.
    ///
    /// Fails when the device exposes no thermostat output cluster; that is a
    /// device mismatch and is not retried.
    pub fn new(device: Arc<Device>, link: Arc<dyn DeviceLink>) -> Result<Self, CalibrationError> {
        let started_at = Instant::now();
        let started_wall = Utc::now();
        let deadline = started_at + ADAPTATION_TIMEOUT;

        let endpoint = device
            .find_output_endpoint(CLUSTER_HVAC_THERMOSTAT)
            .ok_or(CalibrationError::NoThermostatEndpoint {
                device: device.ieee_addr,
            })?;
        let target = EndpointRef {
            device: device.ieee_addr,
            endpoint: endpoint.id,
        };

        Ok(Self {
            device,
            link,
            target,
            machine: CalibrationMachine::new(deadline),
            timer: PollTimer::idle(),
            in_flight: JoinSet::new(),
            started_at,
            started_wall,
            polls: 0,
            read_faults: 0,
            commands_issued: 0,
            command_faults: 0,
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Wall-clock time at which the session gives up
    pub fn abort_at(&self) -> DateTime<Utc> {
        self.started_wall + chrono::Duration::seconds(ADAPTATION_TIMEOUT.as_secs() as i64)
    }

    /// Run the session on its own task
    pub fn spawn(self) -> JoinHandle<CalibrationReport> {
        tokio::spawn(self.run())
    }

    /// Drive the session until it reaches a terminal state
    pub async fn run(mut self) -> CalibrationReport {
        let addr = self.device.ieee_addr;
        let abort_at = self.abort_at();
        info!(
            "Starting valve calibration watchdog for device {} (endpoint {})",
            addr, self.target.endpoint
        );
        debug!(
            "Set timeout for valve adaptation of device {} to {}",
            addr,
            abort_at.to_rfc3339()
        );

        debug!("Add valve adaptation status check to timer");
        self.timer.arm(POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = self.timer.tick(), if self.timer.is_active() => {
                    if let Some(termination) = self.apply(SessionEvent::PollDue) {
                        return self.finish(termination);
                    }
                    self.poll_status();
                }
                Some(joined) = self.in_flight.join_next() => {
                    // A crashed request counts as a failed read
                    let event = joined.unwrap_or_else(|e| {
                        SessionEvent::StatusRead(Err(LinkError::Transport(format!(
                            "request task failed: {}",
                            e
                        ))))
                    });
                    if let Some(termination) = self.apply(event) {
                        return self.finish(termination);
                    }
                }
            }
        }
    }

    fn poll_status(&mut self) {
        self.polls += 1;
        let link = Arc::clone(&self.link);
        let target = self.target;

        self.in_flight.spawn(async move {
            let result = link
                .read_attribute(
                    target,
                    CLUSTER_HVAC_THERMOSTAT,
                    ATTR_ADAPTATION_STATUS,
                    FrameOptions::manufacturer(MANUFACTURER_CODE_BOSCH),
                )
                .await
                .map(AdaptationStatus::from_raw);
            SessionEvent::StatusRead(result)
        });
    }

    fn issue_calibration(&mut self) {
        self.commands_issued += 1;
        let link = Arc::clone(&self.link);
        let target = self.target;
        debug!("Sending valve calibration command to device {}", target.device);

        self.in_flight.spawn(async move {
            let result = link
                .send_command(
                    target,
                    CLUSTER_HVAC_THERMOSTAT,
                    CMD_CALIBRATE_VALVE,
                    &[],
                    FrameOptions::manufacturer(MANUFACTURER_CODE_BOSCH),
                )
                .await;
            SessionEvent::CalibrationSent(result)
        });
    }

    fn stop_polling(&mut self) {
        if self.timer.cancel() {
            debug!("Remove valve adaptation status check from timer");
        }
    }

    /// Feed one completion into the machine and execute its effects.
    fn apply(&mut self, event: SessionEvent) -> Option<Termination> {
        let addr = self.device.ieee_addr;
        match &event {
            SessionEvent::PollDue => {}
            SessionEvent::StatusRead(Ok(status)) => {
                debug!("Adaptation status of device {} is {}", addr, status);
            }
            SessionEvent::StatusRead(Err(e)) => {
                self.read_faults += 1;
                warn!(
                    "Valve adaptation status of device {} could not be read: {}",
                    addr, e
                );
            }
            SessionEvent::CalibrationSent(Ok(())) => {
                debug!("Valve calibration command accepted by device {}", addr);
            }
            SessionEvent::CalibrationSent(Err(e)) => {
                self.command_faults += 1;
                warn!("Valve calibration command to device {} failed: {}", addr, e);
            }
        }

        for effect in self.machine.handle(&event, Instant::now()) {
            match effect {
                Effect::IssueCalibration => self.issue_calibration(),
                Effect::CancelTimer => self.stop_polling(),
                Effect::Finish(termination) => return Some(termination),
            }
        }
        None
    }

    fn finish(mut self, termination: Termination) -> CalibrationReport {
        // Late completions of this session must not reach the device or the machine
        self.in_flight.abort_all();

        let addr = self.device.ieee_addr;
        let elapsed = self.started_at.elapsed();
        let error = termination.into_result(addr).err();

        match &error {
            None => info!(
                "Valve calibration of device {} finished after {}s",
                addr,
                elapsed.as_secs()
            ),
            Some(err) => error!("{}", err),
        }

        CalibrationReport {
            device: addr,
            state: self.machine.state(),
            polls: self.polls,
            read_faults: self.read_faults,
            commands_issued: self.commands_issued,
            command_faults: self.command_faults,
            elapsed_ms: elapsed.as_millis() as u64,
            error,
        }
    }
}

/// Start a calibration session for `device` on a background task.
pub fn start_calibration_session(
    device: Arc<Device>,
    link: Arc<dyn DeviceLink>,
) -> Result<JoinHandle<CalibrationReport>, CalibrationError> {
    CalibrationSession::new(device, link).map(CalibrationSession::spawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ota_common::{Endpoint, ScriptedDeviceLink};

    fn valve() -> Arc<Device> {
        Arc::new(
            Device::new(IeeeAddr(0x1234), "BTH-RA")
                .with_endpoint(Endpoint::new(1).with_output_cluster(CLUSTER_HVAC_THERMOSTAT)),
        )
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_fatal() {
        let device = Arc::new(Device::new(IeeeAddr(0x1234), "BTH-RA").with_endpoint(Endpoint::new(1)));
        let link = Arc::new(ScriptedDeviceLink::builder().build());

        let err = CalibrationSession::new(device, link.clone()).err().unwrap();
        assert_eq!(
            err,
            CalibrationError::NoThermostatEndpoint {
                device: IeeeAddr(0x1234)
            }
        );
        assert_eq!(link.read_count(), 0);
    }

    #[tokio::test]
    async fn test_new_session_starts_polling() {
        let link = Arc::new(ScriptedDeviceLink::builder().build());
        let session = CalibrationSession::new(valve(), link).unwrap();
        assert_eq!(session.state(), SessionState::Polling);
        assert_eq!(session.target.endpoint, 1);
        assert!(!session.timer.is_active());
    }

    #[tokio::test]
    async fn test_abort_time_fixed_at_creation() {
        let link = Arc::new(ScriptedDeviceLink::builder().build());
        let session = CalibrationSession::new(valve(), link).unwrap();
        let created = Utc::now();

        std::thread::sleep(Duration::from_millis(20));

        let timeout = chrono::Duration::seconds(ADAPTATION_TIMEOUT.as_secs() as i64);
        assert!(session.abort_at() <= created + timeout);
        assert_eq!(session.abort_at() - session.started_wall, timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timer_cancels_once() {
        let mut timer = PollTimer::idle();
        timer.arm(POLL_INTERVAL);
        timer.tick().await;
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let link = Arc::new(
            ScriptedDeviceLink::builder()
                .statuses([AdaptationStatus::Success])
                .build(),
        );
        let report = CalibrationSession::new(valve(), link.clone())
            .unwrap()
            .run()
            .await;

        assert!(report.succeeded());
        assert_eq!(report.polls, 1);
        assert_eq!(report.elapsed_ms, 0);
        assert_eq!(link.command_count(), 0);
    }
}
