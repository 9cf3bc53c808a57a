//! Device link abstraction
//!
//! The calibration watchdog only needs two primitives from the Zigbee stack:
//! send a cluster command to an endpoint and read one attribute from it. Both
//! are asynchronous and may fail at any time.
//!
//! ## Usage
//!
//! Production code plugs the coordinator adapter in behind `DeviceLink`.
//! Tests and `otad simulate` use `ScriptedDeviceLink`, which plays back a
//! pre-configured sequence of attribute reads and records every command.

use crate::adaptation::AdaptationStatus;
use crate::device::IeeeAddr;
use crate::error::LinkError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Link Trait
// ============================================================================

/// Address of one endpoint on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointRef {
    pub device: IeeeAddr,
    pub endpoint: u8,
}

/// ZCL frame options attached to a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOptions {
    /// Set for manufacturer-specific commands and attributes
    pub manufacturer_code: Option<u16>,
}

impl FrameOptions {
    pub fn manufacturer(code: u16) -> Self {
        Self {
            manufacturer_code: Some(code),
            ..Self::default()
        }
    }
}

/// Request/response primitives towards a device.
///
/// Implementations must tolerate concurrent outstanding requests; sessions for
/// different devices share one link without extra locking.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Send a cluster-specific command and wait for the acknowledgement
    async fn send_command(
        &self,
        target: EndpointRef,
        cluster: u16,
        command: u8,
        payload: &[u8],
        options: FrameOptions,
    ) -> Result<(), LinkError>;

    /// Read a single attribute, widened to 16 bits
    async fn read_attribute(
        &self,
        target: EndpointRef,
        cluster: u16,
        attribute: u16,
        options: FrameOptions,
    ) -> Result<u16, LinkError>;
}

// ============================================================================
// Scripted Link (Testing / Simulation)
// ============================================================================

/// One pre-configured answer to an attribute read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRead {
    Value(u16),
    Fault(LinkError),
    /// The device never answers; the read stays pending forever
    Unanswered,
}

impl ScriptedRead {
    pub fn status(status: AdaptationStatus) -> Self {
        ScriptedRead::Value(status.raw())
    }

    pub fn pending() -> Self {
        Self::status(AdaptationStatus::None)
    }
}

/// Command recorded by `ScriptedDeviceLink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub target: EndpointRef,
    pub cluster: u16,
    pub command: u8,
    pub options: FrameOptions,
    /// Number of reads this device had served before the command arrived
    pub after_reads: usize,
}

/// Read script and command results of one device.
#[derive(Debug, Clone)]
struct DeviceScript {
    reads: VecDeque<ScriptedRead>,
    fallback: ScriptedRead,
    command_results: VecDeque<Result<(), LinkError>>,
    latency: Duration,
    served: usize,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            reads: VecDeque::new(),
            fallback: ScriptedRead::pending(),
            command_results: VecDeque::new(),
            latency: Duration::ZERO,
            served: 0,
        }
    }
}

impl DeviceScript {
    fn next_read(&mut self) -> ScriptedRead {
        self.served += 1;
        match self.reads.pop_front() {
            Some(read) => read,
            None => self.fallback.clone(),
        }
    }

    fn next_command_result(&mut self) -> Result<(), LinkError> {
        self.command_results.pop_front().unwrap_or(Ok(()))
    }
}

/// Fake link that replays a script of reads.
///
/// Once the script is exhausted every further read returns the fallback.
/// Devices registered with `ScriptedDeviceLinkBuilder::device` get their own
/// script; every other address shares the default one. The link never holds
/// a lock across an await, so requests for different devices overlap freely.
///
/// ```rust,ignore
/// let link = ScriptedDeviceLink::builder()
///     .read(ScriptedRead::pending())
///     .read(ScriptedRead::status(AdaptationStatus::Success))
///     .build();
/// ```
#[derive(Debug)]
pub struct ScriptedDeviceLink {
    default: Mutex<DeviceScript>,
    devices: HashMap<IeeeAddr, Mutex<DeviceScript>>,
    read_count: AtomicUsize,
    commands: Mutex<Vec<SentCommand>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedDeviceLink {
    pub fn builder() -> ScriptedDeviceLinkBuilder {
        ScriptedDeviceLinkBuilder::default()
    }

    fn script(&self, device: IeeeAddr) -> &Mutex<DeviceScript> {
        self.devices.get(&device).unwrap_or(&self.default)
    }

    /// Number of attribute reads served so far, across all devices
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Number of reads served from `device`'s own script, zero without one
    pub fn reads_for(&self, device: IeeeAddr) -> usize {
        self.devices
            .get(&device)
            .map(|script| lock(script).served)
            .unwrap_or(0)
    }

    /// Commands received so far, oldest first
    pub fn commands(&self) -> Vec<SentCommand> {
        lock(&self.commands).clone()
    }

    pub fn command_count(&self) -> usize {
        lock(&self.commands).len()
    }
}

#[async_trait]
impl DeviceLink for ScriptedDeviceLink {
    async fn send_command(
        &self,
        target: EndpointRef,
        cluster: u16,
        command: u8,
        _payload: &[u8],
        options: FrameOptions,
    ) -> Result<(), LinkError> {
        let (result, latency) = {
            let mut script = lock(self.script(target.device));
            lock(&self.commands).push(SentCommand {
                target,
                cluster,
                command,
                options,
                after_reads: script.served,
            });
            (script.next_command_result(), script.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        debug!(
            "Scripted command 0x{:02x} to {} -> {:?}",
            command, target.device, result
        );
        result
    }

    async fn read_attribute(
        &self,
        target: EndpointRef,
        _cluster: u16,
        attribute: u16,
        _options: FrameOptions,
    ) -> Result<u16, LinkError> {
        let (answer, latency) = {
            let mut script = lock(self.script(target.device));
            (script.next_read(), script.latency)
        };
        self.read_count.fetch_add(1, Ordering::SeqCst);

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        debug!(
            "Scripted read 0x{:04x} from {} -> {:?}",
            attribute, target.device, answer
        );
        match answer {
            ScriptedRead::Value(value) => Ok(value),
            ScriptedRead::Fault(err) => Err(err),
            ScriptedRead::Unanswered => std::future::pending().await,
        }
    }
}

/// Builder for `ScriptedDeviceLink`.
#[derive(Debug, Default)]
pub struct ScriptedDeviceLinkBuilder {
    script: DeviceScript,
    devices: HashMap<IeeeAddr, DeviceScript>,
}

impl ScriptedDeviceLinkBuilder {
    pub fn read(mut self, read: ScriptedRead) -> Self {
        self.script.reads.push_back(read);
        self
    }

    pub fn statuses<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = AdaptationStatus>,
    {
        self.script
            .reads
            .extend(statuses.into_iter().map(ScriptedRead::status));
        self
    }

    /// Answer returned once the scripted reads run out
    pub fn then_always(mut self, read: ScriptedRead) -> Self {
        self.script.fallback = read;
        self
    }

    /// Queue the result of the next command; unqueued commands succeed
    pub fn command_result(mut self, result: Result<(), LinkError>) -> Self {
        self.script.command_results.push_back(result);
        self
    }

    /// Delay applied to every request before it resolves
    pub fn latency(mut self, latency: Duration) -> Self {
        self.script.latency = latency;
        self
    }

    /// Give `device` its own script, configured like a standalone link.
    ///
    /// Per-device entries of `script` itself are ignored.
    pub fn device(mut self, device: IeeeAddr, script: ScriptedDeviceLinkBuilder) -> Self {
        self.devices.insert(device, script.script);
        self
    }

    pub fn build(self) -> ScriptedDeviceLink {
        ScriptedDeviceLink {
            default: Mutex::new(self.script),
            devices: self
                .devices
                .into_iter()
                .map(|(addr, script)| (addr, Mutex::new(script)))
                .collect(),
            read_count: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        }
    }
}
