//! Post-update valve calibration
//!
//! After a firmware update some radiator valves must re-learn their valve
//! travel before they regulate again. The device exposes no push notification
//! for this, so a session polls the adaptation status register until the
//! device reports success or an error, or until the deadline passes.
//!
//! ```text
//!            ready_to_calibrate / send calibrate
//!   Polling ───────────────────────────────────► Calibrating
//!     │  ▲ tick, other status, read fault          │  ▲ tick, other status,
//!     │  └─ (deadline check)                       │  └─ read or command fault
//!     │                                            │
//!     ├── success ─────────────► Succeeded ◄───────┤
//!     ├── error ───────────────► Failed    ◄───────┤
//!     └── now >= deadline ─────► TimedOut  ◄───────┘
//! ```
//!
//! `machine` holds the pure transition function, `session` runs it against a
//! `DeviceLink` with a recurring timer.

pub mod machine;
pub mod session;

use std::time::Duration;

/// Period between two adaptation status reads
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Hard limit for one calibration session, measured from its start
pub const ADAPTATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub use machine::{
    transition, CalibrationMachine, Effect, SessionEvent, SessionState, Step, Termination,
};
pub use session::{start_calibration_session, CalibrationReport, CalibrationSession};
